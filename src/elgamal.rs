use serde::{Deserialize, Serialize};

use crate::artifact::EncryptedShare;
use crate::error::TrusteeError;
use crate::group::{Element, Group};
use crate::symmetric;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(bound = "E: Element")]
pub struct Ciphertext<E: Element> {
    pub a: E,
    pub b: E,
}

#[derive(Debug, Clone)]
pub struct PublicKey<E: Element, G: Group<E>> {
    pub value: E,
    pub group: G,
}

impl<E: Element, G: Group<E>> PublicKey<E, G> {
    pub fn encrypt(&self, plaintext: &E) -> Ciphertext<E> {
        let randomness = self.group.rnd_exp();

        Ciphertext {
            a: plaintext
                .mul(&self.value.mod_pow(&randomness, &self.group.modulus()))
                .modulo(&self.group.modulus()),
            b: self
                .group
                .generator()
                .mod_pow(&randomness, &self.group.modulus()),
        }
    }

    pub fn from(value: &E, group: &G) -> PublicKey<E, G> {
        PublicKey {
            value: value.clone(),
            group: group.clone(),
        }
    }
}

/// No Debug: the secret exponent must never reach a log line.
#[derive(Clone)]
pub struct PrivateKey<E: Element, G: Group<E>> {
    pub value: E::Exp,
    pub public_value: E,
    pub group: G,
}

impl<E: Element, G: Group<E>> PrivateKey<E, G> {
    pub fn from(secret: &E::Exp, group: &G) -> PrivateKey<E, G> {
        let public_value = group.generator().mod_pow(secret, &group.modulus());

        PrivateKey {
            value: secret.clone(),
            public_value,
            group: group.clone(),
        }
    }

    pub fn decrypt(&self, c: &Ciphertext<E>) -> E {
        let modulus = &self.group.modulus();

        c.a.div(&c.b.mod_pow(&self.value, modulus), modulus)
            .modulo(modulus)
    }

    pub fn decryption_factor(&self, c: &Ciphertext<E>) -> E {
        let modulus = &self.group.modulus();

        c.b.mod_pow(&self.value, modulus)
    }

    /// Exports the secret exponent wrapped under the trustee's master
    /// key. This is the only form in which key material is ever stored.
    pub fn to_encrypted(&self, key: &symmetric::Key) -> Result<EncryptedShare, TrusteeError> {
        let secret_bytes = bincode::serialize(&self.value)?;
        let (bytes, iv) = symmetric::encrypt(key, &secret_bytes)?;

        Ok(EncryptedShare { bytes, iv })
    }

    /// Unwraps a stored private share. A wrong key surfaces as a
    /// padding failure, which callers must treat as fatal.
    pub fn from_encrypted(
        key: &symmetric::Key,
        encrypted: &EncryptedShare,
        group: &G,
    ) -> Result<PrivateKey<E, G>, TrusteeError> {
        let secret_bytes = symmetric::decrypt(key, &encrypted.iv, &encrypted.bytes)?;
        let value: E::Exp = bincode::deserialize(&secret_bytes)?;
        let public_value = group.generator().mod_pow(&value, &group.modulus());

        Ok(PrivateKey {
            value,
            public_value,
            group: group.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rug_b::SchnorrGroup;

    #[test]
    fn test_encrypted_export_roundtrip() {
        let group = SchnorrGroup::default_group();
        let sk = group.gen_key();
        let key = symmetric::gen_key();

        let encrypted = sk.to_encrypted(&key).unwrap();
        let recovered = PrivateKey::from_encrypted(&key, &encrypted, &group).unwrap();

        assert_eq!(sk.value, recovered.value);
        assert_eq!(sk.public_value, recovered.public_value);

        let other = symmetric::gen_key();
        let result = PrivateKey::<rug::Integer, SchnorrGroup>::from_encrypted(
            &other, &encrypted, &group,
        );
        // either padding fails or the recovered exponent is garbage
        assert!(result.map(|k| k.value != sk.value).unwrap_or(true));
    }
}
