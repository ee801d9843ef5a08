use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::TrusteeError;

/// A peer's verification key together with its canonical PEM form.
///
/// The PEM string is the identity under which the peer appears in the
/// election configuration and in the local trust store.
#[derive(Debug, Clone)]
pub struct RsaVerifier {
    pub pem: String,
    key: RsaPublicKey,
    verifying: VerifyingKey<Sha256>,
}

impl RsaVerifier {
    pub fn from_pem(pem: &str) -> Result<RsaVerifier, TrusteeError> {
        let key = RsaPublicKey::from_public_key_pem(pem)
            .map_err(|e| TrusteeError::Configuration(format!("bad public key pem: {}", e)))?;
        let verifying = VerifyingKey::<Sha256>::new(key.clone());

        Ok(RsaVerifier {
            pem: normalize_pem(pem),
            key,
            verifying,
        })
    }

    /// RSA-SHA-256 verification over the message bytes.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), TrusteeError> {
        let signature = Signature::try_from(signature)?;
        self.verifying
            .verify(message, &signature)
            .map_err(|e| TrusteeError::SignatureFailure(e.to_string()))
    }

    /// The key's modulus, used as the proof domain of this trustee's
    /// Schnorr proofs of knowledge.
    pub fn modulus_bytes(&self) -> Vec<u8> {
        self.key.n().to_bytes_be()
    }
}

/// This trustee's RSA signing identity.
pub struct RsaKeys {
    signing: SigningKey<Sha256>,
    pub verifier: RsaVerifier,
}

impl RsaKeys {
    pub fn from_private_pem(pem: &str) -> Result<RsaKeys, TrusteeError> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| TrusteeError::Configuration(format!("bad private key pem: {}", e)))?;
        let public_pem = private
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| TrusteeError::Configuration(e.to_string()))?;

        Ok(RsaKeys {
            signing: SigningKey::<Sha256>::new(private),
            verifier: RsaVerifier::from_pem(&public_pem)?,
        })
    }

    pub fn generate(bits: usize) -> Result<RsaKeys, TrusteeError> {
        let mut rng = rand::rngs::OsRng;
        let private = RsaPrivateKey::new(&mut rng, bits)?;
        let pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| TrusteeError::Configuration(e.to_string()))?;

        RsaKeys::from_private_pem(&pem)
    }

    /// RSA-SHA-256 signature over the message bytes.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing.sign(message).to_vec()
    }

    pub fn public_pem(&self) -> &str {
        &self.verifier.pem
    }
}

/// Strips trailing whitespace variance so that PEM strings compare
/// reliably across files and json.
pub fn normalize_pem(pem: &str) -> String {
    let trimmed: Vec<&str> = pem.trim().lines().map(|l| l.trim_end()).collect();
    trimmed.join("\n")
}

/// Splits a file concatenating several PEM public keys into the
/// individual normalized keys.
pub fn split_pem_bundle(bundle: &str) -> Vec<String> {
    const END: &str = "-----END PUBLIC KEY-----";
    bundle
        .split_inclusive(END)
        .map(|part| part.trim())
        .filter(|part| part.contains(END))
        .map(normalize_pem)
        .collect()
}
