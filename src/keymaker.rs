use rayon::prelude::*;

use crate::artifact::EncryptedShare;
use crate::elgamal::{Ciphertext, PrivateKey, PublicKey};
use crate::error::TrusteeError;
use crate::group::{ChaumPedersen, Element, Group, Schnorr};
use crate::symmetric;

/// One trustee's contribution to the joint ElGamal election key.
pub struct Keymaker<E: Element, G: Group<E>> {
    sk: PrivateKey<E, G>,
    pk: PublicKey<E, G>,
}

impl<E: Element, G: Group<E>> Keymaker<E, G> {
    pub fn gen(group: &G) -> Keymaker<E, G> {
        let sk = group.gen_key();
        let pk = PublicKey::from(&sk.public_value, group);

        Keymaker { sk, pk }
    }

    pub fn from_sk(sk: PrivateKey<E, G>, group: &G) -> Keymaker<E, G> {
        let pk = PublicKey::from(&sk.public_value, group);

        Keymaker { sk, pk }
    }

    /// The public share with its proof of knowledge, bound to the
    /// caller's proof domain label.
    pub fn share(&self, label: &[u8]) -> (E, Schnorr<E>) {
        let group = &self.sk.group;
        let proof = group.schnorr_prove(&self.sk.value, &self.pk.value, &group.generator(), label);

        (self.pk.value.clone(), proof)
    }

    pub fn get_encrypted_sk(&self, key: &symmetric::Key) -> Result<EncryptedShare, TrusteeError> {
        self.sk.to_encrypted(key)
    }

    pub fn verify_share(group: &G, share: &E, proof: &Schnorr<E>, label: &[u8]) -> bool {
        group.schnorr_verify(share, &group.generator(), proof, label)
    }

    /// The joint election key is the product of all public shares.
    pub fn combine_shares(group: &G, shares: &[E]) -> E {
        let mut acc: E = E::mul_identity();
        for share in shares {
            acc = acc.mul(share).modulo(&group.modulus());
        }

        acc
    }

    pub fn decryption_factor(&self, c: &Ciphertext<E>) -> (E, ChaumPedersen<E>) {
        let group = &self.sk.group;
        let dec_factor = self.sk.decryption_factor(c);
        let proof = group.cp_prove(
            &self.sk.value,
            &self.pk.value,
            &dec_factor,
            &group.generator(),
            &c.b,
        );

        (dec_factor, proof)
    }

    pub fn decryption_factor_many(
        &self,
        cs: &[Ciphertext<E>],
    ) -> (Vec<E>, Vec<ChaumPedersen<E>>) {
        cs.par_iter().map(|c| self.decryption_factor(c)).unzip()
    }

    pub fn verify_decryption_factors(
        group: &G,
        pk_value: &E,
        ciphertexts: &[Ciphertext<E>],
        decs: &[E],
        proofs: &[ChaumPedersen<E>],
    ) -> bool {
        if decs.len() != proofs.len() || decs.len() != ciphertexts.len() {
            return false;
        }
        let generator = group.generator();
        let oks: Vec<bool> = (0..decs.len())
            .into_par_iter()
            .map(|i| group.cp_verify(pk_value, &decs[i], &generator, &ciphertexts[i].b, &proofs[i]))
            .collect();

        !oks.contains(&false)
    }

    /// Divides the product of all decryption factors into each
    /// ciphertext's first component, removing the joint key.
    pub fn joint_dec_many(group: &G, decs: &[Vec<E>], cs: &[Ciphertext<E>]) -> Vec<E> {
        let modulus = group.modulus();

        cs.par_iter()
            .enumerate()
            .map(|(i, c)| {
                let mut acc: E = decs[0][i].clone();
                for d in decs.iter().skip(1) {
                    acc = acc.mul(&d[i]).modulo(&modulus);
                }

                c.a.div(&acc, &modulus).modulo(&modulus)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rug_b::SchnorrGroup;
    use rug::Integer;

    #[test]
    fn test_distributed_decryption() {
        let group = SchnorrGroup::default_group();
        let km1: Keymaker<Integer, SchnorrGroup> = Keymaker::gen(&group);
        let km2: Keymaker<Integer, SchnorrGroup> = Keymaker::gen(&group);
        let (share1, proof1) = km1.share(b"t1");
        let (share2, proof2) = km2.share(b"t2");

        assert!(Keymaker::verify_share(&group, &share1, &proof1, b"t1"));
        assert!(Keymaker::verify_share(&group, &share2, &proof2, b"t2"));
        assert!(!Keymaker::verify_share(&group, &share1, &proof1, b"t2"));

        let pk_value = Keymaker::combine_shares(&group, &[share1.clone(), share2.clone()]);
        let pk = group.pk_from_value(&pk_value);

        let plaintext = group.rnd_exp();
        let encoded = group.encode(&plaintext);
        let c = pk.encrypt(&encoded);

        let (d1, cp1) = km1.decryption_factor(&c);
        let (d2, cp2) = km2.decryption_factor(&c);

        assert!(group.cp_verify(&share1, &d1, &group.generator(), &c.b, &cp1));
        assert!(group.cp_verify(&share2, &d2, &group.generator(), &c.b, &cp2));

        let decrypted = Keymaker::joint_dec_many(
            &group,
            &[vec![d1], vec![d2]],
            std::slice::from_ref(&c),
        );
        assert_eq!(group.decode(&decrypted[0]), plaintext);
    }

    #[test]
    fn test_decryption_factor_many() {
        let group = SchnorrGroup::default_group();
        let km: Keymaker<Integer, SchnorrGroup> = Keymaker::gen(&group);
        let (share, _) = km.share(b"t");
        let pk = group.pk_from_value(&share);

        let cs: Vec<_> = (0..10)
            .map(|_| pk.encrypt(&group.encode(&group.rnd_exp())))
            .collect();
        let (decs, proofs) = km.decryption_factor_many(&cs);

        assert!(Keymaker::verify_decryption_factors(
            &group, &share, &cs, &decs, &proofs
        ));
        // tampered factor fails
        let mut bad = decs.clone();
        bad[3] = group.rnd();
        assert!(!Keymaker::verify_decryption_factors(
            &group, &share, &cs, &bad, &proofs
        ));
    }
}
