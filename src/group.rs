use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::elgamal::{PrivateKey, PublicKey};
use crate::hashing::{cp_proof_challenge, schnorr_proof_challenge, HashBytes, HashTo};

/// An element of a cyclic group in which discrete logarithms are hard.
pub trait Element:
    HashBytes + Clone + PartialEq + Debug + Send + Sync + Serialize + DeserializeOwned
{
    type Exp: Exponent;
    type Plaintext;

    fn mul(&self, other: &Self) -> Self;
    fn div(&self, other: &Self, modulus: &Self) -> Self;
    fn mod_pow(&self, exp: &Self::Exp, modulus: &Self) -> Self;
    fn modulo(&self, modulus: &Self) -> Self;

    fn mul_identity() -> Self;
}

/// An exponent over the group's order.
pub trait Exponent: Clone + PartialEq + Debug + Send + Sync + Serialize + DeserializeOwned {
    fn add(&self, other: &Self) -> Self;
    fn sub(&self, other: &Self) -> Self;
    fn neg(&self) -> Self;
    fn mul(&self, other: &Self) -> Self;
    fn modulo(&self, modulus: &Self) -> Self;

    fn add_identity() -> Self;
    fn mul_identity() -> Self;
}

pub trait Group<E: Element>: Clone + Send + Sync + Sized {
    fn generator(&self) -> E;
    fn modulus(&self) -> E;
    fn exp_modulus(&self) -> E::Exp;
    fn rnd(&self) -> E;
    fn rnd_exp(&self) -> E::Exp;
    fn gen_key(&self) -> PrivateKey<E, Self>;
    fn pk_from_value(&self, value: &E) -> PublicKey<E, Self>;
    fn encode(&self, plaintext: &E::Plaintext) -> E;
    fn decode(&self, element: &E) -> E::Plaintext;
    fn exp_hasher(&self) -> Box<dyn HashTo<E::Exp>>;
    fn elem_hasher(&self) -> Box<dyn HashTo<E>>;

    /// Independent generators derived deterministically from a seed, so
    /// that prover and verifier agree on them without interaction.
    fn generators(&self, size: usize, item: u32, seed: &[u8]) -> Vec<E>;

    fn schnorr_prove(&self, secret: &E::Exp, public: &E, g: &E, label: &[u8]) -> Schnorr<E> {
        let r = self.rnd_exp();
        let commitment = g.mod_pow(&r, &self.modulus());
        let challenge: E::Exp =
            schnorr_proof_challenge(g, public, &commitment, label, &*self.exp_hasher());
        let response = r.add(&challenge.mul(secret)).modulo(&self.exp_modulus());

        Schnorr {
            commitment,
            challenge,
            response,
        }
    }

    fn schnorr_verify(&self, public: &E, g: &E, proof: &Schnorr<E>, label: &[u8]) -> bool {
        let challenge_ =
            schnorr_proof_challenge(g, public, &proof.commitment, label, &*self.exp_hasher());
        let ok1 = challenge_ == proof.challenge;
        let lhs = g.mod_pow(&proof.response, &self.modulus());
        let rhs = proof
            .commitment
            .mul(&public.mod_pow(&proof.challenge, &self.modulus()))
            .modulo(&self.modulus());
        let ok2 = lhs == rhs;

        ok1 && ok2
    }

    fn cp_prove(
        &self,
        secret: &E::Exp,
        public1: &E,
        public2: &E,
        g1: &E,
        g2: &E,
    ) -> ChaumPedersen<E> {
        let r = self.rnd_exp();
        let commitment1 = g1.mod_pow(&r, &self.modulus());
        let commitment2 = g2.mod_pow(&r, &self.modulus());
        let challenge: E::Exp = cp_proof_challenge(
            g1,
            g2,
            public1,
            public2,
            &commitment1,
            &commitment2,
            &*self.exp_hasher(),
        );
        let response = r.add(&challenge.mul(secret)).modulo(&self.exp_modulus());

        ChaumPedersen {
            commitment1,
            commitment2,
            challenge,
            response,
        }
    }

    fn cp_verify(
        &self,
        public1: &E,
        public2: &E,
        g1: &E,
        g2: &E,
        proof: &ChaumPedersen<E>,
    ) -> bool {
        let challenge_ = cp_proof_challenge(
            g1,
            g2,
            public1,
            public2,
            &proof.commitment1,
            &proof.commitment2,
            &*self.exp_hasher(),
        );
        let ok1 = challenge_ == proof.challenge;

        let lhs1 = g1.mod_pow(&proof.response, &self.modulus());
        let rhs1 = proof
            .commitment1
            .mul(&public1.mod_pow(&proof.challenge, &self.modulus()))
            .modulo(&self.modulus());
        let lhs2 = g2.mod_pow(&proof.response, &self.modulus());
        let rhs2 = proof
            .commitment2
            .mul(&public2.mod_pow(&proof.challenge, &self.modulus()))
            .modulo(&self.modulus());
        let ok2 = lhs1 == rhs1;
        let ok3 = lhs2 == rhs2;

        ok1 && ok2 && ok3
    }
}

/// Proof of knowledge of a discrete logarithm.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(bound = "E: Element")]
pub struct Schnorr<E: Element> {
    pub commitment: E,
    pub challenge: E::Exp,
    pub response: E::Exp,
}

/// Proof of discrete logarithm equality (correct decryption factor).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(bound = "E: Element")]
pub struct ChaumPedersen<E: Element> {
    pub commitment1: E,
    pub commitment2: E,
    pub challenge: E::Exp,
    pub response: E::Exp,
}
