use rand::rngs::OsRng;
use rand_core::RngCore;
use rayon::prelude::*;
use rug::rand::{RandGen, RandState};
use rug::Integer;
use serde::{Deserialize, Serialize};

use crate::elgamal::{PrivateKey, PublicKey};
use crate::error::TrusteeError;
use crate::group::{Element, Exponent, Group};
use crate::hashing::{HashBytes, HashTo};

impl Element for Integer {
    type Exp = Integer;
    type Plaintext = Integer;

    fn mul(&self, other: &Self) -> Self {
        Integer::from(self * other)
    }
    fn div(&self, other: &Self, modulus: &Self) -> Self {
        let inverse = other.clone().invert(modulus).unwrap_or_else(|_| Integer::from(0));
        Integer::from(self * &inverse)
    }
    fn mod_pow(&self, exp: &Self::Exp, modulus: &Self) -> Self {
        self.clone()
            .pow_mod(exp, modulus)
            .unwrap_or_else(|_| Integer::from(0))
    }
    fn modulo(&self, modulus: &Self) -> Self {
        let (_, mut rem) = self.clone().div_rem(modulus.clone());
        if rem < 0 {
            rem += modulus;
        }

        rem
    }
    fn mul_identity() -> Integer {
        Integer::from(1)
    }
}

impl Exponent for Integer {
    fn add(&self, other: &Integer) -> Integer {
        Integer::from(self + other)
    }
    fn sub(&self, other: &Integer) -> Integer {
        Integer::from(self - other)
    }
    fn neg(&self) -> Integer {
        Integer::from(-self)
    }
    fn mul(&self, other: &Integer) -> Integer {
        Integer::from(self * other)
    }
    fn modulo(&self, modulus: &Integer) -> Integer {
        let (_, mut rem) = self.clone().div_rem(modulus.clone());
        if rem < 0 {
            rem += modulus;
        }

        rem
    }
    fn add_identity() -> Integer {
        Integer::from(0)
    }
    fn mul_identity() -> Integer {
        Integer::from(1)
    }
}

struct OsRandGen;

impl RandGen for OsRandGen {
    fn gen(&mut self) -> u32 {
        OsRng.next_u32()
    }
}

/// The quadratic residue subgroup of Z_p^* for a safe prime p = 2q + 1,
/// with a generator in the order-q subgroup. The election configuration
/// fixes p and g; q is derived.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SchnorrGroup {
    pub generator: Integer,
    pub modulus: Integer,
    pub modulus_exp: Integer,
}

impl SchnorrGroup {
    // 2048 bit safe prime, from unicrypt's precomputed SafePrime table
    pub const P_STR: &'static str = "B7E151628AED2A6ABF7158809CF4F3C762E7160F38B4DA56A784D9045190CFEF324E7738926CFBE5F4BF8D8D8C31D763DA06C80ABB1185EB4F7C7B5757F5958490CFD47D7C19BB42158D9554F7B46BCED55C4D79FD5F24D6613C31C3839A2DDF8A9A276BCFBFA1C877C56284DAB79CD4C2B3293D20E9E5EAF02AC60ACC93ED874422A52ECB238FEEE5AB6ADD835FD1A0753D0A8F78E537D2B95BB79D8DCAEC642C1E9F23B829B5C2780BF38737DF8BB300D01334A0D0BD8645CBFA73A6160FFE393C48CBBBCA060F0FF8EC6D31BEB5CCEED7F2F0BB088017163BC60DF45A0ECB1BCD289B06CBBFEA21AD08E1847F3F7378D56CED94640D6EF0D3D37BE69D0063";

    pub fn default_group() -> SchnorrGroup {
        let p = Integer::from_str_radix(Self::P_STR, 16).unwrap();
        SchnorrGroup::from_parts(p, Integer::from(3)).unwrap()
    }

    /// Builds the group from the published modulus and generator,
    /// validating that p is a safe prime shape and g a quadratic residue.
    pub fn from_parts(modulus: Integer, generator: Integer) -> Result<SchnorrGroup, TrusteeError> {
        if modulus < 5 || modulus.is_even() {
            return Err(TrusteeError::Configuration(
                "modulus is not an odd prime".to_string(),
            ));
        }
        let q = Integer::from(&modulus - 1) / 2;
        if generator <= 1 || generator >= modulus {
            return Err(TrusteeError::Configuration(
                "generator out of range".to_string(),
            ));
        }
        if generator.clone().legendre(&modulus) != 1 {
            return Err(TrusteeError::Configuration(
                "generator is not a quadratic residue".to_string(),
            ));
        }

        Ok(SchnorrGroup {
            generator,
            modulus,
            modulus_exp: q,
        })
    }
}

/// Hashes into exponents modulo q.
pub struct IntegerExpHasher(pub Integer);

impl HashTo<Integer> for IntegerExpHasher {
    fn hash_to(&self, bytes: &[u8]) -> Integer {
        let hashed = crate::hashing::hash_bytes(bytes);
        let (_, rem) =
            Integer::from_digits(&hashed, rug::integer::Order::Lsf).div_rem(self.0.clone());

        rem
    }
}

/// Hashes into the subgroup by squaring a residue modulo p.
pub struct IntegerElemHasher(pub Integer);

impl HashTo<Integer> for IntegerElemHasher {
    fn hash_to(&self, bytes: &[u8]) -> Integer {
        let hashed = crate::hashing::hash_bytes(bytes);
        let residue = Element::modulo(&Integer::from_digits(&hashed, rug::integer::Order::Lsf), &self.0);

        residue.mod_pow(&Integer::from(2), &self.0)
    }
}

impl Group<Integer> for SchnorrGroup {
    fn generator(&self) -> Integer {
        self.generator.clone()
    }
    fn modulus(&self) -> Integer {
        self.modulus.clone()
    }
    fn exp_modulus(&self) -> Integer {
        self.modulus_exp.clone()
    }
    fn rnd(&self) -> Integer {
        let mut gen = OsRandGen;
        let mut state = RandState::new_custom(&mut gen);
        let below = Integer::from(&self.modulus_exp - 1);

        self.encode(&below.random_below(&mut state))
    }
    fn rnd_exp(&self) -> Integer {
        let mut gen = OsRandGen;
        let mut state = RandState::new_custom(&mut gen);

        self.modulus_exp.clone().random_below(&mut state)
    }
    fn gen_key(&self) -> PrivateKey<Integer, Self> {
        let secret = self.rnd_exp();

        PrivateKey::from(&secret, self)
    }
    fn pk_from_value(&self, value: &Integer) -> PublicKey<Integer, Self> {
        PublicKey {
            value: value.clone(),
            group: self.clone(),
        }
    }
    fn encode(&self, plaintext: &Integer) -> Integer {
        assert!(plaintext < &Integer::from(&self.modulus_exp - 1));

        let notzero: Integer = Integer::from(plaintext + 1);
        let legendre = notzero.clone().legendre(&self.modulus());
        let product = legendre * notzero;

        Element::modulo(&product, &self.modulus())
    }
    fn decode(&self, element: &Integer) -> Integer {
        if element > &self.exp_modulus() {
            let sub: Integer = self.modulus() - element;
            sub - 1
        } else {
            Integer::from(element - 1)
        }
    }
    fn exp_hasher(&self) -> Box<dyn HashTo<Integer>> {
        Box::new(IntegerExpHasher(self.modulus_exp.clone()))
    }
    fn elem_hasher(&self) -> Box<dyn HashTo<Integer>> {
        Box::new(IntegerElemHasher(self.modulus.clone()))
    }
    fn generators(&self, size: usize, item: u32, seed: &[u8]) -> Vec<Integer> {
        let hasher = IntegerElemHasher(self.modulus.clone());

        (0..size)
            .into_par_iter()
            .map(|i| {
                let mut bytes = seed.to_vec();
                bytes.extend_from_slice(b"generators");
                bytes.extend_from_slice(&item.to_le_bytes());
                bytes.extend_from_slice(&i.to_le_bytes());

                hasher.hash_to(&bytes)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elgamal::PublicKey;

    #[test]
    #[should_panic]
    fn test_encode_panic() {
        let group = SchnorrGroup::default_group();
        group.encode(&(group.exp_modulus() - Integer::from(1)));
    }

    #[test]
    fn test_encode_decode() {
        let group = SchnorrGroup::default_group();
        let plaintext = group.rnd_exp();
        let encoded = group.encode(&plaintext);
        assert_eq!(group.decode(&encoded), plaintext);

        let zero = Integer::from(0);
        assert_eq!(group.decode(&group.encode(&zero)), zero);
    }

    #[test]
    fn test_elgamal() {
        let group = SchnorrGroup::default_group();
        let sk = group.gen_key();
        let pk = PublicKey::from(&sk.public_value, &group);

        let plaintext = group.rnd_exp();
        let encoded = group.encode(&plaintext);
        let c = pk.encrypt(&encoded);
        let d = group.decode(&sk.decrypt(&c));

        assert_eq!(d, plaintext);
    }

    #[test]
    fn test_schnorr() {
        let group = SchnorrGroup::default_group();
        let g = group.generator();
        let secret = group.rnd_exp();
        let public = g.mod_pow(&secret, &group.modulus());
        let schnorr = group.schnorr_prove(&secret, &public, &g, b"domain");

        assert!(group.schnorr_verify(&public, &g, &schnorr, b"domain"));
        assert!(!group.schnorr_verify(&public, &g, &schnorr, b"other domain"));

        let public_false = group
            .generator()
            .mod_pow(&group.rnd_exp(), &group.modulus());
        assert!(!group.schnorr_verify(&public_false, &g, &schnorr, b"domain"));
    }

    #[test]
    fn test_chaumpedersen() {
        let group = SchnorrGroup::default_group();
        let g1 = group.generator();
        let g2 = group.rnd();
        let secret = group.rnd_exp();
        let public1 = g1.mod_pow(&secret, &group.modulus());
        let public2 = g2.mod_pow(&secret, &group.modulus());
        let proof = group.cp_prove(&secret, &public1, &public2, &g1, &g2);

        assert!(group.cp_verify(&public1, &public2, &g1, &g2, &proof));

        let public_false = group
            .generator()
            .mod_pow(&group.rnd_exp(), &group.modulus());
        assert!(!group.cp_verify(&public1, &public_false, &g1, &g2, &proof));
    }

    #[test]
    fn test_generators_deterministic() {
        let group = SchnorrGroup::default_group();
        let hs1 = group.generators(5, 1, b"seed");
        let hs2 = group.generators(5, 1, b"seed");
        let hs3 = group.generators(5, 2, b"seed");

        assert_eq!(hs1, hs2);
        assert_ne!(hs1, hs3);
        for h in hs1 {
            // subgroup membership
            assert_eq!(h.clone().legendre(&group.modulus()), 1);
        }
    }
}
