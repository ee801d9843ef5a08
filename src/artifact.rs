use std::io::{BufRead, Write};

use rug::Integer;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::elgamal::Ciphertext;
use crate::error::TrusteeError;
use crate::group::{ChaumPedersen, Schnorr};
use crate::hashing::{Hash, HashingLineReader, HashingWriter};
use crate::rug_b::SchnorrGroup;
use crate::shuffler::{Responses, ShuffleProof, TValues};
use crate::signature::normalize_pem;
use crate::util;

/// The election parameters posted by the authority. Immutable once
/// published; every other artifact binds to its hash.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub id: String,
    pub name: String,
    pub modulus: String,
    pub generator: String,
    pub items: u32,
    pub ballotbox: String,
    pub trustees: Vec<String>,
}

impl Config {
    pub fn group(&self) -> Result<SchnorrGroup, TrusteeError> {
        let modulus = Integer::from_str_radix(&self.modulus, 10)
            .map_err(|e| TrusteeError::Configuration(format!("bad modulus: {}", e)))?;
        let generator = Integer::from_str_radix(&self.generator, 10)
            .map_err(|e| TrusteeError::Configuration(format!("bad generator: {}", e)))?;

        SchnorrGroup::from_parts(modulus, generator)
    }

    /// 1-based position of the given public key pem in the trustee
    /// list; 0 means not a trustee.
    pub fn position_of(&self, pem: &str) -> u32 {
        let target = normalize_pem(pem);
        self.trustees
            .iter()
            .position(|t| normalize_pem(t) == target)
            .map(|p| (p + 1) as u32)
            .unwrap_or(0)
    }

    pub fn trustee_count(&self) -> u32 {
        self.trustees.len() as u32
    }
}

/// A private share at rest: AES-CBC ciphertext plus the public IV.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EncryptedShare {
    #[serde(with = "util::b64")]
    pub bytes: Vec<u8>,
    #[serde(with = "util::b64")]
    pub iv: Vec<u8>,
}

/// One trustee's contribution to the election key: the public share
/// with its proof of knowledge, and the wrapped private counterpart.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Share {
    pub share: Integer,
    pub proof: Schnorr<Integer>,
    pub encrypted_sk: EncryptedShare,
}

/// The joint election key for one item, the product of all shares.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ElectionPublicKey {
    pub value: Integer,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Ballots {
    pub ciphertexts: Vec<Ciphertext<Integer>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Plaintexts {
    pub plaintexts: Vec<Integer>,
}

/// A verifiable re-encryption shuffle: the permuted ciphertexts and
/// the Terelius-Wikström proof.
#[derive(Debug, Clone, PartialEq)]
pub struct Mix {
    pub mixed_ballots: Vec<Ciphertext<Integer>>,
    pub proof: ShuffleProof<Integer>,
}

/// One trustee's decryption factors for the final mix, with proofs of
/// correct decryption.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialDecryption {
    pub proofs: Vec<ChaumPedersen<Integer>>,
    pub pd_ballots: Vec<Integer>,
}

/// Canonical json bytes plus the content hash, for the artifacts that
/// live on the board as json.
pub fn json_bytes<T: Serialize>(artifact: &T) -> (Vec<u8>, Hash) {
    let bytes = serde_json::to_vec(artifact).expect("artifact serialization is infallible");
    let hash = crate::hashing::hash_bytes(&bytes);

    (bytes, hash)
}

pub fn json_parse<T: DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T, TrusteeError> {
    serde_json::from_slice(bytes).map_err(|e| TrusteeError::Malformed(format!("{}: {}", what, e)))
}

// Large artifacts use a newline-delimited field encoding so they can be
// hashed while being written or read. One base64(bincode) field per line.

fn write_field<W: Write, T: Serialize>(
    writer: &mut HashingWriter<W>,
    field: &T,
) -> Result<(), TrusteeError> {
    let line = base64::encode(bincode::serialize(field)?);
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;

    Ok(())
}

fn read_field<R: BufRead, T: DeserializeOwned>(
    reader: &mut HashingLineReader<R>,
    what: &str,
) -> Result<T, TrusteeError> {
    let line = reader
        .next_line()?
        .ok_or_else(|| TrusteeError::Malformed(format!("{}: missing field line", what)))?;
    let bytes = base64::decode(line.trim())
        .map_err(|e| TrusteeError::Malformed(format!("{}: {}", what, e)))?;

    bincode::deserialize(&bytes).map_err(|e| TrusteeError::Malformed(format!("{}: {}", what, e)))
}

impl Mix {
    /// Field order: mix proof commitments and responses, permutation
    /// proof chain, permutation commitments, ciphertexts.
    pub fn write_into<W: Write>(&self, writer: &mut HashingWriter<W>) -> Result<(), TrusteeError> {
        write_field(writer, &(&self.proof.t, &self.proof.s))?;
        write_field(writer, &self.proof.c_hats)?;
        write_field(writer, &self.proof.cs)?;
        write_field(writer, &self.mixed_ballots)?;

        Ok(())
    }

    pub fn to_bytes(&self) -> Result<(Vec<u8>, Hash), TrusteeError> {
        let mut writer = HashingWriter::new(Vec::new());
        self.write_into(&mut writer)?;
        let (bytes, hash) = writer.finish();

        Ok((bytes, hash))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<(Mix, Hash), TrusteeError> {
        let mut reader = HashingLineReader::new(bytes);
        let (t, s): (TValues<Integer>, Responses<Integer>) = read_field(&mut reader, "mix")?;
        let c_hats: Vec<Integer> = read_field(&mut reader, "mix")?;
        let cs: Vec<Integer> = read_field(&mut reader, "mix")?;
        let mixed_ballots: Vec<Ciphertext<Integer>> = read_field(&mut reader, "mix")?;
        let hash = reader.finish();

        Ok((
            Mix {
                mixed_ballots,
                proof: ShuffleProof { t, s, cs, c_hats },
            },
            hash,
        ))
    }
}

impl PartialDecryption {
    /// Field order: proofs of correct decryption, decryption factors.
    pub fn write_into<W: Write>(&self, writer: &mut HashingWriter<W>) -> Result<(), TrusteeError> {
        write_field(writer, &self.proofs)?;
        write_field(writer, &self.pd_ballots)?;

        Ok(())
    }

    pub fn to_bytes(&self) -> Result<(Vec<u8>, Hash), TrusteeError> {
        let mut writer = HashingWriter::new(Vec::new());
        self.write_into(&mut writer)?;
        let (bytes, hash) = writer.finish();

        Ok((bytes, hash))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<(PartialDecryption, Hash), TrusteeError> {
        let mut reader = HashingLineReader::new(bytes);
        let proofs: Vec<ChaumPedersen<Integer>> = read_field(&mut reader, "decryption")?;
        let pd_ballots: Vec<Integer> = read_field(&mut reader, "decryption")?;
        let hash = reader.finish();

        Ok((PartialDecryption { proofs, pd_ballots }, hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elgamal::PublicKey;
    use crate::group::Group;
    use crate::hashing::hash_bytes;
    use crate::shuffler::Shuffler;
    use crate::symmetric;

    #[test]
    fn test_config_roundtrip() {
        let group = SchnorrGroup::default_group();
        let cfg = Config {
            id: "election-1".to_string(),
            name: "test election".to_string(),
            modulus: group.modulus.to_string(),
            generator: group.generator.to_string(),
            items: 3,
            ballotbox: "bb-pem".to_string(),
            trustees: vec!["t1-pem".to_string(), "t2-pem".to_string()],
        };
        let (bytes, hash) = json_bytes(&cfg);
        let parsed: Config = json_parse(&bytes, "config").unwrap();

        assert_eq!(cfg, parsed);
        assert_eq!(hash, hash_bytes(&json_bytes(&parsed).0));
        assert_eq!(parsed.group().unwrap(), group);
    }

    #[test]
    fn test_share_roundtrip() {
        let group = SchnorrGroup::default_group();
        let sk = group.gen_key();
        let key = symmetric::gen_key();
        let proof = group.schnorr_prove(&sk.value, &sk.public_value, &group.generator(), b"t");
        let share = Share {
            share: sk.public_value.clone(),
            proof,
            encrypted_sk: sk.to_encrypted(&key).unwrap(),
        };

        let (bytes, _) = json_bytes(&share);
        let parsed: Share = json_parse(&bytes, "share").unwrap();
        assert_eq!(share, parsed);
    }

    #[test]
    fn test_mix_streaming_roundtrip() {
        let group = SchnorrGroup::default_group();
        let exp_hasher = &*group.exp_hasher();
        let sk = group.gen_key();
        let pk = PublicKey::from(&sk.public_value, &group);

        let es: Vec<Ciphertext<Integer>> = (0..8)
            .map(|_| pk.encrypt(&group.encode(&group.rnd_exp())))
            .collect();
        let hs = group.generators(es.len() + 1, 0, b"test");
        let shuffler = Shuffler {
            pk: &pk,
            generators: &hs,
            hasher: exp_hasher,
        };
        let (e_primes, rs, perm_data) = shuffler.gen_shuffle(&es);
        let proof = shuffler.gen_proof(&es, &e_primes, &rs, &perm_data);
        let mix = Mix {
            mixed_ballots: e_primes,
            proof,
        };

        let (bytes, write_hash) = mix.to_bytes().unwrap();
        let (parsed, read_hash) = Mix::from_bytes(&bytes).unwrap();

        assert_eq!(mix, parsed);
        assert_eq!(write_hash, read_hash);
        assert_eq!(write_hash, hash_bytes(&bytes));
    }

    #[test]
    fn test_partial_decryption_streaming_roundtrip() {
        let group = SchnorrGroup::default_group();
        let sk = group.gen_key();
        let pk = PublicKey::from(&sk.public_value, &group);
        let c = pk.encrypt(&group.encode(&group.rnd_exp()));
        let factor = sk.decryption_factor(&c);
        let proof = group.cp_prove(
            &sk.value,
            &sk.public_value,
            &factor,
            &group.generator(),
            &c.b,
        );
        let pd = PartialDecryption {
            proofs: vec![proof],
            pd_ballots: vec![factor],
        };

        let (bytes, write_hash) = pd.to_bytes().unwrap();
        let (parsed, read_hash) = PartialDecryption::from_bytes(&bytes).unwrap();

        assert_eq!(pd, parsed);
        assert_eq!(write_hash, read_hash);
    }

    #[test]
    fn test_malformed_artifact_is_an_error() {
        assert!(json_parse::<Ballots>(b"[0|0]", "ballots").is_err());
        assert!(Mix::from_bytes(b"[0|0]").is_err());
    }
}
