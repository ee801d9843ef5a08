use rayon::prelude::*;
use rug::Integer;

use crate::elgamal::{Ciphertext, PublicKey};
use crate::group::Group;
use crate::hashing::Hash;
use crate::rug_b::SchnorrGroup;

/// Abbreviated hash for log lines.
pub fn short(hash: &Hash) -> String {
    hex::encode(&hash[0..8])
}

/// base64 serde adapter for binary fields embedded in json artifacts.
pub mod b64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Encrypts `n` random plaintexts under the given election key,
/// returning both so callers can check the tally end to end.
pub fn random_encrypt_ballots(
    n: usize,
    pk: &PublicKey<Integer, SchnorrGroup>,
) -> (Vec<Integer>, Vec<Ciphertext<Integer>>) {
    (0..n)
        .into_par_iter()
        .map(|_| {
            let group = &pk.group;
            let plaintext = group.rnd_exp();
            let encoded = group.encode(&plaintext);

            (plaintext, pk.encrypt(&encoded))
        })
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::hash_bytes;

    #[test]
    fn test_short() {
        let h = hash_bytes(b"value");
        assert_eq!(short(&h).len(), 16);
    }
}
