use serde::{Deserialize, Serialize};

use crate::hashing::Hash;

/// Statements are the only values trustees sign. They carry hashes and
/// positional indices, never payloads, so that their canonical encoding
/// stays small and stable.
///
/// The canonical encoding is the UTF-8 json of the record with fields
/// in declared order and no insignificant whitespace, which is exactly
/// what serde_json emits.
pub fn canonical_bytes<S: Serialize>(statement: &S) -> Vec<u8> {
    serde_json::to_vec(statement).expect("statement serialization is infallible")
}

type VHash = Vec<u8>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConfigStatement {
    #[serde(with = "hex")]
    pub config_hash: VHash,
}

impl ConfigStatement {
    pub fn new(config_hash: &Hash) -> ConfigStatement {
        ConfigStatement {
            config_hash: config_hash.to_vec(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ShareStatement {
    #[serde(with = "hex")]
    pub share_hash: VHash,
    #[serde(with = "hex")]
    pub config_hash: VHash,
    pub item: u32,
}

impl ShareStatement {
    pub fn new(share_hash: &Hash, config_hash: &Hash, item: u32) -> ShareStatement {
        ShareStatement {
            share_hash: share_hash.to_vec(),
            config_hash: config_hash.to_vec(),
            item,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyStatement {
    #[serde(with = "hex")]
    pub public_key_hash: VHash,
    #[serde(with = "hex")]
    pub shares_hash: VHash,
    #[serde(with = "hex")]
    pub config_hash: VHash,
    pub item: u32,
}

impl PublicKeyStatement {
    pub fn new(
        public_key_hash: &Hash,
        shares_hash: &Hash,
        config_hash: &Hash,
        item: u32,
    ) -> PublicKeyStatement {
        PublicKeyStatement {
            public_key_hash: public_key_hash.to_vec(),
            shares_hash: shares_hash.to_vec(),
            config_hash: config_hash.to_vec(),
            item,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BallotsStatement {
    #[serde(with = "hex")]
    pub ballots_hash: VHash,
    #[serde(with = "hex")]
    pub config_hash: VHash,
    pub item: u32,
}

impl BallotsStatement {
    pub fn new(ballots_hash: &Hash, config_hash: &Hash, item: u32) -> BallotsStatement {
        BallotsStatement {
            ballots_hash: ballots_hash.to_vec(),
            config_hash: config_hash.to_vec(),
            item,
        }
    }
}

/// `parent_hash` keys this mix to the previous element of the item's
/// mix chain, the ballots for the first position.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MixStatement {
    #[serde(with = "hex")]
    pub mix_hash: VHash,
    #[serde(with = "hex")]
    pub parent_hash: VHash,
    #[serde(with = "hex")]
    pub config_hash: VHash,
    pub item: u32,
    pub auth: u32,
}

impl MixStatement {
    pub fn new(
        mix_hash: &Hash,
        parent_hash: &Hash,
        config_hash: &Hash,
        item: u32,
        auth: u32,
    ) -> MixStatement {
        MixStatement {
            mix_hash: mix_hash.to_vec(),
            parent_hash: parent_hash.to_vec(),
            config_hash: config_hash.to_vec(),
            item,
            auth,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DecryptionStatement {
    #[serde(with = "hex")]
    pub decryption_hash: VHash,
    #[serde(with = "hex")]
    pub mix_hash: VHash,
    #[serde(with = "hex")]
    pub config_hash: VHash,
    pub item: u32,
}

impl DecryptionStatement {
    pub fn new(
        decryption_hash: &Hash,
        mix_hash: &Hash,
        config_hash: &Hash,
        item: u32,
    ) -> DecryptionStatement {
        DecryptionStatement {
            decryption_hash: decryption_hash.to_vec(),
            mix_hash: mix_hash.to_vec(),
            config_hash: config_hash.to_vec(),
            item,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlaintextsStatement {
    #[serde(with = "hex")]
    pub plaintexts_hash: VHash,
    #[serde(with = "hex")]
    pub decryptions_hash: VHash,
    #[serde(with = "hex")]
    pub config_hash: VHash,
    pub item: u32,
}

impl PlaintextsStatement {
    pub fn new(
        plaintexts_hash: &Hash,
        decryptions_hash: &Hash,
        config_hash: &Hash,
        item: u32,
    ) -> PlaintextsStatement {
        PlaintextsStatement {
            plaintexts_hash: plaintexts_hash.to_vec(),
            decryptions_hash: decryptions_hash.to_vec(),
            config_hash: config_hash.to_vec(),
            item,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::hash_bytes;

    #[test]
    fn test_canonical_roundtrip() {
        let stmt = MixStatement::new(
            &hash_bytes(b"mix"),
            &hash_bytes(b"parent"),
            &hash_bytes(b"cfg"),
            2,
            1,
        );
        let bytes = canonical_bytes(&stmt);
        let parsed: MixStatement = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(stmt, parsed);
        assert_eq!(bytes, canonical_bytes(&parsed));
        // no insignificant whitespace
        assert!(!bytes.contains(&b' '));
    }

    #[test]
    fn test_canonical_field_order() {
        let stmt = ShareStatement::new(&hash_bytes(b"share"), &hash_bytes(b"cfg"), 1);
        let json = String::from_utf8(canonical_bytes(&stmt)).unwrap();

        let share_pos = json.find("share_hash").unwrap();
        let config_pos = json.find("config_hash").unwrap();
        let item_pos = json.find("item").unwrap();
        assert!(share_pos < config_pos && config_pos < item_pos);
    }
}
