use std::collections::{HashMap, HashSet};

use rug::Integer;

use crate::bb::{BulletinBoard, Names, PermDataStore};
use crate::error::TrusteeError;
use crate::shuffler::PermutationData;

/// In-memory board used by tests and demos. There is no remote, so
/// `sync` is a no-op and `put` cannot lose a race.
#[derive(Default)]
pub struct MemoryBulletinBoard {
    data: HashMap<String, Vec<u8>>,
    perm_data: PermDataStore,
}

impl MemoryBulletinBoard {
    pub fn new() -> MemoryBulletinBoard {
        MemoryBulletinBoard::default()
    }

    /// Removes a key outright. The protocol never does this; tests use
    /// it to model out-of-band human intervention (error clearance).
    pub fn remove(&mut self, key: &str) {
        self.data.remove(key);
    }

    /// Overwrites a key in place, modeling a corrupted or malicious
    /// publication in tests.
    pub fn overwrite(&mut self, key: &str, value: Vec<u8>) {
        self.data.insert(key.to_string(), value);
    }
}

impl Names for MemoryBulletinBoard {}

impl BulletinBoard for MemoryBulletinBoard {
    fn sync(&mut self) -> Result<(), TrusteeError> {
        Ok(())
    }

    fn file_set(&self) -> HashSet<String> {
        let mut ret: HashSet<String> = self.data.keys().cloned().collect();
        ret.extend(self.perm_data.keys::<Self>());

        ret
    }

    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.data.get(key).cloned()
    }

    fn put(&mut self, entries: &[(String, Vec<u8>)]) -> Result<(), TrusteeError> {
        // the backing store is append-only
        for (key, _) in entries {
            if self.data.contains_key(key) {
                return Err(TrusteeError::Transport(format!(
                    "key already present: {}",
                    key
                )));
            }
        }
        for (key, value) in entries {
            self.data.insert(key.clone(), value.clone());
        }

        Ok(())
    }

    fn add_perm_data_local(&self, item: u32, auth: u32, data: PermutationData<Integer>) {
        self.perm_data.add(item, auth, data);
    }

    fn get_perm_data_local(&self, item: u32, auth: u32) -> Option<PermutationData<Integer>> {
        self.perm_data.get(item, auth)
    }

    fn rm_perm_data_local(&self, item: u32, auth: u32) {
        self.perm_data.rm(item, auth);
    }
}
