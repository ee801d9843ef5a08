use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Mutex;

use rug::Integer;

use crate::artifact::Config;
use crate::error::TrusteeError;
use crate::shuffler::PermutationData;
use crate::statement::{
    canonical_bytes, BallotsStatement, ConfigStatement, DecryptionStatement, MixStatement,
    PlaintextsStatement, PublicKeyStatement, ShareStatement,
};

/// The total key grammar of the board. Keys double as tokens for the
/// condition engine; items and trustees are 1-based.
pub trait Names {
    const CONFIG: &'static str = "config.json";
    const CONFIG_STMT: &'static str = "config.stmt.json";
    const PAUSE: &'static str = "pause";
    const ERROR: &'static str = "error";

    fn config_sig(auth: u32) -> String {
        format!("{}/config.sig", auth)
    }
    fn auth_error(auth: u32) -> String {
        format!("{}/error", auth)
    }

    fn share(item: u32, auth: u32) -> String {
        format!("{}/{}/share.json", auth, item)
    }
    fn share_stmt(item: u32, auth: u32) -> String {
        format!("{}/{}/share.stmt.json", auth, item)
    }
    fn share_sig(item: u32, auth: u32) -> String {
        format!("{}/{}/share.sig", auth, item)
    }

    fn public_key(item: u32) -> String {
        format!("{}/public_key.json", item)
    }
    fn public_key_stmt(item: u32) -> String {
        format!("{}/public_key.stmt.json", item)
    }
    fn public_key_sig(item: u32, auth: u32) -> String {
        format!("{}/{}/public_key.sig", auth, item)
    }

    fn ballots(item: u32) -> String {
        format!("bb/{}/ballots.json", item)
    }
    fn ballots_stmt(item: u32) -> String {
        format!("bb/{}/ballots.stmt.json", item)
    }
    fn ballots_sig(item: u32) -> String {
        format!("bb/{}/ballots.sig", item)
    }

    /// Local only, never replicated to the remote.
    fn perm_data(item: u32, auth: u32) -> String {
        format!("{}/{}/perm_data", auth, item)
    }

    fn mix(item: u32, auth: u32) -> String {
        format!("{}/{}/mix", auth, item)
    }
    fn mix_stmt(item: u32, auth: u32) -> String {
        format!("{}/{}/mix.stmt.json", auth, item)
    }
    fn mix_sig(item: u32, mixer: u32, signer: u32) -> String {
        format!("{}/{}/mix.{}.sig", signer, item, mixer)
    }

    fn decryption(item: u32, auth: u32) -> String {
        format!("{}/{}/decryption", auth, item)
    }
    fn decryption_stmt(item: u32, auth: u32) -> String {
        format!("{}/{}/decryption.stmt.json", auth, item)
    }
    fn decryption_sig(item: u32, auth: u32) -> String {
        format!("{}/{}/decryption.sig", auth, item)
    }

    fn plaintexts(item: u32) -> String {
        format!("{}/plaintexts.json", item)
    }
    fn plaintexts_stmt(item: u32) -> String {
        format!("{}/plaintexts.stmt.json", item)
    }
    fn plaintexts_sig(item: u32, auth: u32) -> String {
        format!("{}/{}/plaintexts.sig", auth, item)
    }
}

/// In-memory side channel for pre-shuffle data. The permutation must
/// never reach the replicated store, and it is shared with the worker
/// pool during the parallel offline phase, hence the mutex.
#[derive(Default)]
pub struct PermDataStore {
    data: Mutex<HashMap<(u32, u32), PermutationData<Integer>>>,
}

impl PermDataStore {
    pub fn add(&self, item: u32, auth: u32, data: PermutationData<Integer>) {
        self.data.lock().unwrap().insert((item, auth), data);
    }

    pub fn get(&self, item: u32, auth: u32) -> Option<PermutationData<Integer>> {
        self.data.lock().unwrap().get(&(item, auth)).cloned()
    }

    pub fn rm(&self, item: u32, auth: u32) {
        self.data.lock().unwrap().remove(&(item, auth));
    }

    pub fn keys<N: Names + ?Sized>(&self) -> Vec<String> {
        self.data
            .lock()
            .unwrap()
            .keys()
            .map(|(item, auth)| N::perm_data(*item, *auth))
            .collect()
    }
}

/// The append-only keyed store trustees communicate through.
///
/// Implementations provide synchronization, enumeration and raw access;
/// the typed publication methods are derived. `put` must publish all
/// entries atomically, syncing before the push and retrying a bounded
/// number of times on lost races.
pub trait BulletinBoard: Names {
    fn sync(&mut self) -> Result<(), TrusteeError>;

    /// All keys present, including local-only pre-shuffle keys.
    fn file_set(&self) -> HashSet<String>;

    fn get(&self, key: &str) -> Option<Vec<u8>>;

    fn put(&mut self, entries: &[(String, Vec<u8>)]) -> Result<(), TrusteeError>;

    fn add_perm_data_local(&self, item: u32, auth: u32, data: PermutationData<Integer>);
    fn get_perm_data_local(&self, item: u32, auth: u32) -> Option<PermutationData<Integer>>;
    fn rm_perm_data_local(&self, item: u32, auth: u32);

    fn get_bytes(&self, key: &str) -> Result<Vec<u8>, TrusteeError> {
        self.get(key)
            .ok_or_else(|| TrusteeError::Missing(key.to_string()))
    }

    /// The config if present and parseable; validation is the business
    /// of ValidateConfig.
    fn get_config_opt(&self) -> Option<Config> {
        let bytes = self.get(Self::CONFIG)?;
        serde_json::from_slice(&bytes).ok()
    }

    fn add_config(&mut self, config: &Config) -> Result<(), TrusteeError> {
        let (bytes, hash) = crate::artifact::json_bytes(config);
        let stmt = ConfigStatement::new(&hash);
        self.put(&[
            (Self::CONFIG.to_string(), bytes),
            (Self::CONFIG_STMT.to_string(), canonical_bytes(&stmt)),
        ])
    }

    fn add_config_sig(&mut self, auth: u32, sig: &[u8]) -> Result<(), TrusteeError> {
        self.put(&[(Self::config_sig(auth), sig.to_vec())])
    }

    fn add_share(
        &mut self,
        item: u32,
        auth: u32,
        share: Vec<u8>,
        stmt: &ShareStatement,
        sig: &[u8],
    ) -> Result<(), TrusteeError> {
        self.put(&[
            (Self::share(item, auth), share),
            (Self::share_stmt(item, auth), canonical_bytes(stmt)),
            (Self::share_sig(item, auth), sig.to_vec()),
        ])
    }

    fn add_public_key(
        &mut self,
        item: u32,
        auth: u32,
        public_key: Vec<u8>,
        stmt: &PublicKeyStatement,
        sig: &[u8],
    ) -> Result<(), TrusteeError> {
        self.put(&[
            (Self::public_key(item), public_key),
            (Self::public_key_stmt(item), canonical_bytes(stmt)),
            (Self::public_key_sig(item, auth), sig.to_vec()),
        ])
    }

    fn add_public_key_sig(&mut self, item: u32, auth: u32, sig: &[u8]) -> Result<(), TrusteeError> {
        self.put(&[(Self::public_key_sig(item, auth), sig.to_vec())])
    }

    fn add_ballots(
        &mut self,
        item: u32,
        ballots: Vec<u8>,
        stmt: &BallotsStatement,
        sig: &[u8],
    ) -> Result<(), TrusteeError> {
        self.put(&[
            (Self::ballots(item), ballots),
            (Self::ballots_stmt(item), canonical_bytes(stmt)),
            (Self::ballots_sig(item), sig.to_vec()),
        ])
    }

    fn add_mix(
        &mut self,
        item: u32,
        auth: u32,
        mix: Vec<u8>,
        stmt: &MixStatement,
        self_sig: &[u8],
    ) -> Result<(), TrusteeError> {
        self.put(&[
            (Self::mix(item, auth), mix),
            (Self::mix_stmt(item, auth), canonical_bytes(stmt)),
            (Self::mix_sig(item, auth, auth), self_sig.to_vec()),
        ])
    }

    fn add_mix_sig(
        &mut self,
        item: u32,
        mixer: u32,
        signer: u32,
        sig: &[u8],
    ) -> Result<(), TrusteeError> {
        self.put(&[(Self::mix_sig(item, mixer, signer), sig.to_vec())])
    }

    fn add_decryption(
        &mut self,
        item: u32,
        auth: u32,
        decryption: Vec<u8>,
        stmt: &DecryptionStatement,
        sig: &[u8],
    ) -> Result<(), TrusteeError> {
        self.put(&[
            (Self::decryption(item, auth), decryption),
            (Self::decryption_stmt(item, auth), canonical_bytes(stmt)),
            (Self::decryption_sig(item, auth), sig.to_vec()),
        ])
    }

    fn add_plaintexts(
        &mut self,
        item: u32,
        auth: u32,
        plaintexts: Vec<u8>,
        stmt: &PlaintextsStatement,
        sig: &[u8],
    ) -> Result<(), TrusteeError> {
        self.put(&[
            (Self::plaintexts(item), plaintexts),
            (Self::plaintexts_stmt(item), canonical_bytes(stmt)),
            (Self::plaintexts_sig(item, auth), sig.to_vec()),
        ])
    }

    fn add_plaintexts_sig(&mut self, item: u32, auth: u32, sig: &[u8]) -> Result<(), TrusteeError> {
        self.put(&[(Self::plaintexts_sig(item, auth), sig.to_vec())])
    }

    fn add_error(&mut self, message: &str, auth: u32) -> Result<(), TrusteeError> {
        self.put(&[(Self::auth_error(auth), message.as_bytes().to_vec())])
    }

    fn add_pause(&mut self) -> Result<(), TrusteeError> {
        self.put(&[(Self::PAUSE.to_string(), Vec::new())])
    }
}
