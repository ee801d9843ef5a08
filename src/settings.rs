use std::fs;
use std::path::{Path, PathBuf};

use crate::error::TrusteeError;
use crate::signature::{split_pem_bundle, RsaKeys};
use crate::symmetric;

/// Environment variable pointing at the trustee configuration file.
pub const CONFIG_ENV: &str = "TRUSTEE_CONFIG";

/// Flat key/value configuration of one trustee process.
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_store_path: PathBuf,
    pub repo_base_uri: String,
    pub public_key: PathBuf,
    pub private_key: PathBuf,
    pub aes_key: PathBuf,
    pub peers: PathBuf,
    pub offline_split: bool,
    pub git_no_compression: bool,
    pub git_remove_lock: bool,
    pub singleton_port: u16,
}

impl Settings {
    /// Parses a `key = value` file; `#` starts a comment.
    pub fn parse(contents: &str) -> Result<Settings, TrusteeError> {
        let mut pairs = std::collections::HashMap::new();
        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                TrusteeError::Configuration(format!("line {}: expected key = value", lineno + 1))
            })?;
            pairs.insert(key.trim().to_string(), value.trim().to_string());
        }

        let required = |key: &str| -> Result<String, TrusteeError> {
            pairs
                .get(key)
                .cloned()
                .ok_or_else(|| TrusteeError::Configuration(format!("missing option: {}", key)))
        };
        let flag = |key: &str, default: bool| -> Result<bool, TrusteeError> {
            match pairs.get(key) {
                None => Ok(default),
                Some(v) => v.parse::<bool>().map_err(|_| {
                    TrusteeError::Configuration(format!("option {} is not a bool: {}", key, v))
                }),
            }
        };
        let port = match pairs.get("singletonPort") {
            None => 9999,
            Some(v) => v.parse::<u16>().map_err(|_| {
                TrusteeError::Configuration(format!("singletonPort is not a port: {}", v))
            })?,
        };

        Ok(Settings {
            data_store_path: PathBuf::from(required("dataStorePath")?),
            repo_base_uri: required("repoBaseUri")?,
            public_key: PathBuf::from(required("publicKey")?),
            private_key: PathBuf::from(required("privateKey")?),
            aes_key: PathBuf::from(required("aesKey")?),
            peers: PathBuf::from(required("peers")?),
            offline_split: flag("offlineSplit", false)?,
            git_no_compression: flag("gitNoCompression", false)?,
            git_remove_lock: flag("gitRemoveLock", true)?,
            singleton_port: port,
        })
    }

    pub fn load(path: &Path) -> Result<Settings, TrusteeError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            TrusteeError::Configuration(format!("cannot read settings {:?}: {}", path, e))
        })?;

        Settings::parse(&contents)
    }

    pub fn load_from_env() -> Result<Settings, TrusteeError> {
        let path = std::env::var(CONFIG_ENV).map_err(|_| {
            TrusteeError::Configuration(format!("{} is not set", CONFIG_ENV))
        })?;

        Settings::load(Path::new(&path))
    }

    pub fn read_keys(&self) -> Result<RsaKeys, TrusteeError> {
        let pem = fs::read_to_string(&self.private_key).map_err(|e| {
            TrusteeError::Configuration(format!("cannot read private key: {}", e))
        })?;

        RsaKeys::from_private_pem(&pem)
    }

    /// The master key file holds either 16 raw bytes or their base64.
    pub fn read_aes_key(&self) -> Result<symmetric::Key, TrusteeError> {
        let bytes = fs::read(&self.aes_key)
            .map_err(|e| TrusteeError::Configuration(format!("cannot read aes key: {}", e)))?;
        if bytes.len() == 16 {
            return symmetric::key_from_bytes(&bytes);
        }
        let text = String::from_utf8(bytes)
            .map_err(|_| TrusteeError::Configuration("unreadable aes key".to_string()))?;
        let decoded = base64::decode(text.trim())
            .map_err(|e| TrusteeError::Configuration(format!("bad aes key: {}", e)))?;

        symmetric::key_from_bytes(&decoded)
    }

    pub fn read_peers(&self) -> Result<Vec<String>, TrusteeError> {
        let bundle = fs::read_to_string(&self.peers)
            .map_err(|e| TrusteeError::Configuration(format!("cannot read peers: {}", e)))?;
        let peers = split_pem_bundle(&bundle);
        if peers.is_empty() {
            return Err(TrusteeError::Configuration(
                "peers file contains no public keys".to_string(),
            ));
        }

        Ok(peers)
    }

    /// Remote and mirror location for one board section.
    pub fn section_paths(&self, section: &str) -> (String, PathBuf) {
        let url = format!("{}/{}", self.repo_base_uri.trim_end_matches('/'), section);
        let mirror = self.data_store_path.join(section);

        (url, mirror)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS: &str = "
        # trustee 1
        dataStorePath = /tmp/datastore
        repoBaseUri = ssh://git@board.example.com/
        publicKey = /keys/public.pem
        privateKey = /keys/private.pem
        aesKey = /keys/master.aes
        peers = /keys/peers.pem
        offlineSplit = true
    ";

    #[test]
    fn test_parse() {
        let settings = Settings::parse(SETTINGS).unwrap();

        assert_eq!(settings.data_store_path, PathBuf::from("/tmp/datastore"));
        assert!(settings.offline_split);
        // defaults
        assert!(!settings.git_no_compression);
        assert!(settings.git_remove_lock);
        assert_eq!(settings.singleton_port, 9999);

        let (url, mirror) = settings.section_paths("election-7");
        assert_eq!(url, "ssh://git@board.example.com/election-7");
        assert_eq!(mirror, PathBuf::from("/tmp/datastore/election-7"));
    }

    #[test]
    fn test_parse_missing_option() {
        assert!(Settings::parse("dataStorePath = /tmp").is_err());
    }

    #[test]
    fn test_parse_bad_flag() {
        let contents = format!("{}\ngitNoCompression = maybe", SETTINGS);
        assert!(Settings::parse(&contents).is_err());
    }

    #[test]
    fn test_load_key_material() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let aes_path = dir.path().join("master.aes");
        fs::write(&aes_path, symmetric::gen_key()).unwrap();

        let peers_path = dir.path().join("peers.pem");
        let k1 = RsaKeys::generate(1024).unwrap();
        let k2 = RsaKeys::generate(1024).unwrap();
        let mut peers_file = fs::File::create(&peers_path).unwrap();
        writeln!(peers_file, "{}", k1.public_pem()).unwrap();
        writeln!(peers_file, "{}", k2.public_pem()).unwrap();

        let settings_path = dir.path().join("trustee.conf");
        let contents = format!(
            "dataStorePath = {}\nrepoBaseUri = ssh://git@localhost/\n\
             publicKey = unused\nprivateKey = unused\naesKey = {}\npeers = {}\n",
            dir.path().display(),
            aes_path.display(),
            peers_path.display()
        );
        fs::write(&settings_path, contents).unwrap();

        let settings = Settings::load(&settings_path).unwrap();
        assert_eq!(settings.read_aes_key().unwrap().len(), 16);
        assert_eq!(settings.read_peers().unwrap().len(), 2);
    }
}
