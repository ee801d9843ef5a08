use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{AutotagOption, Cred, FetchOptions, ObjectType, PushOptions, RemoteCallbacks,
    Repository, ResetType};
use log::{info, warn};
use rug::Integer;
use walkdir::{DirEntry, WalkDir};

use crate::bb::{BulletinBoard, Names, PermDataStore};
use crate::error::TrusteeError;
use crate::shuffler::PermutationData;

const BRANCH: &str = "master";
const PUSH_ATTEMPTS: u32 = 3;

/// Git-backed bulletin board: a local mirror of the remote section,
/// hard-reset to the remote on every sync. Trustees are idempotent, so
/// discarding unpushed local state on sync is always safe.
pub struct GitBulletinBoard {
    pub url: String,
    pub fs_path: PathBuf,
    pub no_compression: bool,
    perm_data: PermDataStore,
}

impl GitBulletinBoard {
    pub fn open(
        url: &str,
        fs_path: &Path,
        no_compression: bool,
        remove_lock: bool,
    ) -> Result<GitBulletinBoard, TrusteeError> {
        let board = GitBulletinBoard {
            url: url.to_string(),
            fs_path: fs_path.to_path_buf(),
            no_compression,
            perm_data: PermDataStore::default(),
        };

        if remove_lock {
            let lock = board.fs_path.join(".git").join("index.lock");
            if lock.exists() {
                warn!("removing stale index lock {:?}", lock);
                fs::remove_file(lock)?;
            }
        }
        let repo = board.open_or_clone()?;
        board.configure(&repo)?;

        Ok(board)
    }

    fn open_or_clone(&self) -> Result<Repository, git2::Error> {
        if self.fs_path.join(".git").exists() {
            Repository::open(&self.fs_path)
        } else {
            let co = CheckoutBuilder::new();
            let mut fo = FetchOptions::new();
            fo.remote_callbacks(remote_callbacks());

            RepoBuilder::new()
                .fetch_options(fo)
                .with_checkout(co)
                .clone(&self.url, &self.fs_path)
        }
    }

    fn configure(&self, repo: &Repository) -> Result<(), git2::Error> {
        if self.no_compression {
            let mut config = repo.config()?;
            config.set_i32("core.compression", 0)?;
            config.set_i32("pack.compression", 0)?;
        }

        Ok(())
    }

    // resets the working copy to match the remote, discarding local
    // commits and changes
    fn reset_to_remote(&self, repo: &Repository) -> Result<(), git2::Error> {
        let mut remote = repo.find_remote("origin")?;
        let mut fo = FetchOptions::new();
        fo.remote_callbacks(remote_callbacks());
        fo.download_tags(AutotagOption::All);
        remote.fetch(&[BRANCH], Some(&mut fo), None)?;

        let fetch_head = repo.find_reference("FETCH_HEAD")?;
        let commit = repo.reference_to_annotated_commit(&fetch_head)?;
        let object = repo.find_object(commit.id(), None)?;
        repo.reset(&object, ResetType::Hard, None)
    }

    fn write_entries(&self, entries: &[(String, Vec<u8>)]) -> Result<(), TrusteeError> {
        for (key, value) in entries {
            let target = self.fs_path.join(key);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            if target.exists() {
                return Err(TrusteeError::Transport(format!(
                    "key already present: {}",
                    key
                )));
            }
            fs::write(&target, value)?;
        }

        Ok(())
    }

    fn commit(&self, repo: &Repository, entries: &[(String, Vec<u8>)]) -> Result<(), git2::Error> {
        let mut index = repo.index()?;
        for (key, _) in entries {
            index.add_path(Path::new(key))?;
        }
        index.write()?;
        let oid = index.write_tree()?;
        let tree = repo.find_tree(oid)?;
        let signature = git2::Signature::now("trustee", "trustee@localhost")?;
        let message = entries
            .iter()
            .map(|(key, _)| key.as_str())
            .collect::<Vec<&str>>()
            .join(" ");

        let head = repo.head().ok().and_then(|h| {
            h.resolve()
                .ok()
                .and_then(|r| r.peel(ObjectType::Commit).ok())
                .and_then(|o| o.into_commit().ok())
        });
        match head {
            Some(parent) => repo.commit(
                Some("HEAD"),
                &signature,
                &signature,
                &message,
                &tree,
                &[&parent],
            )?,
            None => repo.commit(Some("HEAD"), &signature, &signature, &message, &tree, &[])?,
        };

        Ok(())
    }

    fn push(&self, repo: &Repository) -> Result<(), git2::Error> {
        let mut options = PushOptions::new();
        options.remote_callbacks(remote_callbacks());
        let mut remote = repo.find_remote("origin")?;
        let refspec = format!("refs/heads/{}:refs/heads/{}", BRANCH, BRANCH);

        remote.push(&[refspec.as_str()], Some(&mut options))
    }
}

fn remote_callbacks<'a>() -> RemoteCallbacks<'a> {
    let mut cb = RemoteCallbacks::new();
    cb.credentials(|_url, username, _allowed| {
        let user = username.unwrap_or("git");
        Cred::ssh_key_from_agent(user).or_else(|_| Cred::default())
    });

    cb
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

impl Names for GitBulletinBoard {}

impl BulletinBoard for GitBulletinBoard {
    fn sync(&mut self) -> Result<(), TrusteeError> {
        let repo = self.open_or_clone()?;
        self.reset_to_remote(&repo)?;

        Ok(())
    }

    fn file_set(&self) -> HashSet<String> {
        let mut ret: HashSet<String> = WalkDir::new(&self.fs_path)
            .into_iter()
            .filter_entry(|e| !is_hidden(e))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                e.path()
                    .strip_prefix(&self.fs_path)
                    .ok()
                    .and_then(|p| p.to_str())
                    .map(|s| s.replace('\\', "/"))
            })
            .collect();
        ret.extend(self.perm_data.keys::<Self>());

        ret
    }

    fn get(&self, key: &str) -> Option<Vec<u8>> {
        fs::read(self.fs_path.join(key)).ok()
    }

    /// Publishes all entries in a single commit; on a lost push race
    /// the mirror is re-synced and the publication retried.
    fn put(&mut self, entries: &[(String, Vec<u8>)]) -> Result<(), TrusteeError> {
        let repo = self.open_or_clone()?;
        let mut last_error: Option<git2::Error> = None;

        for attempt in 0..PUSH_ATTEMPTS {
            if attempt > 0 {
                info!("put: retrying after lost push race, attempt [{}]", attempt);
            }
            self.reset_to_remote(&repo)?;
            self.write_entries(entries)?;
            self.commit(&repo, entries)?;
            match self.push(&repo) {
                Ok(()) => return Ok(()),
                Err(e) => last_error = Some(e),
            }
        }

        Err(TrusteeError::Transport(format!(
            "push failed after {} attempts: {}",
            PUSH_ATTEMPTS,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
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
