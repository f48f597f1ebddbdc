//! Reference JSON engine and transacted file writes.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use vault_session_core::{CompositeKey, ContentHash, Locator, Store};
use zeroize::Zeroizing;

use crate::{DatabaseEngine, EngineIoError, OpenError, OpenedStore};

/// Format tag written into every store file.
pub const STORE_FORMAT_TAG: &str = "vault-session-json";

/// Current store file version.
pub const STORE_FORMAT_VERSION: u32 = 1;

const KEY_SALT_LEN: usize = 16;

#[derive(Serialize, Deserialize)]
struct StoreFile {
    format: String,
    version: u32,
    key_salt: String,
    key_check: String,
    store: Store,
}

/// Engine persisting stores as JSON files with a salted key check.
#[derive(Debug, Default, Clone)]
pub struct JsonFileEngine;

impl JsonFileEngine {
    /// Creates the engine.
    pub fn new() -> Self {
        Self
    }

    fn local_path(locator: &Locator) -> Result<PathBuf, EngineIoError> {
        locator
            .to_path()
            .ok_or_else(|| EngineIoError::Unsupported(locator.redacted()))
    }

    fn encode(store: &Store, key: &CompositeKey) -> Result<Zeroizing<Vec<u8>>, EngineIoError> {
        let mut salt = [0_u8; KEY_SALT_LEN];
        StdRng::from_os_rng().fill_bytes(&mut salt);

        let file = StoreFile {
            format: STORE_FORMAT_TAG.to_string(),
            version: STORE_FORMAT_VERSION,
            key_salt: hex::encode(salt),
            key_check: key_check(&salt, key),
            store: store.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&file)
            .map_err(|error| EngineIoError::Encode(error.to_string()))?;
        Ok(Zeroizing::new(bytes))
    }
}

impl DatabaseEngine for JsonFileEngine {
    fn open(&self, locator: &Locator, key: &CompositeKey) -> Result<OpenedStore, OpenError> {
        let path = locator
            .to_path()
            .ok_or_else(|| OpenError::Unreadable(format!("unsupported locator {locator}")))?;
        let raw = match fs::read(&path) {
            Ok(raw) => Zeroizing::new(raw),
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Err(OpenError::NotFound(locator.redacted()));
            }
            Err(error) => return Err(OpenError::Unreadable(error.to_string())),
        };
        let hash = ContentHash::of_bytes(&raw);

        let file: StoreFile =
            serde_json::from_slice(&raw).map_err(|error| OpenError::Corrupt(error.to_string()))?;
        if file.format != STORE_FORMAT_TAG || file.version != STORE_FORMAT_VERSION {
            return Err(OpenError::Corrupt(format!(
                "unsupported store format {} v{}",
                file.format, file.version
            )));
        }
        let salt = hex::decode(&file.key_salt)
            .map_err(|error| OpenError::Corrupt(format!("invalid key salt: {error}")))?;
        if key_check(&salt, key) != file.key_check {
            return Err(OpenError::InvalidCredentials);
        }

        debug!(locator = %locator, hash = ?hash, "Store opened");
        Ok(OpenedStore {
            store: file.store,
            hash,
        })
    }

    fn save_as(
        &self,
        store: &Store,
        key: &CompositeKey,
        locator: &Locator,
    ) -> Result<ContentHash, EngineIoError> {
        let path = Self::local_path(locator)?;
        let bytes = Self::encode(store, key)?;
        FileTransaction::new(path).commit(&bytes)
    }

    fn hash_of(&self, locator: &Locator) -> Result<Option<ContentHash>, EngineIoError> {
        let path = Self::local_path(locator)?;
        match fs::read(&path) {
            Ok(raw) => Ok(Some(ContentHash::of_bytes(&Zeroizing::new(raw)))),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(EngineIoError::Io(error)),
        }
    }
}

fn key_check(salt: &[u8], key: &CompositeKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(key.key_material().as_slice());
    hex::encode(hasher.finalize())
}

/// Replace-on-success writer: temp file, verify, then atomic swap.
///
/// A crash mid-write leaves either the previous file or the new one, never a
/// truncated mix.
#[derive(Debug, Clone)]
pub struct FileTransaction {
    target: PathBuf,
}

impl FileTransaction {
    /// Prepares a transaction for `target`.
    ///
    /// A symbolic link target is resolved so the swap replaces the link's
    /// destination instead of the link itself.
    pub fn new(target: impl Into<PathBuf>) -> Self {
        let target = target.into();
        let target = match fs::symlink_metadata(&target) {
            Ok(meta) if meta.file_type().is_symlink() => {
                fs::canonicalize(&target).unwrap_or(target)
            }
            _ => target,
        };
        Self { target }
    }

    /// Writes `bytes` and swaps them into place.
    ///
    /// # Returns
    /// Hash of the committed bytes.
    ///
    /// # Errors
    /// - [`EngineIoError::Io`] for filesystem failures.
    /// - [`EngineIoError::ReadBackMismatch`] when the temporary file does not
    ///   read back identically; the target is left untouched.
    pub fn commit(&self, bytes: &[u8]) -> Result<ContentHash, EngineIoError> {
        let parent = match self.target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let mut temp = tempfile::NamedTempFile::new_in(&parent)?;
        temp.write_all(bytes)?;
        temp.flush()?;
        temp.as_file().sync_all()?;

        let expected = ContentHash::of_bytes(bytes);
        let actual = ContentHash::of_bytes(&Zeroizing::new(fs::read(temp.path())?));
        if actual != expected {
            return Err(EngineIoError::ReadBackMismatch { expected, actual });
        }

        temp.persist(&self.target)
            .map_err(|error| EngineIoError::Io(error.error))?;
        restrict_file(&self.target)?;
        debug!(path = %self.target.display(), hash = ?expected, "Transaction committed");
        Ok(expected)
    }
}

fn restrict_file(path: &Path) -> Result<(), EngineIoError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Merges `remote` into `local`.
///
/// # Semantics
/// - Groups and entries are matched by id.
/// - A remote entry replaces the local one when its revision is newer.
/// - Objects present on only one side are kept; deletions are not tracked.
pub fn merge_stores(local: &Store, remote: &Store) -> Store {
    let mut merged = local.clone();

    for group in &remote.groups {
        if merged.group(&group.id).is_none() {
            merged.groups.push(group.clone());
        }
    }

    for remote_entry in &remote.entries {
        match merged.entry_mut(&remote_entry.id) {
            Some(local_entry) if remote_entry.revision > local_entry.revision => {
                *local_entry = remote_entry.clone();
            }
            Some(_) => {}
            None => merged.entries.push(remote_entry.clone()),
        }
    }

    merged
}
