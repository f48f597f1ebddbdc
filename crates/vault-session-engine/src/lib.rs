#![warn(missing_docs)]
//! # vault-session-engine
//!
//! ## Purpose
//! Defines the collaborator contracts the session layer consumes: the database
//! engine, the placeholder compiler and the credential prompt.
//!
//! ## Responsibilities
//! - Declare [`DatabaseEngine`] (open, transacted save, close, hash, merge).
//! - Declare [`PlaceholderCompiler`] as a pure `(template, context) -> text`
//!   function safe to call from worker threads.
//! - Provide reference implementations: [`JsonFileEngine`] with
//!   [`FileTransaction`] writes and the [`SprCompiler`] placeholder engine.
//!
//! ## Data flow
//! Coordinator asks [`CredentialPrompt`] for a [`CompositeKey`] ->
//! [`DatabaseEngine::open`] returns an [`OpenedStore`] -> later saves go
//! through [`DatabaseEngine::save_as`] and are verified with
//! [`DatabaseEngine::hash_of`].
//!
//! ## Ownership and lifetimes
//! Engines return owned [`Store`] values; compilers read an `Arc<Store>`
//! snapshot carried in [`ExpandContext`] so they never borrow the registry.
//!
//! ## Error model
//! Open failures are [`OpenError`] (credentials, missing, unreadable, corrupt),
//! write and hash failures are [`EngineIoError`], expansion failures are
//! [`ExpandError`] and are expected to be swallowed by callers.
//!
//! ## Security and privacy notes
//! The reference JSON engine is not an encrypted container. It exists so the
//! coordination layer can be exercised end to end; production hosts plug in
//! their own engine behind the same trait.

mod file;
mod spr;

use std::sync::Arc;

use thiserror::Error;
use vault_session_core::{CompositeKey, ContentHash, Entry, Locator, Store};

pub use file::{FileTransaction, JsonFileEngine, STORE_FORMAT_TAG, STORE_FORMAT_VERSION, merge_stores};
pub use spr::{MAX_RECURSION_DEPTH, SprCompiler};

/// Store content returned by a successful open.
#[derive(Debug)]
pub struct OpenedStore {
    /// Decrypted content.
    pub store: Store,
    /// Hash of the raw bytes that were read.
    pub hash: ContentHash,
}

/// Database engine collaborator.
pub trait DatabaseEngine: Send + Sync {
    /// Reads and decrypts the store at `locator`.
    ///
    /// # Errors
    /// Returns [`OpenError::InvalidCredentials`] for a wrong key and other
    /// [`OpenError`] variants for missing, unreadable or corrupt stores.
    fn open(&self, locator: &Locator, key: &CompositeKey) -> Result<OpenedStore, OpenError>;

    /// Writes `store` to `locator` and returns the hash of the bytes written.
    ///
    /// # Errors
    /// Returns [`EngineIoError`] when the write or its read-back check fails.
    fn save_as(
        &self,
        store: &Store,
        key: &CompositeKey,
        locator: &Locator,
    ) -> Result<ContentHash, EngineIoError>;

    /// Releases engine-side resources held for `store`.
    fn close(&self, store: Arc<Store>) {
        drop(store);
    }

    /// Hashes the current raw content at `locator`; `None` when absent.
    ///
    /// # Errors
    /// Returns [`EngineIoError`] when the location exists but cannot be read.
    fn hash_of(&self, locator: &Locator) -> Result<Option<ContentHash>, EngineIoError>;

    /// Merges the store currently at `locator` into `local`.
    ///
    /// Does not write; the caller saves the merged result.
    ///
    /// # Errors
    /// Propagates [`OpenError`] from reading the remote store.
    fn synchronize(
        &self,
        local: &Store,
        key: &CompositeKey,
        locator: &Locator,
    ) -> Result<Store, OpenError> {
        let remote = self.open(locator, key)?;
        Ok(merge_stores(local, &remote.store))
    }
}

/// Inputs available to a placeholder expansion.
#[derive(Debug, Clone)]
pub struct ExpandContext {
    /// Content snapshot the row was built from.
    pub store: Arc<Store>,
    /// Entry the template belongs to.
    pub entry_id: String,
    /// Locator of the owning document.
    pub locator: Locator,
}

impl ExpandContext {
    /// Resolves the context entry in the snapshot.
    ///
    /// # Errors
    /// Returns [`ExpandError::UnknownEntry`] when the entry is gone.
    pub fn entry(&self) -> Result<&Entry, ExpandError> {
        self.store
            .entry(&self.entry_id)
            .ok_or_else(|| ExpandError::UnknownEntry(self.entry_id.clone()))
    }
}

/// Placeholder compiler collaborator.
///
/// Implementations must be pure with respect to the context: no I/O of their
/// own and no mutation of the snapshot.
pub trait PlaceholderCompiler: Send + Sync {
    /// Expands placeholders in `template`.
    ///
    /// # Errors
    /// Returns [`ExpandError`] when the template cannot be expanded.
    fn expand(&self, template: &str, ctx: &ExpandContext) -> Result<String, ExpandError>;
}

/// Source of credentials for open and unlock.
pub trait CredentialPrompt {
    /// Asks for credentials for `locator`; `attempt` starts at 1.
    ///
    /// Returns `None` when the user cancels.
    fn request(&mut self, locator: &Locator, attempt: u32) -> Option<CompositeKey>;
}

/// Errors from opening a backing store.
#[derive(Debug, Error)]
pub enum OpenError {
    /// Key check failed.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// Nothing exists at the locator.
    #[error("store not found: {0}")]
    NotFound(String),
    /// The store exists but could not be read.
    #[error("store unreadable: {0}")]
    Unreadable(String),
    /// Content was read but is not a valid store.
    #[error("corrupt store format: {0}")]
    Corrupt(String),
}

impl OpenError {
    /// Returns `true` when re-prompting for credentials can help.
    pub fn is_credential_error(&self) -> bool {
        matches!(self, Self::InvalidCredentials)
    }
}

/// Errors from writing or hashing a backing store.
#[derive(Debug, Error)]
pub enum EngineIoError {
    /// Filesystem failure.
    #[error("store i/o failure: {0}")]
    Io(#[from] std::io::Error),
    /// Store could not be serialized.
    #[error("store encoding failure: {0}")]
    Encode(String),
    /// Locator kind is not supported by this engine.
    #[error("unsupported locator: {0}")]
    Unsupported(String),
    /// Temporary file read-back did not match the bytes written.
    #[error("transaction read-back mismatch: expected {expected}, got {actual}")]
    ReadBackMismatch {
        /// Hash of the bytes handed to the writer.
        expected: ContentHash,
        /// Hash of the bytes read back.
        actual: ContentHash,
    },
}

/// Errors from placeholder expansion.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExpandError {
    /// Nested references exceeded [`MAX_RECURSION_DEPTH`].
    #[error("placeholder recursion limit reached")]
    RecursionLimit,
    /// Context entry does not exist in the snapshot.
    #[error("unknown entry: {0}")]
    UnknownEntry(String),
    /// Compiler-specific failure.
    #[error("placeholder expansion failed: {0}")]
    Failed(String),
}
