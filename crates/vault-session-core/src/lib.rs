#![warn(missing_docs)]
//! # vault-session-core
//!
//! ## Purpose
//! Defines the pure data model shared across the `vault-session` workspace.
//!
//! ## Responsibilities
//! - Represent credential-protected documents and their Open/Locked state.
//! - Keep the ordered document registry and its single active pointer.
//! - Model the in-memory store content (groups, entries, fields).
//! - Compute content hashes used for save-time conflict detection.
//!
//! ## Data flow
//! Engines produce a [`Store`] -> the coordinator populates a [`Document`] in
//! the [`DocumentRegistry`] -> lock/save/resolver layers read and mutate the
//! document through registry handles ([`DocumentId`]).
//!
//! ## Ownership and lifetimes
//! Open content is held as `Arc<Store>` so background resolver jobs can read a
//! snapshot without borrowing the registry. Locking drops the document's
//! reference; once the last snapshot is released the store zeroizes itself.
//!
//! ## Error model
//! Registry precondition failures return [`CloseError`] or [`RegistryError`];
//! content access on a locked or empty slot returns [`CoreError`].
//!
//! ## Security and privacy notes
//! Field values and credential material are zeroized on drop. [`CompositeKey`]
//! never prints its contents through `Debug`, and [`Locator::redacted`] strips
//! URI passwords before a locator reaches a log line.
//!
//! ## Example
//! ```rust
//! use vault_session_core::DocumentRegistry;
//!
//! let mut registry = DocumentRegistry::new();
//! let doc = registry.create_new();
//! assert_eq!(registry.active_id(), Some(doc));
//! assert_eq!(registry.len(), 1);
//! ```

mod document;
mod registry;
mod store;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;
use zeroize::Zeroizing;

pub use document::{Document, DocumentState};
pub use registry::DocumentRegistry;
pub use store::{Entry, Field, Group, Store, standard_fields};

/// Identity-stable handle of one registry slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc-{}", self.0)
    }
}

/// Path or URI identifying a document's backing store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator(String);

impl Locator {
    /// Creates a locator from a path or URI string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Empty locator (never-saved document or unlocked slot).
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Returns the raw locator text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` when no locator is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolves the locator to a local filesystem path.
    ///
    /// # Returns
    /// - `Some(path)` for plain paths and `file://` URIs.
    /// - `None` for other URI schemes (remote stores) and empty locators.
    pub fn to_path(&self) -> Option<PathBuf> {
        if self.is_empty() {
            return None;
        }

        match self.as_uri() {
            Some(url) if url.scheme() == "file" => url.to_file_path().ok(),
            Some(_) => None,
            None => Some(PathBuf::from(&self.0)),
        }
    }

    /// Returns the last path segment, used as a display title.
    pub fn file_name(&self) -> &str {
        self.0
            .rsplit(['/', '\\'])
            .find(|segment| !segment.is_empty())
            .unwrap_or("")
    }

    /// Returns a log-safe rendering with URI passwords removed.
    pub fn redacted(&self) -> String {
        match self.as_uri() {
            Some(mut url) if url.password().is_some() => {
                if url.set_password(Some("redacted")).is_err() {
                    return "<redacted>".to_string();
                }
                url.to_string()
            }
            _ => self.0.clone(),
        }
    }

    fn as_uri(&self) -> Option<Url> {
        // Single-letter schemes are Windows drive letters, not URIs.
        match Url::parse(&self.0) {
            Ok(url) if url.scheme().len() > 1 => Some(url),
            _ => None,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl From<&str> for Locator {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// SHA-256 digest of a backing store's raw bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hashes raw store bytes.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(digest.into())
    }

    /// Wraps an existing digest.
    pub fn from_digest(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    /// Parses a lowercase or uppercase hex digest.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidHash`] for non-hex input or wrong length.
    pub fn from_hex(raw: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(raw).map_err(|error| CoreError::InvalidHash(error.to_string()))?;
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidHash("digest must be 32 bytes".to_string()))?;
        Ok(Self(digest))
    }

    /// Returns the lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Credential material used to open a document.
#[derive(Clone)]
pub struct CompositeKey {
    password: Zeroizing<String>,
    key_file: Option<Zeroizing<Vec<u8>>>,
}

impl CompositeKey {
    /// Creates a password-only key.
    pub fn from_password(password: impl Into<String>) -> Self {
        Self {
            password: Zeroizing::new(password.into()),
            key_file: None,
        }
    }

    /// Adds key-file bytes to the composite key.
    pub fn with_key_file(mut self, bytes: Vec<u8>) -> Self {
        self.key_file = Some(Zeroizing::new(bytes));
        self
    }

    /// Returns the concatenated key material fed to engine key checks.
    pub fn key_material(&self) -> Zeroizing<Vec<u8>> {
        let mut material = Zeroizing::new(self.password.as_bytes().to_vec());
        if let Some(key_file) = &self.key_file {
            material.push(0);
            material.extend_from_slice(key_file);
        }
        material
    }

    /// Returns `true` when neither a password nor a key file is present.
    pub fn is_empty(&self) -> bool {
        self.password.is_empty() && self.key_file.is_none()
    }
}

impl fmt::Debug for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeKey")
            .field("password", &"<redacted>")
            .field("key_file", &self.key_file.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// View position flushed into a document before locking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    /// Group selected in the group tree.
    pub selected_group: Option<String>,
    /// Group scrolled to the top of the group tree.
    pub top_visible_group: Option<String>,
    /// Entry scrolled to the top of the entry list.
    pub top_visible_entry: Option<String>,
}

impl ViewState {
    /// Returns `true` when no position was recorded.
    pub fn is_empty(&self) -> bool {
        self.selected_group.is_none()
            && self.top_visible_group.is_none()
            && self.top_visible_entry.is_none()
    }
}

/// Errors from content access and hash parsing.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The document is locked or was never opened.
    #[error("document {0} has no open content")]
    ContentUnavailable(DocumentId),
    /// Hex digest could not be parsed.
    #[error("invalid content hash: {0}")]
    InvalidHash(String),
}

/// Errors returned by [`DocumentRegistry::close`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CloseError {
    /// The sole remaining slot is still open and cannot be removed.
    #[error("document {0} is the last open document")]
    LastOpenDocument(DocumentId),
    /// Handle does not refer to a registry slot.
    #[error("unknown document {0}")]
    UnknownDocument(DocumentId),
}

/// Errors from registry pointer operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Handle does not refer to a registry slot.
    #[error("unknown document {0}")]
    UnknownDocument(DocumentId),
}
