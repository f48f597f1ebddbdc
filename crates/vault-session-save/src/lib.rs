#![warn(missing_docs)]
//! # vault-session-save
//!
//! ## Purpose
//! Saves open documents without silently losing concurrent external edits or
//! accepting a corrupted write.
//!
//! ## Responsibilities
//! - Compare the on-disk hash with the document's last known hash before
//!   writing and surface any mismatch as a three-way [`ConflictChoice`].
//! - Merge remote changes on [`ConflictChoice::Synchronize`].
//! - Re-hash after writing and report [`SaveError::VerificationFailed`] on a
//!   mismatch.
//!
//! ## Data flow
//! Caller -> [`SaveCoordinator::save`] -> `hash_of` (pre-write) ->
//! [`ConflictResolver`] on mismatch -> `save_as` (transacted) -> `hash_of`
//! (post-write) -> [`vault_session_core::Document::mark_saved`].
//!
//! ## Ownership and lifetimes
//! The coordinator borrows the registry for one call and writes from an
//! `Arc<Store>` snapshot, so the registry is free while the engine runs.
//!
//! ## Error model
//! Every failure is a [`SaveError`]; on error the document keeps its modified
//! flag and its previous last known hash.
//!
//! ## Security and privacy notes
//! Locators are logged through [`Locator::redacted`].

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use vault_session_core::{ContentHash, DocumentId, DocumentRegistry, Locator};
use vault_session_engine::{DatabaseEngine, EngineIoError, OpenError};

/// Answer to a pre-write hash mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    /// Merge the external changes into memory, then write the merge.
    Synchronize,
    /// Write anyway, discarding the external changes.
    Overwrite,
    /// Abort the save.
    Cancel,
}

/// Details of a detected external modification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveConflict {
    /// Document being saved.
    pub doc: DocumentId,
    /// Backing store location.
    pub locator: Locator,
    /// Hash recorded at the last open or save.
    pub expected: Option<ContentHash>,
    /// Hash found on disk now.
    pub actual: Option<ContentHash>,
}

/// Collaborator asked to resolve a save conflict.
pub trait ConflictResolver {
    /// Picks how to continue.
    fn resolve(&mut self, conflict: &SaveConflict) -> ConflictChoice;
}

/// Resolver that always answers with the same choice.
#[derive(Debug, Clone, Copy)]
pub struct FixedChoice(pub ConflictChoice);

impl ConflictResolver for FixedChoice {
    fn resolve(&mut self, _conflict: &SaveConflict) -> ConflictChoice {
        self.0
    }
}

/// Flags for one save request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Skip the pre-write conflict check.
    pub force: bool,
}

/// Result of a successful save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    /// Verified hash of the written content.
    pub hash: ContentHash,
    /// `true` when external changes were merged before writing.
    pub synchronized: bool,
}

/// Two-hash save discipline over a [`DatabaseEngine`].
pub struct SaveCoordinator {
    engine: Arc<dyn DatabaseEngine>,
}

impl SaveCoordinator {
    /// Creates a coordinator writing through `engine`.
    pub fn new(engine: Arc<dyn DatabaseEngine>) -> Self {
        Self { engine }
    }

    /// Saves `doc` to its current locator.
    ///
    /// # Errors
    /// - [`SaveError::UnknownDocument`], [`SaveError::NotOpen`],
    ///   [`SaveError::NoLocator`] for precondition failures.
    /// - [`SaveError::Conflict`] when the resolver cancels.
    /// - [`SaveError::SyncFailed`] when merging the external store fails.
    /// - [`SaveError::Io`] and [`SaveError::VerificationFailed`] from the
    ///   write itself.
    pub fn save(
        &self,
        registry: &mut DocumentRegistry,
        doc: DocumentId,
        resolver: &mut dyn ConflictResolver,
        options: SaveOptions,
    ) -> Result<SaveReport, SaveError> {
        let (locator, expected) = {
            let document = registry.get(doc).ok_or(SaveError::UnknownDocument(doc))?;
            if !document.is_open() {
                return Err(SaveError::NotOpen(doc));
            }
            if document.locator().is_empty() {
                return Err(SaveError::NoLocator(doc));
            }
            (document.locator().clone(), document.last_known_hash())
        };

        let mut synchronized = false;
        if !options.force {
            let actual = self.engine.hash_of(&locator)?;
            if is_conflict(expected, actual) {
                let conflict = SaveConflict {
                    doc,
                    locator: locator.clone(),
                    expected,
                    actual,
                };
                warn!(doc = %doc, locator = %locator, "Backing store changed since last read");
                match resolver.resolve(&conflict) {
                    ConflictChoice::Cancel => {
                        return Err(SaveError::Conflict { expected, actual });
                    }
                    ConflictChoice::Overwrite => {}
                    ConflictChoice::Synchronize => {
                        self.synchronize(registry, doc, &locator)?;
                        synchronized = true;
                    }
                }
            }
        }

        let hash = self.write_verified(registry, doc, &locator)?;
        info!(doc = %doc, locator = %locator, synchronized, "Document saved");
        Ok(SaveReport { hash, synchronized })
    }

    /// Saves `doc` to `new_locator` and makes it the document's locator.
    ///
    /// No conflict check is made against the new location.
    ///
    /// # Errors
    /// Precondition, I/O and verification errors as for
    /// [`SaveCoordinator::save`].
    pub fn save_as(
        &self,
        registry: &mut DocumentRegistry,
        doc: DocumentId,
        new_locator: Locator,
    ) -> Result<SaveReport, SaveError> {
        let document = registry.get(doc).ok_or(SaveError::UnknownDocument(doc))?;
        if !document.is_open() {
            return Err(SaveError::NotOpen(doc));
        }
        if new_locator.is_empty() {
            return Err(SaveError::NoLocator(doc));
        }

        let hash = self.write_verified(registry, doc, &new_locator)?;
        info!(doc = %doc, locator = %new_locator, "Document saved under new locator");
        Ok(SaveReport {
            hash,
            synchronized: false,
        })
    }

    fn synchronize(
        &self,
        registry: &mut DocumentRegistry,
        doc: DocumentId,
        locator: &Locator,
    ) -> Result<(), SaveError> {
        let document = registry.get_mut(doc).ok_or(SaveError::UnknownDocument(doc))?;
        let (Some(store), Some(key)) = (document.content().cloned(), document.credentials().cloned())
        else {
            return Err(SaveError::NotOpen(doc));
        };

        let merged = self
            .engine
            .synchronize(&store, &key, locator)
            .map_err(SaveError::SyncFailed)?;
        document
            .replace_content(merged)
            .map_err(|_| SaveError::NotOpen(doc))?;
        Ok(())
    }

    fn write_verified(
        &self,
        registry: &mut DocumentRegistry,
        doc: DocumentId,
        locator: &Locator,
    ) -> Result<ContentHash, SaveError> {
        let document = registry.get_mut(doc).ok_or(SaveError::UnknownDocument(doc))?;
        let (Some(store), Some(key)) = (document.content().cloned(), document.credentials().cloned())
        else {
            return Err(SaveError::NotOpen(doc));
        };

        let written = self.engine.save_as(&store, &key, locator)?;
        let on_disk = self.engine.hash_of(locator)?;
        if on_disk != Some(written) {
            warn!(doc = %doc, locator = %locator, "Post-write verification failed");
            return Err(SaveError::VerificationFailed {
                written,
                on_disk,
            });
        }

        document.mark_saved(locator.clone(), written);
        Ok(written)
    }
}

impl std::fmt::Debug for SaveCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveCoordinator").finish_non_exhaustive()
    }
}

/// Decides whether the on-disk state diverged from the last known state.
///
/// A store that no longer exists is not a conflict: there is nothing on disk
/// to lose.
fn is_conflict(expected: Option<ContentHash>, actual: Option<ContentHash>) -> bool {
    match actual {
        None => false,
        Some(actual) => expected != Some(actual),
    }
}

/// Save coordinator error type.
#[derive(Debug, Error)]
pub enum SaveError {
    /// Handle does not refer to a registry slot.
    #[error("unknown document {0}")]
    UnknownDocument(DocumentId),
    /// Document is locked or empty.
    #[error("document {0} is not open")]
    NotOpen(DocumentId),
    /// Document has never been saved and no locator was given.
    #[error("document {0} has no locator")]
    NoLocator(DocumentId),
    /// The backing store changed externally and the save was cancelled.
    #[error("backing store changed externally (expected {expected:?}, found {actual:?})")]
    Conflict {
        /// Hash recorded at the last open or save.
        expected: Option<ContentHash>,
        /// Hash found on disk.
        actual: Option<ContentHash>,
    },
    /// Merging the external store failed.
    #[error("synchronize failed: {0}")]
    SyncFailed(OpenError),
    /// Written content does not hash to what the writer reported.
    #[error("post-write verification failed (wrote {written:?}, found {on_disk:?})")]
    VerificationFailed {
        /// Hash reported by the writer.
        written: ContentHash,
        /// Hash read back after the write.
        on_disk: Option<ContentHash>,
    },
    /// Engine write or hash failure.
    #[error(transparent)]
    Io(#[from] EngineIoError),
}
