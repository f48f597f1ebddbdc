#![warn(missing_docs)]
//! # vault-session-lock
//!
//! ## Purpose
//! Drives the per-document `Open -> Locked -> Open` state machine.
//!
//! ## Responsibilities
//! - Lock every open document, or a single one, with no partial effect when a
//!   blocking window or a pre-lock save gets in the way.
//! - Reopen locked documents and hand back the view state flushed at lock
//!   time, re-prompting for credentials on a bad key.
//! - Provide the try-enter [`ReentrancyGuard`] the periodic tick wraps its
//!   lock attempt in.
//! - Model OS session signals as [`SessionSignal`].
//!
//! ## Data flow
//! Tick or user command -> [`LockController::lock_all`] -> modal surfaces
//! closed -> pre-lock saves via [`LockHooks`] -> per document: flush view,
//! drain resolver jobs, release content, hand the store back to the engine.
//!
//! ## Ownership and lifetimes
//! The controller borrows the registry for the duration of one call. Released
//! content is passed to [`DatabaseEngine::close`]; once the last snapshot is
//! dropped the store zeroizes itself.
//!
//! ## Error model
//! Every failure is a [`LockError`]. `BlockingWindowOpen` and `SaveFailed`
//! leave all documents exactly as they were.
//!
//! ## Security and privacy notes
//! Background jobs are drained before content is released so no worker reads
//! memory that is about to be cleared.

mod guard;

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use vault_session_core::{CompositeKey, DocumentId, DocumentRegistry, Locator, ViewState};
use vault_session_engine::{CredentialPrompt, DatabaseEngine, OpenError};

pub use guard::{GuardToken, ReentrancyGuard};

/// Discrete OS session notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionSignal {
    /// Workstation was locked.
    Lock,
    /// Workstation unlock is pending.
    UnlockPending,
    /// System is about to suspend.
    Suspend,
    /// Another user session became active.
    UserSwitch,
    /// Session is logging off or shutting down.
    SessionEnding,
}

/// Modal or blocking UI surfaces owned by the host.
pub trait ModalSurfaces {
    /// Returns `true` when every blocking surface can be closed.
    fn can_close_all(&self) -> bool;

    /// Closes every blocking surface; `false` if one refused.
    fn close_all(&mut self) -> bool;
}

/// Host without modal surfaces.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoModalSurfaces;

impl ModalSurfaces for NoModalSurfaces {
    fn can_close_all(&self) -> bool {
        true
    }

    fn close_all(&mut self) -> bool {
        true
    }
}

/// Callbacks into the layers around the lock controller.
pub trait LockHooks {
    /// Saves `doc` before it is locked.
    ///
    /// # Errors
    /// Any error aborts the whole lock operation.
    fn save_before_lock(
        &mut self,
        registry: &mut DocumentRegistry,
        doc: DocumentId,
    ) -> Result<(), Box<dyn StdError + Send + Sync>>;

    /// Returns the view position the UI currently shows for `doc`.
    fn pending_view(&mut self, doc: DocumentId) -> Option<ViewState> {
        let _ = doc;
        None
    }

    /// Waits for background work reading `doc`'s content.
    fn drain(&mut self, doc: DocumentId) {
        let _ = doc;
    }
}

/// Flags controlling one lock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    /// Report [`LockOutcome::ExitRequested`] instead of locking.
    pub exit_instead_of_lock: bool,
    /// Save modified documents first; otherwise their changes are discarded.
    pub save_modified: bool,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            exit_instead_of_lock: false,
            save_modified: true,
        }
    }
}

/// Successful result of a lock request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    /// These documents moved to `Locked`.
    Locked(Vec<DocumentId>),
    /// Policy asked for application exit; nothing was locked.
    ExitRequested,
    /// No open document to lock.
    NothingToLock,
}

/// Per-document lock state machine.
pub struct LockController {
    engine: Arc<dyn DatabaseEngine>,
    tick_guard: ReentrancyGuard,
}

impl LockController {
    /// Creates a controller handing released content back to `engine`.
    pub fn new(engine: Arc<dyn DatabaseEngine>) -> Self {
        Self {
            engine,
            tick_guard: ReentrancyGuard::new(),
        }
    }

    /// Guard the periodic tick acquires around its lock attempt.
    pub fn tick_guard(&self) -> &ReentrancyGuard {
        &self.tick_guard
    }

    /// Locks every open document.
    ///
    /// # Errors
    /// - [`LockError::BlockingWindowOpen`] when a modal surface refuses to
    ///   close.
    /// - [`LockError::SaveFailed`] when a pre-lock save fails.
    ///
    /// Both leave every document untouched.
    pub fn lock_all(
        &self,
        registry: &mut DocumentRegistry,
        surfaces: &mut dyn ModalSurfaces,
        hooks: &mut dyn LockHooks,
        policy: LockPolicy,
    ) -> Result<LockOutcome, LockError> {
        let targets = registry.open_documents();
        self.lock_targets(registry, targets, surfaces, hooks, policy)
    }

    /// Locks one document with the same semantics as [`LockController::lock_all`].
    ///
    /// # Errors
    /// [`LockError::UnknownDocument`] plus the errors of `lock_all`.
    pub fn lock_document(
        &self,
        registry: &mut DocumentRegistry,
        doc: DocumentId,
        surfaces: &mut dyn ModalSurfaces,
        hooks: &mut dyn LockHooks,
        policy: LockPolicy,
    ) -> Result<LockOutcome, LockError> {
        let document = registry.get(doc).ok_or(LockError::UnknownDocument(doc))?;
        let targets = if document.is_open() { vec![doc] } else { Vec::new() };
        self.lock_targets(registry, targets, surfaces, hooks, policy)
    }

    fn lock_targets(
        &self,
        registry: &mut DocumentRegistry,
        targets: Vec<DocumentId>,
        surfaces: &mut dyn ModalSurfaces,
        hooks: &mut dyn LockHooks,
        policy: LockPolicy,
    ) -> Result<LockOutcome, LockError> {
        if targets.is_empty() {
            return Ok(LockOutcome::NothingToLock);
        }

        if !surfaces.close_all() {
            warn!("Lock aborted: a blocking window is still open");
            return Err(LockError::BlockingWindowOpen);
        }

        if policy.exit_instead_of_lock {
            info!("Lock replaced by application exit");
            return Ok(LockOutcome::ExitRequested);
        }

        // Invariant:
        // - Every fallible step runs before the first document is locked.
        for &doc in &targets {
            let modified = registry.get(doc).is_some_and(|document| document.is_modified());
            if !modified {
                continue;
            }
            if policy.save_modified {
                hooks
                    .save_before_lock(registry, doc)
                    .map_err(|source| LockError::SaveFailed { doc, source })?;
            } else {
                warn!(doc = %doc, "Locking modified document; unsaved changes are discarded");
            }
        }

        let mut locked = Vec::with_capacity(targets.len());
        for doc in targets {
            let pending = hooks.pending_view(doc);
            hooks.drain(doc);

            let Some(document) = registry.get_mut(doc) else {
                continue;
            };
            let view = pending.unwrap_or_else(|| document.view_state().clone());
            if let Some(store) = document.lock(view) {
                self.engine.close(store);
                info!(doc = %doc, locator = %document.locked_locator(), "Document locked");
                locked.push(doc);
            }
        }
        Ok(LockOutcome::Locked(locked))
    }

    /// Reopens a locked document.
    ///
    /// # Returns
    /// The view state flushed at lock time.
    ///
    /// # Errors
    /// - [`LockError::UnknownDocument`] for a foreign handle.
    /// - [`LockError::NotLocked`] when the slot holds no locked locator.
    /// - [`LockError::Open`] when the engine rejects the reopen; the document
    ///   stays locked.
    pub fn unlock(
        &self,
        registry: &mut DocumentRegistry,
        doc: DocumentId,
        credentials: CompositeKey,
    ) -> Result<ViewState, LockError> {
        let locator = locked_locator(registry, doc)?;
        let opened = self.engine.open(&locator, &credentials)?;

        let document = registry
            .get_mut(doc)
            .ok_or(LockError::UnknownDocument(doc))?;
        let view = document.unlock(credentials, opened.store, Some(opened.hash));
        info!(doc = %doc, locator = %locator, "Document unlocked");
        Ok(view)
    }

    /// Reopens a locked document, asking `prompt` for credentials.
    ///
    /// Bad credentials are retried up to `max_attempts` prompts in total.
    ///
    /// # Errors
    /// - [`LockError::Cancelled`] when the prompt returns `None`.
    /// - Errors of [`LockController::unlock`]; the last credential error is
    ///   returned once attempts run out.
    pub fn unlock_with_prompt(
        &self,
        registry: &mut DocumentRegistry,
        doc: DocumentId,
        prompt: &mut dyn CredentialPrompt,
        max_attempts: u32,
    ) -> Result<ViewState, LockError> {
        let locator = locked_locator(registry, doc)?;
        let max_attempts = max_attempts.max(1);

        let mut attempt = 1;
        loop {
            let credentials = prompt
                .request(&locator, attempt)
                .ok_or(LockError::Cancelled)?;
            match self.unlock(registry, doc, credentials) {
                Err(LockError::Open(error)) if error.is_credential_error() && attempt < max_attempts => {
                    warn!(doc = %doc, attempt, "Unlock rejected credentials");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

impl std::fmt::Debug for LockController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockController")
            .field("tick_guard", &self.tick_guard)
            .finish_non_exhaustive()
    }
}

fn locked_locator(registry: &DocumentRegistry, doc: DocumentId) -> Result<Locator, LockError> {
    let document = registry.get(doc).ok_or(LockError::UnknownDocument(doc))?;
    if !document.is_locked() {
        return Err(LockError::NotLocked(doc));
    }
    Ok(document.locked_locator().clone())
}

/// Lock controller error type.
#[derive(Debug, Error)]
pub enum LockError {
    /// A modal surface refused to close; nothing was locked.
    #[error("a blocking window is open")]
    BlockingWindowOpen,
    /// Unlock requested for a slot that is not locked.
    #[error("document {0} is not locked")]
    NotLocked(DocumentId),
    /// Handle does not refer to a registry slot.
    #[error("unknown document {0}")]
    UnknownDocument(DocumentId),
    /// Reopening the backing store failed.
    #[error("unlock failed: {0}")]
    Open(#[from] OpenError),
    /// The credential prompt was dismissed.
    #[error("unlock cancelled")]
    Cancelled,
    /// A pre-lock save failed; nothing was locked.
    #[error("saving {doc} before lock failed: {source}")]
    SaveFailed {
        /// Document whose save failed.
        doc: DocumentId,
        /// Underlying save failure.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}
