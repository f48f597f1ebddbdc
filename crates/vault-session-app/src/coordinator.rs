//! Session façade owning the registry, the periodic tick and every lifecycle
//! transition the presentation layer can request.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};
use vault_session_core::{
    CloseError, CompositeKey, CoreError, DocumentId, DocumentRegistry, DocumentState, Locator,
    RegistryError, Store, ViewState, standard_fields,
};
use vault_session_engine::{CredentialPrompt, DatabaseEngine, OpenError, PlaceholderCompiler};
use vault_session_inactivity::{GlobalInputSource, InactivityMonitor, NoGlobalInput};
use vault_session_lock::{
    LockController, LockError, LockHooks, LockOutcome, ModalSurfaces, NoModalSurfaces,
    ReentrancyGuard, SessionSignal,
};
use vault_session_resolver::{FieldResolver, ResolverError, RowSet, RowSource};
use vault_session_save::{
    ConflictChoice, ConflictResolver, FixedChoice, SaveCoordinator, SaveError, SaveOptions,
    SaveReport,
};

use crate::clipboard::{ClipboardCountdown, ClipboardSink, NoClipboard};
use crate::config::{ConfigError, SessionConfig};
use crate::events::{
    DocumentSummary, EventVerdict, LockCommand, SessionEvent, SessionObserver, UiSnapshot,
};

/// Columns materialized for the entry list.
pub const LIST_COLUMNS: [&str; 4] = [
    standard_fields::TITLE,
    standard_fields::USER_NAME,
    standard_fields::URL,
    standard_fields::NOTES,
];

/// Root group id given to documents created by [`SessionCoordinator::new_document`].
pub const NEW_ROOT_GROUP_ID: &str = "root";

/// Answer to closing a document with unsaved changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    /// Save, then close.
    Save,
    /// Close and drop the changes.
    Discard,
    /// Keep the document open.
    Cancel,
}

/// Collaborator asked whether unsaved changes should be kept.
pub trait CloseDecider {
    /// Decides for `doc`, shown to the user as `title`.
    fn decide(&mut self, doc: DocumentId, title: &str) -> CloseDecision;
}

/// Decider that always answers the same.
#[derive(Debug, Clone, Copy)]
pub struct FixedDecision(pub CloseDecision);

impl CloseDecider for FixedDecision {
    fn decide(&mut self, _doc: DocumentId, _title: &str) -> CloseDecision {
        self.0
    }
}

/// Prompt that always cancels.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclinePrompt;

impl CredentialPrompt for DeclinePrompt {
    fn request(&mut self, _locator: &Locator, _attempt: u32) -> Option<CompositeKey> {
        None
    }
}

/// Host-side collaborators the coordinator calls back into.
pub struct HostServices {
    /// Modal dialogs that may block locking.
    pub surfaces: Box<dyn ModalSurfaces>,
    /// Save conflict three-way choice.
    pub conflicts: Box<dyn ConflictResolver>,
    /// Credential entry for open and unlock.
    pub prompt: Box<dyn CredentialPrompt>,
    /// System clipboard.
    pub clipboard: Box<dyn ClipboardSink>,
    /// OS last-input query.
    pub global_input: Arc<dyn GlobalInputSource>,
    /// Save/discard/cancel on close.
    pub close_decider: Box<dyn CloseDecider>,
}

impl HostServices {
    /// Collaborators for a host without UI: conflicts and prompts cancel,
    /// close keeps unsaved documents open.
    pub fn headless() -> Self {
        Self {
            surfaces: Box::new(NoModalSurfaces),
            conflicts: Box::new(FixedChoice(ConflictChoice::Cancel)),
            prompt: Box::new(DeclinePrompt),
            clipboard: Box::new(NoClipboard),
            global_input: Arc::new(NoGlobalInput),
            close_decider: Box::new(FixedDecision(CloseDecision::Cancel)),
        }
    }
}

impl std::fmt::Debug for HostServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostServices").finish_non_exhaustive()
    }
}

/// What one call to [`SessionCoordinator::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A previous tick still holds the guard; nothing ran.
    Skipped,
    /// A blocking dialog is open; the lock check did not run.
    Suppressed,
    /// No deadline passed, or nothing was open.
    Idle,
    /// Inactivity locked the open documents.
    Locked,
    /// Inactivity asked the host to exit instead of locking.
    ExitRequested,
    /// A lock was due but could not complete.
    LockAborted,
}

/// Result of [`SessionCoordinator::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The slot left the registry.
    Closed,
    /// An observer vetoed or the user cancelled.
    Cancelled,
}

/// Result of [`SessionCoordinator::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every document closed and workers joined.
    Completed,
    /// Closing this document was cancelled; the session keeps running.
    Cancelled(DocumentId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ShownGroup {
    doc: DocumentId,
    group: String,
}

/// Top-level session coordinator.
///
/// # Invariants
/// - All transitions run on the owning thread; only cell expansion runs on
///   resolver workers.
/// - Every lock and close drains resolver work for the shown document before
///   its content is released.
pub struct SessionCoordinator {
    config: SessionConfig,
    engine: Arc<dyn DatabaseEngine>,
    registry: DocumentRegistry,
    inactivity: InactivityMonitor,
    lock: LockController,
    saver: SaveCoordinator,
    resolver: FieldResolver,
    host: HostServices,
    observers: Vec<Box<dyn SessionObserver>>,
    clipboard: ClipboardCountdown,
    views: HashMap<DocumentId, ViewState>,
    shown: Option<ShownGroup>,
    blocked: usize,
    exit_requested: bool,
}

impl SessionCoordinator {
    /// Builds a coordinator and starts the resolver pool.
    ///
    /// Inactivity clocks start disarmed; the host arms them with
    /// [`SessionCoordinator::notify_activity`].
    ///
    /// # Errors
    /// - [`SessionError::Config`] when `config` fails validation.
    /// - [`SessionError::Resolver`] when workers cannot be started.
    pub fn new(
        config: SessionConfig,
        engine: Arc<dyn DatabaseEngine>,
        compiler: Arc<dyn PlaceholderCompiler>,
        host: HostServices,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let resolver = FieldResolver::new(compiler, config.resolver_workers)?;
        info!(
            lock_after_secs = config.lock_after_secs,
            lock_after_global_secs = config.lock_after_global_secs,
            workers = config.resolver_workers,
            "Session coordinator started"
        );

        Ok(Self {
            inactivity: InactivityMonitor::new(config.lock_after_secs),
            lock: LockController::new(Arc::clone(&engine)),
            saver: SaveCoordinator::new(Arc::clone(&engine)),
            registry: DocumentRegistry::new(),
            clipboard: ClipboardCountdown::new(),
            observers: Vec::new(),
            views: HashMap::new(),
            shown: None,
            blocked: 0,
            exit_requested: false,
            resolver,
            engine,
            config,
            host,
        })
    }

    /// Adds an event observer.
    pub fn subscribe(&mut self, observer: Box<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    /// Injected configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Document collection.
    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    /// Inactivity clocks.
    pub fn inactivity(&self) -> &InactivityMonitor {
        &self.inactivity
    }

    /// Guard held by a running tick.
    pub fn tick_guard(&self) -> &ReentrancyGuard {
        self.lock.tick_guard()
    }

    /// Displayed entry rows.
    pub fn rows(&self) -> &RowSet {
        self.resolver.rows()
    }

    /// Group currently listed, with its document.
    pub fn shown_group(&self) -> Option<(DocumentId, &str)> {
        self.shown
            .as_ref()
            .map(|shown| (shown.doc, shown.group.as_str()))
    }

    /// Latest view position known for `doc`.
    pub fn view_state(&self, doc: DocumentId) -> Option<&ViewState> {
        self.views.get(&doc)
    }

    /// `true` once policy asked the host to exit.
    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    /// Records user interaction with this process.
    pub fn notify_activity(&mut self, now_ms: u64) {
        self.inactivity.notify_activity(now_ms);
    }

    /// Periodic entry point, called at `tick_interval_ms` cadence.
    ///
    /// Order: apply finished cells, advance the clipboard countdown, stop if
    /// a blocking dialog is open, observe global input, lock when due.
    pub fn tick(&mut self, now_ms: u64) -> TickOutcome {
        let Some(_running) = self.lock.tick_guard().try_enter() else {
            debug!("Tick skipped: previous tick still running");
            return TickOutcome::Skipped;
        };

        self.resolver.apply_ready();
        self.tick_clipboard();

        if !self.host.surfaces.can_close_all() {
            return TickOutcome::Suppressed;
        }

        let stamp = self.host.global_input.last_input_stamp();
        self.inactivity
            .tick(now_ms, self.config.lock_after_global_secs, stamp);
        if !self.inactivity.is_due(now_ms) || self.registry.open_documents().is_empty() {
            return TickOutcome::Idle;
        }

        info!("Inactivity timeout reached");
        match self.run_lock(None) {
            Ok(LockOutcome::Locked(_)) => {
                // Unlocking must not immediately re-trigger a lock.
                self.inactivity.notify_activity(now_ms);
                TickOutcome::Locked
            }
            Ok(LockOutcome::ExitRequested) => TickOutcome::ExitRequested,
            Ok(LockOutcome::NothingToLock) => TickOutcome::Idle,
            Err(error) => {
                warn!(error = %error, "Inactivity lock aborted");
                TickOutcome::LockAborted
            }
        }
    }

    fn tick_clipboard(&mut self) {
        if !self.clipboard.is_armed() {
            return;
        }
        if self.clipboard.tick() && self.host.clipboard.clear_if_owner() {
            info!("Clipboard cleared");
        }
        self.notify_ui();
    }

    /// Arms the clipboard auto-clear countdown after a copy.
    ///
    /// No-op when `clipboard_clear_secs` is disabled.
    pub fn start_clipboard_countdown(&mut self) {
        if let Some(secs) = self.config.clipboard_clear_secs {
            self.clipboard.start(secs);
            self.notify_ui();
        }
    }

    /// Locks every open document under the configured policy.
    ///
    /// # Errors
    /// [`SessionError::Lock`]; nothing is locked on error.
    pub fn lock_all(&mut self) -> Result<LockOutcome, SessionError> {
        self.run_lock(None)
    }

    /// Locks a single document.
    ///
    /// # Errors
    /// [`SessionError::Lock`]; the document is untouched on error.
    pub fn lock_document(&mut self, doc: DocumentId) -> Result<LockOutcome, SessionError> {
        self.run_lock(Some(doc))
    }

    /// Locks `doc` when open, unlocks it when locked.
    ///
    /// # Errors
    /// Errors of [`SessionCoordinator::lock_document`] and
    /// [`SessionCoordinator::unlock`]; [`SessionError::NotOpen`] for an
    /// empty slot.
    pub fn toggle_lock(&mut self, doc: DocumentId) -> Result<(), SessionError> {
        let state = self
            .registry
            .get(doc)
            .map(|document| document.state())
            .ok_or(SessionError::UnknownDocument(doc))?;
        match state {
            DocumentState::Open => self.lock_document(doc).map(|_| ()),
            DocumentState::Locked => self.unlock(doc),
            DocumentState::Empty => Err(SessionError::NotOpen(doc)),
        }
    }

    /// Host reports the main window was minimized.
    ///
    /// # Errors
    /// Lock errors when `lock_on_minimize` is set.
    pub fn on_window_minimized(&mut self) -> Result<Option<LockOutcome>, SessionError> {
        if !self.config.lock_on_minimize {
            return Ok(None);
        }
        self.run_lock(None).map(Some)
    }

    /// Host reports the main window was restored from minimized.
    ///
    /// Starts unlock of the active document when minimize locking is on.
    ///
    /// # Errors
    /// Unlock errors, including [`SessionError::Lock`] for a cancelled prompt.
    pub fn on_window_restored(&mut self) -> Result<(), SessionError> {
        if !self.config.lock_on_minimize {
            return Ok(());
        }
        let locked_active = self
            .registry
            .active()
            .filter(|document| document.is_locked())
            .map(|document| document.id());
        match locked_active {
            Some(doc) => self.unlock(doc),
            None => Ok(()),
        }
    }

    /// Reacts to an OS session notification.
    ///
    /// `SessionEnding` always locks; `UnlockPending` never does; the rest
    /// follow their `lock_on_*` flag.
    ///
    /// # Errors
    /// Lock errors from the triggered `lock_all`.
    pub fn on_session_signal(
        &mut self,
        signal: SessionSignal,
    ) -> Result<Option<LockOutcome>, SessionError> {
        let triggers = match signal {
            SessionSignal::Lock => self.config.lock_on_session_lock,
            SessionSignal::Suspend => self.config.lock_on_suspend,
            SessionSignal::UserSwitch => self.config.lock_on_user_switch,
            SessionSignal::SessionEnding => true,
            SessionSignal::UnlockPending => false,
        };
        debug!(signal = ?signal, triggers, "Session signal received");
        if !triggers {
            return Ok(None);
        }
        self.run_lock(None).map(Some)
    }

    fn run_lock(&mut self, target: Option<DocumentId>) -> Result<LockOutcome, SessionError> {
        let policy = self.config.lock_policy();
        let mut hooks = CoordinatorHooks {
            saver: &self.saver,
            conflicts: self.host.conflicts.as_mut(),
            resolver: &self.resolver,
            views: &mut self.views,
            shown: &mut self.shown,
            saved: Vec::new(),
        };
        let surfaces = self.host.surfaces.as_mut();
        let result = match target {
            Some(doc) => {
                self.lock
                    .lock_document(&mut self.registry, doc, surfaces, &mut hooks, policy)
            }
            None => self
                .lock
                .lock_all(&mut self.registry, surfaces, &mut hooks, policy),
        };
        let saved = std::mem::take(&mut hooks.saved);

        for doc in saved {
            self.emit(SessionEvent::DocumentSaved { doc, success: true });
        }
        match result {
            Ok(LockOutcome::Locked(docs)) => {
                for &doc in &docs {
                    self.emit(SessionEvent::DocumentLocked(doc));
                }
                self.notify_ui();
                Ok(LockOutcome::Locked(docs))
            }
            Ok(LockOutcome::ExitRequested) => {
                self.exit_requested = true;
                self.emit(SessionEvent::ExitRequested);
                Ok(LockOutcome::ExitRequested)
            }
            Ok(LockOutcome::NothingToLock) => Ok(LockOutcome::NothingToLock),
            Err(error) => {
                if let LockError::SaveFailed { doc, .. } = &error {
                    let doc = *doc;
                    self.emit(SessionEvent::DocumentSaved {
                        doc,
                        success: false,
                    });
                }
                Err(SessionError::Lock(error))
            }
        }
    }

    /// Reopens a locked document through the credential prompt and restores
    /// its view position.
    ///
    /// # Errors
    /// [`SessionError::Lock`] for unknown, not-locked, cancelled or failed
    /// unlocks; the document stays locked.
    pub fn unlock(&mut self, doc: DocumentId) -> Result<(), SessionError> {
        let max_attempts = self.config.max_credential_attempts;
        let view = self.blocking(|this| {
            this.lock.unlock_with_prompt(
                &mut this.registry,
                doc,
                this.host.prompt.as_mut(),
                max_attempts,
            )
        })?;

        self.views.insert(doc, view);
        self.emit(SessionEvent::DocumentUnlocked(doc));
        self.refresh_view(doc);
        self.notify_ui();
        Ok(())
    }

    /// Opens the store at `locator`, or activates the slot already holding it.
    ///
    /// Without `credentials`, or when they are rejected, the credential
    /// prompt is asked up to `max_credential_attempts` times in total.
    ///
    /// # Errors
    /// - [`SessionError::Cancelled`] when the prompt is dismissed.
    /// - [`SessionError::Open`] for engine failures.
    pub fn open(
        &mut self,
        locator: Locator,
        credentials: Option<CompositeKey>,
    ) -> Result<DocumentId, SessionError> {
        if let Some(existing) = self.registry.find_by_locator(&locator) {
            debug!(doc = %existing, locator = %locator, "Store already in registry");
            self.set_active(existing)?;
            let locked = self
                .registry
                .get(existing)
                .is_some_and(|document| document.is_locked());
            if locked {
                self.unlock(existing)?;
            }
            return Ok(existing);
        }

        let doc = self.blocking(|this| this.open_new(locator, credentials))?;
        self.emit(SessionEvent::DocumentOpened(doc));
        self.flush_selection_change();
        self.refresh_view(doc);
        self.notify_ui();
        Ok(doc)
    }

    fn open_new(
        &mut self,
        locator: Locator,
        credentials: Option<CompositeKey>,
    ) -> Result<DocumentId, SessionError> {
        let max_attempts = self.config.max_credential_attempts.max(1);
        let mut attempt = 1;
        let mut key = match credentials {
            Some(key) => key,
            None => self
                .host
                .prompt
                .request(&locator, attempt)
                .ok_or(SessionError::Cancelled)?,
        };

        let opened = loop {
            match self.engine.open(&locator, &key) {
                Ok(opened) => break opened,
                Err(error) if error.is_credential_error() && attempt < max_attempts => {
                    warn!(locator = %locator, attempt, "Open rejected credentials");
                    attempt += 1;
                    key = self
                        .host
                        .prompt
                        .request(&locator, attempt)
                        .ok_or(SessionError::Cancelled)?;
                }
                Err(error) => return Err(SessionError::Open(error)),
            }
        };

        let doc = self.registry.create_new();
        let document = self
            .registry
            .get_mut(doc)
            .ok_or(SessionError::UnknownDocument(doc))?;
        info!(doc = %doc, locator = %locator, "Document opened");
        document.populate(locator, key, opened.store, Some(opened.hash));
        Ok(doc)
    }

    /// Creates an empty store named `name` and saves it at `locator`.
    ///
    /// # Errors
    /// [`SessionError::Save`] when the initial write fails; no slot is left
    /// behind.
    pub fn new_document(
        &mut self,
        locator: Locator,
        credentials: CompositeKey,
        name: &str,
    ) -> Result<DocumentId, SessionError> {
        let doc = self.registry.create_new();
        if let Some(document) = self.registry.get_mut(doc) {
            document.populate(
                Locator::empty(),
                credentials,
                Store::with_root(name, NEW_ROOT_GROUP_ID),
                None,
            );
        }

        let saved = self.blocking(|this| this.saver.save_as(&mut this.registry, doc, locator));
        if let Err(error) = saved {
            warn!(doc = %doc, error = %error, "Initial save of new document failed");
            if let Some(store) = self.registry.get_mut(doc).and_then(|document| document.release())
            {
                self.engine.close(store);
            }
            self.registry.close(doc, true)?;
            self.registry.take_selection_change();
            return Err(SessionError::Save(error));
        }

        self.emit(SessionEvent::DocumentOpened(doc));
        self.flush_selection_change();
        self.refresh_view(doc);
        self.notify_ui();
        Ok(doc)
    }

    /// Saves `doc` to its locator with the conflict check.
    ///
    /// # Errors
    /// [`SessionError::Save`]; see [`SaveError`].
    pub fn save(&mut self, doc: DocumentId) -> Result<SaveReport, SessionError> {
        self.save_with(doc, SaveOptions::default())
    }

    /// Saves `doc` with explicit options.
    ///
    /// # Errors
    /// [`SessionError::Save`]; see [`SaveError`].
    pub fn save_with(
        &mut self,
        doc: DocumentId,
        options: SaveOptions,
    ) -> Result<SaveReport, SessionError> {
        let result = self.blocking(|this| {
            this.saver.save(
                &mut this.registry,
                doc,
                this.host.conflicts.as_mut(),
                options,
            )
        });
        self.finish_save(doc, result)
    }

    /// Saves `doc` under a new locator.
    ///
    /// # Errors
    /// [`SessionError::Save`]; see [`SaveError`].
    pub fn save_as(
        &mut self,
        doc: DocumentId,
        new_locator: Locator,
    ) -> Result<SaveReport, SessionError> {
        let result =
            self.blocking(|this| this.saver.save_as(&mut this.registry, doc, new_locator));
        self.finish_save(doc, result)
    }

    fn finish_save(
        &mut self,
        doc: DocumentId,
        result: Result<SaveReport, SaveError>,
    ) -> Result<SaveReport, SessionError> {
        self.emit(SessionEvent::DocumentSaved {
            doc,
            success: result.is_ok(),
        });
        match result {
            Ok(report) => {
                if report.synchronized {
                    self.refresh_view(doc);
                }
                self.notify_ui();
                Ok(report)
            }
            Err(error) => {
                warn!(doc = %doc, error = %error, "Save failed");
                self.notify_ui();
                Err(SessionError::Save(error))
            }
        }
    }

    /// Closes `doc`, asking about unsaved changes.
    ///
    /// # Errors
    /// - [`SessionError::UnknownDocument`] for a foreign handle.
    /// - [`SessionError::Save`] when the save before close fails; the
    ///   document stays open.
    pub fn close(&mut self, doc: DocumentId) -> Result<CloseOutcome, SessionError> {
        let (modified, title) = {
            let document = self
                .registry
                .get(doc)
                .ok_or(SessionError::UnknownDocument(doc))?;
            (document.is_modified(), document.display_name())
        };

        if self.emit(SessionEvent::DocumentClosing { doc }) == EventVerdict::Veto {
            info!(doc = %doc, "Close vetoed by observer");
            return Ok(CloseOutcome::Cancelled);
        }

        if modified {
            let decision = if self.config.auto_save_on_close {
                CloseDecision::Save
            } else {
                self.host.close_decider.decide(doc, &title)
            };
            match decision {
                CloseDecision::Save => {
                    self.save(doc)?;
                }
                CloseDecision::Discard => {
                    warn!(doc = %doc, "Closing with unsaved changes discarded");
                }
                CloseDecision::Cancel => return Ok(CloseOutcome::Cancelled),
            }
        }

        self.drain_document(doc);
        self.views.remove(&doc);
        if let Some(store) = self
            .registry
            .get_mut(doc)
            .and_then(|document| document.release())
        {
            self.engine.close(store);
        }
        self.registry.close(doc, false)?;
        info!(doc = %doc, "Document closed");

        self.emit(SessionEvent::DocumentClosed(doc));
        if let Some(active) = self.flush_selection_change() {
            self.refresh_view(active);
        }
        self.notify_ui();
        Ok(CloseOutcome::Closed)
    }

    /// Moves the active pointer and lists the new document.
    ///
    /// # Errors
    /// [`SessionError::Registry`] for a foreign handle.
    pub fn set_active(&mut self, doc: DocumentId) -> Result<(), SessionError> {
        self.registry.set_active(doc)?;
        if self.flush_selection_change().is_some() {
            self.refresh_view(doc);
            self.notify_ui();
        }
        Ok(())
    }

    /// Lists `group_id` of the active document and queues cell expansion.
    ///
    /// # Returns
    /// The new row-set generation.
    ///
    /// # Errors
    /// - [`SessionError::NotOpen`] when the active document is not open.
    /// - [`SessionError::NoActiveDocument`] when nothing is active.
    /// - [`SessionError::Resolver`] after shutdown.
    pub fn show_group(&mut self, group_id: &str) -> Result<u64, SessionError> {
        let doc = self
            .registry
            .active_id()
            .ok_or(SessionError::NoActiveDocument)?;
        let source = {
            let document = self
                .registry
                .get(doc)
                .ok_or(SessionError::UnknownDocument(doc))?;
            let store = document.content().ok_or(SessionError::NotOpen(doc))?;
            RowSource::new(Arc::clone(store), document.locator().clone())
        };

        let generation = self.resolver.populate(&source, group_id, &LIST_COLUMNS)?;
        self.shown = Some(ShownGroup {
            doc,
            group: group_id.to_string(),
        });
        self.views.entry(doc).or_default().selected_group = Some(group_id.to_string());
        debug!(doc = %doc, generation, "Group listed");
        Ok(generation)
    }

    /// Records the scroll and selection the UI shows for `doc`.
    pub fn update_view_state(&mut self, doc: DocumentId, view: ViewState) {
        self.views.insert(doc, view);
    }

    /// Mutates the content of an open document and marks it modified.
    ///
    /// The listed rows are rebuilt when `doc` is shown.
    ///
    /// # Errors
    /// - [`SessionError::UnknownDocument`] for a foreign handle.
    /// - [`SessionError::Core`] when the document is not open.
    pub fn edit_document<R>(
        &mut self,
        doc: DocumentId,
        edit: impl FnOnce(&mut Store) -> R,
    ) -> Result<R, SessionError> {
        let result = self
            .registry
            .get_mut(doc)
            .ok_or(SessionError::UnknownDocument(doc))?
            .edit_content(edit)?;
        self.refresh_view(doc);
        self.notify_ui();
        Ok(result)
    }

    /// Applies finished cell expansions.
    ///
    /// # Returns
    /// Number of cells written.
    pub fn apply_resolved(&self) -> usize {
        self.resolver.apply_ready()
    }

    /// Blocks until every queued cell expansion finished and applies them.
    pub fn drain_resolver(&self) -> usize {
        self.resolver.drain()
    }

    /// Flat projection of the visible state.
    pub fn ui_snapshot(&self) -> UiSnapshot {
        let documents = self
            .registry
            .documents()
            .map(|document| {
                let mut title = document.display_name();
                if document.is_modified() {
                    title.push('*');
                }
                DocumentSummary {
                    id: document.id(),
                    title,
                    state: document.state(),
                    modified: document.is_modified(),
                }
            })
            .collect();

        let lock_command = match self.registry.active().map(|document| document.state()) {
            Some(DocumentState::Open) => LockCommand::Lock,
            Some(DocumentState::Locked) => LockCommand::Unlock,
            _ => LockCommand::Unavailable,
        };

        UiSnapshot {
            documents,
            active: self.registry.active_id(),
            lock_command,
            clipboard_percent: self.clipboard.percent_remaining(),
            interaction_blocked: self.blocked > 0,
        }
    }

    /// Closes every document and stops the resolver.
    ///
    /// Nothing is locked. The clipboard is cleared when
    /// `clipboard_clear_on_exit` is set.
    ///
    /// # Errors
    /// Errors of [`SessionCoordinator::close`]; the session keeps running.
    pub fn shutdown(&mut self) -> Result<ShutdownOutcome, SessionError> {
        self.resolver.cancel_pending();
        self.resolver.drain();

        let targets: Vec<DocumentId> = self
            .registry
            .documents()
            .filter(|document| document.state() != DocumentState::Empty)
            .map(|document| document.id())
            .collect();
        for doc in targets {
            if self.close(doc)? == CloseOutcome::Cancelled {
                info!(doc = %doc, "Shutdown cancelled");
                return Ok(ShutdownOutcome::Cancelled(doc));
            }
        }

        self.clipboard.disarm();
        if self.config.clipboard_clear_on_exit && self.host.clipboard.clear_if_owner() {
            info!("Clipboard cleared on exit");
        }
        self.resolver.shutdown();
        info!("Session coordinator stopped");
        Ok(ShutdownOutcome::Completed)
    }

    fn blocking<R>(&mut self, operation: impl FnOnce(&mut Self) -> R) -> R {
        self.blocked += 1;
        self.notify_ui();
        let result = operation(self);
        self.blocked = self.blocked.saturating_sub(1);
        self.notify_ui();
        result
    }

    fn refresh_view(&mut self, doc: DocumentId) {
        let group = {
            let Some(document) = self.registry.get(doc) else {
                return;
            };
            if self.registry.active_id() != Some(doc) {
                return;
            }
            let Some(store) = document.content() else {
                return;
            };
            let remembered = self
                .views
                .get(&doc)
                .and_then(|view| view.selected_group.as_deref())
                .filter(|group| store.group(group).is_some());
            match remembered.or_else(|| store.root().map(|root| root.id.as_str())) {
                Some(group) => group.to_string(),
                None => return,
            }
        };
        if let Err(error) = self.show_group(&group) {
            warn!(doc = %doc, error = %error, "Failed to list group");
        }
    }

    fn drain_document(&mut self, doc: DocumentId) {
        drain_document_jobs(&self.resolver, &mut self.shown, doc);
    }

    fn flush_selection_change(&mut self) -> Option<DocumentId> {
        let doc = self.registry.take_selection_change()?;
        self.emit(SessionEvent::ActiveDocumentChanged(doc));
        Some(doc)
    }

    fn notify_ui(&mut self) {
        let snapshot = self.ui_snapshot();
        self.emit(SessionEvent::UiStateChanged(snapshot));
    }

    fn emit(&mut self, event: SessionEvent) -> EventVerdict {
        let mut verdict = EventVerdict::Proceed;
        for observer in &mut self.observers {
            if observer.on_event(&event) == EventVerdict::Veto {
                verdict = EventVerdict::Veto;
            }
        }
        verdict
    }
}

impl std::fmt::Debug for SessionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCoordinator")
            .field("documents", &self.registry.len())
            .field("shown", &self.shown)
            .field("blocked", &self.blocked)
            .field("exit_requested", &self.exit_requested)
            .finish_non_exhaustive()
    }
}

/// Waits until no worker holds a snapshot of `doc`. Queued jobs of a
/// document that is no longer shown are stale and finish without expanding.
fn drain_document_jobs(resolver: &FieldResolver, shown: &mut Option<ShownGroup>, doc: DocumentId) {
    let is_shown = shown.as_ref().is_some_and(|shown| shown.doc == doc);
    if is_shown {
        resolver.cancel_pending();
    }
    resolver.drain();
    if is_shown {
        resolver.rows().clear();
        *shown = None;
    }
}

struct CoordinatorHooks<'a> {
    saver: &'a SaveCoordinator,
    conflicts: &'a mut dyn ConflictResolver,
    resolver: &'a FieldResolver,
    views: &'a mut HashMap<DocumentId, ViewState>,
    shown: &'a mut Option<ShownGroup>,
    saved: Vec<DocumentId>,
}

impl LockHooks for CoordinatorHooks<'_> {
    fn save_before_lock(
        &mut self,
        registry: &mut DocumentRegistry,
        doc: DocumentId,
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        self.saver
            .save(registry, doc, self.conflicts, SaveOptions::default())?;
        self.saved.push(doc);
        Ok(())
    }

    fn pending_view(&mut self, doc: DocumentId) -> Option<ViewState> {
        self.views.remove(&doc)
    }

    fn drain(&mut self, doc: DocumentId) {
        drain_document_jobs(self.resolver, self.shown, doc);
    }
}

/// Coordinator error type.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Configuration rejected.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    /// Registry pointer error.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    /// Registry close rejected.
    #[error("close error: {0}")]
    Close(#[from] CloseError),
    /// Lock or unlock failed.
    #[error("lock error: {0}")]
    Lock(#[from] LockError),
    /// Save failed.
    #[error("save error: {0}")]
    Save(#[from] SaveError),
    /// Opening a store failed.
    #[error("open error: {0}")]
    Open(#[from] OpenError),
    /// Resolver pool failure.
    #[error("resolver error: {0}")]
    Resolver(#[from] ResolverError),
    /// Content access failed.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    /// Handle does not refer to a registry slot.
    #[error("unknown document {0}")]
    UnknownDocument(DocumentId),
    /// Document has no open content.
    #[error("document {0} is not open")]
    NotOpen(DocumentId),
    /// The registry has no active slot.
    #[error("no active document")]
    NoActiveDocument,
    /// The user dismissed a prompt.
    #[error("operation cancelled")]
    Cancelled,
}

impl SessionError {
    /// `true` when the user cancelled rather than something failing.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Lock(LockError::Cancelled)
        )
    }
}
