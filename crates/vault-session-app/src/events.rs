//! Typed session events, observers and the UI state snapshot.

use std::sync::{Arc, Mutex, PoisonError};

use vault_session_core::{DocumentId, DocumentState};

/// Notification emitted by the coordinator after a state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A document was opened or created.
    DocumentOpened(DocumentId),
    /// A save finished.
    DocumentSaved {
        /// Saved document.
        doc: DocumentId,
        /// `false` when the save failed or was cancelled.
        success: bool,
    },
    /// A document is about to close; observers may veto.
    DocumentClosing {
        /// Closing document.
        doc: DocumentId,
    },
    /// A document left the registry.
    DocumentClosed(DocumentId),
    /// The active pointer moved.
    ActiveDocumentChanged(DocumentId),
    /// A document moved to `Locked`.
    DocumentLocked(DocumentId),
    /// A document was reopened.
    DocumentUnlocked(DocumentId),
    /// Something visible changed.
    UiStateChanged(UiSnapshot),
    /// Policy asked the host to exit.
    ExitRequested,
}

/// Observer answer; only honoured for [`SessionEvent::DocumentClosing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventVerdict {
    /// Continue.
    #[default]
    Proceed,
    /// Cancel the pending operation.
    Veto,
}

/// Subscriber to coordinator events.
pub trait SessionObserver: Send {
    /// Handles one event.
    fn on_event(&mut self, event: &SessionEvent) -> EventVerdict;
}

/// Observer recording every event it sees.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the recorded events.
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drops recorded events.
    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl SessionObserver for EventLog {
    fn on_event(&mut self, event: &SessionEvent) -> EventVerdict {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        EventVerdict::Proceed
    }
}

/// Label of the lock/unlock toolbar command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockCommand {
    /// Active document is open.
    Lock,
    /// Active document is locked.
    Unlock,
    /// Nothing to lock or unlock.
    Unavailable,
}

/// One tab in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSummary {
    /// Slot handle.
    pub id: DocumentId,
    /// Tab title, with a `*` suffix when modified.
    pub title: String,
    /// Lifecycle state.
    pub state: DocumentState,
    /// Unsaved changes present.
    pub modified: bool,
}

/// Flat, secret-free projection for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiSnapshot {
    /// Tabs in registry order.
    pub documents: Vec<DocumentSummary>,
    /// Active slot.
    pub active: Option<DocumentId>,
    /// Lock command label for the active slot.
    pub lock_command: LockCommand,
    /// Clipboard countdown progress, `None` when disarmed.
    pub clipboard_percent: Option<u8>,
    /// A blocking operation is in progress.
    pub interaction_blocked: bool,
}
