//! One registry slot and its Open/Locked lifecycle.

use std::sync::Arc;

use crate::{CompositeKey, ContentHash, CoreError, DocumentId, Locator, Store, ViewState};

/// Lifecycle state of one registry slot.
///
/// `Closed` is not represented: a closed document is no longer in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    /// Slot exists but holds neither content nor a locked locator.
    Empty,
    /// Content is decrypted and in memory.
    Open,
    /// Content was released; `locked_locator` remembers where to reopen.
    Locked,
}

/// Open-or-locked credential-protected workspace instance.
#[derive(Debug)]
pub struct Document {
    id: DocumentId,
    locator: Locator,
    credentials: Option<CompositeKey>,
    content: Option<Arc<Store>>,
    modified: bool,
    locked_locator: Locator,
    last_known_hash: Option<ContentHash>,
    view: ViewState,
}

impl Document {
    pub(crate) fn new(id: DocumentId) -> Self {
        Self {
            id,
            locator: Locator::empty(),
            credentials: None,
            content: None,
            modified: false,
            locked_locator: Locator::empty(),
            last_known_hash: None,
            view: ViewState::default(),
        }
    }

    /// Returns the slot handle.
    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Returns the backing-store locator (empty for never-saved content).
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Returns the locator remembered while locked; empty otherwise.
    pub fn locked_locator(&self) -> &Locator {
        &self.locked_locator
    }

    /// Returns current lifecycle state.
    pub fn state(&self) -> DocumentState {
        if self.content.is_some() {
            DocumentState::Open
        } else if !self.locked_locator.is_empty() {
            DocumentState::Locked
        } else {
            DocumentState::Empty
        }
    }

    /// Returns `true` while content is in memory.
    pub fn is_open(&self) -> bool {
        self.content.is_some()
    }

    /// Returns `true` while the slot is locked.
    pub fn is_locked(&self) -> bool {
        !self.locked_locator.is_empty()
    }

    /// Returns `true` when in-memory content differs from the last save.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Hash of the backing store as of the last read or write.
    pub fn last_known_hash(&self) -> Option<ContentHash> {
        self.last_known_hash
    }

    /// View position flushed at the last lock.
    pub fn view_state(&self) -> &ViewState {
        &self.view
    }

    /// Credentials of the open content.
    pub fn credentials(&self) -> Option<&CompositeKey> {
        self.credentials.as_ref()
    }

    /// Shared snapshot of the open content.
    pub fn content(&self) -> Option<&Arc<Store>> {
        self.content.as_ref()
    }

    /// Title shown in tabs: store name, else locator file name.
    pub fn display_name(&self) -> String {
        let locator = if self.is_locked() {
            &self.locked_locator
        } else {
            &self.locator
        };
        match &self.content {
            Some(store) if !store.name.is_empty() => store.name.clone(),
            _ if !locator.is_empty() => locator.file_name().to_string(),
            _ => String::new(),
        }
    }

    /// Installs freshly opened (or newly created) content.
    ///
    /// Clears any locked state; the slot becomes `Open` and unmodified.
    pub fn populate(
        &mut self,
        locator: Locator,
        credentials: CompositeKey,
        store: Store,
        hash: Option<ContentHash>,
    ) {
        self.locator = locator;
        self.credentials = Some(credentials);
        self.content = Some(Arc::new(store));
        self.modified = false;
        self.locked_locator = Locator::empty();
        self.last_known_hash = hash;
    }

    /// Applies a mutation to the open content and marks the document modified.
    ///
    /// Outstanding snapshots keep the previous version; the mutation works on
    /// a private copy in that case.
    ///
    /// # Errors
    /// Returns [`CoreError::ContentUnavailable`] when the slot is not open.
    pub fn edit_content<R>(&mut self, edit: impl FnOnce(&mut Store) -> R) -> Result<R, CoreError> {
        let store = self
            .content
            .as_mut()
            .ok_or(CoreError::ContentUnavailable(self.id))?;
        let result = edit(Arc::make_mut(store));
        self.modified = true;
        Ok(result)
    }

    /// Replaces open content after a merge, keeping the modified flag set.
    ///
    /// # Errors
    /// Returns [`CoreError::ContentUnavailable`] when the slot is not open.
    pub fn replace_content(&mut self, store: Store) -> Result<(), CoreError> {
        if self.content.is_none() {
            return Err(CoreError::ContentUnavailable(self.id));
        }
        self.content = Some(Arc::new(store));
        self.modified = true;
        Ok(())
    }

    /// Flags the content as modified without touching it.
    pub fn mark_modified(&mut self) {
        if self.content.is_some() {
            self.modified = true;
        }
    }

    /// Records a successful write to `locator` with verified `hash`.
    pub fn mark_saved(&mut self, locator: Locator, hash: ContentHash) {
        self.locator = locator;
        self.last_known_hash = Some(hash);
        self.modified = false;
    }

    /// Transitions `Open -> Locked`.
    ///
    /// Stores `view` and remembers the locator; returns the released content
    /// so the caller can hand it back to the engine. Credentials are dropped.
    pub fn lock(&mut self, view: ViewState) -> Option<Arc<Store>> {
        let store = self.content.take()?;
        self.credentials = None;
        self.modified = false;
        self.view = view;
        self.locked_locator = self.locator.clone();
        Some(store)
    }

    /// Transitions `Open -> Empty` (close without keeping the slot locked).
    pub fn release(&mut self) -> Option<Arc<Store>> {
        let store = self.content.take()?;
        self.credentials = None;
        self.modified = false;
        Some(store)
    }

    /// Transitions `Locked -> Open` with reopened content.
    ///
    /// Returns the view state flushed at lock time.
    pub fn unlock(
        &mut self,
        credentials: CompositeKey,
        store: Store,
        hash: Option<ContentHash>,
    ) -> ViewState {
        let locator = std::mem::take(&mut self.locked_locator);
        self.populate(locator, credentials, store, hash);
        std::mem::take(&mut self.view)
    }
}
