//! Ordered document collection with a single active pointer.

use crate::{CloseError, Document, DocumentId, Locator, RegistryError};

/// Ordered sequence of documents (UI tab order) plus the active pointer.
///
/// The registry always keeps at least one slot; an empty placeholder slot is
/// recreated when the last document is removed. It never touches a backing
/// store.
#[derive(Debug)]
pub struct DocumentRegistry {
    documents: Vec<Document>,
    active: Option<DocumentId>,
    next_id: u64,
    selection_change: Option<DocumentId>,
}

impl DocumentRegistry {
    /// Creates a registry holding one empty, active placeholder slot.
    pub fn new() -> Self {
        let mut registry = Self {
            documents: Vec::new(),
            active: None,
            next_id: 1,
            selection_change: None,
        };
        let placeholder = registry.allocate();
        registry.active = Some(placeholder);
        registry
    }

    /// Allocates a new, not-yet-populated document and makes it active.
    ///
    /// A sole placeholder slot (neither open nor locked) is replaced instead of
    /// kept next to the new document.
    pub fn create_new(&mut self) -> DocumentId {
        if self.documents.len() == 1 {
            let sole = &self.documents[0];
            if !sole.is_open() && !sole.is_locked() {
                self.documents.clear();
            }
        }

        let id = self.allocate();
        self.select(id, false);
        id
    }

    /// Removes a document from the registry.
    ///
    /// The slot at the same position (or the new last slot) becomes active.
    /// `quiet` suppresses the active-selection change record.
    ///
    /// # Errors
    /// - [`CloseError::LastOpenDocument`] when `doc` is the sole remaining slot
    ///   and still open; callers release its content first.
    /// - [`CloseError::UnknownDocument`] when `doc` is not in the registry.
    pub fn close(&mut self, doc: DocumentId, quiet: bool) -> Result<(), CloseError> {
        let position = self
            .position(doc)
            .ok_or(CloseError::UnknownDocument(doc))?;

        if self.documents.len() == 1 && self.documents[position].is_open() {
            return Err(CloseError::LastOpenDocument(doc));
        }

        self.documents.remove(position);
        if self.documents.is_empty() {
            self.allocate();
        }

        // Invariant:
        // - The active pointer always refers to an element of `documents`.
        let next_position = position.min(self.documents.len() - 1);
        let next = self.documents[next_position].id();
        if self.active == Some(doc) || self.position_of_active().is_none() {
            self.select(next, quiet);
        }
        Ok(())
    }

    /// Finds the slot whose current or locked locator equals `locator`.
    pub fn find_by_locator(&self, locator: &Locator) -> Option<DocumentId> {
        if locator.is_empty() {
            return None;
        }
        self.documents
            .iter()
            .find(|doc| doc.locator() == locator || doc.locked_locator() == locator)
            .map(Document::id)
    }

    /// Moves the active pointer.
    ///
    /// # Errors
    /// Returns [`RegistryError::UnknownDocument`] when `doc` is not a slot.
    pub fn set_active(&mut self, doc: DocumentId) -> Result<(), RegistryError> {
        if self.position(doc).is_none() {
            return Err(RegistryError::UnknownDocument(doc));
        }
        self.select(doc, false);
        Ok(())
    }

    /// Returns the active slot handle.
    pub fn active_id(&self) -> Option<DocumentId> {
        self.active
    }

    /// Returns the active document.
    pub fn active(&self) -> Option<&Document> {
        self.active.and_then(|id| self.get(id))
    }

    /// Looks up a document.
    pub fn get(&self, doc: DocumentId) -> Option<&Document> {
        self.documents.iter().find(|candidate| candidate.id() == doc)
    }

    /// Looks up a document for mutation.
    pub fn get_mut(&mut self, doc: DocumentId) -> Option<&mut Document> {
        self.documents
            .iter_mut()
            .find(|candidate| candidate.id() == doc)
    }

    /// Iterates documents in tab order.
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }

    /// Handles of all open documents, in tab order.
    pub fn open_documents(&self) -> Vec<DocumentId> {
        self.documents
            .iter()
            .filter(|doc| doc.is_open())
            .map(Document::id)
            .collect()
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Takes the last recorded active-selection change, if any.
    pub fn take_selection_change(&mut self) -> Option<DocumentId> {
        self.selection_change.take()
    }

    fn allocate(&mut self) -> DocumentId {
        let id = DocumentId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.documents.push(Document::new(id));
        id
    }

    fn select(&mut self, doc: DocumentId, quiet: bool) {
        self.active = Some(doc);
        if !quiet {
            self.selection_change = Some(doc);
        }
    }

    fn position(&self, doc: DocumentId) -> Option<usize> {
        self.documents
            .iter()
            .position(|candidate| candidate.id() == doc)
    }

    fn position_of_active(&self) -> Option<usize> {
        self.active.and_then(|id| self.position(id))
    }
}

impl Default for DocumentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
