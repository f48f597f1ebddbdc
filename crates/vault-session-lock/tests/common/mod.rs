//! Shared fixtures for lock integration tests.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::Mutex;

use vault_session_core::{
    CompositeKey, ContentHash, DocumentId, DocumentRegistry, Entry, Locator, Store, ViewState,
    standard_fields,
};
use vault_session_engine::{CredentialPrompt, DatabaseEngine, EngineIoError, OpenError, OpenedStore};
use vault_session_lock::{LockHooks, ModalSurfaces};

/// In-memory engine double keyed by locator text.
#[derive(Default)]
pub struct MemoryEngine {
    stores: Mutex<HashMap<String, (String, Store)>>,
    closed: Mutex<usize>,
}

#[allow(dead_code)]
impl MemoryEngine {
    /// Seeds a store protected by `password`.
    pub fn insert(&self, locator: &str, password: &str, store: Store) {
        self.stores
            .lock()
            .expect("stores lock")
            .insert(locator.to_string(), (password.to_string(), store));
    }

    /// Number of stores handed back through `close`.
    pub fn closed(&self) -> usize {
        *self.closed.lock().expect("closed lock")
    }
}

impl DatabaseEngine for MemoryEngine {
    fn open(&self, locator: &Locator, key: &CompositeKey) -> Result<OpenedStore, OpenError> {
        let stores = self.stores.lock().expect("stores lock");
        let (password, store) = stores
            .get(locator.as_str())
            .ok_or_else(|| OpenError::NotFound(locator.redacted()))?;
        if CompositeKey::from_password(password.as_str()).key_material() != key.key_material() {
            return Err(OpenError::InvalidCredentials);
        }
        Ok(OpenedStore {
            store: store.clone(),
            hash: ContentHash::of_bytes(locator.as_str().as_bytes()),
        })
    }

    fn save_as(
        &self,
        store: &Store,
        _key: &CompositeKey,
        locator: &Locator,
    ) -> Result<ContentHash, EngineIoError> {
        let mut stores = self.stores.lock().expect("stores lock");
        if let Some(slot) = stores.get_mut(locator.as_str()) {
            slot.1 = store.clone();
        }
        Ok(ContentHash::of_bytes(locator.as_str().as_bytes()))
    }

    fn close(&self, store: std::sync::Arc<Store>) {
        drop(store);
        *self.closed.lock().expect("closed lock") += 1;
    }

    fn hash_of(&self, locator: &Locator) -> Result<Option<ContentHash>, EngineIoError> {
        Ok(Some(ContentHash::of_bytes(locator.as_str().as_bytes())))
    }
}

/// Modal surfaces that can be told to refuse closing.
#[derive(Default)]
pub struct ScriptedSurfaces {
    /// When `true`, `close_all` refuses.
    pub blocked: bool,
    /// Number of `close_all` calls.
    pub close_calls: usize,
}

impl ModalSurfaces for ScriptedSurfaces {
    fn can_close_all(&self) -> bool {
        !self.blocked
    }

    fn close_all(&mut self) -> bool {
        self.close_calls += 1;
        !self.blocked
    }
}

/// Hooks that record every callback.
#[derive(Default)]
pub struct RecordingHooks {
    /// Documents saved before locking.
    pub saved: Vec<DocumentId>,
    /// Documents drained, in order.
    pub drained: Vec<DocumentId>,
    /// View positions returned from `pending_view`.
    pub views: HashMap<DocumentId, ViewState>,
    /// When set, saving this document fails.
    pub fail_save_for: Option<DocumentId>,
}

impl LockHooks for RecordingHooks {
    fn save_before_lock(
        &mut self,
        registry: &mut DocumentRegistry,
        doc: DocumentId,
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        if self.fail_save_for == Some(doc) {
            return Err("disk full".into());
        }
        let document = registry.get_mut(doc).ok_or("unknown document")?;
        let locator = document.locator().clone();
        document.mark_saved(locator, ContentHash::of_bytes(b"saved"));
        self.saved.push(doc);
        Ok(())
    }

    fn pending_view(&mut self, doc: DocumentId) -> Option<ViewState> {
        self.views.remove(&doc)
    }

    fn drain(&mut self, doc: DocumentId) {
        self.drained.push(doc);
    }
}

/// Prompt answering from a fixed list, then cancelling.
#[allow(dead_code)]
pub struct ScriptedPrompt {
    /// Remaining answers, first is used first.
    pub answers: Vec<Option<String>>,
    /// Attempt numbers seen.
    pub attempts: Vec<u32>,
}

#[allow(dead_code)]
impl ScriptedPrompt {
    /// Creates a prompt returning `answers` in order.
    pub fn new(answers: &[Option<&str>]) -> Self {
        Self {
            answers: answers.iter().map(|answer| answer.map(str::to_string)).collect(),
            attempts: Vec::new(),
        }
    }
}

impl CredentialPrompt for ScriptedPrompt {
    fn request(&mut self, _locator: &Locator, attempt: u32) -> Option<CompositeKey> {
        self.attempts.push(attempt);
        if self.answers.is_empty() {
            return None;
        }
        self.answers.remove(0).map(CompositeKey::from_password)
    }
}

/// Store with one group and one entry.
pub fn fixture_store(name: &str) -> Store {
    let mut store = Store::with_root(name, "root");
    store.add_group("g1", "Internet", "root");
    store.add_entry(Entry::new("e1", "g1").with_field(standard_fields::TITLE, "Mail"));
    store
}

/// Opens `locator` into a fresh registry slot, seeding the engine.
pub fn open_document(
    registry: &mut DocumentRegistry,
    engine: &MemoryEngine,
    locator: &str,
    password: &str,
) -> DocumentId {
    engine.insert(locator, password, fixture_store(locator));
    let doc = registry.create_new();
    registry
        .get_mut(doc)
        .expect("new document should exist")
        .populate(
            Locator::new(locator),
            CompositeKey::from_password(password),
            fixture_store(locator),
            Some(ContentHash::of_bytes(locator.as_bytes())),
        );
    doc
}
