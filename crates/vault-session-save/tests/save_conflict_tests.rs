//! Integration tests for pre-write conflict detection and post-write
//! verification.

use std::path::Path;
use std::sync::Arc;

use vault_session_core::{
    CompositeKey, ContentHash, DocumentId, DocumentRegistry, Entry, Locator, Store,
    standard_fields,
};
use vault_session_engine::{DatabaseEngine, EngineIoError, JsonFileEngine, OpenError, OpenedStore};
use vault_session_save::{
    ConflictChoice, ConflictResolver, FixedChoice, SaveConflict, SaveCoordinator, SaveError,
    SaveOptions,
};

const PASSWORD: &str = "correct horse";

struct RecordingResolver {
    choice: ConflictChoice,
    seen: Vec<SaveConflict>,
}

impl ConflictResolver for RecordingResolver {
    fn resolve(&mut self, conflict: &SaveConflict) -> ConflictChoice {
        self.seen.push(conflict.clone());
        self.choice
    }
}

/// Engine whose post-write hash never matches what it wrote.
struct LyingEngine(JsonFileEngine);

impl DatabaseEngine for LyingEngine {
    fn open(&self, locator: &Locator, key: &CompositeKey) -> Result<OpenedStore, OpenError> {
        self.0.open(locator, key)
    }

    fn save_as(
        &self,
        store: &Store,
        key: &CompositeKey,
        locator: &Locator,
    ) -> Result<ContentHash, EngineIoError> {
        self.0.save_as(store, key, locator)
    }

    fn hash_of(&self, _locator: &Locator) -> Result<Option<ContentHash>, EngineIoError> {
        Ok(Some(ContentHash::of_bytes(b"something else")))
    }
}

fn base_store() -> Store {
    let mut store = Store::with_root("Vault", "root");
    store.add_entry(Entry::new("e1", "root").with_field(standard_fields::TITLE, "Mail"));
    store
}

fn locator_in(dir: &Path) -> Locator {
    Locator::new(dir.join("vault.json").to_string_lossy().to_string())
}

/// Writes the base store to disk and opens it into a registry slot.
fn opened_document(engine: &JsonFileEngine, locator: &Locator) -> (DocumentRegistry, DocumentId) {
    let key = CompositeKey::from_password(PASSWORD);
    engine
        .save_as(&base_store(), &key, locator)
        .expect("seed save should succeed");
    let opened = engine.open(locator, &key).expect("seed open should succeed");

    let mut registry = DocumentRegistry::new();
    let doc = registry.create_new();
    registry
        .get_mut(doc)
        .expect("new document should exist")
        .populate(locator.clone(), key, opened.store, Some(opened.hash));
    (registry, doc)
}

fn modify_externally(engine: &JsonFileEngine, locator: &Locator) -> ContentHash {
    let mut remote = base_store();
    remote.add_entry(Entry::new("e-remote", "root").with_field(standard_fields::TITLE, "Bank"));
    engine
        .save_as(&remote, &CompositeKey::from_password(PASSWORD), locator)
        .expect("external write should succeed")
}

fn edit(registry: &mut DocumentRegistry, doc: DocumentId) {
    registry
        .get_mut(doc)
        .expect("document should exist")
        .edit_content(|store| {
            store.add_entry(Entry::new("e-local", "root").with_field(standard_fields::TITLE, "Shop"))
        })
        .expect("document should be open");
}

#[test]
fn save_conflict_tests_unchanged_store_saves_and_updates_hash() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let locator = locator_in(dir.path());
    let engine = Arc::new(JsonFileEngine::new());
    let (mut registry, doc) = opened_document(&engine, &locator);
    edit(&mut registry, doc);

    let mut resolver = RecordingResolver {
        choice: ConflictChoice::Cancel,
        seen: Vec::new(),
    };
    let report = SaveCoordinator::new(engine.clone())
        .save(&mut registry, doc, &mut resolver, SaveOptions::default())
        .expect("save should succeed");

    assert!(resolver.seen.is_empty());
    let document = registry.get(doc).expect("document should exist");
    assert!(!document.is_modified());
    assert_eq!(document.last_known_hash(), Some(report.hash));
    assert_eq!(engine.hash_of(&locator).expect("hash readable"), Some(report.hash));
}

#[test]
fn save_conflict_tests_external_change_is_surfaced_and_cancel_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let locator = locator_in(dir.path());
    let engine = Arc::new(JsonFileEngine::new());
    let (mut registry, doc) = opened_document(&engine, &locator);
    let h0 = registry.get(doc).and_then(|d| d.last_known_hash());
    edit(&mut registry, doc);
    let h1 = modify_externally(&engine, &locator);

    let mut resolver = RecordingResolver {
        choice: ConflictChoice::Cancel,
        seen: Vec::new(),
    };
    let error = SaveCoordinator::new(engine.clone())
        .save(&mut registry, doc, &mut resolver, SaveOptions::default())
        .expect_err("cancel should abort");

    assert!(matches!(
        error,
        SaveError::Conflict { expected, actual } if expected == h0 && actual == Some(h1)
    ));
    assert_eq!(resolver.seen.len(), 1);
    assert_eq!(engine.hash_of(&locator).expect("hash readable"), Some(h1));
    assert!(registry.get(doc).expect("document").is_modified());
}

#[test]
fn save_conflict_tests_overwrite_verifies_written_hash() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let locator = locator_in(dir.path());
    let engine = Arc::new(JsonFileEngine::new());
    let (mut registry, doc) = opened_document(&engine, &locator);
    edit(&mut registry, doc);
    let h1 = modify_externally(&engine, &locator);

    let report = SaveCoordinator::new(engine.clone())
        .save(
            &mut registry,
            doc,
            &mut FixedChoice(ConflictChoice::Overwrite),
            SaveOptions::default(),
        )
        .expect("overwrite should succeed");

    assert_ne!(report.hash, h1);
    assert!(!report.synchronized);
    assert_eq!(engine.hash_of(&locator).expect("hash readable"), Some(report.hash));
    let reopened = engine
        .open(&locator, &CompositeKey::from_password(PASSWORD))
        .expect("reopen should succeed");
    assert!(reopened.store.entry("e-local").is_some());
    assert!(reopened.store.entry("e-remote").is_none());
}

#[test]
fn save_conflict_tests_synchronize_merges_remote_changes_before_writing() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let locator = locator_in(dir.path());
    let engine = Arc::new(JsonFileEngine::new());
    let (mut registry, doc) = opened_document(&engine, &locator);
    edit(&mut registry, doc);
    modify_externally(&engine, &locator);

    let report = SaveCoordinator::new(engine.clone())
        .save(
            &mut registry,
            doc,
            &mut FixedChoice(ConflictChoice::Synchronize),
            SaveOptions::default(),
        )
        .expect("synchronize should succeed");

    assert!(report.synchronized);
    let content = registry
        .get(doc)
        .and_then(|document| document.content().cloned())
        .expect("document should stay open");
    assert!(content.entry("e-local").is_some());
    assert!(content.entry("e-remote").is_some());
    let reopened = engine
        .open(&locator, &CompositeKey::from_password(PASSWORD))
        .expect("reopen should succeed");
    assert!(reopened.store.entry("e-remote").is_some());
}

#[test]
fn save_conflict_tests_forced_save_skips_conflict_check() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let locator = locator_in(dir.path());
    let engine = Arc::new(JsonFileEngine::new());
    let (mut registry, doc) = opened_document(&engine, &locator);
    modify_externally(&engine, &locator);

    let mut resolver = RecordingResolver {
        choice: ConflictChoice::Cancel,
        seen: Vec::new(),
    };
    SaveCoordinator::new(engine.clone())
        .save(&mut registry, doc, &mut resolver, SaveOptions { force: true })
        .expect("forced save should succeed");
    assert!(resolver.seen.is_empty());
}

#[test]
fn save_conflict_tests_verification_mismatch_is_reported_not_retried() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let locator = locator_in(dir.path());
    let json = JsonFileEngine::new();
    let (mut registry, doc) = opened_document(&json, &locator);
    edit(&mut registry, doc);
    let before = registry.get(doc).and_then(|d| d.last_known_hash());

    let error = SaveCoordinator::new(Arc::new(LyingEngine(json)))
        .save(
            &mut registry,
            doc,
            &mut FixedChoice(ConflictChoice::Overwrite),
            SaveOptions::default(),
        )
        .expect_err("verification should fail");

    assert!(matches!(error, SaveError::VerificationFailed { .. }));
    let document = registry.get(doc).expect("document should exist");
    assert!(document.is_modified());
    assert_eq!(document.last_known_hash(), before);
}

#[test]
fn save_conflict_tests_save_as_moves_document_locator() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let locator = locator_in(dir.path());
    let engine = Arc::new(JsonFileEngine::new());
    let (mut registry, doc) = opened_document(&engine, &locator);
    let target = Locator::new(dir.path().join("copy.json").to_string_lossy().to_string());

    let report = SaveCoordinator::new(engine.clone())
        .save_as(&mut registry, doc, target.clone())
        .expect("save as should succeed");

    let document = registry.get(doc).expect("document should exist");
    assert_eq!(document.locator(), &target);
    assert_eq!(document.last_known_hash(), Some(report.hash));
}

#[test]
fn save_conflict_tests_locked_or_unsaved_documents_are_rejected() {
    let engine = Arc::new(JsonFileEngine::new());
    let coordinator = SaveCoordinator::new(engine);
    let mut registry = DocumentRegistry::new();
    let placeholder = registry.active_id().expect("placeholder should be active");
    assert!(matches!(
        coordinator.save(
            &mut registry,
            placeholder,
            &mut FixedChoice(ConflictChoice::Overwrite),
            SaveOptions::default()
        ),
        Err(SaveError::NotOpen(_))
    ));

    let fresh = registry.create_new();
    registry.get_mut(fresh).expect("fresh document").populate(
        Locator::empty(),
        CompositeKey::from_password(PASSWORD),
        base_store(),
        None,
    );
    assert!(matches!(
        coordinator.save(
            &mut registry,
            fresh,
            &mut FixedChoice(ConflictChoice::Overwrite),
            SaveOptions::default()
        ),
        Err(SaveError::NoLocator(_))
    ));
}
