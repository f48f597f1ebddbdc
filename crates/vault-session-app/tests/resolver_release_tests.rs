//! Integration tests for releasing content that background expansion still
//! references when a document that is not shown is locked or closed.

mod common;

use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use common::{PASSWORD, seed_store, test_config};
use tempfile::TempDir;
use vault_session_app::{CloseOutcome, HostServices, SessionCoordinator};
use vault_session_core::{
    CompositeKey, DocumentId, DocumentState, Entry, Locator, Store, standard_fields,
};
use vault_session_engine::{
    DatabaseEngine, ExpandContext, ExpandError, JsonFileEngine, PlaceholderCompiler, SprCompiler,
};
use vault_session_lock::LockOutcome;

/// Expands like [`SprCompiler`] after a delay so jobs stay queued.
struct SlowCompiler;

impl PlaceholderCompiler for SlowCompiler {
    fn expand(&self, template: &str, ctx: &ExpandContext) -> Result<String, ExpandError> {
        thread::sleep(Duration::from_millis(100));
        SprCompiler::new().expand(template, ctx)
    }
}

fn slow_session() -> SessionCoordinator {
    SessionCoordinator::new(
        test_config(),
        Arc::new(JsonFileEngine::new()),
        Arc::new(SlowCompiler),
        HostServices::headless(),
    )
    .expect("coordinator should start")
}

fn seed_busy_store(dir: &TempDir) -> Locator {
    let mut store = Store::with_root("busy", "root");
    for index in 0..5 {
        store.add_entry(
            Entry::new(format!("b{index}"), "root")
                .with_field(standard_fields::TITLE, &format!("Busy {index}"))
                .with_field(standard_fields::NOTES, "{TITLE}"),
        );
    }
    let locator = Locator::new(dir.path().join("busy.json").to_string_lossy().into_owned());
    JsonFileEngine::new()
        .save_as(&store, &CompositeKey::from_password(PASSWORD), &locator)
        .expect("busy store should be written");
    locator
}

/// Opens the fixture store, then the busy one, and switches back to the
/// fixture while the busy store's cells are still queued.
fn open_busy_in_background(
    session: &mut SessionCoordinator,
    dir: &TempDir,
) -> (DocumentId, DocumentId, Weak<Store>) {
    let key = || Some(CompositeKey::from_password(PASSWORD));
    let shown = session
        .open(seed_store(dir, "alpha"), key())
        .expect("alpha should open");
    let busy = session
        .open(seed_busy_store(dir), key())
        .expect("busy should open");
    let weak = Arc::downgrade(
        session
            .registry()
            .get(busy)
            .and_then(|document| document.content())
            .expect("busy store should be open"),
    );
    session.set_active(shown).expect("alpha should activate");
    (shown, busy, weak)
}

#[test]
fn resolver_release_tests_locking_hidden_document_waits_for_its_jobs() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let mut session = slow_session();
    let (shown, busy, weak) = open_busy_in_background(&mut session, &dir);

    let outcome = session.lock_document(busy).expect("lock should succeed");
    assert_eq!(outcome, LockOutcome::Locked(vec![busy]));
    assert!(weak.upgrade().is_none(), "no worker may keep the locked content");
    assert_eq!(
        session.registry().get(busy).map(|document| document.state()),
        Some(DocumentState::Locked)
    );
    assert_eq!(session.shown_group(), Some((shown, "root")));
}

#[test]
fn resolver_release_tests_closing_hidden_document_waits_for_its_jobs() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let mut session = slow_session();
    let (shown, busy, weak) = open_busy_in_background(&mut session, &dir);

    let outcome = session.close(busy).expect("close should succeed");
    assert_eq!(outcome, CloseOutcome::Closed);
    assert!(weak.upgrade().is_none(), "no worker may keep the closed content");
    assert!(session.registry().get(busy).is_none());
    assert_eq!(session.shown_group(), Some((shown, "root")));

    session.drain_resolver();
    assert_eq!(session.rows().len(), 2, "the shown listing is untouched");
}
