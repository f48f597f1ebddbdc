//! Integration tests for opening stores and the credential re-prompt loop.

mod common;

use std::sync::atomic::Ordering;

use common::{PASSWORD, harness, test_config};
use vault_session_app::{SessionError, SessionEvent};
use vault_session_core::{CompositeKey, DocumentState, Locator};
use vault_session_engine::OpenError;

#[test]
fn open_flow_tests_rejected_key_falls_back_to_prompt() {
    let mut h = harness(test_config());
    let locator = h.seed_store("alpha");
    h.prompt.push(Some(PASSWORD));

    let doc = h
        .session
        .open(locator, Some(CompositeKey::from_password("wrong")))
        .expect("prompted key should open the store");

    assert_eq!(h.prompt.requests.load(Ordering::SeqCst), 1);
    assert!(h.session.registry().get(doc).is_some_and(|d| d.is_open()));
    let events = h.events.events();
    assert!(events.contains(&SessionEvent::DocumentOpened(doc)));
    assert!(events.contains(&SessionEvent::ActiveDocumentChanged(doc)));
    assert!(!h.session.ui_snapshot().interaction_blocked);
}

#[test]
fn open_flow_tests_gives_up_after_max_attempts() {
    let mut h = harness(test_config());
    let locator = h.seed_store("alpha");
    h.prompt.push(Some("still wrong"));
    h.prompt.push(Some("wrong again"));
    h.prompt.push(Some(PASSWORD));

    let error = h
        .session
        .open(locator, Some(CompositeKey::from_password("wrong")))
        .expect_err("three bad keys should fail");

    assert!(matches!(
        error,
        SessionError::Open(OpenError::InvalidCredentials)
    ));
    assert_eq!(h.prompt.requests.load(Ordering::SeqCst), 2);
    assert_eq!(h.session.registry().open_documents(), Vec::new());
}

#[test]
fn open_flow_tests_dismissed_prompt_cancels() {
    let mut h = harness(test_config());
    let locator = h.seed_store("alpha");
    h.prompt.push(None);

    let error = h
        .session
        .open(locator, None)
        .expect_err("dismissed prompt should cancel");
    assert!(error.is_cancelled());
    assert_eq!(h.session.registry().len(), 1);
}

#[test]
fn open_flow_tests_missing_store_is_not_retried() {
    let mut h = harness(test_config());
    let missing = Locator::new(
        h.dir
            .path()
            .join("missing.json")
            .to_string_lossy()
            .into_owned(),
    );

    let error = h
        .session
        .open(missing, Some(CompositeKey::from_password(PASSWORD)))
        .expect_err("missing store should fail");
    assert!(matches!(error, SessionError::Open(OpenError::NotFound(_))));
    assert_eq!(h.prompt.requests.load(Ordering::SeqCst), 0);
}

#[test]
fn open_flow_tests_same_locator_reuses_slot() {
    let mut h = harness(test_config());
    let locator = h.seed_store("alpha");
    let key = || Some(CompositeKey::from_password(PASSWORD));
    let first = h.session.open(locator.clone(), key()).expect("first open");
    let other = h.open_seeded("beta");
    assert_eq!(h.session.registry().active_id(), Some(other));

    let again = h.session.open(locator, key()).expect("second open");
    assert_eq!(again, first);
    assert_eq!(h.session.registry().len(), 2);
    assert_eq!(h.session.registry().active_id(), Some(first));
}

#[test]
fn open_flow_tests_reopening_locked_locator_unlocks_it() {
    let mut h = harness(test_config());
    let locator = h.seed_store("alpha");
    let doc = h
        .session
        .open(locator.clone(), Some(CompositeKey::from_password(PASSWORD)))
        .expect("open");
    h.session.lock_all().expect("lock");

    h.prompt.push(Some(PASSWORD));
    let again = h.session.open(locator, None).expect("reopen should unlock");
    assert_eq!(again, doc);
    assert_eq!(
        h.session.registry().get(doc).map(|d| d.state()),
        Some(DocumentState::Open)
    );
    assert!(h.events.events().contains(&SessionEvent::DocumentUnlocked(doc)));
}
