//! Integration tests for closing documents: veto, save prompt and auto-save.

mod common;

use common::{harness, test_config};
use vault_session_app::{
    CloseDecision, CloseOutcome, EventVerdict, SessionConfig, SessionEvent, SessionObserver,
};
use vault_session_core::{CompositeKey, DocumentState, Entry, Store, standard_fields};
use vault_session_engine::{DatabaseEngine, JsonFileEngine};

struct VetoClosing;

impl SessionObserver for VetoClosing {
    fn on_event(&mut self, event: &SessionEvent) -> EventVerdict {
        match event {
            SessionEvent::DocumentClosing { .. } => EventVerdict::Veto,
            _ => EventVerdict::Proceed,
        }
    }
}

fn add_entry(entry_id: &str) -> impl FnOnce(&mut Store) {
    let entry_id = entry_id.to_string();
    move |store: &mut Store| {
        store.add_entry(Entry::new(entry_id, "root").with_field(standard_fields::TITLE, "New"))
    }
}

#[test]
fn close_flow_tests_observer_veto_keeps_document() {
    let mut h = harness(test_config());
    let doc = h.open_seeded("alpha");
    h.session.subscribe(Box::new(VetoClosing));

    let outcome = h.session.close(doc).expect("close should be handled");
    assert_eq!(outcome, CloseOutcome::Cancelled);
    assert!(h.session.registry().get(doc).is_some_and(|d| d.is_open()));
    assert!(!h.events.events().contains(&SessionEvent::DocumentClosed(doc)));
}

#[test]
fn close_flow_tests_unmodified_document_closes_without_asking() {
    let mut h = harness(test_config());
    let doc = h.open_seeded("alpha");

    let outcome = h.session.close(doc).expect("close should succeed");
    assert_eq!(outcome, CloseOutcome::Closed);
    assert!(h.session.registry().get(doc).is_none());
    assert!(h.decider.asked.lock().expect("lock").is_empty());

    // The registry keeps an empty placeholder slot active.
    assert_eq!(h.session.registry().len(), 1);
    let placeholder = h.session.registry().active().expect("placeholder should be active");
    assert_eq!(placeholder.state(), DocumentState::Empty);
    assert!(
        h.events
            .events()
            .contains(&SessionEvent::ActiveDocumentChanged(placeholder.id()))
    );
    assert!(h.session.shown_group().is_none());
}

#[test]
fn close_flow_tests_modified_document_follows_decider() {
    let mut h = harness(test_config());
    let doc = h.open_seeded("alpha");
    let locator = h.session.registry().get(doc).expect("doc").locator().clone();
    let before = JsonFileEngine::new()
        .hash_of(&locator)
        .expect("hash should be readable");
    h.session
        .edit_document(doc, add_entry("e9"))
        .expect("edit should succeed");

    h.decider.answer_with(CloseDecision::Cancel);
    assert_eq!(h.session.close(doc).expect("close"), CloseOutcome::Cancelled);
    assert!(h.session.registry().get(doc).is_some_and(|d| d.is_modified()));

    h.decider.answer_with(CloseDecision::Discard);
    assert_eq!(h.session.close(doc).expect("close"), CloseOutcome::Closed);
    let after = JsonFileEngine::new()
        .hash_of(&locator)
        .expect("hash should be readable");
    assert_eq!(before, after, "discard must not write");

    let asked = h.decider.asked.lock().expect("lock").clone();
    assert_eq!(asked.len(), 2);
    assert_eq!(asked[0].0, doc);
    assert_eq!(asked[0].1, "alpha");
}

#[test]
fn close_flow_tests_save_decision_writes_before_closing() {
    let mut h = harness(test_config());
    let doc = h.open_seeded("alpha");
    let locator = h.session.registry().get(doc).expect("doc").locator().clone();
    h.session
        .edit_document(doc, add_entry("e9"))
        .expect("edit should succeed");

    h.decider.answer_with(CloseDecision::Save);
    assert_eq!(h.session.close(doc).expect("close"), CloseOutcome::Closed);
    assert!(
        h.events
            .events()
            .contains(&SessionEvent::DocumentSaved { doc, success: true })
    );

    let reopened = h
        .session
        .open(locator, Some(CompositeKey::from_password(common::PASSWORD)))
        .expect("saved store should reopen");
    let document = h.session.registry().get(reopened).expect("doc");
    assert!(document.content().is_some_and(|store| store.entry("e9").is_some()));
}

#[test]
fn close_flow_tests_auto_save_skips_decider() {
    let config = SessionConfig {
        auto_save_on_close: true,
        ..test_config()
    };
    let mut h = harness(config);
    let doc = h.open_seeded("alpha");
    h.session
        .edit_document(doc, add_entry("e9"))
        .expect("edit should succeed");

    assert_eq!(h.session.close(doc).expect("close"), CloseOutcome::Closed);
    assert!(h.decider.asked.lock().expect("lock").is_empty());
    assert!(
        h.events
            .events()
            .contains(&SessionEvent::DocumentSaved { doc, success: true })
    );
}

#[test]
fn close_flow_tests_closing_locked_document_needs_no_credentials() {
    let mut h = harness(test_config());
    let doc = h.open_seeded("alpha");
    h.session.lock_all().expect("lock should succeed");

    assert_eq!(h.session.close(doc).expect("close"), CloseOutcome::Closed);
    assert_eq!(h.prompt.requests.load(std::sync::atomic::Ordering::SeqCst), 0);
}
