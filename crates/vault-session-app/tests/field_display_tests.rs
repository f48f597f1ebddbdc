//! Integration tests for listed rows and background placeholder expansion.

mod common;

use common::{harness, test_config};
use vault_session_app::LIST_COLUMNS;
use vault_session_core::{Entry, Store, standard_fields};

fn column(name: &str) -> usize {
    LIST_COLUMNS
        .iter()
        .position(|candidate| *candidate == name)
        .expect("column should be listed")
}

#[test]
fn field_display_tests_open_lists_root_and_expands_cells() {
    let mut h = harness(test_config());
    let doc = h.open_seeded("alpha");

    assert_eq!(h.session.shown_group(), Some((doc, "root")));
    assert_eq!(h.session.rows().len(), 2);

    h.session.drain_resolver();
    assert_eq!(
        h.session.rows().cell("e1", column(standard_fields::NOTES)).as_deref(),
        Some("alice in alpha")
    );
    assert_eq!(
        h.session.rows().cell("e2", column(standard_fields::TITLE)).as_deref(),
        Some("Shop")
    );
}

#[test]
fn field_display_tests_field_reference_resolves_across_groups() {
    let mut h = harness(test_config());
    h.open_seeded("alpha");

    h.session.show_group("g-mail").expect("group should list");
    h.session.drain_resolver();
    assert_eq!(
        h.session.rows().cell("e3", column(standard_fields::USER_NAME)).as_deref(),
        Some("alice")
    );
}

#[test]
fn field_display_tests_edit_rebuilds_rows_with_new_generation() {
    let mut h = harness(test_config());
    let doc = h.open_seeded("alpha");
    h.session.drain_resolver();
    let before = h.session.rows().generation();

    h.session
        .edit_document(doc, |store: &mut Store| {
            store.add_entry(
                Entry::new("e4", "root")
                    .with_field(standard_fields::TITLE, "Copy of {REF:T@I:e2}"),
            );
        })
        .expect("edit should succeed");

    assert!(h.session.rows().generation() > before);
    h.session.drain_resolver();
    assert_eq!(h.session.rows().len(), 3);
    assert_eq!(
        h.session.rows().cell("e4", column(standard_fields::TITLE)).as_deref(),
        Some("Copy of Shop")
    );
}

#[test]
fn field_display_tests_switching_documents_relists_active_one() {
    let mut h = harness(test_config());
    let first = h.open_seeded("alpha");
    let second = h.open_seeded("beta");
    assert_eq!(h.session.shown_group(), Some((second, "root")));

    h.session.show_group("g-mail").expect("group should list");
    h.session.set_active(first).expect("first should activate");
    assert_eq!(h.session.shown_group(), Some((first, "root")));

    h.session.set_active(second).expect("second should activate");
    assert_eq!(
        h.session.shown_group(),
        Some((second, "g-mail")),
        "the remembered group comes back"
    );
}
