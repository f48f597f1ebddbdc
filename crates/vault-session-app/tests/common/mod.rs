//! Shared fixtures for coordinator integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use vault_session_app::{
    ClipboardSink, CloseDecider, CloseDecision, EventLog, HostServices, SessionConfig,
    SessionCoordinator,
};
use vault_session_core::{CompositeKey, DocumentId, Entry, Locator, Store, standard_fields};
use vault_session_engine::{CredentialPrompt, DatabaseEngine, JsonFileEngine, SprCompiler};
use vault_session_inactivity::SyntheticInputSource;
use vault_session_lock::ModalSurfaces;
use vault_session_save::{ConflictChoice, FixedChoice};

/// Password used for every fixture store.
#[allow(dead_code)]
pub const PASSWORD: &str = "correct horse";

/// Modal surfaces whose blocking flag is flipped from the test body.
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct SharedSurfaces {
    pub blocked: Arc<AtomicBool>,
}

impl ModalSurfaces for SharedSurfaces {
    fn can_close_all(&self) -> bool {
        !self.blocked.load(Ordering::SeqCst)
    }

    fn close_all(&mut self) -> bool {
        !self.blocked.load(Ordering::SeqCst)
    }
}

/// Clipboard counting clears.
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct CountingClipboard {
    pub clears: Arc<AtomicUsize>,
}

impl ClipboardSink for CountingClipboard {
    fn clear_if_owner(&mut self) -> bool {
        self.clears.fetch_add(1, Ordering::SeqCst);
        true
    }
}

/// Prompt answering from a shared script; an exhausted script cancels.
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct QueuedPrompt {
    pub answers: Arc<Mutex<VecDeque<Option<String>>>>,
    pub requests: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl QueuedPrompt {
    pub fn push(&self, answer: Option<&str>) {
        self.answers
            .lock()
            .expect("prompt script lock should not be poisoned")
            .push_back(answer.map(str::to_string));
    }
}

impl CredentialPrompt for QueuedPrompt {
    fn request(&mut self, _locator: &Locator, _attempt: u32) -> Option<CompositeKey> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.answers
            .lock()
            .expect("prompt script lock should not be poisoned")
            .pop_front()
            .flatten()
            .map(CompositeKey::from_password)
    }
}

/// Close decider with a settable answer and a call log.
#[allow(dead_code)]
#[derive(Clone)]
pub struct SharedDecider {
    pub answer: Arc<Mutex<CloseDecision>>,
    pub asked: Arc<Mutex<Vec<(DocumentId, String)>>>,
}

impl Default for SharedDecider {
    fn default() -> Self {
        Self {
            answer: Arc::new(Mutex::new(CloseDecision::Cancel)),
            asked: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[allow(dead_code)]
impl SharedDecider {
    pub fn answer_with(&self, decision: CloseDecision) {
        *self.answer.lock().expect("decider lock should not be poisoned") = decision;
    }
}

impl CloseDecider for SharedDecider {
    fn decide(&mut self, doc: DocumentId, title: &str) -> CloseDecision {
        self.asked
            .lock()
            .expect("decider lock should not be poisoned")
            .push((doc, title.to_string()));
        *self.answer.lock().expect("decider lock should not be poisoned")
    }
}

/// Coordinator plus handles to every scripted collaborator.
#[allow(dead_code)]
pub struct Harness {
    pub session: SessionCoordinator,
    pub surfaces: SharedSurfaces,
    pub clipboard: CountingClipboard,
    pub prompt: QueuedPrompt,
    pub decider: SharedDecider,
    pub input: Arc<SyntheticInputSource>,
    pub events: EventLog,
    pub dir: TempDir,
}

#[allow(dead_code)]
impl Harness {
    /// Writes a fixture store named `name` and returns its locator.
    pub fn seed_store(&self, name: &str) -> Locator {
        seed_store(&self.dir, name)
    }

    /// Opens a fresh fixture store with the right password.
    pub fn open_seeded(&mut self, name: &str) -> DocumentId {
        let locator = self.seed_store(name);
        self.session
            .open(locator, Some(CompositeKey::from_password(PASSWORD)))
            .expect("fixture store should open")
    }
}

/// Config with one worker and short timeouts for deterministic tests.
#[allow(dead_code)]
pub fn test_config() -> SessionConfig {
    SessionConfig {
        lock_after_secs: 60,
        resolver_workers: 1,
        clipboard_clear_secs: Some(3),
        ..SessionConfig::default()
    }
}

/// Builds a harness around `config`.
#[allow(dead_code)]
pub fn harness(config: SessionConfig) -> Harness {
    let surfaces = SharedSurfaces::default();
    let clipboard = CountingClipboard::default();
    let prompt = QueuedPrompt::default();
    let decider = SharedDecider::default();
    let input = Arc::new(SyntheticInputSource::new(0));

    let host = HostServices {
        surfaces: Box::new(surfaces.clone()),
        conflicts: Box::new(FixedChoice(ConflictChoice::Overwrite)),
        prompt: Box::new(prompt.clone()),
        clipboard: Box::new(clipboard.clone()),
        global_input: input.clone(),
        close_decider: Box::new(decider.clone()),
    };
    let mut session = SessionCoordinator::new(
        config,
        Arc::new(JsonFileEngine::new()),
        Arc::new(SprCompiler::new()),
        host,
    )
    .expect("coordinator should start");
    let events = EventLog::new();
    session.subscribe(Box::new(events.clone()));

    Harness {
        session,
        surfaces,
        clipboard,
        prompt,
        decider,
        input,
        events,
        dir: tempfile::tempdir().expect("tempdir should be created"),
    }
}

/// Fixture content: root group with two entries, one `Mail` subgroup.
#[allow(dead_code)]
pub fn fixture_store(name: &str) -> Store {
    let mut store = Store::with_root(name, "root");
    store.add_group("g-mail", "Mail", "root");
    store.add_entry(
        Entry::new("e1", "root")
            .with_field(standard_fields::TITLE, "Bank")
            .with_field(standard_fields::USER_NAME, "alice")
            .with_field(standard_fields::NOTES, "{USERNAME} in {GROUP}"),
    );
    store.add_entry(Entry::new("e2", "root").with_field(standard_fields::TITLE, "Shop"));
    store.add_entry(
        Entry::new("e3", "g-mail")
            .with_field(standard_fields::TITLE, "Inbox")
            .with_field(standard_fields::USER_NAME, "{REF:U@T:Bank}"),
    );
    store
}

/// Writes [`fixture_store`] to `<dir>/<name>.json`.
#[allow(dead_code)]
pub fn seed_store(dir: &TempDir, name: &str) -> Locator {
    let path = dir.path().join(format!("{name}.json"));
    let locator = Locator::new(path.to_string_lossy().into_owned());
    JsonFileEngine::new()
        .save_as(
            &fixture_store(name),
            &CompositeKey::from_password(PASSWORD),
            &locator,
        )
        .expect("fixture store should be written");
    locator
}
