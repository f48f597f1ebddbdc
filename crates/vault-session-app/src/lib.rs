#![warn(missing_docs)]
//! # vault-session-app
//!
//! ## Purpose
//! Composes registry, inactivity clocks, lock controller, save coordinator
//! and field resolver into one [`SessionCoordinator`] driven by a periodic
//! tick.
//!
//! ## Responsibilities
//! - Own the single periodic tick and its try-enter guard.
//! - Expose open, save, close, lock and unlock to the presentation layer.
//! - Emit typed [`SessionEvent`]s to subscribed observers.
//! - Load [`SessionConfig`] and bootstrap `tracing`.
//! - Run the clipboard auto-clear countdown.
//!
//! ## Data flow
//! Host event loop -> [`SessionCoordinator::tick`] -> inactivity clocks ->
//! lock controller when due. User commands -> coordinator -> save/lock crates
//! -> events -> [`UiSnapshot`] for the presentation layer.
//!
//! ## Ownership and lifetimes
//! The coordinator owns every component and all host collaborators. Borrows of
//! its fields are split per call so lock hooks can reach the save coordinator
//! and resolver while the lock controller holds the registry.
//!
//! ## Error model
//! Component errors are wrapped in [`SessionError`]. Expansion failures never
//! surface; save conflicts always go through the conflict resolver.
//!
//! ## Security and privacy notes
//! - Resolver work for a document is drained before its content is released.
//! - [`UiSnapshot`] carries titles and states only.
//! - [`redact_sensitive`] strips credential values from free-form log text.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use vault_session_app::{HostServices, SessionConfig, SessionCoordinator, TickOutcome};
//! use vault_session_engine::{JsonFileEngine, SprCompiler};
//!
//! let mut session = SessionCoordinator::new(
//!     SessionConfig::default(),
//!     Arc::new(JsonFileEngine::new()),
//!     Arc::new(SprCompiler::new()),
//!     HostServices::headless(),
//! )
//! .expect("coordinator starts");
//! session.notify_activity(0);
//! assert_eq!(session.tick(1_000), TickOutcome::Idle);
//! ```

mod clipboard;
mod config;
mod coordinator;
mod events;
mod logging;

pub use clipboard::{ClipboardCountdown, ClipboardSink, NoClipboard};
pub use config::{ConfigError, ENV_LOCK_AFTER_GLOBAL_SECS, ENV_LOCK_AFTER_SECS, SessionConfig};
pub use coordinator::{
    CloseDecider, CloseDecision, CloseOutcome, DeclinePrompt, FixedDecision, HostServices,
    LIST_COLUMNS, NEW_ROOT_GROUP_ID, SessionCoordinator, SessionError, ShutdownOutcome,
    TickOutcome,
};
pub use events::{
    DocumentSummary, EventLog, EventVerdict, LockCommand, SessionEvent, SessionObserver,
    UiSnapshot,
};
pub use logging::{LOG_ENV_VAR, init_tracing, redact_sensitive};

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("VAULT_SESSION_VERSION");

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}
