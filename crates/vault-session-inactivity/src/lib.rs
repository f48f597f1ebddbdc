#![warn(missing_docs)]
//! # vault-session-inactivity
//!
//! ## Purpose
//! Tracks the two independent inactivity clocks that drive automatic locking.
//!
//! ## Responsibilities
//! - Keep the local deadline, reset by interaction delivered to this process.
//! - Keep the global deadline, recomputed only when the OS last-input stamp
//!   changes.
//! - Answer whether either deadline has passed.
//!
//! ## Data flow
//! UI event handlers call [`InactivityMonitor::notify_activity`] -> the
//! periodic tick samples a [`GlobalInputSource`] and calls
//! [`InactivityMonitor::tick`] -> the coordinator asks
//! [`InactivityMonitor::is_due`] before invoking the lock controller.
//!
//! ## Ownership and lifetimes
//! The monitor is a plain value owned by the coordinator on the UI thread; it
//! holds no shared state and needs no synchronization.
//!
//! ## Error model
//! The monitor has no failure modes. A source that cannot report a stamp
//! returns `None`, which leaves the global deadline unchanged.
//!
//! ## Example
//! ```rust
//! use vault_session_inactivity::{InactivityMonitor, InputStamp};
//!
//! let mut monitor = InactivityMonitor::new(60);
//! monitor.notify_activity(0);
//! monitor.tick(0, 0, Some(InputStamp(1)));
//! assert!(!monitor.is_due(59_999));
//! assert!(monitor.is_due(60_000));
//! ```

use std::sync::Mutex;

use tracing::debug;

/// Absolute point in time (milliseconds) or "never".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Deadline {
    /// Due at this instant.
    At(u64),
    /// Clock disabled.
    Never,
}

impl Deadline {
    /// Returns `true` when `now_ms` has reached the deadline.
    pub fn has_passed(&self, now_ms: u64) -> bool {
        match self {
            Self::At(at) => now_ms >= *at,
            Self::Never => false,
        }
    }

    fn after(now_ms: u64, timeout_secs: u64) -> Self {
        if timeout_secs == 0 {
            return Self::Never;
        }
        Self::At(now_ms.saturating_add(timeout_secs.saturating_mul(1_000)))
    }
}

/// Opaque OS last-input token, comparable for inequality only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputStamp(pub u64);

/// OS global-input query.
pub trait GlobalInputSource: Send + Sync {
    /// Returns the current last-input stamp, or `None` when unavailable.
    fn last_input_stamp(&self) -> Option<InputStamp>;
}

/// Source for hosts without an OS last-input query.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGlobalInput;

impl GlobalInputSource for NoGlobalInput {
    fn last_input_stamp(&self) -> Option<InputStamp> {
        None
    }
}

/// Deterministic source for tests and headless hosts.
#[derive(Debug, Default)]
pub struct SyntheticInputSource {
    stamp: Mutex<Option<InputStamp>>,
}

impl SyntheticInputSource {
    /// Creates a source reporting `initial`.
    pub fn new(initial: u64) -> Self {
        Self {
            stamp: Mutex::new(Some(InputStamp(initial))),
        }
    }

    /// Simulates OS-level input by advancing the stamp.
    pub fn record_input(&self) {
        let mut stamp = self
            .stamp
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let next = stamp.map(|InputStamp(value)| value.wrapping_add(1)).unwrap_or(0);
        *stamp = Some(InputStamp(next));
    }
}

impl GlobalInputSource for SyntheticInputSource {
    fn last_input_stamp(&self) -> Option<InputStamp> {
        *self
            .stamp
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Two-clock inactivity tracker.
///
/// # Invariants
/// - The global deadline changes only when a tick observes a stamp different
///   from the last one stored, or when the global timeout is disabled.
/// - [`InactivityMonitor::notify_activity`] only writes the local deadline.
#[derive(Debug, Clone)]
pub struct InactivityMonitor {
    local_timeout_secs: u64,
    local_deadline: Deadline,
    global_deadline: Deadline,
    last_global_stamp: Option<InputStamp>,
}

impl InactivityMonitor {
    /// Creates a monitor with both clocks disarmed.
    ///
    /// `local_timeout_secs == 0` disables the local clock.
    pub fn new(local_timeout_secs: u64) -> Self {
        Self {
            local_timeout_secs,
            local_deadline: Deadline::Never,
            global_deadline: Deadline::Never,
            last_global_stamp: None,
        }
    }

    /// Records user interaction observed by this process.
    pub fn notify_activity(&mut self, now_ms: u64) {
        self.local_deadline = Deadline::after(now_ms, self.local_timeout_secs);
    }

    /// Recomputes the global deadline from an observed OS stamp.
    ///
    /// - `global_timeout_secs == 0` disables the global clock; the stored stamp
    ///   is forgotten so re-enabling arms on the next observation.
    /// - An unchanged (or unavailable) stamp leaves the deadline untouched.
    pub fn tick(&mut self, now_ms: u64, global_timeout_secs: u64, observed: Option<InputStamp>) {
        if global_timeout_secs == 0 {
            self.global_deadline = Deadline::Never;
            self.last_global_stamp = None;
            return;
        }

        let Some(stamp) = observed else {
            return;
        };
        if self.last_global_stamp == Some(stamp) {
            return;
        }

        self.last_global_stamp = Some(stamp);
        self.global_deadline = Deadline::after(now_ms, global_timeout_secs);
        debug!(deadline = ?self.global_deadline, "Global input observed");
    }

    /// Returns `true` when either clock has expired.
    pub fn is_due(&self, now_ms: u64) -> bool {
        self.local_deadline.has_passed(now_ms) || self.global_deadline.has_passed(now_ms)
    }

    /// Current local deadline.
    pub fn local_deadline(&self) -> Deadline {
        self.local_deadline
    }

    /// Current global deadline.
    pub fn global_deadline(&self) -> Deadline {
        self.global_deadline
    }

    /// Configured local timeout.
    pub fn local_timeout_secs(&self) -> u64 {
        self.local_timeout_secs
    }

    /// Whole seconds until the earlier deadline, `None` when both are disabled.
    pub fn seconds_until_due(&self, now_ms: u64) -> Option<u64> {
        match self.local_deadline.min(self.global_deadline) {
            Deadline::At(at) => Some(at.saturating_sub(now_ms).div_ceil(1_000)),
            Deadline::Never => None,
        }
    }
}
