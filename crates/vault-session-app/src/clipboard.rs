//! Clipboard auto-clear countdown.

use tracing::debug;

/// Host clipboard owned by this process.
pub trait ClipboardSink: Send {
    /// Clears the clipboard if this process still owns its content.
    ///
    /// # Returns
    /// `true` when something was cleared.
    fn clear_if_owner(&mut self) -> bool;
}

/// Host without clipboard access.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoClipboard;

impl ClipboardSink for NoClipboard {
    fn clear_if_owner(&mut self) -> bool {
        false
    }
}

/// Per-tick countdown to clearing a copied secret.
///
/// Disarmed is `remaining == None`. An armed countdown at `Some(0)` fires on
/// the next tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClipboardCountdown {
    remaining: Option<u32>,
    total: u32,
}

impl ClipboardCountdown {
    /// Creates a disarmed countdown.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the countdown for `ticks` ticks, replacing any running one.
    pub fn start(&mut self, ticks: u32) {
        self.remaining = Some(ticks);
        self.total = ticks;
        debug!(ticks, "Clipboard countdown started");
    }

    /// Advances one tick.
    ///
    /// # Returns
    /// `true` on the tick the countdown expires; it is disarmed afterwards.
    pub fn tick(&mut self) -> bool {
        match self.remaining {
            Some(0) => {
                self.disarm();
                true
            }
            Some(left) => {
                self.remaining = Some(left - 1);
                false
            }
            None => false,
        }
    }

    /// Stops the countdown without firing.
    pub fn disarm(&mut self) {
        self.remaining = None;
        self.total = 0;
    }

    /// `true` while counting down.
    pub fn is_armed(&self) -> bool {
        self.remaining.is_some()
    }

    /// Remaining share of the countdown, 0-100.
    pub fn percent_remaining(&self) -> Option<u8> {
        let left = self.remaining?;
        if self.total == 0 {
            return Some(0);
        }
        let percent = u64::from(left) * 100 / u64::from(self.total);
        Some(u8::try_from(percent.min(100)).unwrap_or(100))
    }
}
