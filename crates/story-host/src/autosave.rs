//! Debounced autosave scheduling.
//!
//! The scheduler holds no document; the daemon feeds it captured
//! [`SaveState`]s and clock readings and acts on its verdicts. Time comes from
//! `tokio::time::Instant` so tests can run under a paused clock.

use std::time::Duration;

use story_model::{SaveState, is_save_worthy};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    PendingDebounce,
    Saving,
}

/// Verdict for a debounce window that has run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// Nothing was pending.
    Idle,
    /// A save completed after the window was last armed.
    Stale,
    /// The document did not change in a way worth saving.
    Unworthy,
    /// Start an autosave now; the scheduler is in [`Phase::Saving`].
    Save,
}

#[derive(Debug, Clone)]
struct Pending {
    deadline: Instant,
    armed_at: Instant,
    baseline: SaveState,
}

#[derive(Debug)]
pub struct AutosaveScheduler {
    delay: Duration,
    pending: Option<Pending>,
    saving: bool,
    last_saved_at: Option<Instant>,
}

impl AutosaveScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
            saving: false,
            last_saved_at: None,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.saving {
            Phase::Saving
        } else if self.pending.is_some() {
            Phase::PendingDebounce
        } else {
            Phase::Idle
        }
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn last_saved_at(&self) -> Option<Instant> {
        self.last_saved_at
    }

    /// True when the next arm needs a baseline, i.e. no window is open.
    pub fn needs_baseline(&self) -> bool {
        self.pending.is_none()
    }

    /// Open or extend the debounce window. `baseline` is the state captured
    /// before the mutation; it is only used when no window is open yet.
    pub fn arm(&mut self, now: Instant, baseline: Option<SaveState>) {
        let deadline = now + self.delay;
        match (&mut self.pending, baseline) {
            (Some(pending), _) => {
                pending.deadline = deadline;
                pending.armed_at = now;
            }
            (None, Some(baseline)) => {
                self.pending = Some(Pending {
                    deadline,
                    armed_at: now,
                    baseline,
                });
            }
            (None, None) => {
                tracing::warn!("autosave armed without a baseline; ignored");
            }
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    /// Drop any open window.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Close the window and decide whether to save `current`.
    pub fn evaluate(&mut self, current: &SaveState) -> Evaluation {
        let Some(pending) = self.pending.take() else {
            return Evaluation::Idle;
        };
        if self.last_saved_at.is_some_and(|saved| saved > pending.armed_at) {
            return Evaluation::Stale;
        }
        if !is_save_worthy(&pending.baseline, current) {
            return Evaluation::Unworthy;
        }
        self.saving = true;
        Evaluation::Save
    }

    /// Claim the save slot for a user-initiated save. Returns false when a
    /// save is already in flight.
    pub fn begin_manual(&mut self) -> bool {
        if self.saving {
            return false;
        }
        self.saving = true;
        true
    }

    /// Release the save slot. Only successful saves move the staleness mark.
    pub fn complete(&mut self, now: Instant, success: bool) {
        self.saving = false;
        if success {
            self.last_saved_at = Some(now);
        }
    }
}
