//! Auto-save policy and debounce timing.
//!
//! DESIGN
//! ======
//! Persistence is explicit unless the session is configured with
//! [`SavePolicy::AutoSave`]. In that mode every edit is reported to the
//! [`Debouncer`], which answers "save now" when the minimum interval since
//! the last auto-save has passed, or schedules one deferred save otherwise.
//! Later edits inside the window move nothing; the single pending save
//! covers them. The host drives time by calling [`Debouncer::poll`].
//!
//! The debouncer never performs I/O. It only tells the engine when to emit
//! an auto-save request.

#[cfg(test)]
#[path = "autosave_test.rs"]
mod autosave_test;

use std::time::{Duration, Instant};

use crate::consts::DEFAULT_AUTOSAVE_INTERVAL_MS;

/// When the open document is written back to the file store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SavePolicy {
    /// Only on an explicit save request.
    #[default]
    Explicit,
    /// After edits, at most once per `min_interval`.
    AutoSave { min_interval: Duration },
}

impl SavePolicy {
    /// Auto-save with the default minimum interval.
    #[must_use]
    pub fn auto() -> Self {
        Self::AutoSave { min_interval: Duration::from_millis(DEFAULT_AUTOSAVE_INTERVAL_MS) }
    }
}

/// What the debouncer wants done after an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Auto-save is off; nothing to do.
    Idle,
    /// Save immediately.
    SaveNow,
    /// A save is pending and will fire from `poll` at `due`.
    Deferred { due: Instant },
}

#[derive(Debug, Clone, Default)]
pub struct Debouncer {
    policy: SavePolicy,
    last_save: Option<Instant>,
    pending: Option<Instant>,
}

impl Debouncer {
    #[must_use]
    pub fn new(policy: SavePolicy) -> Self {
        Self { policy, last_save: None, pending: None }
    }

    #[must_use]
    pub fn policy(&self) -> SavePolicy {
        self.policy
    }

    /// Time of the pending deferred save, if any.
    #[must_use]
    pub fn pending(&self) -> Option<Instant> {
        self.pending
    }

    /// Record an edit made at `now`.
    pub fn on_edit(&mut self, now: Instant) -> Schedule {
        let SavePolicy::AutoSave { min_interval } = self.policy else {
            return Schedule::Idle;
        };
        match self.last_save {
            Some(last) if now.duration_since(last) < min_interval => {
                let due = last + min_interval;
                self.pending = Some(due);
                Schedule::Deferred { due }
            }
            _ => {
                self.last_save = Some(now);
                self.pending = None;
                Schedule::SaveNow
            }
        }
    }

    /// Fire the pending save if it is due. Returns true at most once per schedule.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.pending {
            Some(due) if now >= due => {
                self.pending = None;
                self.last_save = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Forget any pending save, e.g. after the document was replaced.
    pub fn cancel(&mut self) {
        self.pending = None;
    }
}
