//! Per-execution job state.
//!
//! Jobs signal release/fail/delete through the context instead of
//! mutating fields on themselves; the pipeline reads the signal after
//! `handle()` returns to decide the post-execution outcome.

use crate::allocator::SlotId;

/// Explicit exit signal raised from inside `handle()`. First write wins.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExitSignal {
    #[default]
    None,

    /// Put the job back on the queue without counting it as failed.
    Released,

    /// Fail the job regardless of what `handle()` returns.
    Failed { reason: String },

    /// The job is done and wants no retry or failure handling.
    Deleted,
}

impl ExitSignal {
    pub fn is_set(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// State carried across one `handle()` invocation: the bound slot and any
/// explicit exit signal.
#[derive(Debug)]
pub struct JobContext {
    job_id: String,
    slot: Option<SlotId>,
    signal: ExitSignal,
}

impl JobContext {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            slot: None,
            signal: ExitSignal::None,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// The slot bound to this execution, if the locking stage reserved
    /// one.
    pub fn slot(&self) -> Option<SlotId> {
        self.slot
    }

    pub(crate) fn bind_slot(&mut self, slot: SlotId) {
        self.slot = Some(slot);
    }

    pub(crate) fn clear_slot(&mut self) {
        self.slot = None;
    }

    pub fn signal(&self) -> &ExitSignal {
        &self.signal
    }

    /// Ask the queue to requeue this job instead of completing it.
    pub fn mark_released(&mut self) {
        self.set_signal(ExitSignal::Released);
    }

    /// Fail this job even if `handle()` returns `Ok`.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.set_signal(ExitSignal::Failed {
            reason: reason.into(),
        });
    }

    /// Finish this job with no retry and no failure handling.
    pub fn mark_deleted(&mut self) {
        self.set_signal(ExitSignal::Deleted);
    }

    fn set_signal(&mut self, signal: ExitSignal) {
        if self.signal.is_set() {
            tracing::warn!(
                job_id = %self.job_id,
                current = ?self.signal,
                ignored = ?signal,
                "Exit signal already set, ignoring"
            );
            return;
        }
        self.signal = signal;
    }
}
