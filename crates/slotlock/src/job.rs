//! Job contract for lockable work.

use crate::context::JobContext;

/// A unit of queue work that can run under a slot lock.
///
/// Implementing this trait is the opt-in: only `LockableJob` types can be
/// dispatched through the locking pipeline, so a job that cannot accept a
/// bound slot is unrepresentable rather than a runtime error.
#[async_trait::async_trait]
pub trait LockableJob: Send + Sync + 'static {
    /// Stable name for logs and outcome reporting.
    fn name(&self) -> &str;

    /// Execute the job. The bound slot is available via `ctx.slot()`, and
    /// `ctx.mark_released()` / `mark_failed()` / `mark_deleted()` override
    /// the outcome the queue sees.
    async fn handle(&self, ctx: &mut JobContext) -> anyhow::Result<()>;
}

/// What the surrounding queue sees after one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Finished normally.
    Completed,

    /// Execution failed; the queue applies its retry or dead-letter
    /// policy.
    Failed { error: String },

    /// The job asked to go back on the queue.
    Released,

    /// The job deleted itself: done, bypassing failure handling.
    Deleted,
}

impl JobOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
            Self::Released => "released",
            Self::Deleted => "deleted",
        }
    }
}
