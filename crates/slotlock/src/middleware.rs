//! Job middleware pipeline.
//!
//! A pipeline wraps `handle()` with the stages the queue framework
//! composed for a job type. [`SlotLockMiddleware`] is the stage that
//! gives a job its concurrency slot and takes it back on every exit
//! path. Jobs whose pipeline omits it never touch the allocator.

use std::sync::Arc;

use crate::allocator::SlotAllocator;
use crate::context::{ExitSignal, JobContext};
use crate::job::{JobOutcome, LockableJob};
use crate::locker::{JobLocker, ReleasePolicy};

/// One pipeline stage.
#[async_trait::async_trait]
pub trait JobMiddleware: Send + Sync + 'static {
    /// Wrap the rest of the pipeline. Implementations call
    /// `next.run(job, ctx)` exactly once.
    async fn handle(
        &self,
        job: Arc<dyn LockableJob>,
        ctx: &mut JobContext,
        next: Next<'_>,
    ) -> anyhow::Result<()>;
}

/// Remainder of the pipeline after the current stage.
pub struct Next<'a> {
    chain: &'a [Arc<dyn JobMiddleware>],
}

impl Next<'_> {
    pub async fn run(
        self,
        job: Arc<dyn LockableJob>,
        ctx: &mut JobContext,
    ) -> anyhow::Result<()> {
        match self.chain.split_first() {
            Some((stage, rest)) => stage.handle(job, ctx, Next { chain: rest }).await,
            None => job.handle(ctx).await,
        }
    }
}

/// A composed middleware stack for one job type.
pub struct Pipeline {
    stages: Vec<Arc<dyn JobMiddleware>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Arc<dyn JobMiddleware>>) -> Self {
        Self { stages }
    }

    /// Run `job` through every stage and map the result and any explicit
    /// signal to the queue-facing outcome.
    pub async fn dispatch(&self, job: Arc<dyn LockableJob>, ctx: &mut JobContext) -> JobOutcome {
        let result = Next { chain: &self.stages }.run(job, ctx).await;
        outcome_for(result, ctx.signal())
    }
}

/// An error out of `handle()` outranks any explicit signal except an
/// explicit failure reason.
fn outcome_for(result: anyhow::Result<()>, signal: &ExitSignal) -> JobOutcome {
    match (result, signal) {
        (_, ExitSignal::Failed { reason }) => JobOutcome::failed(reason.clone()),
        (Err(e), _) => JobOutcome::failed(format!("{e:#}")),
        (Ok(()), ExitSignal::Released) => JobOutcome::Released,
        (Ok(()), ExitSignal::Deleted) => JobOutcome::Deleted,
        (Ok(()), ExitSignal::None) => JobOutcome::Completed,
    }
}

/// Pipeline stage enforcing bounded concurrency via the slot pool.
///
/// Reserves a slot before the rest of the pipeline runs, binds it to the
/// context, and releases it no matter how the pipeline exits. A job that
/// failed always releases without biasing reuse; other exits release per
/// the configured [`ReleasePolicy`].
pub struct SlotLockMiddleware {
    allocator: Arc<SlotAllocator>,
    policy: ReleasePolicy,
}

impl SlotLockMiddleware {
    pub fn new(allocator: Arc<SlotAllocator>) -> Self {
        Self {
            allocator,
            policy: ReleasePolicy::default(),
        }
    }

    pub fn with_release_policy(mut self, policy: ReleasePolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait::async_trait]
impl JobMiddleware for SlotLockMiddleware {
    async fn handle(
        &self,
        job: Arc<dyn LockableJob>,
        ctx: &mut JobContext,
        next: Next<'_>,
    ) -> anyhow::Result<()> {
        let mut locker = JobLocker::new(Arc::clone(&self.allocator));
        let slot = locker
            .reserve_next_available_slot()
            .await
            .map_err(anyhow::Error::from)?;
        ctx.bind_slot(slot);
        tracing::debug!(job = %job.name(), id = %ctx.job_id(), slot = %slot, "Slot bound");

        let result = next.run(Arc::clone(&job), ctx).await;

        // Release on every exit path, before the outcome is visible to
        // the queue.
        let failed = result.is_err() || matches!(ctx.signal(), ExitSignal::Failed { .. });
        if failed {
            locker.release_slot().await;
        } else {
            locker.release_with(self.policy).await;
        }
        ctx.clear_slot();

        result
    }
}
