//! Job-scoped slot lifecycle.
//!
//! A `JobLocker` binds at most one lease to one job execution. Releasing
//! with no slot held is a no-op, so the middleware can release
//! unconditionally on every exit path.

use std::sync::Arc;

use crate::allocator::{LockError, SlotAllocator, SlotId};
use crate::lease::SlotLease;

/// How a released slot influences the next reservation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReleasePolicy {
    /// Leave the cursor alone: the pool keeps rotating and freed slots
    /// are revisited when the scan wraps.
    #[default]
    Rotate,

    /// Rewind the cursor so the freed slot is the next first candidate.
    ReuseFreed,
}

/// Binds slot acquisition and release to one job execution.
pub struct JobLocker {
    allocator: Arc<SlotAllocator>,
    lease: Option<SlotLease>,
}

impl JobLocker {
    pub fn new(allocator: Arc<SlotAllocator>) -> Self {
        Self {
            allocator,
            lease: None,
        }
    }

    /// Reserve a slot for this job and return its id.
    pub async fn reserve_next_available_slot(&mut self) -> Result<SlotId, LockError> {
        if self.lease.is_some() {
            debug_assert!(false, "reserve called with a slot already held");
            tracing::error!("Reserve called with a slot already held, releasing the old slot");
            self.release_slot().await;
        }

        let lease = self.allocator.reserve_next_available_slot().await?;
        let slot = lease.slot();
        self.lease = Some(lease);
        Ok(slot)
    }

    /// The held slot, if any.
    pub fn slot(&self) -> Option<SlotId> {
        self.lease.as_ref().map(|lease| lease.slot())
    }

    /// Release without touching the cursor. No-op when no slot is held.
    pub async fn release_slot(&mut self) {
        if let Some(mut lease) = self.lease.take() {
            lease.release().await;
        }
    }

    /// Release and bias the next reservation toward the freed slot.
    /// No-op when no slot is held.
    pub async fn release_and_update_slot(&mut self) {
        if let Some(mut lease) = self.lease.take() {
            lease.release_and_update().await;
        }
    }

    /// Release according to `policy`.
    pub async fn release_with(&mut self, policy: ReleasePolicy) {
        match policy {
            ReleasePolicy::Rotate => self.release_slot().await,
            ReleasePolicy::ReuseFreed => self.release_and_update_slot().await,
        }
    }
}
