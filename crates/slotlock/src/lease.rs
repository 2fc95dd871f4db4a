//! A held slot.
//!
//! Release is best-effort at the store level: a failed `forget` is logged
//! and left to the TTL, which also covers leases that are never released
//! at all (crashed or hung holders).

use std::sync::Arc;

use crate::allocator::SlotId;
use crate::store::SlotStore;

/// Exclusive hold on one slot, from claim until release.
///
/// Dropping a lease without releasing it is a bug in the holder: the slot
/// stays marked held until its TTL elapses, and an error is logged.
pub struct SlotLease {
    slot: SlotId,
    slot_key: String,
    cursor_key: String,
    prefix: String,
    store: Arc<dyn SlotStore>,
    released: bool,
}

impl SlotLease {
    pub(crate) fn new(
        slot: SlotId,
        slot_key: String,
        cursor_key: String,
        prefix: String,
        store: Arc<dyn SlotStore>,
    ) -> Self {
        Self {
            slot,
            slot_key,
            cursor_key,
            prefix,
            store,
            released: false,
        }
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Release the slot, leaving the round-robin cursor alone. Idempotent.
    pub async fn release(&mut self) {
        self.release_inner(false).await;
    }

    /// Release the slot and rewind the shared cursor so this slot is the
    /// next reservation's first candidate. Idempotent.
    pub async fn release_and_update(&mut self) {
        self.release_inner(true).await;
    }

    async fn release_inner(&mut self, update_cursor: bool) {
        if self.released {
            return;
        }
        self.released = true;

        if let Err(e) = self.store.forget(&self.slot_key).await {
            tracing::warn!(
                prefix = %self.prefix,
                slot = %self.slot,
                error = %e,
                "Failed to release slot, TTL will reclaim it"
            );
            return;
        }

        if update_cursor {
            // The scan starts at cursor + 1, so pointing the cursor just
            // before this slot makes it the first candidate.
            let rewound = self.slot.get() - 1;
            if let Err(e) = self
                .store
                .put(&self.cursor_key, rewound.into(), None)
                .await
            {
                tracing::warn!(
                    prefix = %self.prefix,
                    slot = %self.slot,
                    error = %e,
                    "Failed to update cursor after release"
                );
            }
        }

        tracing::debug!(prefix = %self.prefix, slot = %self.slot, "Slot released");
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        if !self.released {
            tracing::error!(
                prefix = %self.prefix,
                slot = %self.slot,
                "SlotLease dropped without release, slot reclaims after TTL"
            );
        }
    }
}
