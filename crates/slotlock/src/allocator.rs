//! Slot allocation over the shared store.
//!
//! The allocator scans round-robin from a shared cursor and claims the
//! first free slot with a single atomic `put_if_absent`. The cursor is a
//! throughput heuristic only; two workers reading the same cursor value
//! still end up on distinct slots because only one of them wins the
//! claim.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, LockerConfig};
use crate::lease::SlotLease;
use crate::store::{SlotStore, StoreError};

/// One of the pool's N concurrency permits. 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(u32);

impl SlotId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value written under a claimed slot key.
///
/// The holder id ties a claim to one worker; the timestamp is diagnostic.
/// Expiry is enforced by the store's TTL, never by readers of this entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockEntry {
    pub holder_id: uuid::Uuid,
    /// Acquisition time (ISO 8601 format).
    pub acquired_at: String,
}

impl LockEntry {
    fn new() -> Self {
        Self {
            holder_id: uuid::Uuid::new_v4(),
            acquired_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Every slot was held for the whole configured wait.
    #[error("no slot available after {waited:?} ({pool_size} slots held)")]
    Exhausted { waited: Duration, pool_size: u32 },
}

/// Finds and claims free slots out of a fixed pool of size N.
///
/// The store is injected, never reached through ambient state, so tests
/// and single-process deployments substitute [`crate::store::MemoryStore`].
pub struct SlotAllocator {
    store: Arc<dyn SlotStore>,
    config: LockerConfig,
}

impl SlotAllocator {
    pub fn new(store: Arc<dyn SlotStore>, config: LockerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &LockerConfig {
        &self.config
    }

    fn slot_key(&self, slot: SlotId) -> String {
        format!("{}|{}", self.config.prefix, slot)
    }

    fn cursor_key(&self) -> String {
        format!("{}:last_slot", self.config.prefix)
    }

    /// Claim the next free slot, re-polling while the pool is exhausted.
    ///
    /// Never returns without a slot: with no `acquire_timeout` configured
    /// this polls until a holder releases or a TTL reclaims.
    pub async fn reserve_next_available_slot(&self) -> Result<SlotLease, LockError> {
        let started = Instant::now();
        loop {
            if let Some(lease) = self.try_reserve().await? {
                return Ok(lease);
            }

            let waited = started.elapsed();
            if let Some(timeout) = self.config.acquire_timeout {
                if waited >= timeout {
                    return Err(LockError::Exhausted {
                        waited,
                        pool_size: self.config.pool_size,
                    });
                }
            }

            tracing::debug!(
                prefix = %self.config.prefix,
                ?waited,
                "Pool exhausted, backing off"
            );
            tokio::time::sleep(self.config.acquire_backoff).await;
        }
    }

    /// One scan over the pool. Returns `None` when every slot is held.
    async fn try_reserve(&self) -> Result<Option<SlotLease>, LockError> {
        let pool_size = self.config.pool_size;
        let cursor = self.read_cursor().await? % pool_size;

        for step in 1..=pool_size {
            let candidate = SlotId::new((cursor + step - 1) % pool_size + 1);
            let key = self.slot_key(candidate);

            // Fast-path filter only; the claim below is authoritative.
            if self.store.has(&key).await? {
                continue;
            }

            let entry = serde_json::to_value(LockEntry::new())
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            if !self
                .store
                .put_if_absent(&key, entry, Some(self.config.slot_ttl))
                .await?
            {
                // Lost the claim race for this slot, keep scanning.
                continue;
            }

            self.store
                .put(&self.cursor_key(), candidate.get().into(), None)
                .await?;

            tracing::debug!(prefix = %self.config.prefix, slot = %candidate, "Slot reserved");
            return Ok(Some(SlotLease::new(
                candidate,
                key,
                self.cursor_key(),
                self.config.prefix.clone(),
                Arc::clone(&self.store),
            )));
        }

        Ok(None)
    }

    async fn read_cursor(&self) -> Result<u32, LockError> {
        let value = self
            .store
            .remember(&self.cursor_key(), None, 0u32.into())
            .await?;
        Ok(value.as_u64().map(|v| v as u32).unwrap_or(0))
    }
}
