//! Shared slot storage.
//!
//! Workers coordinate exclusively through a key-value store with TTL
//! expiry. Per-key atomicity at the store is the sole correctness
//! mechanism for slot claims: `put_if_absent` must be a single round trip
//! that admits exactly one winner, never a read-modify-write another
//! worker can observe partially.

mod memory;

pub use memory::MemoryStore;

use std::time::Duration;

use serde_json::Value;

/// Errors from the underlying store.
///
/// These are infrastructure errors, not job-logic errors; acquisition
/// attempts that hit them are retried by the surrounding queue's policy.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Key-value backend with TTL expiry.
///
/// An entry whose TTL elapsed is absent for every operation, whether or
/// not the backend has physically removed it.
#[async_trait::async_trait]
pub trait SlotStore: Send + Sync + 'static {
    /// True if `key` is present and unexpired.
    async fn has(&self, key: &str) -> Result<bool, StoreError>;

    /// Read the current value, if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Write `value` under `key`. `ttl: None` writes without expiry.
    async fn put(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Atomically write `value` under `key` iff the key is absent or
    /// expired. Returns true iff the write happened.
    ///
    /// Concurrent calls on one key must admit a single winner.
    async fn put_if_absent(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Delete `key` before its TTL expires. Absent keys are a no-op.
    async fn forget(&self, key: &str) -> Result<(), StoreError>;

    /// Read-or-initialize: writes `init` under `key` if absent, then
    /// returns whatever the key holds.
    async fn remember(
        &self,
        key: &str,
        ttl: Option<Duration>,
        init: Value,
    ) -> Result<Value, StoreError> {
        self.put_if_absent(key, init.clone(), ttl).await?;
        Ok(self.get(key).await?.unwrap_or(init))
    }
}
