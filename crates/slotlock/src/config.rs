//! Locker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for one slot pool.
///
/// Independent pools can share a single store backend as long as their
/// prefixes differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockerConfig {
    /// Namespaces the slot keys and the round-robin cursor key.
    pub prefix: String,

    /// Maximum concurrent holders (N). Bounds holders across every worker
    /// process sharing the store, not just this one.
    pub pool_size: u32,

    /// Reclaim deadline for slots never explicitly released.
    ///
    /// Must exceed the longest expected job execution, or a live holder's
    /// slot can be claimed out from under it.
    pub slot_ttl: Duration,

    /// Re-poll interval while the pool is exhausted.
    pub acquire_backoff: Duration,

    /// Give up waiting after this long. `None` polls until a slot frees.
    pub acquire_timeout: Option<Duration>,
}

impl Default for LockerConfig {
    fn default() -> Self {
        Self {
            prefix: "locker".to_string(),
            pool_size: 10,
            slot_ttl: Duration::from_secs(60),
            acquire_backoff: Duration::from_millis(50),
            acquire_timeout: None,
        }
    }
}

impl LockerConfig {
    /// Validate at setup time, so misconfiguration never turns into
    /// silent unlocked execution at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix.is_empty() || self.prefix.contains(['|', ':']) {
            return Err(ConfigError::InvalidPrefix(self.prefix.clone()));
        }
        if self.pool_size == 0 {
            return Err(ConfigError::ZeroPoolSize);
        }
        if self.slot_ttl.is_zero() {
            return Err(ConfigError::ZeroTtl);
        }
        if self.acquire_backoff.is_zero() {
            return Err(ConfigError::ZeroBackoff);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("prefix {0:?} must be non-empty and free of '|' and ':'")]
    InvalidPrefix(String),

    #[error("pool_size must be at least 1")]
    ZeroPoolSize,

    #[error("slot_ttl must be non-zero")]
    ZeroTtl,

    #[error("acquire_backoff must be non-zero")]
    ZeroBackoff,
}
