//! Configuration for pools, retries and cell arrays
//!
//! All configs are plain data with sensible defaults and serde support, so
//! they can be embedded in a host application's own configuration file.

use serde::{Deserialize, Serialize};

/// Default number of donated cells a pool keeps for reuse
pub const DEFAULT_POOL_CAPACITY: usize = 64;

/// Cell pool configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of idle cells kept for reuse (0 disables pooling)
    pub capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_POOL_CAPACITY,
        }
    }
}

impl PoolConfig {
    /// A pool that never retains cells
    pub fn disabled() -> Self {
        Self { capacity: 0 }
    }
}

/// Retry policy for `atomically`-style helpers
///
/// `max_attempts: None` retries until a commit succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Upper bound on commit attempts
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Retry until success
    pub fn unbounded() -> Self {
        Self { max_attempts: None }
    }

    /// Give up after `attempts` failed commits
    pub fn limited(attempts: u32) -> Self {
        Self {
            max_attempts: Some(attempts),
        }
    }

    /// Check whether another attempt is allowed after `attempts` failures
    pub fn allows(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }
}

/// Lazy cell array configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrayConfig {
    /// Fixed number of slots
    pub capacity: usize,
    /// Pool backing cell creation and donation
    pub pool: PoolConfig,
}

impl Default for ArrayConfig {
    fn default() -> Self {
        Self {
            capacity: 16,
            pool: PoolConfig::default(),
        }
    }
}
