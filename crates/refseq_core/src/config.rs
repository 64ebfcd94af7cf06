//! Runtime configuration for storage and reference allocation.
//!
//! # Responsibility
//! - Hold tunables shared by the store, the allocator and the hooks.
//! - Provide defaults usable without any configuration source.
//!
//! # Invariants
//! - `RetryPolicy::max_attempts` is at least 1 after normalization.
//! - Configuration values are plain data; loading them from CLI/env is the
//!   caller's concern.

use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_MS: u64 = 10;

/// Top-level configuration for a reference allocation deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RefseqConfig {
    pub store: StoreConfig,
    pub reference: ReferenceConfig,
}

/// Durable store settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long a connection waits on a locked database before giving up.
    pub busy_timeout_ms: u64,
}

impl StoreConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Allocation behavior settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    /// Create a project's sequence on first allocation when it is missing.
    ///
    /// Off by default: only project creation provisions a sequence, and an
    /// item of a project without one fails with `SequenceMissing`.
    pub lazy_sequence_creation: bool,
    /// Retry policy applied to sequence creation and increments.
    pub retry: RetryPolicy,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            lazy_sequence_creation: false,
            retry: RetryPolicy::default(),
        }
    }
}

/// Bounded retry for transient store unavailability.
///
/// Backoff grows linearly with the attempt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl RetryPolicy {
    /// Effective attempt count, never zero.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_ms: DEFAULT_BACKOFF_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RefseqConfig, RetryPolicy};
    use std::time::Duration;

    #[test]
    fn defaults_disable_lazy_creation_and_bound_retries() {
        let config = RefseqConfig::default();
        assert!(!config.reference.lazy_sequence_creation);
        assert_eq!(config.reference.retry.max_attempts, 3);
        assert_eq!(config.store.busy_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let policy = RetryPolicy {
            max_attempts: 0,
            backoff_ms: 5,
        };
        assert_eq!(policy.attempts(), 1);
        assert_eq!(policy.delay_after(3), Duration::from_millis(15));
    }
}
