//! # Pool Configuration
//!
//! Serde-friendly settings for a `Pool`. Durations are stored as integer
//! milliseconds so configs stay plain JSON/TOML numbers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, PoolResult};

/// Pool sizing and maintenance policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Idle connections above this count are trimmed by maintenance.
    /// Does not limit acquisition.
    pub max_idle: usize,
    /// Hard ceiling on simultaneously dialed connections (idle + in use).
    pub max_active: usize,
    /// How long `get` waits at the ceiling. Zero waits forever.
    pub wait_timeout_ms: u64,
    /// Consecutive over-`max_idle` ticks tolerated before one eviction.
    pub idle_life_ticks: u32,
    /// Each tick probes `idle / ping_period + 1` idle connections.
    pub ping_period: usize,
    /// Interval between maintenance ticks.
    pub tick_interval_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_idle: 8,
            max_active: 16,
            wait_timeout_ms: 0,
            idle_life_ticks: 10,
            ping_period: 20,
            tick_interval_ms: 1_000,
        }
    }
}

impl PoolConfig {
    /// Default policy with the given capacities.
    pub fn new(max_idle: usize, max_active: usize) -> Self {
        PoolConfig {
            max_idle,
            max_active,
            ..PoolConfig::default()
        }
    }

    /// Sets the ceiling wait; `Duration::ZERO` waits forever.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout_ms = duration_millis(timeout);
        self
    }

    /// Sets the maintenance tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval_ms = duration_millis(interval);
        self
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Rejects values the pool cannot run with.
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_active == 0 {
            return Err(PoolError::Config("max_active must be at least 1".into()));
        }
        if self.ping_period == 0 {
            return Err(PoolError::Config("ping_period must be at least 1".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(PoolError::Config("tick_interval_ms must be at least 1".into()));
        }
        Ok(())
    }
}

/// Whole milliseconds, rounding a non-zero sub-millisecond duration up so it
/// never reads as zero. Saturates at `u64::MAX`.
pub(crate) fn duration_millis(duration: Duration) -> u64 {
    if duration.is_zero() {
        return 0;
    }
    u64::try_from(duration.as_millis())
        .unwrap_or(u64::MAX)
        .max(1)
}
