//! Simulation configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Hard limits on runtime parameters
pub mod limits {
    /// Minimum number of producer tasks
    pub const MIN_PRODUCERS: usize = 1;
    /// Maximum number of producer tasks
    pub const MAX_PRODUCERS: usize = 10;
    /// Minimum number of consumer tasks
    pub const MIN_CONSUMERS: usize = 1;
    /// Maximum number of consumer tasks
    pub const MAX_CONSUMERS: usize = 3;
    /// Minimum queue capacity
    pub const MIN_CAPACITY: usize = 1;
    /// Maximum queue capacity
    pub const MAX_CAPACITY: usize = 20;
    /// Minimum simulation runtime in seconds
    pub const MIN_TIMEOUT_SECS: u64 = 1;
}

/// Simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Number of producer tasks (1..=10)
    pub producers: usize,
    /// Number of consumer tasks (1..=3)
    pub consumers: usize,
    /// Queue capacity (1..=20)
    pub capacity: usize,
    /// Simulation runtime before orderly shutdown
    pub timeout: Duration,
    /// RNG seed for deterministic payload/priority/sleep generation
    pub seed: Option<u64>,
    /// Aging interval in milliseconds (0 disables aging)
    pub aging_interval_ms: u64,
    /// Maximum producer sleep between messages
    pub producer_max_wait: Duration,
    /// Maximum consumer sleep between messages
    pub consumer_max_wait: Duration,
    /// Interval between queue occupancy samples
    pub sample_interval: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            producers: 2,
            consumers: 2,
            capacity: 10,
            timeout: Duration::from_secs(10),
            seed: None,
            aging_interval_ms: 0,
            producer_max_wait: Duration::from_secs(2),
            consumer_max_wait: Duration::from_secs(4),
            sample_interval: Duration::from_secs(1),
        }
    }
}

impl SimConfig {
    /// Create a configuration from the four required runtime parameters,
    /// with all options at their defaults.
    pub fn new(producers: usize, consumers: usize, capacity: usize, timeout: Duration) -> Self {
        Self {
            producers,
            consumers,
            capacity,
            timeout,
            ..Self::default()
        }
    }

    /// Set the RNG seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the aging interval in milliseconds (0 disables aging)
    pub fn with_aging_interval_ms(mut self, interval_ms: u64) -> Self {
        self.aging_interval_ms = interval_ms;
        self
    }

    /// Set the maximum producer sleep between messages
    pub fn with_producer_max_wait(mut self, wait: Duration) -> Self {
        self.producer_max_wait = wait;
        self
    }

    /// Set the maximum consumer sleep between messages
    pub fn with_consumer_max_wait(mut self, wait: Duration) -> Self {
        self.consumer_max_wait = wait;
        self
    }

    /// Check all parameters against the limits in [`limits`].
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<()> {
        if !(limits::MIN_PRODUCERS..=limits::MAX_PRODUCERS).contains(&self.producers) {
            return Err(SimError::InvalidInput(format!(
                "producers must be between {} and {} (got {})",
                limits::MIN_PRODUCERS,
                limits::MAX_PRODUCERS,
                self.producers
            )));
        }

        if !(limits::MIN_CONSUMERS..=limits::MAX_CONSUMERS).contains(&self.consumers) {
            return Err(SimError::InvalidInput(format!(
                "consumers must be between {} and {} (got {})",
                limits::MIN_CONSUMERS,
                limits::MAX_CONSUMERS,
                self.consumers
            )));
        }

        if !(limits::MIN_CAPACITY..=limits::MAX_CAPACITY).contains(&self.capacity) {
            return Err(SimError::InvalidCapacity(self.capacity));
        }

        if self.timeout < Duration::from_secs(limits::MIN_TIMEOUT_SECS) {
            return Err(SimError::InvalidInput(format!(
                "timeout must be at least {} second(s) (got {:?})",
                limits::MIN_TIMEOUT_SECS,
                self.timeout
            )));
        }

        Ok(())
    }
}
