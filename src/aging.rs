//! Time-based priority boosting to prevent starvation
//!
//! This module provides the aging policy that automatically raises a
//! resident message's effective priority the longer it waits in the queue.

use serde::{Deserialize, Serialize};

use crate::message::{Message, PRIORITY_MAX};

/// Aging policy configuration
///
/// Every `interval_ms` of residency adds one level to a message's
/// effective priority, capped at [`PRIORITY_MAX`]. An interval of zero
/// disables aging entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgingPolicy {
    interval_ms: u64,
}

impl AgingPolicy {
    /// Create a new aging policy.
    ///
    /// `interval_ms == 0` disables aging.
    pub fn new(interval_ms: u64) -> Self {
        Self { interval_ms }
    }

    /// Create a disabled aging policy.
    pub fn disabled() -> Self {
        Self { interval_ms: 0 }
    }

    /// Whether aging is enabled
    pub fn is_enabled(&self) -> bool {
        self.interval_ms > 0
    }

    /// The configured aging interval in milliseconds (0 = disabled)
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Calculate the effective priority of a message as seen at `now_ms`.
    ///
    /// Returns `min(base + age / interval, PRIORITY_MAX)`; with aging
    /// disabled the base priority is returned unchanged. Pure and
    /// side-effect free so it can be applied inside the queue's critical
    /// section during the dequeue scan.
    pub fn effective_priority(&self, message: &Message, now_ms: i64) -> u8 {
        if self.interval_ms == 0 {
            return message.priority;
        }

        let bonus = message.age_ms(now_ms) / self.interval_ms;
        let bonus = bonus.min(u64::from(PRIORITY_MAX)) as u8;

        message.priority.saturating_add(bonus).min(PRIORITY_MAX)
    }
}

impl Default for AgingPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}
