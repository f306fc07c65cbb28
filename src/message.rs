//! Message value type carried through the queue

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Highest payload value produced by the simulation
pub const PAYLOAD_MAX: u8 = 9;

/// Highest priority level (9 = most important)
pub const PRIORITY_MAX: u8 = 9;

/// A single work item in the system.
///
/// Immutable once created. Carries the payload, its base priority, the
/// producer that created it, and a wall-clock creation timestamp in
/// milliseconds used for aging and latency measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Payload value (0..=9)
    pub payload: u8,
    /// Base priority level (0..=9, higher = more important)
    pub priority: u8,
    /// Identifier of the producer that created this message (1..=N)
    pub producer: usize,
    /// Creation time, wall-clock milliseconds
    pub timestamp_ms: i64,
}

impl Message {
    /// Create a message stamped with the current wall-clock time.
    ///
    /// Priorities above [`PRIORITY_MAX`] are clamped.
    pub fn new(payload: u8, priority: u8, producer: usize) -> Self {
        Self::with_timestamp(payload, priority, producer, Utc::now().timestamp_millis())
    }

    /// Create a message with an explicit creation timestamp.
    pub fn with_timestamp(payload: u8, priority: u8, producer: usize, timestamp_ms: i64) -> Self {
        Self {
            payload,
            priority: priority.min(PRIORITY_MAX),
            producer,
            timestamp_ms,
        }
    }

    /// Milliseconds this message has been resident, as seen at `now_ms`.
    ///
    /// Clock skew can make `now_ms` precede the creation stamp; the age
    /// saturates at zero in that case.
    pub fn age_ms(&self, now_ms: i64) -> u64 {
        (now_ms - self.timestamp_ms).max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_new_stamps_current_time() {
        let before = Utc::now().timestamp_millis();
        let msg = Message::new(5, 7, 1);
        let after = Utc::now().timestamp_millis();

        assert_eq!(msg.payload, 5);
        assert_eq!(msg.priority, 7);
        assert_eq!(msg.producer, 1);
        assert!(msg.timestamp_ms >= before);
        assert!(msg.timestamp_ms <= after);
    }

    #[test]
    fn test_message_priority_clamped() {
        let msg = Message::new(0, 42, 1);
        assert_eq!(msg.priority, PRIORITY_MAX);
    }

    #[test]
    fn test_message_age() {
        let msg = Message::with_timestamp(0, 0, 1, 1_000);
        assert_eq!(msg.age_ms(1_500), 500);
        assert_eq!(msg.age_ms(1_000), 0);
    }

    #[test]
    fn test_message_age_saturates_on_clock_skew() {
        let msg = Message::with_timestamp(0, 0, 1, 2_000);
        assert_eq!(msg.age_ms(1_000), 0);
    }

    #[test]
    fn test_message_serialization() {
        let msg = Message::with_timestamp(3, 8, 2, 12_345);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"payload\":3"));
        assert!(json.contains("\"priority\":8"));

        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }
}
