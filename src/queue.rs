//! Core bounded queue with priority extraction and blocking operations
//!
//! The queue follows the counting-semaphore pattern: a `slots` semaphore
//! tracks free capacity, an `items` semaphore tracks stored messages, and a
//! mutex protects the buffer itself. Both blocking operations first attempt
//! a non-blocking acquire; the outcome of that attempt is the contract's
//! only source of the "this caller had to wait" signal.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{Mutex, Semaphore, SemaphorePermit, TryAcquireError};

use crate::aging::AgingPolicy;
use crate::config::limits;
use crate::error::{Result, SimError};
use crate::message::Message;

/// Outcome of a successful enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueReceipt {
    /// True iff the caller had to wait for a free slot
    pub blocked: bool,
}

/// Outcome of a successful dequeue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DequeueReceipt {
    /// The extracted message
    pub message: Message,
    /// True iff the caller had to wait for an item
    pub blocked: bool,
    /// Time between entering the call and obtaining the message
    /// (0 when the caller did not block)
    pub wait_ms: u64,
}

/// Bounded, priority-aware message queue
///
/// Safe to call concurrently from any number of tasks. Dequeue hands out
/// the message with the highest *effective* priority (base priority plus
/// any aging bonus), ties broken oldest-timestamp-first.
pub struct MessageQueue {
    buffer: Mutex<VecDeque<Message>>,
    /// Free capacity; initial value = capacity
    slots: Semaphore,
    /// Stored messages; initial value = 0
    items: Semaphore,
    capacity: usize,
    aging: AgingPolicy,
    /// Occupancy mirror maintained inside the critical section so
    /// observers never need the buffer mutex
    occupancy: AtomicUsize,
    is_shutting_down: AtomicBool,
}

impl MessageQueue {
    /// Create a new queue.
    ///
    /// Capacity must lie within `1..=20`.
    pub fn new(capacity: usize, aging: AgingPolicy) -> Result<Self> {
        if !(limits::MIN_CAPACITY..=limits::MAX_CAPACITY).contains(&capacity) {
            return Err(SimError::InvalidCapacity(capacity));
        }

        Ok(Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            slots: Semaphore::new(capacity),
            items: Semaphore::new(0),
            capacity,
            aging,
            occupancy: AtomicUsize::new(0),
            is_shutting_down: AtomicBool::new(false),
        })
    }

    /// Maximum number of resident messages
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of resident messages.
    ///
    /// Read without taking the buffer mutex; the value may be stale by the
    /// time the caller acts on it.
    pub fn occupancy(&self) -> usize {
        self.occupancy.load(Ordering::Relaxed)
    }

    /// True when no messages are resident
    pub fn is_empty(&self) -> bool {
        self.occupancy() == 0
    }

    /// True when the queue is at capacity
    pub fn is_full(&self) -> bool {
        self.occupancy() >= self.capacity
    }

    /// The queue's aging policy
    pub fn aging(&self) -> &AgingPolicy {
        &self.aging
    }

    /// Check if shutdown has been requested
    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::SeqCst)
    }

    /// Add a message, waiting for a free slot if necessary.
    ///
    /// The receipt's `blocked` flag is true iff the initial non-blocking
    /// slot acquire failed. Returns [`SimError::Shutdown`] without storing
    /// the message once shutdown has been requested, including for callers
    /// that were parked when it arrived.
    pub async fn enqueue(&self, message: Message) -> Result<EnqueueReceipt> {
        if self.is_shutting_down() {
            return Err(SimError::Shutdown);
        }

        let (permit, blocked) = self.acquire(&self.slots).await?;

        // Shutdown may have landed between the acquire and here; dropping
        // the permit returns the slot token before reporting it.
        if self.is_shutting_down() {
            drop(permit);
            return Err(SimError::Shutdown);
        }

        {
            let mut buffer = self.buffer.lock().await;
            buffer.push_back(message);
            self.occupancy.store(buffer.len(), Ordering::Relaxed);
        }

        permit.forget();
        self.items.add_permits(1);

        tracing::trace!(
            producer = message.producer,
            priority = message.priority,
            blocked,
            "message enqueued"
        );

        Ok(EnqueueReceipt { blocked })
    }

    /// Remove and return the most important message, waiting for one if
    /// necessary.
    ///
    /// Selection uses the effective priority (aging applied with a single
    /// `now` captured inside the critical section, so a concurrent enqueue
    /// cannot change the set mid-scan), ties broken oldest first.
    pub async fn dequeue(&self) -> Result<DequeueReceipt> {
        let entered = Instant::now();

        let (permit, blocked) = self.acquire(&self.items).await?;

        if self.is_shutting_down() {
            drop(permit);
            return Err(SimError::Shutdown);
        }

        let message = {
            let mut buffer = self.buffer.lock().await;
            let now_ms = Utc::now().timestamp_millis();

            let index = match Self::select_index(&buffer, &self.aging, now_ms) {
                Some(index) => index,
                // An items permit without a stored message means the
                // accounting invariant broke; the dropped permit restores
                // the token before the fault is reported.
                None => {
                    return Err(SimError::Internal(
                        "items token held but no message stored".to_string(),
                    ))
                }
            };

            let message = match buffer.remove(index) {
                Some(message) => message,
                None => {
                    return Err(SimError::Internal(
                        "priority scan produced an out-of-range index".to_string(),
                    ))
                }
            };
            self.occupancy.store(buffer.len(), Ordering::Relaxed);
            message
        };

        permit.forget();
        self.slots.add_permits(1);

        let wait_ms = if blocked {
            entered.elapsed().as_millis() as u64
        } else {
            0
        };

        tracing::trace!(
            producer = message.producer,
            priority = message.priority,
            blocked,
            wait_ms,
            "message dequeued"
        );

        Ok(DequeueReceipt {
            message,
            blocked,
            wait_ms,
        })
    }

    /// Request shutdown. Idempotent.
    ///
    /// Sets the shutdown flag, then closes both semaphores so that every
    /// currently-parked caller wakes and observes [`SimError::Shutdown`].
    /// Resident messages stay in the buffer for the final balance check.
    pub fn shutdown(&self) {
        if self.is_shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        // Closing wakes all current and future waiters on both semaphores.
        self.slots.close();
        self.items.close();

        tracing::debug!(residual = self.occupancy(), "queue shutdown requested");
    }

    /// Try-then-wait acquire. The failed first attempt is the sole source
    /// of the `blocked` signal.
    async fn acquire<'a>(&self, semaphore: &'a Semaphore) -> Result<(SemaphorePermit<'a>, bool)> {
        match semaphore.try_acquire() {
            Ok(permit) => Ok((permit, false)),
            Err(TryAcquireError::Closed) => Err(SimError::Shutdown),
            Err(TryAcquireError::NoPermits) => match semaphore.acquire().await {
                Ok(permit) => Ok((permit, true)),
                Err(_) => Err(SimError::Shutdown),
            },
        }
    }

    fn select_index(buffer: &VecDeque<Message>, aging: &AgingPolicy, now_ms: i64) -> Option<usize> {
        let mut best: Option<(usize, u8, i64)> = None;

        for (index, message) in buffer.iter().enumerate() {
            let effective = aging.effective_priority(message, now_ms);

            let better = match best {
                None => true,
                Some((_, best_priority, best_timestamp)) => {
                    effective > best_priority
                        || (effective == best_priority && message.timestamp_ms < best_timestamp)
                }
            };

            if better {
                best = Some((index, effective, message.timestamp_ms));
            }
        }

        best.map(|(index, _, _)| index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn queue(capacity: usize) -> MessageQueue {
        MessageQueue::new(capacity, AgingPolicy::disabled()).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_capacity() {
        assert!(matches!(
            MessageQueue::new(0, AgingPolicy::disabled()),
            Err(SimError::InvalidCapacity(0))
        ));
        assert!(matches!(
            MessageQueue::new(21, AgingPolicy::disabled()),
            Err(SimError::InvalidCapacity(21))
        ));
    }

    #[test]
    fn test_new_accepts_boundary_capacities() {
        assert!(MessageQueue::new(1, AgingPolicy::disabled()).is_ok());
        assert!(MessageQueue::new(20, AgingPolicy::disabled()).is_ok());
    }

    #[tokio::test]
    async fn test_enqueue_dequeue_roundtrip() {
        let q = queue(5);
        assert!(q.is_empty());

        let receipt = q.enqueue(Message::new(4, 2, 1)).await.unwrap();
        assert!(!receipt.blocked);
        assert_eq!(q.occupancy(), 1);

        let receipt = q.dequeue().await.unwrap();
        assert!(!receipt.blocked);
        assert_eq!(receipt.wait_ms, 0);
        assert_eq!(receipt.message.payload, 4);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_priority_dominance_with_aging_off() {
        // Enqueue order 2, 7, 1, 9, 5; expected dequeue order 9, 7, 5, 2, 1
        let q = queue(5);
        for (i, priority) in [2u8, 7, 1, 9, 5].into_iter().enumerate() {
            q.enqueue(Message::with_timestamp(0, priority, 1, i as i64))
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(q.dequeue().await.unwrap().message.priority);
        }
        assert_eq!(seen, vec![9, 7, 5, 2, 1]);
    }

    #[tokio::test]
    async fn test_fifo_within_priority_band() {
        // Three priority-5 messages from producers 1, 2, 3 come back in
        // enqueue order.
        let q = queue(5);
        for (producer, ts) in [(1usize, 100i64), (2, 200), (3, 300)] {
            q.enqueue(Message::with_timestamp(0, 5, producer, ts))
                .await
                .unwrap();
        }

        let mut producers = Vec::new();
        for _ in 0..3 {
            producers.push(q.dequeue().await.unwrap().message.producer);
        }
        assert_eq!(producers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_fifo_preserved_on_equal_timestamps() {
        let q = queue(5);
        for producer in 1..=3usize {
            q.enqueue(Message::with_timestamp(0, 5, producer, 1_000))
                .await
                .unwrap();
        }

        let mut producers = Vec::new();
        for _ in 0..3 {
            producers.push(q.dequeue().await.unwrap().message.producer);
        }
        assert_eq!(producers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_aging_promotes_old_low_priority_message() {
        let q = MessageQueue::new(5, AgingPolicy::new(50)).unwrap();
        let now = Utc::now().timestamp_millis();

        // Priority 1, resident for one second: effective 1 + 20 -> capped 9.
        q.enqueue(Message::with_timestamp(1, 1, 1, now - 1_000))
            .await
            .unwrap();
        // Fresh priority 5.
        q.enqueue(Message::with_timestamp(2, 5, 2, now))
            .await
            .unwrap();

        let first = q.dequeue().await.unwrap().message;
        assert_eq!(first.producer, 1);
        assert_eq!(first.payload, 1);
    }

    #[tokio::test]
    async fn test_enqueue_blocked_flag_set_when_full() {
        let q = Arc::new(queue(1));
        q.enqueue(Message::new(0, 0, 1)).await.unwrap();
        assert!(q.is_full());

        let q2 = Arc::clone(&q);
        let writer = tokio::spawn(async move { q2.enqueue(Message::new(1, 1, 2)).await });

        // Free a slot after the writer has had time to park.
        tokio::time::sleep(Duration::from_millis(50)).await;
        q.dequeue().await.unwrap();

        let receipt = writer.await.unwrap().unwrap();
        assert!(receipt.blocked);
        assert_eq!(q.occupancy(), 1);
    }

    #[tokio::test]
    async fn test_dequeue_blocked_flag_and_wait_time() {
        let q = Arc::new(queue(1));

        let q2 = Arc::clone(&q);
        let reader = tokio::spawn(async move { q2.dequeue().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        q.enqueue(Message::new(7, 3, 1)).await.unwrap();

        let receipt = reader.await.unwrap().unwrap();
        assert!(receipt.blocked);
        assert!(receipt.wait_ms >= 20);
        assert_eq!(receipt.message.payload, 7);
    }

    #[tokio::test]
    async fn test_unblocked_operations_report_not_blocked() {
        let q = queue(2);
        assert!(!q.enqueue(Message::new(0, 0, 1)).await.unwrap().blocked);
        assert!(!q.enqueue(Message::new(0, 0, 1)).await.unwrap().blocked);
        let receipt = q.dequeue().await.unwrap();
        assert!(!receipt.blocked);
        assert_eq!(receipt.wait_ms, 0);
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_fails() {
        let q = queue(5);
        q.shutdown();
        assert!(matches!(
            q.enqueue(Message::new(0, 0, 1)).await,
            Err(SimError::Shutdown)
        ));
    }

    #[tokio::test]
    async fn test_dequeue_after_shutdown_fails() {
        let q = queue(5);
        q.enqueue(Message::new(0, 0, 1)).await.unwrap();
        q.shutdown();
        assert!(matches!(q.dequeue().await, Err(SimError::Shutdown)));
        // Residual stays resident for the balance check
        assert_eq!(q.occupancy(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_wakes_parked_enqueuer() {
        let q = Arc::new(queue(1));
        q.enqueue(Message::new(0, 0, 1)).await.unwrap();

        let q2 = Arc::clone(&q);
        let writer = tokio::spawn(async move { q2.enqueue(Message::new(1, 1, 2)).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        q.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(2), writer)
            .await
            .expect("parked enqueuer must wake after shutdown")
            .unwrap();
        assert!(matches!(result, Err(SimError::Shutdown)));
        // The message was not stored
        assert_eq!(q.occupancy(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_wakes_parked_dequeuer() {
        let q = Arc::new(queue(1));

        let q2 = Arc::clone(&q);
        let reader = tokio::spawn(async move { q2.dequeue().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        q.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(2), reader)
            .await
            .expect("parked dequeuer must wake after shutdown")
            .unwrap();
        assert!(matches!(result, Err(SimError::Shutdown)));
    }

    #[tokio::test]
    async fn test_shutdown_wakes_many_parked_waiters() {
        let q = Arc::new(queue(1));
        q.enqueue(Message::new(0, 0, 1)).await.unwrap();

        let mut handles = Vec::new();
        for id in 0..4usize {
            let q2 = Arc::clone(&q);
            handles.push(tokio::spawn(async move {
                q2.enqueue(Message::new(0, 0, id + 2)).await.map(|_| ())
            }));
        }
        for _ in 0..3 {
            let q2 = Arc::clone(&q);
            handles.push(tokio::spawn(async move {
                q2.dequeue().await.map(|_| ())
            }));
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        q.shutdown();

        for handle in handles {
            let joined = tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .expect("every parked waiter must wake after shutdown");
            assert!(joined.is_ok());
        }
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let q = queue(3);
        q.enqueue(Message::new(0, 0, 1)).await.unwrap();

        q.shutdown();
        let occupancy_after_first = q.occupancy();
        q.shutdown();

        assert!(q.is_shutting_down());
        assert_eq!(q.occupancy(), occupancy_after_first);
        assert!(matches!(q.dequeue().await, Err(SimError::Shutdown)));
    }

    #[tokio::test]
    async fn test_occupancy_tracks_buffer() {
        let q = queue(4);
        for i in 0..4u8 {
            q.enqueue(Message::new(i, i, 1)).await.unwrap();
            assert_eq!(q.occupancy(), usize::from(i) + 1);
        }
        assert!(q.is_full());
        for i in (0..4usize).rev() {
            q.dequeue().await.unwrap();
            assert_eq!(q.occupancy(), i);
        }
    }

    #[tokio::test]
    async fn test_concurrent_producers_consumers_conserve_messages() {
        let q = Arc::new(queue(4));
        let per_producer = 50usize;

        let mut producers = Vec::new();
        for id in 1..=3usize {
            let q2 = Arc::clone(&q);
            producers.push(tokio::spawn(async move {
                for i in 0..per_producer {
                    q2.enqueue(Message::new((i % 10) as u8, (i % 10) as u8, id))
                        .await
                        .unwrap();
                }
            }));
        }

        let consumed = Arc::new(AtomicUsize::new(0));
        let mut consumers = Vec::new();
        for _ in 0..2 {
            let q2 = Arc::clone(&q);
            let counter = Arc::clone(&consumed);
            consumers.push(tokio::spawn(async move {
                while q2.dequeue().await.is_ok() {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }

        for handle in producers {
            handle.await.unwrap();
        }
        // Let the consumers drain what remains, then stop them.
        tokio::time::sleep(Duration::from_millis(100)).await;
        q.shutdown();
        for handle in consumers {
            tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .unwrap()
                .unwrap();
        }

        let total = consumed.load(Ordering::SeqCst) + q.occupancy();
        assert_eq!(total, 3 * per_producer);
    }
}
