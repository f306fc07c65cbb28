//! Producer and consumer worker tasks
//!
//! Producers and consumers are symmetric loops over the queue operations
//! with bounded random sleeps. Both poll the shared running flag at the
//! loop head and inside their sleep (200 ms granularity), and both exit on
//! the first `Shutdown` result from the queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::analytics::Analytics;
use crate::error::SimError;
use crate::message::{Message, PAYLOAD_MAX, PRIORITY_MAX};
use crate::queue::MessageQueue;

/// Granularity at which a sleeping worker re-checks the running flag
pub const POLL_CHUNK: Duration = Duration::from_millis(200);

/// RNG stream offset separating consumer streams from producer streams
/// under the same base seed
const CONSUMER_STREAM: u64 = 1 << 32;

/// Per-worker counters, read only after the worker has exited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    /// Worker identifier (1..=N within its role)
    pub id: usize,
    /// Messages successfully produced or consumed
    pub messages: u64,
    /// Times the worker was forced to wait on the queue
    pub times_blocked: u64,
}

impl WorkerStats {
    fn new(id: usize) -> Self {
        Self {
            id,
            messages: 0,
            times_blocked: 0,
        }
    }
}

/// Derive a worker's RNG from the base seed and its stream number.
///
/// A fixed base seed makes every worker's generation sequence exactly
/// reproducible across runs; without a seed each worker draws from OS
/// entropy.
fn worker_rng(seed: Option<u64>, stream: u64) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
        None => StdRng::from_entropy(),
    }
}

/// Producer loop: generate a message, enqueue it, sleep, repeat.
///
/// Exits when the running flag clears or the queue reports shutdown, and
/// returns its counters.
pub async fn run_producer(
    id: usize,
    queue: Arc<MessageQueue>,
    analytics: Arc<Analytics>,
    running: Arc<AtomicBool>,
    max_wait: Duration,
    seed: Option<u64>,
) -> WorkerStats {
    let mut rng = worker_rng(seed, id as u64);
    let mut stats = WorkerStats::new(id);

    tracing::info!(producer = id, "started");

    while running.load(Ordering::Relaxed) {
        let payload = rng.gen_range(0..=PAYLOAD_MAX);
        let priority = rng.gen_range(0..=PRIORITY_MAX);
        let message = Message::new(payload, priority, id);

        match queue.enqueue(message).await {
            Ok(receipt) => {
                if receipt.blocked {
                    stats.times_blocked += 1;
                    analytics.record_producer_block().await;
                    tracing::debug!(producer = id, "blocked on full queue");
                }
                stats.messages += 1;
                analytics.record_produce().await;
                tracing::info!(
                    producer = id,
                    priority,
                    payload,
                    occupancy = queue.occupancy(),
                    capacity = queue.capacity(),
                    "wrote message"
                );
            }
            Err(SimError::Shutdown) => break,
            Err(err) => {
                tracing::error!(producer = id, %err, "enqueue failed");
                break;
            }
        }

        let pause = rng.gen_range(Duration::ZERO..=max_wait);
        interruptible_sleep(pause, &running).await;
    }

    tracing::info!(
        producer = id,
        messages = stats.messages,
        blocked = stats.times_blocked,
        "stopped"
    );

    stats
}

/// Consumer loop: dequeue the most important message, record its latency,
/// sleep, repeat.
///
/// Exits when the running flag clears or the queue reports shutdown, and
/// returns its counters.
pub async fn run_consumer(
    id: usize,
    queue: Arc<MessageQueue>,
    analytics: Arc<Analytics>,
    running: Arc<AtomicBool>,
    max_wait: Duration,
    seed: Option<u64>,
) -> WorkerStats {
    let mut rng = worker_rng(seed, CONSUMER_STREAM + id as u64);
    let mut stats = WorkerStats::new(id);

    tracing::info!(consumer = id, "started");

    while running.load(Ordering::Relaxed) {
        match queue.dequeue().await {
            Ok(receipt) => {
                if receipt.blocked {
                    stats.times_blocked += 1;
                    analytics.record_consumer_block().await;
                    tracing::debug!(consumer = id, wait_ms = receipt.wait_ms, "blocked on empty queue");
                }
                stats.messages += 1;

                let now_ms = Utc::now().timestamp_millis();
                let latency_ms = receipt.message.age_ms(now_ms);
                analytics.record_consume().await;
                analytics.record_latency(latency_ms).await;

                tracing::info!(
                    consumer = id,
                    producer = receipt.message.producer,
                    priority = receipt.message.priority,
                    payload = receipt.message.payload,
                    latency_ms,
                    occupancy = queue.occupancy(),
                    capacity = queue.capacity(),
                    "read message"
                );
            }
            Err(SimError::Shutdown) => break,
            Err(err) => {
                tracing::error!(consumer = id, %err, "dequeue failed");
                break;
            }
        }

        let pause = rng.gen_range(Duration::ZERO..=max_wait);
        interruptible_sleep(pause, &running).await;
    }

    tracing::info!(
        consumer = id,
        messages = stats.messages,
        blocked = stats.times_blocked,
        "stopped"
    );

    stats
}

/// Sleep for `total`, subdivided into [`POLL_CHUNK`] steps so the caller
/// observes a cleared running flag within roughly one chunk.
async fn interruptible_sleep(total: Duration, running: &AtomicBool) {
    let mut remaining = total;
    while !remaining.is_zero() && running.load(Ordering::Relaxed) {
        let step = remaining.min(POLL_CHUNK);
        tokio::time::sleep(step).await;
        remaining = remaining.saturating_sub(step);
    }
}
