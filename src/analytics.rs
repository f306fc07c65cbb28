//! Analytics collection and reporting for queue observability
//!
//! A single background sampler task records queue occupancy on a fixed
//! interval, while workers push produce/consume/block/latency events
//! through thread-safe record operations. All derived figures are computed
//! at the end of the run with division-by-zero guards throughout.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use crate::config::limits;
use crate::error::Result;
use crate::queue::MessageQueue;

/// Upper bound on stored occupancy samples; one sample per second covers a
/// ten-minute run. Samples past the bound are dropped silently.
pub const MAX_SAMPLES: usize = 600;

/// Default interval between occupancy samples
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// A snapshot of queue state at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QueueSample {
    /// Seconds since the run started
    pub t: f64,
    /// Number of resident messages
    pub occupancy: usize,
    /// Queue capacity at that moment
    pub capacity: usize,
}

/// Mutable aggregate state, guarded by the analytics mutex
#[derive(Debug)]
struct AnalyticsState {
    samples: Vec<QueueSample>,
    occupancy_sum: u64,
    max_occupancy: usize,
    min_occupancy: usize,
    full_samples: usize,
    empty_samples: usize,
    total_produced: u64,
    total_consumed: u64,
    producer_blocks: u64,
    consumer_blocks: u64,
    latency_sum_ms: u64,
    latency_count: u64,
    min_latency_ms: u64,
    max_latency_ms: u64,
    end_time: Option<f64>,
}

/// Analytics collector
///
/// Owned by the supervisor and shared with workers and the sampler via
/// `Arc`. The record operations take only the analytics mutex; the sampler
/// reads occupancy through the queue's lock-free mirror.
pub struct Analytics {
    state: Mutex<AnalyticsState>,
    started: Instant,
    capacity: usize,
    producers: usize,
    consumers: usize,
    sample_interval: Duration,
    sampling_active: AtomicBool,
    stop_notify: Notify,
}

impl Analytics {
    /// Create a new analytics collector for a run with the given shape.
    pub fn new(
        capacity: usize,
        producers: usize,
        consumers: usize,
        sample_interval: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(AnalyticsState {
                samples: Vec::new(),
                occupancy_sum: 0,
                max_occupancy: 0,
                // Start at capacity so the first real sample becomes the
                // minimum.
                min_occupancy: capacity,
                full_samples: 0,
                empty_samples: 0,
                total_produced: 0,
                total_consumed: 0,
                producer_blocks: 0,
                consumer_blocks: 0,
                latency_sum_ms: 0,
                latency_count: 0,
                min_latency_ms: u64::MAX,
                max_latency_ms: 0,
                end_time: None,
            }),
            started: Instant::now(),
            capacity,
            producers,
            consumers,
            sample_interval,
            sampling_active: AtomicBool::new(false),
            stop_notify: Notify::new(),
        }
    }

    /// Seconds elapsed since this collector was created
    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Spawn the background sampler task.
    ///
    /// Every sample interval it reads the queue's occupancy mirror (no
    /// queue mutex involved; a stale read is acceptable for observation)
    /// and appends a bounded time-series record. The task exits when
    /// [`Analytics::stop_sampling`] is called.
    pub fn start_sampling(self: &Arc<Self>, queue: Arc<MessageQueue>) -> JoinHandle<()> {
        self.sampling_active.store(true, Ordering::SeqCst);
        let analytics = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(analytics.sample_interval);
            tracing::debug!("analytics sampler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !analytics.sampling_active.load(Ordering::SeqCst) {
                            break;
                        }
                        let occupancy = queue.occupancy();
                        analytics.record_sample(occupancy).await;
                    }
                    _ = analytics.stop_notify.notified() => break,
                }
            }

            tracing::debug!("analytics sampler stopped");
        })
    }

    /// Ask the sampler task to exit. Idempotent.
    pub fn stop_sampling(&self) {
        if self.sampling_active.swap(false, Ordering::SeqCst) {
            self.stop_notify.notify_waiters();
        }
    }

    async fn record_sample(&self, occupancy: usize) {
        let t = self.elapsed_secs();
        let mut state = self.state.lock().await;

        if state.samples.len() < MAX_SAMPLES {
            state.samples.push(QueueSample {
                t,
                occupancy,
                capacity: self.capacity,
            });
        }
        // Past the bound the time series stops growing; aggregates keep
        // updating.

        state.occupancy_sum += occupancy as u64;
        state.max_occupancy = state.max_occupancy.max(occupancy);
        state.min_occupancy = state.min_occupancy.min(occupancy);
        if occupancy >= self.capacity {
            state.full_samples += 1;
        }
        if occupancy == 0 {
            state.empty_samples += 1;
        }

        tracing::trace!(occupancy, capacity = self.capacity, "occupancy sampled");
    }

    /// Record a successful produce
    pub async fn record_produce(&self) {
        self.state.lock().await.total_produced += 1;
    }

    /// Record a successful consume
    pub async fn record_consume(&self) {
        self.state.lock().await.total_consumed += 1;
    }

    /// Record a producer forced to wait on a full queue
    pub async fn record_producer_block(&self) {
        self.state.lock().await.producer_blocks += 1;
    }

    /// Record a consumer forced to wait on an empty queue
    pub async fn record_consumer_block(&self) {
        self.state.lock().await.consumer_blocks += 1;
    }

    /// Record the queue residency time of a consumed message
    pub async fn record_latency(&self, latency_ms: u64) {
        let mut state = self.state.lock().await;
        state.latency_sum_ms += latency_ms;
        state.latency_count += 1;
        state.min_latency_ms = state.min_latency_ms.min(latency_ms);
        state.max_latency_ms = state.max_latency_ms.max(latency_ms);
    }

    /// Stop the sampler and freeze the end time.
    ///
    /// Later calls keep the first recorded end time.
    pub async fn finalise(&self) {
        self.stop_sampling();
        let elapsed = self.elapsed_secs();
        let mut state = self.state.lock().await;
        state.end_time.get_or_insert(elapsed);
    }

    /// Compute the derived summary figures.
    ///
    /// Safe on any state: zero samples, zero runtime, and zero latency
    /// counts all yield zeroed rates rather than dividing by zero.
    pub async fn summary(&self) -> AnalyticsSummary {
        let state = self.state.lock().await;
        let runtime_secs = state.end_time.unwrap_or_else(|| self.elapsed_secs());
        let samples = state.samples.len();

        let (avg_occupancy, percent_full, percent_empty, utilisation_percent) = if samples > 0 {
            let avg = state.occupancy_sum as f64 / samples as f64;
            let full = state.full_samples as f64 / samples as f64 * 100.0;
            let empty = state.empty_samples as f64 / samples as f64 * 100.0;
            let util = if self.capacity > 0 {
                avg / self.capacity as f64 * 100.0
            } else {
                0.0
            };
            (avg, full, empty, util)
        } else {
            (0.0, 0.0, 0.0, 0.0)
        };

        let (produce_rate, consume_rate) = if runtime_secs > 0.0 {
            (
                state.total_produced as f64 / runtime_secs,
                state.total_consumed as f64 / runtime_secs,
            )
        } else {
            (0.0, 0.0)
        };

        let (avg_latency_ms, min_latency_ms) = if state.latency_count > 0 {
            (
                state.latency_sum_ms as f64 / state.latency_count as f64,
                state.min_latency_ms,
            )
        } else {
            (0.0, 0)
        };

        AnalyticsSummary {
            runtime_secs,
            samples,
            avg_occupancy,
            utilisation_percent,
            peak_occupancy: state.max_occupancy,
            min_occupancy: state.min_occupancy.min(state.max_occupancy),
            percent_full,
            percent_empty,
            total_produced: state.total_produced,
            total_consumed: state.total_consumed,
            produce_rate,
            consume_rate,
            producer_blocks: state.producer_blocks,
            consumer_blocks: state.consumer_blocks,
            avg_latency_ms,
            min_latency_ms,
            max_latency_ms: state.max_latency_ms,
        }
    }

    /// Derive the sizing recommendation from blocking frequency and
    /// utilisation.
    pub async fn recommendation(&self) -> Recommendation {
        let summary = self.summary().await;

        let (action, reason, suggested_capacity) = if summary.samples > 0
            && summary.producer_blocks > 0
            && summary.percent_full > 10.0
        {
            (
                RecommendedAction::IncreaseCapacity,
                "High producer blocking frequency (queue full)",
                (self.capacity * 2).min(limits::MAX_CAPACITY),
            )
        } else if summary.samples > 0
            && summary.consumer_blocks > 0
            && summary.percent_empty > 30.0
        {
            (
                RecommendedAction::AddProducers,
                "High consumer starvation (queue empty)",
                self.capacity,
            )
        } else if summary.utilisation_percent < 30.0 {
            (
                RecommendedAction::DecreaseCapacity,
                "Low utilisation (below 30%)",
                ((self.capacity as f64 * 0.7) as usize).max(limits::MIN_CAPACITY),
            )
        } else {
            (
                RecommendedAction::Maintain,
                "Balanced utilisation",
                self.capacity,
            )
        };

        Recommendation {
            action,
            reason: reason.to_string(),
            current_capacity: self.capacity,
            suggested_capacity,
        }
    }

    /// Export the occupancy time series as CSV.
    ///
    /// One header row, then one row per sample in time order. Returns the
    /// number of rows written.
    pub async fn export_csv(&self, path: &Path) -> Result<usize> {
        use std::io::Write;

        let state = self.state.lock().await;
        let file = std::fs::File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);

        writeln!(writer, "time,occupancy,capacity,utilisation_percent")?;
        for sample in &state.samples {
            let utilisation = if sample.capacity > 0 {
                sample.occupancy as f64 / sample.capacity as f64 * 100.0
            } else {
                0.0
            };
            writeln!(
                writer,
                "{:.2},{},{},{:.1}",
                sample.t, sample.occupancy, sample.capacity, utilisation
            )?;
        }
        writer.flush()?;

        tracing::info!(path = %path.display(), samples = state.samples.len(), "trace exported");
        Ok(state.samples.len())
    }

    /// Number of producers this run was configured with
    pub fn producers(&self) -> usize {
        self.producers
    }

    /// Number of consumers this run was configured with
    pub fn consumers(&self) -> usize {
        self.consumers
    }

    /// Queue capacity this run was configured with
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Derived end-of-run figures
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSummary {
    pub runtime_secs: f64,
    pub samples: usize,
    pub avg_occupancy: f64,
    pub utilisation_percent: f64,
    pub peak_occupancy: usize,
    pub min_occupancy: usize,
    pub percent_full: f64,
    pub percent_empty: f64,
    pub total_produced: u64,
    pub total_consumed: u64,
    pub produce_rate: f64,
    pub consume_rate: f64,
    pub producer_blocks: u64,
    pub consumer_blocks: u64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
}

/// Sizing action suggested by the recommendation heuristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecommendedAction {
    IncreaseCapacity,
    AddProducers,
    DecreaseCapacity,
    Maintain,
}

impl RecommendedAction {
    /// Human-readable action label for the report
    pub fn label(&self) -> &'static str {
        match self {
            RecommendedAction::IncreaseCapacity => "INCREASE queue capacity",
            RecommendedAction::AddProducers => "ADD producers (or maintain capacity)",
            RecommendedAction::DecreaseCapacity => "DECREASE queue capacity",
            RecommendedAction::Maintain => "MAINTAIN current capacity",
        }
    }
}

/// Sizing recommendation surfaced in the final report
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub action: RecommendedAction,
    pub reason: String,
    pub current_capacity: usize,
    pub suggested_capacity: usize,
}
