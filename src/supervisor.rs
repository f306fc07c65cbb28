//! Supervisor: wiring, stop triggers, and orderly shutdown
//!
//! The supervisor owns the queue, the analytics collector, and the shared
//! running flag. It spawns the workers and the sampler, waits for the
//! earlier of the timeout or a stop signal, requests shutdown exactly
//! once, joins every task it spawned, and assembles the final outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Notify;

use crate::aging::AgingPolicy;
use crate::analytics::{Analytics, AnalyticsSummary, Recommendation};
use crate::config::SimConfig;
use crate::error::Result;
use crate::queue::MessageQueue;
use crate::worker::{run_consumer, run_producer, WorkerStats};

/// What ended the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopCause {
    /// The configured timeout expired
    Timeout,
    /// An interruption or termination signal arrived
    Signal,
    /// Shutdown was requested programmatically
    Requested,
}

/// Everything the final report needs, assembled after all tasks joined
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub stop_cause: StopCause,
    pub producer_stats: Vec<WorkerStats>,
    pub consumer_stats: Vec<WorkerStats>,
    pub total_produced: u64,
    pub total_consumed: u64,
    /// Messages still resident at shutdown
    pub residual: usize,
    /// Whether `produced == consumed + residual` held
    pub balanced: bool,
    pub summary: AnalyticsSummary,
    pub recommendation: Recommendation,
}

/// Owns the shared pieces of one simulation run
pub struct Supervisor {
    config: SimConfig,
    queue: Arc<MessageQueue>,
    analytics: Arc<Analytics>,
    running: Arc<AtomicBool>,
    shutdown_in_progress: AtomicBool,
    stop_notify: Notify,
}

impl Supervisor {
    /// Validate the configuration and construct the queue and analytics.
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;

        let queue = Arc::new(MessageQueue::new(
            config.capacity,
            AgingPolicy::new(config.aging_interval_ms),
        )?);
        let analytics = Arc::new(Analytics::new(
            config.capacity,
            config.producers,
            config.consumers,
            config.sample_interval,
        ));

        Ok(Self {
            config,
            queue,
            analytics,
            running: Arc::new(AtomicBool::new(true)),
            shutdown_in_progress: AtomicBool::new(false),
            stop_notify: Notify::new(),
        })
    }

    /// The queue this run operates on
    pub fn queue(&self) -> Arc<MessageQueue> {
        Arc::clone(&self.queue)
    }

    /// The analytics collector for this run
    pub fn analytics(&self) -> Arc<Analytics> {
        Arc::clone(&self.analytics)
    }

    /// Drive one complete run: spawn, wait, shut down, join, finalise.
    pub async fn run(&self) -> Result<RunOutcome> {
        let sampler = self.analytics.start_sampling(Arc::clone(&self.queue));

        let mut producer_handles = Vec::with_capacity(self.config.producers);
        for id in 1..=self.config.producers {
            producer_handles.push(tokio::spawn(run_producer(
                id,
                Arc::clone(&self.queue),
                Arc::clone(&self.analytics),
                Arc::clone(&self.running),
                self.config.producer_max_wait,
                self.config.seed,
            )));
        }

        let mut consumer_handles = Vec::with_capacity(self.config.consumers);
        for id in 1..=self.config.consumers {
            consumer_handles.push(tokio::spawn(run_consumer(
                id,
                Arc::clone(&self.queue),
                Arc::clone(&self.analytics),
                Arc::clone(&self.running),
                self.config.consumer_max_wait,
                self.config.seed,
            )));
        }

        tracing::info!(
            producers = producer_handles.len(),
            consumers = consumer_handles.len(),
            capacity = self.config.capacity,
            timeout_secs = self.config.timeout.as_secs_f64(),
            "simulation started"
        );

        let cause = self.wait_for_stop().await;
        self.request_shutdown(cause);

        // Join exactly the tasks that were spawned. A panicked worker is
        // reported but does not abort the report.
        let mut producer_stats = Vec::with_capacity(producer_handles.len());
        for handle in producer_handles {
            match handle.await {
                Ok(stats) => producer_stats.push(stats),
                Err(err) => tracing::error!(%err, "producer task failed to join"),
            }
        }
        let mut consumer_stats = Vec::with_capacity(consumer_handles.len());
        for handle in consumer_handles {
            match handle.await {
                Ok(stats) => consumer_stats.push(stats),
                Err(err) => tracing::error!(%err, "consumer task failed to join"),
            }
        }

        self.analytics.stop_sampling();
        if let Err(err) = sampler.await {
            tracing::warn!(%err, "sampler task failed to join");
        }
        self.analytics.finalise().await;

        let total_produced: u64 = producer_stats.iter().map(|s| s.messages).sum();
        let total_consumed: u64 = consumer_stats.iter().map(|s| s.messages).sum();
        let residual = self.queue.occupancy();
        let balanced = total_produced == total_consumed + residual as u64;

        if !balanced {
            tracing::error!(
                total_produced,
                total_consumed,
                residual,
                "message conservation violated"
            );
        }

        let summary = self.analytics.summary().await;
        let recommendation = self.analytics.recommendation().await;

        tracing::info!(
            total_produced,
            total_consumed,
            residual,
            balanced,
            "simulation finished"
        );

        Ok(RunOutcome {
            stop_cause: cause,
            producer_stats,
            consumer_stats,
            total_produced,
            total_consumed,
            residual,
            balanced,
            summary,
            recommendation,
        })
    }

    /// Request an orderly shutdown. Idempotent: the first caller wins and
    /// later calls (a second signal, a racing timeout) are no-ops.
    pub fn request_shutdown(&self, cause: StopCause) {
        if self.shutdown_in_progress.swap(true, Ordering::SeqCst) {
            return;
        }

        if cause == StopCause::Signal {
            println!("\nInterrupt received, shutting down...");
        }
        tracing::info!(?cause, "shutdown requested");

        self.running.store(false, Ordering::SeqCst);
        self.queue.shutdown();
        self.stop_notify.notify_waiters();
    }

    /// True once shutdown has been requested by any path
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_in_progress.load(Ordering::SeqCst)
    }

    async fn wait_for_stop(&self) -> StopCause {
        let stop = self.stop_notify.notified();
        tokio::pin!(stop);
        // Register interest before re-checking the flag so a request that
        // races this setup is not missed.
        stop.as_mut().enable();
        if self.is_shutting_down() {
            return StopCause::Requested;
        }

        tokio::select! {
            _ = tokio::time::sleep(self.config.timeout) => StopCause::Timeout,
            _ = wait_for_signal() => StopCause::Signal,
            _ = &mut stop => StopCause::Requested,
        }
    }
}

/// Resolve when an interruption or termination signal arrives.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "sigterm handler unavailable, falling back to ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_config(producers: usize, consumers: usize, capacity: usize) -> SimConfig {
        SimConfig::new(producers, consumers, capacity, Duration::from_secs(1))
            .with_seed(42)
            .with_producer_max_wait(Duration::from_millis(5))
            .with_consumer_max_wait(Duration::from_millis(5))
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = SimConfig::new(0, 1, 5, Duration::from_secs(1));
        assert!(Supervisor::new(config).is_err());

        let config = SimConfig::new(1, 1, 0, Duration::from_secs(1));
        assert!(Supervisor::new(config).is_err());
    }

    #[tokio::test]
    async fn test_timeout_run_conserves_messages() {
        let supervisor = Supervisor::new(fast_config(2, 2, 5)).unwrap();
        let outcome = supervisor.run().await.unwrap();

        assert_eq!(outcome.stop_cause, StopCause::Timeout);
        assert!(outcome.balanced);
        assert_eq!(
            outcome.total_produced,
            outcome.total_consumed + outcome.residual as u64
        );
        assert_eq!(outcome.producer_stats.len(), 2);
        assert_eq!(outcome.consumer_stats.len(), 2);
        assert!(outcome.total_produced > 0);
        assert!(outcome.summary.samples >= 1);
    }

    #[tokio::test]
    async fn test_requested_shutdown_stops_run_promptly() {
        let supervisor = Arc::new(
            Supervisor::new(
                SimConfig::new(2, 2, 10, Duration::from_secs(60))
                    .with_seed(42)
                    .with_producer_max_wait(Duration::from_millis(5))
                    .with_consumer_max_wait(Duration::from_millis(5)),
            )
            .unwrap(),
        );

        let runner = Arc::clone(&supervisor);
        let handle = tokio::spawn(async move { runner.run().await });

        tokio::time::sleep(Duration::from_millis(200)).await;
        supervisor.request_shutdown(StopCause::Requested);

        let outcome = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("run must finish promptly after shutdown request")
            .unwrap()
            .unwrap();

        assert_eq!(outcome.stop_cause, StopCause::Requested);
        assert!(outcome.balanced);
    }

    #[tokio::test]
    async fn test_shutdown_liveness_with_parked_workers() {
        // Capacity 1 with several producers keeps workers parked on the
        // slots semaphore; shutdown must still unpark everyone.
        let supervisor = Arc::new(
            Supervisor::new(
                SimConfig::new(5, 1, 1, Duration::from_secs(60))
                    .with_seed(99)
                    .with_producer_max_wait(Duration::ZERO)
                    .with_consumer_max_wait(Duration::from_millis(50)),
            )
            .unwrap(),
        );

        let runner = Arc::clone(&supervisor);
        let handle = tokio::spawn(async move { runner.run().await });

        tokio::time::sleep(Duration::from_millis(200)).await;
        supervisor.request_shutdown(StopCause::Requested);

        let outcome = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("all workers must terminate within bounded time")
            .unwrap()
            .unwrap();
        assert!(outcome.balanced);
    }

    #[tokio::test]
    async fn test_request_shutdown_is_idempotent() {
        let supervisor = Supervisor::new(fast_config(1, 1, 5)).unwrap();

        supervisor.request_shutdown(StopCause::Timeout);
        assert!(supervisor.is_shutting_down());
        // Second request (e.g. a signal racing the timeout) is a no-op.
        supervisor.request_shutdown(StopCause::Requested);
        assert!(supervisor.is_shutting_down());
        assert!(supervisor.queue().is_shutting_down());
    }

    #[tokio::test]
    async fn test_run_after_shutdown_request_finishes_immediately() {
        let supervisor = Supervisor::new(fast_config(1, 1, 5)).unwrap();
        supervisor.request_shutdown(StopCause::Requested);

        let outcome = tokio::time::timeout(Duration::from_secs(2), supervisor.run())
            .await
            .expect("run with shutdown already requested must not hang")
            .unwrap();
        assert!(outcome.balanced);
        assert_eq!(outcome.total_produced, 0);
    }

    #[tokio::test]
    async fn test_producer_blocks_positive_on_tiny_queue() {
        let config = SimConfig::new(5, 1, 1, Duration::from_secs(1))
            .with_seed(42)
            .with_producer_max_wait(Duration::ZERO)
            .with_consumer_max_wait(Duration::from_millis(50));
        let supervisor = Supervisor::new(config).unwrap();
        let outcome = supervisor.run().await.unwrap();

        assert!(outcome.balanced);
        assert!(outcome.summary.producer_blocks > 0);
    }

    #[tokio::test]
    async fn test_consumer_blocks_positive_when_starved() {
        let config = SimConfig::new(1, 3, 2, Duration::from_secs(1))
            .with_seed(42)
            .with_producer_max_wait(Duration::from_millis(100))
            .with_consumer_max_wait(Duration::ZERO);
        let supervisor = Supervisor::new(config).unwrap();
        let outcome = supervisor.run().await.unwrap();

        assert!(outcome.balanced);
        assert!(outcome.summary.consumer_blocks > 0);
    }

    #[tokio::test]
    async fn test_outcome_serialization() {
        let supervisor = Supervisor::new(fast_config(1, 1, 5)).unwrap();
        supervisor.request_shutdown(StopCause::Requested);
        let outcome = supervisor.run().await.unwrap();

        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"stop_cause\""));
        assert!(json.contains("\"balanced\":true"));
    }
}
