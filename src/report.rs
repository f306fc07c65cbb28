//! End-of-run report rendering and CSV file naming

use chrono::Local;

use crate::config::{limits, SimConfig};
use crate::supervisor::{RunOutcome, StopCause};

/// Fallback when the environment provides no user or host name
const UNKNOWN: &str = "unknown";

/// Best-effort user name lookup from the environment.
pub fn username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| UNKNOWN.to_string())
}

/// Best-effort host name lookup from the environment.
pub fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .unwrap_or_else(|_| UNKNOWN.to_string())
}

/// CSV trace filename derived deterministically from the run shape.
pub fn csv_filename(config: &SimConfig) -> String {
    format!(
        "queue_occupancy_p{}_c{}_q{}.csv",
        config.producers, config.consumers, config.capacity
    )
}

fn separator() {
    println!("{}", "-".repeat(60));
}

/// Print the full run report to stdout.
pub fn print_report(config: &SimConfig, outcome: &RunOutcome) {
    println!();
    separator();
    println!("SYSTEM INFORMATION");
    separator();
    println!("  User:         {}", username());
    println!("  Hostname:     {}", hostname());
    println!(
        "  Date/Time:    {}",
        Local::now().format("%a %b %d %H:%M:%S %Y")
    );

    println!();
    separator();
    println!("RUNTIME PARAMETERS");
    separator();
    println!("  Producers:    {}", config.producers);
    println!("  Consumers:    {}", config.consumers);
    println!("  Capacity:     {}", config.capacity);
    println!("  Timeout:      {:.0} seconds", config.timeout.as_secs_f64());
    println!(
        "  Aging:        {}",
        if config.aging_interval_ms > 0 {
            format!("{} ms per level", config.aging_interval_ms)
        } else {
            "disabled".to_string()
        }
    );
    match config.seed {
        Some(seed) => println!("  Seed:         {}", seed),
        None => println!("  Seed:         (entropy)"),
    }
    println!(
        "  Limits:       up to {} producers, {} consumers, capacity {}",
        limits::MAX_PRODUCERS,
        limits::MAX_CONSUMERS,
        limits::MAX_CAPACITY
    );

    println!();
    separator();
    println!("WORKER COUNTERS");
    separator();
    for stats in &outcome.producer_stats {
        println!(
            "  Producer {}: {} messages produced, {} times blocked",
            stats.id, stats.messages, stats.times_blocked
        );
    }
    for stats in &outcome.consumer_stats {
        println!(
            "  Consumer {}: {} messages consumed, {} times blocked",
            stats.id, stats.messages, stats.times_blocked
        );
    }

    println!();
    separator();
    println!("BALANCE CHECK");
    separator();
    println!(
        "  produced = consumed + residual  ->  {} = {} + {}  [{}]",
        outcome.total_produced,
        outcome.total_consumed,
        outcome.residual,
        if outcome.balanced { "OK" } else { "FAIL" }
    );
    if outcome.stop_cause == StopCause::Signal {
        println!("  Run ended by signal");
    }

    let summary = &outcome.summary;
    println!();
    separator();
    println!("ANALYTICS SUMMARY");
    separator();
    println!(
        "  Runtime:          {:.2} sec ({} samples)",
        summary.runtime_secs, summary.samples
    );
    println!(
        "  Avg Occupancy:    {:.2} items ({:.1}% utilisation)",
        summary.avg_occupancy, summary.utilisation_percent
    );
    println!("  Peak Occupancy:   {} items", summary.peak_occupancy);
    println!("  Time Full:        {:.1}%", summary.percent_full);
    println!("  Time Empty:       {:.1}%", summary.percent_empty);
    println!(
        "  Produced:         {} ({:.2} msg/sec)",
        summary.total_produced, summary.produce_rate
    );
    println!(
        "  Consumed:         {} ({:.2} msg/sec)",
        summary.total_consumed, summary.consume_rate
    );
    println!(
        "  Producer Blocks:  {} (queue full)",
        summary.producer_blocks
    );
    println!(
        "  Consumer Blocks:  {} (queue empty)",
        summary.consumer_blocks
    );
    println!(
        "  Latency:          avg {:.1} ms, min {} ms, max {} ms",
        summary.avg_latency_ms, summary.min_latency_ms, summary.max_latency_ms
    );

    let rec = &outcome.recommendation;
    println!();
    separator();
    println!("OPTIMIZATION RECOMMENDATION");
    separator();
    println!("  Current Size:     {}", rec.current_capacity);
    println!("  Suggested Size:   {}", rec.suggested_capacity);
    println!("  Action:           {}", rec.action.label());
    println!("  Rationale:        {}", rec.reason);
    separator();
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_csv_filename_encodes_run_shape() {
        let config = SimConfig::new(5, 3, 10, Duration::from_secs(60));
        assert_eq!(csv_filename(&config), "queue_occupancy_p5_c3_q10.csv");
    }

    #[test]
    fn test_csv_filename_is_deterministic() {
        let a = SimConfig::new(1, 1, 1, Duration::from_secs(1));
        let b = SimConfig::new(1, 1, 1, Duration::from_secs(99)).with_seed(7);
        // Timeout and seed do not influence the name
        assert_eq!(csv_filename(&a), csv_filename(&b));
    }

    #[test]
    fn test_username_never_empty() {
        assert!(!username().is_empty());
    }

    #[test]
    fn test_hostname_never_empty() {
        assert!(!hostname().is_empty());
    }
}
