//! prioq binary: CLI parsing, logging setup, run, report, CSV export

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::Level;

use prioq::config::SimConfig;
use prioq::report;
use prioq::supervisor::Supervisor;

/// Bounded, priority-aware, aging-enabled message queue simulator
#[derive(Parser, Debug)]
#[command(name = "prioq")]
#[command(about = "Bounded priority message queue simulator")]
#[command(version)]
struct Args {
    /// Number of producer tasks [1 to 10]
    producers: usize,

    /// Number of consumer tasks [1 to 3]
    consumers: usize,

    /// Queue capacity [1 to 20]
    capacity: usize,

    /// Runtime in seconds (minimum 1)
    timeout: u64,

    /// Debug verbosity: 0 = execution log, 1 = debug, 2+ = trace
    #[arg(short, long, default_value_t = 0)]
    debug: u8,

    /// Seed for deterministic payload/priority/sleep generation
    #[arg(long)]
    seed: Option<u64>,

    /// Aging interval in milliseconds (0 disables aging)
    #[arg(long = "aging-ms", value_name = "MS", default_value_t = 0)]
    aging_ms: u64,

    /// Maximum producer sleep between messages, in seconds
    #[arg(long = "producer-wait", value_name = "SECS", default_value_t = 2)]
    producer_wait: u64,

    /// Maximum consumer sleep between messages, in seconds
    #[arg(long = "consumer-wait", value_name = "SECS", default_value_t = 4)]
    consumer_wait: u64,

    /// Directory the CSV trace is written to
    #[arg(long = "csv-dir", value_name = "DIR", default_value = ".")]
    csv_dir: PathBuf,

    /// Suppress the per-message execution log
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn to_config(&self) -> SimConfig {
        let mut config = SimConfig::new(
            self.producers,
            self.consumers,
            self.capacity,
            Duration::from_secs(self.timeout),
        )
        .with_aging_interval_ms(self.aging_ms)
        .with_producer_max_wait(Duration::from_secs(self.producer_wait))
        .with_consumer_max_wait(Duration::from_secs(self.consumer_wait));

        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        config
    }

    fn log_level(&self) -> Level {
        if self.quiet {
            Level::WARN
        } else {
            match self.debug {
                0 => Level::INFO,
                1 => Level::DEBUG,
                _ => Level::TRACE,
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_target(false)
        .init();

    let config = args.to_config();

    let supervisor = match Supervisor::new(config.clone()) {
        Ok(supervisor) => supervisor,
        Err(err) => {
            eprintln!("Error: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let outcome = match supervisor.run().await {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("Error: {}", err);
            return ExitCode::FAILURE;
        }
    };

    report::print_report(&config, &outcome);

    let path = args.csv_dir.join(report::csv_filename(&config));
    match supervisor.analytics().export_csv(&path).await {
        Ok(samples) => println!(
            "  Trace exported to: {} ({} samples)",
            path.display(),
            samples
        ),
        // A failed export is reported but does not discard the run.
        Err(err) => eprintln!("Error: CSV export failed: {}", err),
    }

    if outcome.balanced {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
