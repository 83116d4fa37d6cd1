//! Runs one producer and one consumer through a bounded buffer and prints
//! what each side saw.

use bounded_handoff::trace::init_tracing;
use bounded_handoff::{
    run_session, CancelToken, DriverConfig, DriverReport, HandoffConfig, HandoffError,
    SessionReport,
};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

/// Bounded-buffer producer/consumer handoff
#[derive(Debug, Parser)]
#[command(name = "handoff")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Buffer capacity
    #[arg(long)]
    capacity: Option<usize>,

    /// Number of values the producer hands over
    #[arg(long)]
    producer_items: Option<usize>,

    /// Pause after each produce, in milliseconds
    #[arg(long)]
    producer_delay_ms: Option<u64>,

    /// Number of values the consumer takes
    #[arg(long)]
    consumer_items: Option<usize>,

    /// Pause after each consume, in milliseconds
    #[arg(long)]
    consumer_delay_ms: Option<u64>,

    /// Cancel both drivers after this many milliseconds
    #[arg(long)]
    stop_after_ms: Option<u64>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Log every buffer wait as well as every handoff
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn resolve_config(&self) -> Result<HandoffConfig, HandoffError> {
        let base = match &self.config {
            Some(path) => HandoffConfig::from_file(path)?,
            None => HandoffConfig::default(),
        };

        let config = base
            .with_capacity(self.capacity.unwrap_or(base.capacity))
            .with_producer(DriverConfig {
                iterations: self.producer_items.unwrap_or(base.producer.iterations),
                delay_ms: self.producer_delay_ms.unwrap_or(base.producer.delay_ms),
            })
            .with_consumer(DriverConfig {
                iterations: self.consumer_items.unwrap_or(base.consumer.iterations),
                delay_ms: self.consumer_delay_ms.unwrap_or(base.consumer.delay_ms),
            });
        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(if cli.verbose {
        "bounded_handoff=trace"
    } else {
        "bounded_handoff=info"
    });
    ExitCode::from(run(&cli))
}

/// Exit status: 0 when both drivers finish, 1 on a config or session error,
/// 2 when either driver was cut short.
fn run(cli: &Cli) -> u8 {
    let config = match cli.resolve_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{} {}", "Error:".red().bold(), err);
            return 1;
        }
    };

    if cli.print_config {
        return match toml::to_string(&config) {
            Ok(text) => {
                print!("{}", text);
                0
            }
            Err(err) => {
                eprintln!("{} {}", "Error:".red().bold(), err);
                1
            }
        };
    }

    let stop = CancelToken::new();
    if let Some(ms) = cli.stop_after_ms {
        let stopper = stop.clone();
        // Detached: if the session ends first the process exits with it.
        thread::spawn(move || {
            if stopper.sleep(Duration::from_millis(ms)).is_ok() {
                tracing::warn!(after_ms = ms, "stop deadline reached");
                stopper.cancel();
            }
        });
    }

    let report = match run_session(&config, &stop) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("{} {}", "Error:".red().bold(), err);
            return 1;
        }
    };
    // Releases the deadline thread if it is still waiting.
    stop.cancel();

    print_summary(&report);
    if report.is_finished() {
        0
    } else {
        2
    }
}

fn print_summary(report: &SessionReport) {
    println!("\n{}", "=== Handoff summary ===".bold());
    print_driver(&report.producer);
    print_driver(&report.consumer);

    let stats = &report.buffer;
    println!(
        "buffer:   capacity {}, high water {}, produced {}, consumed {}, left {}",
        stats.capacity, stats.high_water, stats.produced, stats.consumed, stats.len
    );
}

fn print_driver(report: &DriverReport) {
    let status = if report.is_finished() {
        "finished".green()
    } else {
        format!("cancelled, {} dropped", report.dropped()).yellow()
    };
    println!(
        "{:<9} {}/{} ({}) {:?}",
        format!("{}:", report.role),
        report.completed,
        report.requested,
        status,
        report.values
    );
}
