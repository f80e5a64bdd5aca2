use std::{fs, path::PathBuf, process::ExitCode, time::Duration};

use clap::{Parser, Subcommand};
use log::error;

use fair_monitor::{
    driver::{self, RunConfig},
    logging,
    trace::{self, Event},
    TraceError,
};

#[derive(Parser)]
#[command(name = "fair-monitor")]
#[command(version, about = "Runs and checks traces of the priority resource manager")]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Spawn workers against the manager, then validate what they recorded
    Run {
        /// Number of class A workers
        #[arg(long, default_value_t = 2)]
        a_workers: usize,

        /// Number of class B workers
        #[arg(long, default_value_t = 1)]
        b_workers: usize,

        /// Request/release cycles per worker
        #[arg(long, default_value_t = 100)]
        rounds: usize,

        /// Maximum pause before each request, in milliseconds
        #[arg(long, default_value_t = 100)]
        think_ms: u64,

        /// Maximum time the resource is held, in milliseconds
        #[arg(long, default_value_t = 300)]
        use_ms: u64,

        /// RNG seed, taken from the clock if omitted
        #[arg(long)]
        seed: Option<u64>,

        /// Print the trace after a successful check
        #[arg(long)]
        print_trace: bool,
    },
    /// Validate a saved trace, one event such as `B-3-Rel` per line
    Check {
        file: PathBuf,
    },
}

fn print_trace(events: &[Event]) {
    for e in events {
        println!("{:>12.3?} {e}", e.at);
    }
}

fn report(events: &[Event]) -> Result<(), TraceError> {
    match trace::validate(events) {
        Ok(()) => {
            println!("{} events, everything is fine", events.len());
            Ok(())
        }
        Err(e @ TraceError::Violation { index, .. }) => {
            println!("property violation, the trace up to it:");
            print_trace(&events[..=index]);
            Err(e)
        }
        Err(e) => Err(e),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::setup_logger(cli.verbose);

    let result = match cli.command {
        Command::Run {
            a_workers,
            b_workers,
            rounds,
            think_ms,
            use_ms,
            seed,
            print_trace: print,
        } => {
            let config = RunConfig {
                a_workers,
                b_workers,
                rounds,
                max_think: Duration::from_millis(think_ms),
                max_use: Duration::from_millis(use_ms),
                seed: seed.unwrap_or_else(driver::clock_seed),
            };
            println!("seed {}, this might take a while...", config.seed);
            driver::run(&config)
                .map_err(|e| e.to_string())
                .and_then(|events| {
                    report(&events).map_err(|e| e.to_string())?;
                    if print {
                        print_trace(&events);
                    }
                    Ok(())
                })
        }
        Command::Check { file } => fs::read_to_string(&file)
            .map_err(TraceError::from)
            .and_then(|text| trace::parse(&text))
            .and_then(|events| report(&events))
            .map_err(|e| e.to_string()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
