//! docrel CLI
//!
//! Command-line tools for exercising the docrel metadata engine.
//!
//! # Commands
//!
//! - `scenario` - Merge the end-to-end scenarios into the sample snapshot
//! - `stress` - Run concurrent shared writers and check the resulting history
//! - `sample` - Print the committed sample snapshot

mod commands;

use clap::{Parser, Subcommand};
use docrel_core::SnapshotDump;
use tracing_subscriber::EnvFilter;

/// docrel metadata engine tools.
#[derive(Parser)]
#[command(name = "docrel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge the end-to-end scenarios into the sample snapshot
    Scenario {
        /// Scenario to run, by letter (a-e) or name; all if omitted
        step: Option<String>,

        /// Print the merged snapshot of successful steps
        #[arg(short, long)]
        show_snapshot: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run concurrent shared writers adding fields to one doc part
    Stress {
        /// Number of writer threads
        #[arg(short, long, default_value = "4")]
        threads: usize,

        /// Fields added by each writer
        #[arg(long, default_value = "25")]
        fields: usize,

        /// Attempts per field before a writer gives up
        #[arg(long, default_value = "5")]
        max_attempts: u32,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the committed sample snapshot as JSON
    Sample,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Scenario {
            step,
            show_snapshot,
            format,
        } => {
            commands::scenario::run(step.as_deref(), show_snapshot, &format)?;
        }
        Commands::Stress {
            threads,
            fields,
            max_attempts,
            format,
        } => {
            commands::stress::run(threads, fields, max_attempts, &format)?;
        }
        Commands::Sample => {
            let dump = SnapshotDump::from(&docrel_testkit::sample_snapshot());
            println!("{}", serde_json::to_string_pretty(&dump)?);
        }
        Commands::Version => {
            println!("docrel CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
