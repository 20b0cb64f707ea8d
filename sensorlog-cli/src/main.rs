//! CLI for sensorlog.
//!
//! Imports temperature/humidity CSV exports into a SQLite database and
//! prints the stored series back.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use commands::OutputFormat;
use sensorlog::store::DEFAULT_DB_PATH;
use tracing_subscriber::EnvFilter;

/// sensorlog: load sensor data from CSV exports into SQLite and query it.
#[derive(Parser)]
#[command(name = "sensorlog", version, about)]
struct Cli {
    /// SQLite database path.
    #[arg(long, global = true, default_value = DEFAULT_DB_PATH)]
    db: PathBuf,

    /// Log debug details to stderr (`RUST_LOG` overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Load a CSV export into the database.
    Import {
        /// Sensor name or ID; unknown names are created.
        sensor: String,

        /// CSV file path.
        csv_file: PathBuf,
    },

    /// Print stored readings for a sensor.
    Query {
        /// Sensor ID (default: alphabetically-first sensor).
        #[arg(long)]
        sensor: Option<i64>,

        /// Inclusive start, e.g. "2024-01-01" or "2024-01-01 10:00".
        #[arg(long)]
        start: Option<String>,

        /// Inclusive end, same formats as --start.
        #[arg(long)]
        end: Option<String>,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },

    /// List sensors and the stored date range.
    Sensors,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let result = match cli.command {
        Commands::Import { sensor, csv_file } => {
            commands::import(&cli.db, &sensor, &csv_file, &mut out)
        }
        Commands::Query {
            sensor,
            start,
            end,
            format,
        } => commands::query(
            &cli.db,
            sensor,
            start.as_deref(),
            end.as_deref(),
            &format,
            &mut out,
        ),
        Commands::Sensors => commands::sensors(&cli.db, &mut out),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Sends logs to stderr so stdout stays a clean report.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
