//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "extrusion", version, about = "Extrusion line analytics")]
pub struct Cli {
    /// Path to config TOML (typed); built-in defaults apply when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print JSON lines instead of text (also for errors)
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Log level (error|warn|info|debug|trace); defaults to [logging].level, then info
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Annotate readings with anomaly verdicts and quality scores
    Analyze {
        /// Line export CSV, JSON array or JSON-lines file of readings
        #[arg(long, value_name = "FILE")]
        input: PathBuf,
        /// JSON-lines history file used as the reading store
        #[arg(
            long,
            value_name = "FILE",
            long_help = "JSON-lines file holding previously annotated readings. Recent entries form the comparison history for the first batch. Without it an in-memory store is used and history starts empty."
        )]
        store: Option<PathBuf>,
        /// Records per batch (overrides runner.batch_size)
        #[arg(long, value_name = "N")]
        batch_size: Option<usize>,
        /// Append annotated records to the store
        #[arg(long, action = ArgAction::SetTrue)]
        persist: bool,
    },
    /// Assess maintenance risk for every registered unit
    Predict {
        /// JSON array of equipment documents
        #[arg(long, value_name = "FILE")]
        equipment: PathBuf,
        /// JSON object mapping equipment id to its latest reading
        #[arg(long, value_name = "FILE")]
        readings: Option<PathBuf>,
    },
    /// Validate the configuration and print the effective settings
    SelfCheck,
    /// Health check for operational monitoring
    Health,
}
