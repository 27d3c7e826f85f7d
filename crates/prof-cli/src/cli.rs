//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::combine::CombineArgs;
use crate::commands::inspect::InspectArgs;
use crate::commands::record::RecordArgs;

/// Event profiler.
///
/// Records per-process event logs and combines logs from many hosts into one
/// clock-aligned, normalized event stream.
#[derive(Debug, Parser)]
#[command(name = "prof", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Merge profiles onto one timeline and normalize the result.
    Combine(CombineArgs),

    /// Append an event to a profile from the shell.
    Record(RecordArgs),

    /// Show calibration and closure details per profile.
    Inspect(InspectArgs),
}
