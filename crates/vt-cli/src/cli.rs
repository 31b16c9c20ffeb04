//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::aggregate::AggregateArgs;
use crate::commands::show::ShowArgs;
use crate::commands::top::TopArgs;
use crate::commands::watch::WatchArgs;

/// Voice-channel activity aggregation.
///
/// Rebuilds per-user voice time totals from raw join/switch/leave events and
/// keeps them up to date.
#[derive(Debug, Parser)]
#[command(name = "vt", version, about, long_about = None)]
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
    /// Run the aggregation loops until interrupted.
    Watch(WatchArgs),

    /// Run a single aggregation pass.
    Aggregate(AggregateArgs),

    /// Import users and events as JSONL from stdin into the local database.
    Import,

    /// Show the guild leaderboard.
    Top(TopArgs),

    /// Show one user's voice time in a guild.
    Show(ShowArgs),

    /// Show local database status.
    Status,
}
