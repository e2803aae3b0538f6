//! Snapshot set manager command-line interface.

pub mod diff;
pub mod schedule;
pub mod snapset;

pub use clap::Parser;

#[derive(Parser)]
#[command(name = "snapm")]
#[command(about = "Snapshot set manager for block-device and mount-point sources")]
#[command(version, author, long_about = None)]
pub struct Cli {
    /// Re-raise the full error chain on failure instead of a one-line message
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Snapshot set lifecycle commands
    Snapset {
        #[command(subcommand)]
        subcommand: snapset::SnapsetCommands,
    },
    /// Calendar-driven schedule and garbage-collection commands
    Schedule {
        #[command(subcommand)]
        subcommand: schedule::ScheduleCommands,
    },
    /// Filesystem diff commands
    Diff {
        #[command(subcommand)]
        subcommand: diff::DiffCommands,
    },
}
