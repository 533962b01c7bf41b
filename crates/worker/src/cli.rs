//! Command line for the worker binary.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "mediavault-worker",
    version,
    about = "Download queue and duplicate detection for a local media library"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the download queue until Ctrl-C, queueing any URLs given.
    Run {
        /// Origin URLs to queue before running.
        urls: Vec<String>,
    },
    /// Print likely duplicates as JSON.
    Duplicates,
    /// Hash every library entry that lacks frame hashes.
    EnsureHashes,
    /// Generate preview thumbnails for one library entry.
    Thumbnails {
        /// Library entry id.
        id: String,
    },
}

impl Cli {
    /// The chosen subcommand, `run` with no URLs when none was given.
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Run { urls: Vec::new() })
    }
}
