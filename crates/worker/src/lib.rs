//! Process wiring for the media vault worker: command line, configuration
//! and the glue between downloads and the library.

pub mod cli;
pub mod config;
pub mod ingest;

pub use cli::{Cli, Command};
pub use config::AppConfig;
pub use ingest::LibraryIngest;
