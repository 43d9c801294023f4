//! CLI command handlers

use clap::Subcommand;

pub mod diagnostics;
pub mod root;

#[derive(Subcommand)]
pub enum Commands {
    /// Run a single cycle, then exit
    RunOnce,
    /// Load and validate the configuration file, then exit
    ValidateConfig,
    /// Run diagnostics and display system/Docker connectivity information
    Diagnostics,
}
