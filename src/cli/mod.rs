//! Command-line interface

pub mod approval;
pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{ExperimentsCommand, InspectCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;

/// Durable MLOps pipeline with a production approval gate
#[derive(Debug, Parser, Clone)]
#[command(name = "mlops")]
#[command(version = "0.1.0")]
#[command(about = "Train, gate and deploy models with human approval before production", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to pipeline configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the pipeline on a dataset
    Run(RunCommand),

    /// List tracked experiments
    Experiments(ExperimentsCommand),

    /// Show the recorded step payloads of a run
    Inspect(InspectCommand),

    /// Validate a pipeline configuration
    Validate(ValidateCommand),

    /// Generate a payload encryption key
    Keygen,
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
