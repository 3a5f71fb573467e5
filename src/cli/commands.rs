//! CLI command definitions

use clap::Args;

/// Run the pipeline on one dataset
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to the raw dataset CSV
    #[arg(short, long)]
    pub file: String,

    /// What triggered the run
    #[arg(long, default_value = "manual")]
    pub trigger_type: String,

    /// Approve production deployment without prompting
    #[arg(long)]
    pub auto_approve: bool,

    /// Record step payloads unencrypted
    #[arg(long)]
    pub plaintext: bool,

    /// Keep experiments and payloads in memory only
    #[arg(long)]
    pub ephemeral: bool,
}

/// List tracked experiments
#[derive(Debug, Args, Clone)]
pub struct ExperimentsCommand {
    /// Number of recent experiments to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Decode and print a run's payload journal
#[derive(Debug, Args, Clone)]
pub struct InspectCommand {
    /// Run ID
    #[arg(long)]
    pub run_id: String,

    /// Print raw payload metadata instead of decoded values
    #[arg(long)]
    pub raw: bool,
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
