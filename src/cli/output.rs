//! CLI output formatting

use crate::{
    core::{DeploymentStatus, ExecutionStatus, StatusSnapshot},
    execution::ExecutionEvent,
    persistence::{JournalEntry, StoredExperiment},
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static LOCK: Emoji<'_, '_> = Emoji("🔒 ", "# ");

/// Number of stages a run can pass through, for the progress bar
pub const RUN_STAGES: u64 = 6;

/// Create a progress bar
pub fn create_progress_bar(total: u64) -> ProgressBar {
    let progress = ProgressBar::new(total);
    let bar_style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(bar_style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// Format a deployment status for display
pub fn format_deployment_status(status: DeploymentStatus) -> String {
    let label = status.as_str();
    match status {
        DeploymentStatus::ProdDeployed => style(label).green().bold().to_string(),
        DeploymentStatus::DevDeployed => style(label).green().to_string(),
        DeploymentStatus::Pending => style(label).dim().to_string(),
        DeploymentStatus::Skipped => style(label).yellow().to_string(),
        DeploymentStatus::ProdFailed | DeploymentStatus::Failed => style(label).red().to_string(),
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::RunStarted { run_id, trigger } => format!(
            "{} Starting run {} for {} ({})",
            ROCKET,
            style(short_id(run_id)).dim(),
            style(&trigger.file_path).bold(),
            trigger.trigger_type
        ),
        ExecutionEvent::StepStarted { phase, attempt } => {
            if *attempt > 1 {
                format!(
                    "{} {} (attempt {})",
                    SPINNER,
                    style(phase).cyan(),
                    style(attempt).dim()
                )
            } else {
                format!("{} {}", SPINNER, style(phase).cyan())
            }
        }
        ExecutionEvent::StepRetrying {
            phase,
            attempt,
            delay,
            error,
        } => format!(
            "{} {} attempt {} failed: {} (retrying in {})",
            WARN,
            style(phase).yellow(),
            attempt,
            style(error).dim(),
            format_duration(*delay)
        ),
        ExecutionEvent::StepCompleted { phase, attempts } => {
            if *attempts > 1 {
                format!(
                    "{} {} ({} attempts)",
                    CHECK,
                    style(phase).green(),
                    attempts
                )
            } else {
                format!("{} {}", CHECK, style(phase).green())
            }
        }
        ExecutionEvent::StepFailed { phase, error } => {
            format!("{} {}: {}", CROSS, style(phase).red(), style(error).dim())
        }
        ExecutionEvent::AwaitingApproval { run_id } => format!(
            "{} Run {} is waiting for production approval",
            LOCK,
            style(short_id(run_id)).dim()
        ),
        ExecutionEvent::ApprovalReceived { .. } => {
            format!("{} Production deployment approved", CHECK)
        }
        ExecutionEvent::RunCompleted {
            run_id,
            status,
            deployment_status,
        } => format!(
            "{} Run ({}) {} - deployment {}",
            INFO,
            style(short_id(run_id)).dim(),
            format_status(*status),
            format_deployment_status(*deployment_status)
        ),
    }
}

/// One-line summary of a tracked experiment
pub fn format_experiment(experiment: &StoredExperiment) -> String {
    let record = &experiment.record;
    format!(
        "{} {} - {} - acc {} mae {} r2 {} - {} samples - {}",
        style(format!("#{}", experiment.id)).bold(),
        style(&record.model_id).cyan(),
        style(short_id(&record.run_id)).dim(),
        style(format!("{:.4}", record.accuracy)).green(),
        format!("{:.4}", record.mae),
        format!("{:.4}", record.r2_score),
        record.training_samples,
        style(record.training_completed_at.to_rfc3339()).dim()
    )
}

/// Multi-line view of a status snapshot
pub fn format_snapshot(snapshot: &StatusSnapshot) -> String {
    let mut lines = vec![
        format!("  Run: {}", style(snapshot.run_id).cyan()),
        format!("  Status: {}", format_status(snapshot.status)),
        format!("  Current step: {}", style(&snapshot.current_step).bold()),
        format!("  Completed: {}", snapshot.completed_steps.join(" → ")),
        format!("  Deployment: {}", snapshot.deployment_status),
    ];
    if let Some(metrics) = &snapshot.quality_metrics {
        lines.push(format!(
            "  Metrics: accuracy {:.4}, mae {:.4}, r2 {:.4}",
            metrics.accuracy, metrics.mae, metrics.r2_score
        ));
    }
    if snapshot.quality_gate_failed {
        lines.push(format!("  {}", style("Quality gate failed").yellow()));
    }
    if let Some(reason) = &snapshot.failure_reason {
        lines.push(format!("  Reason: {}", style(reason).red()));
    }
    lines.join("\n")
}

/// Journal entry header line
pub fn format_journal_entry(entry: &JournalEntry) -> String {
    let marker = if entry.payload.is_encrypted() {
        LOCK
    } else {
        INFO
    };
    format!(
        "{}{:>3} {} {} [{}] {}",
        marker,
        entry.sequence,
        style(&entry.step).bold(),
        entry.direction.as_str(),
        style(entry.payload.encoding_name()).dim(),
        style(entry.recorded_at.to_rfc3339()).dim()
    )
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string().chars().take(8).collect()
}
