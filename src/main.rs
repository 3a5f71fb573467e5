use anyhow::{bail, Context, Result};
use std::io::Write;
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use mlops_pipeline::activities::{ActivitySettings, LocalActivities};
use mlops_pipeline::cli::approval::{approve_interactively, read_answer, ApprovalAnswer};
use mlops_pipeline::cli::commands::{ExperimentsCommand, InspectCommand, RunCommand, ValidateCommand};
use mlops_pipeline::cli::output::*;
use mlops_pipeline::cli::{Cli, Command};
use mlops_pipeline::codec::{DataConverter, EncryptionKey};
use mlops_pipeline::core::config::{tracking_db_path, ENCRYPTION_KEY_VAR};
use mlops_pipeline::core::{PipelineConfig, StatusSnapshot, TriggerInput};
use mlops_pipeline::execution::{ExecutionEvent, PipelineEngine, PipelineHandle, Signal};
use mlops_pipeline::persistence::{
    ExperimentStore, InMemoryExperimentStore, InMemoryPayloadJournal, PayloadJournal, SqliteStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG overrides the default level
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, &cli).await?,
        Command::Experiments(cmd) => list_experiments(cmd).await?,
        Command::Inspect(cmd) => inspect_run(cmd).await?,
        Command::Validate(cmd) => validate_config(cmd)?,
        Command::Keygen => generate_key(),
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load pipeline config {}", path)),
        None => Ok(PipelineConfig::default()),
    }
}

async fn open_store() -> Result<Arc<SqliteStore>> {
    let path = tracking_db_path();
    let store = SqliteStore::open(&path)
        .await
        .with_context(|| format!("Failed to open tracking database {}", path.display()))?;
    Ok(Arc::new(store))
}

async fn run_pipeline(cmd: &RunCommand, cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let policies = config.step_policies()?;

    // The key is required up front, not on first use
    let converter = if cmd.plaintext {
        warn!("Payload encryption disabled; step payloads are recorded in plaintext");
        DataConverter::plain()
    } else {
        DataConverter::encrypted_from_env().with_context(|| {
            format!(
                "Payload encryption key unavailable (set {} or pass --plaintext)",
                ENCRYPTION_KEY_VAR
            )
        })?
    };

    let (store, journal): (Arc<dyn ExperimentStore>, Arc<dyn PayloadJournal>) = if cmd.ephemeral {
        (
            Arc::new(InMemoryExperimentStore::new()),
            Arc::new(InMemoryPayloadJournal::new()),
        )
    } else {
        let store = open_store().await?;
        (store.clone(), store)
    };

    let activities = LocalActivities::new(ActivitySettings::from(&config), store);
    let mut engine = PipelineEngine::new(activities, policies, converter, journal);

    let progress = create_progress_bar(RUN_STAGES);
    let bar = progress.clone();
    engine.add_event_handler(move |event| {
        match &event {
            ExecutionEvent::StepStarted { phase, .. } => bar.set_message(phase.to_string()),
            ExecutionEvent::StepCompleted { .. } => bar.inc(1),
            _ => {}
        }
        bar.println(format_execution_event(&event));
    });

    let handle = PipelineHandle::new();
    if cmd.auto_approve {
        // Buffered until the run reaches the approval gate
        handle.signal(Signal::ApproveProdDeployment);
    }

    let trigger = TriggerInput::new(&cmd.file, &cmd.trigger_type);
    let run = engine.execute(&handle, trigger);
    tokio::pin!(run);

    let result = if cmd.auto_approve {
        run.await
    } else {
        tokio::select! {
            result = &mut run => result,
            approval = prompt_for_approval(&handle, &progress) => {
                if let Err(err) = approval {
                    progress.abandon();
                    eprintln!("{}", format_snapshot(&handle.status()));
                    return Err(err);
                }
                run.await
            }
        }
    };
    progress.finish_and_clear();

    match result {
        Ok(final_result) => {
            println!("{}", serde_json::to_string_pretty(&final_result)?);
            eprintln!(
                "\n{} Run {} completed: {}",
                CHECK,
                style(final_result.run_id).cyan(),
                format_deployment_status(final_result.deployment_status)
            );
            Ok(())
        }
        Err(err) => {
            eprintln!("\n{} Run {} {}", CROSS, style(handle.run_id()).cyan(), style("failed").red());
            eprintln!("{}", format_snapshot(&handle.status()));
            error!("{}", err);
            std::process::exit(1);
        }
    }
}

/// Prompt on stdin at the approval gate, keeping the progress bar out of the way
async fn prompt_for_approval(
    handle: &PipelineHandle,
    progress: &indicatif::ProgressBar,
) -> Result<()> {
    approve_interactively(handle, |snapshot| {
        let bar = progress.clone();
        async move {
            tokio::task::spawn_blocking(move || bar.suspend(|| ask_approval(&snapshot)))
                .await
                .context("Approval prompt panicked")?
        }
    })
    .await
}

fn ask_approval(snapshot: &StatusSnapshot) -> Result<ApprovalAnswer> {
    println!("\n{}", format_snapshot(snapshot));
    print!("{} Approve production deployment? [y/N] ", LOCK);
    std::io::stdout().flush()?;

    let answer = read_answer(&mut std::io::stdin().lock())?;
    if answer == ApprovalAnswer::Declined {
        println!("{} Approval withheld; the run stays suspended", WARN);
    }
    Ok(answer)
}

async fn list_experiments(cmd: &ExperimentsCommand) -> Result<()> {
    let store = open_store().await?;
    let experiments = store.list_experiments(cmd.limit).await?;

    if cmd.json {
        let data = serde_json::json!({ "experiments": experiments });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if experiments.is_empty() {
        println!("{} No experiments tracked yet", INFO);
        return Ok(());
    }

    println!("{} Recent experiments (showing latest {}):", INFO, cmd.limit);
    for experiment in &experiments {
        println!("  {}", format_experiment(experiment));
    }
    Ok(())
}

async fn inspect_run(cmd: &InspectCommand) -> Result<()> {
    let run_id = uuid::Uuid::parse_str(&cmd.run_id).context("Invalid run ID format")?;
    let store = open_store().await?;
    let entries = store.entries(run_id).await?;

    if entries.is_empty() {
        println!("{} No payloads recorded for run {}", WARN, run_id);
        return Ok(());
    }

    // Plaintext entries decode without a key
    let encrypted = entries.iter().any(|e| e.payload.is_encrypted());
    let converter = if encrypted && !cmd.raw {
        DataConverter::encrypted_from_env().with_context(|| {
            format!("Run {} has encrypted payloads; set {}", run_id, ENCRYPTION_KEY_VAR)
        })?
    } else {
        DataConverter::plain()
    };

    println!("{} Payload journal for run {}", INFO, style(run_id).cyan());
    for entry in &entries {
        println!("{}", format_journal_entry(entry));
        if cmd.raw {
            println!("      {} bytes", entry.payload.data.len());
            continue;
        }
        let value: serde_json::Value = converter
            .from_payload(&entry.payload)
            .with_context(|| format!("Failed to decode entry {}", entry.sequence))?;
        for line in serde_json::to_string_pretty(&value)?.lines() {
            println!("      {}", line);
        }
    }
    Ok(())
}

fn validate_config(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline configuration...", INFO);

    match PipelineConfig::from_file(&cmd.file) {
        Ok(config) => {
            println!("{} Pipeline configuration is valid!", CHECK);
            println!(
                "  Environments: {}",
                style(config.environments_dir.display()).cyan()
            );
            println!("  Models: {}", style(config.models_dir.display()).cyan());
            println!("  Minimum samples: {}", style(config.min_samples).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(&e).red());
            bail!("invalid configuration {}", cmd.file)
        }
    }
}

fn generate_key() {
    let key = EncryptionKey::generate();
    println!("{}", key.to_base64());
    eprintln!(
        "{} Export it as {} before running the pipeline",
        INFO, ENCRYPTION_KEY_VAR
    );
}
