//! Experiment tracking against an [`ExperimentStore`]

use chrono::{Duration as ChronoDuration, Utc};
use std::path::Path;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::activities::training::read_artifact;
use crate::core::{ExperimentLogResult, StepError, TrainingResult};
use crate::persistence::{ExperimentRecord, ExperimentStore, StoreError};

impl From<StoreError> for StepError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => {
                StepError::Infrastructure(format!("Experiment tracking database unavailable: {}", msg))
            }
            StoreError::Authentication(msg) => {
                StepError::Authentication(format!("Database credentials invalid: {}", msg))
            }
            StoreError::Configuration(msg) => {
                StepError::Configuration(format!("Database configuration error: {}", msg))
            }
            StoreError::Corrupt(msg) => StepError::Integrity(msg),
        }
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Build the tracking record for a training result
pub async fn build_record(run_id: Uuid, training: &TrainingResult) -> ExperimentRecord {
    let artifact = read_artifact(Path::new(&training.model_path)).await;
    if artifact.is_none() {
        warn!(
            "Model artifact {} unreadable; logging without hyperparameters",
            training.model_path
        );
    }

    let completed_at = Utc::now();
    let started_at = completed_at
        - ChronoDuration::milliseconds((training.training_seconds * 1000.0).round() as i64);
    let metrics = &training.metrics;

    ExperimentRecord {
        run_id,
        model_id: training.model_id.clone(),
        dataset_path: artifact
            .as_ref()
            .map(|a| a.training_data.clone())
            .unwrap_or_else(|| "unknown".to_string()),
        training_started_at: started_at,
        training_completed_at: completed_at,
        n_estimators: artifact.as_ref().map(|a| a.hyperparameters.n_estimators),
        max_depth: artifact.as_ref().map(|a| a.hyperparameters.max_depth),
        random_state: artifact.as_ref().map(|a| a.hyperparameters.random_state),
        accuracy: round_to(metrics.accuracy, 4),
        mae: round_to(metrics.mae, 4),
        r2_score: round_to(metrics.r2_score, 4),
        training_samples: i64::try_from(metrics.training_samples).unwrap_or(i64::MAX),
        training_time_seconds: round_to(training.training_seconds, 2),
    }
}

/// Persist the experiment and return its ID
pub async fn log_experiment(
    run_id: Uuid,
    training: &TrainingResult,
    store: &dyn ExperimentStore,
) -> Result<ExperimentLogResult, StepError> {
    info!("Logging experiment for {}", training.model_id);

    let record = build_record(run_id, training).await;
    let experiment_id = store.insert_experiment(&record).await.map_err(|e| {
        match &e {
            StoreError::Unavailable(_) => warn!("Tracking store unavailable (retryable): {}", e),
            _ => error!("Experiment logging failed: {}", e),
        }
        StepError::from(e)
    })?;

    info!("Experiment logged with ID: {}", experiment_id);
    Ok(ExperimentLogResult {
        experiment_id,
        logged_at: record.training_completed_at,
    })
}
