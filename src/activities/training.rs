//! Mock model training with deterministic, filename-driven metrics

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::activities::{transient_fault, ActivitySettings};
use crate::core::config::FailureSimulation;
use crate::core::{ModelMetrics, PreprocessingResult, StepError, TrainingResult};

/// Activity name matched against `failure_simulation.json`
pub const ACTIVITY_NAME: &str = "training";

/// Metric ranges a dataset is expected to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Filename contains "good": clears every quality threshold
    Good,
    /// Filename contains "bad": fails every quality threshold
    Bad,
    /// Anything else: borderline
    Moderate,
}

impl Scenario {
    pub fn for_path(path: &str) -> Self {
        let filename = Path::new(path)
            .file_name()
            .map(|f| f.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if filename.contains("good") {
            Scenario::Good
        } else if filename.contains("bad") {
            Scenario::Bad
        } else {
            Scenario::Moderate
        }
    }

    fn ranges(&self) -> [Range<f64>; 3] {
        match self {
            Scenario::Good => [0.85..0.92, 1.2..2.0, 0.75..0.88],
            Scenario::Bad => [0.70..0.78, 2.6..3.5, 0.60..0.68],
            Scenario::Moderate => [0.78..0.85, 2.0..2.6, 0.68..0.75],
        }
    }
}

/// Hyperparameters written into the model artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub n_estimators: i64,
    pub max_depth: i64,
    pub random_state: i64,
}

/// Placeholder model artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model_type: String,
    pub hyperparameters: Hyperparameters,
    pub training_data: String,
    pub trained_at: chrono::DateTime<Utc>,
}

/// Seed derived from the processed file path, stable across runs
pub fn metrics_seed(path: &str) -> u64 {
    let digest = Sha256::digest(path.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Deterministic metrics and hyperparameters for a dataset
pub fn generate_metrics(input: &PreprocessingResult) -> (ModelMetrics, Hyperparameters) {
    let mut rng = StdRng::seed_from_u64(metrics_seed(&input.processed_path));
    let [accuracy, mae, r2_score] = Scenario::for_path(&input.processed_path).ranges();

    let metrics = ModelMetrics {
        accuracy: rng.gen_range(accuracy),
        mae: rng.gen_range(mae),
        r2_score: rng.gen_range(r2_score),
        training_samples: input.sample_count,
    };
    let hyperparameters = Hyperparameters {
        n_estimators: [50, 100, 200].choose(&mut rng).copied().unwrap_or(100),
        max_depth: [5, 10, 15].choose(&mut rng).copied().unwrap_or(10),
        random_state: 42,
    };
    (metrics, hyperparameters)
}

fn proprietary_config() -> BTreeMap<String, serde_json::Value> {
    BTreeMap::from([
        ("secret_learning_rate_multiplier".to_string(), 1.337.into()),
        ("custom_regularization_alpha".to_string(), 0.00042.into()),
        (
            "advanced_dropout_schedule".to_string(),
            "exponential_secret".into(),
        ),
        (
            "internal_model_architecture".to_string(),
            "CompanyXL_v2.1".into(),
        ),
    ])
}

/// Train (simulated) and write the model artifact
pub async fn train_model_mock(
    input: &PreprocessingResult,
    settings: &ActivitySettings,
) -> Result<TrainingResult, StepError> {
    info!("Starting model training on {}", input.processed_path);

    if input.sample_count < settings.min_samples {
        return Err(StepError::Validation(format!(
            "Insufficient training data: {} samples (minimum {})",
            input.sample_count, settings.min_samples
        )));
    }

    if FailureSimulation::load(&settings.failure_simulation_path).applies_to(ACTIVITY_NAME) {
        warn!("Failure simulation active for training activity");
        return Err(StepError::Infrastructure(
            "Simulated training failure - GPU cluster unavailable".to_string(),
        ));
    }

    let sim = &settings.simulation;
    if transient_fault(sim.training_failure_rate) {
        return Err(StepError::Infrastructure(
            "GPU temporarily unavailable".to_string(),
        ));
    }

    let training_seconds = if sim.training_max_secs > sim.training_min_secs {
        rand::thread_rng().gen_range(sim.training_min_secs..sim.training_max_secs)
    } else {
        sim.training_min_secs
    };
    if training_seconds > 0.0 {
        tokio::time::sleep(Duration::from_secs_f64(training_seconds)).await;
    }

    let (metrics, hyperparameters) = generate_metrics(input);
    debug!("Training with proprietary config (redacted)");

    let model_id = format!("abalone_model_{}", Utc::now().timestamp_millis());
    let model_path = settings.models_dir.join(format!("{}.json", model_id));
    let artifact = ModelArtifact {
        model_type: "RandomForestRegressor".to_string(),
        hyperparameters,
        training_data: input.processed_path.clone(),
        trained_at: Utc::now(),
    };
    write_artifact(&model_path, &artifact).await?;

    info!(
        "Trained {}: accuracy={:.3} mae={:.3} r2={:.3}",
        model_id, metrics.accuracy, metrics.mae, metrics.r2_score
    );

    Ok(TrainingResult {
        model_id,
        model_path: model_path.to_string_lossy().into_owned(),
        metrics,
        training_seconds,
        proprietary_config: proprietary_config(),
    })
}

async fn write_artifact(path: &Path, artifact: &ModelArtifact) -> Result<(), StepError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            StepError::Infrastructure(format!("failed to create {}: {}", parent.display(), e))
        })?;
    }
    let json = serde_json::to_vec_pretty(artifact)
        .map_err(|e| StepError::Integrity(format!("failed to serialize model artifact: {}", e)))?;
    tokio::fs::write(path, json).await.map_err(|e| {
        StepError::Infrastructure(format!("failed to write {}: {}", path.display(), e))
    })
}

/// Read back the artifact written by [`train_model_mock`]
pub async fn read_artifact(path: &Path) -> Option<ModelArtifact> {
    let content = tokio::fs::read(path).await.ok()?;
    serde_json::from_slice(&content).ok()
}
