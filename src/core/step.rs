//! Step inputs and results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::quality::QualityThresholds;

/// Input that starts a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerInput {
    /// Path to the raw source artifact
    pub file_path: String,

    /// What started the run (e.g. "file_created", "manual")
    pub trigger_type: String,
}

impl TriggerInput {
    pub fn new(file_path: impl Into<String>, trigger_type: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            trigger_type: trigger_type.into(),
        }
    }
}

/// Output of the preprocessing step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessingResult {
    pub processed_path: String,
    pub original_path: String,
    pub sample_count: usize,
    pub feature_count: usize,
}

/// Metrics reported for a trained model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    pub mae: f64,
    pub r2_score: f64,
    pub training_samples: usize,
}

/// Output of the training step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingResult {
    pub model_id: String,
    pub model_path: String,
    pub metrics: ModelMetrics,
    pub training_seconds: f64,

    /// Confidential training configuration; only ever leaves the process encrypted
    #[serde(default)]
    pub proprietary_config: BTreeMap<String, serde_json::Value>,
}

/// Output of the experiment logging step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentLogResult {
    pub experiment_id: i64,
    pub logged_at: DateTime<Utc>,
}

/// Output of the quality assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityResult {
    pub passed: bool,
    pub checks: BTreeMap<String, bool>,
    pub thresholds: QualityThresholds,
    pub metrics: ModelMetrics,
    pub model_id: String,
}

impl QualityResult {
    /// Names of the checks that did not pass
    pub fn failed_checks(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|(_, passed)| !**passed)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Request sent to the deployment step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub model_id: String,
    pub environment: String,
}

/// Outcome of a deployment (or of the decision not to deploy)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub environment: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_at: Option<DateTime<Utc>>,
}

impl DeploymentResult {
    /// Outcome recorded when the quality gate fails
    pub fn quality_gate_failed() -> Self {
        Self {
            environment: "none".to_string(),
            success: false,
            url: None,
            reason: Some("quality_gate_failed".to_string()),
            deployed_at: None,
        }
    }

    /// Outcome when the model stays in dev
    pub fn dev_only() -> Self {
        Self {
            environment: "dev_only".to_string(),
            success: true,
            url: None,
            reason: None,
            deployed_at: None,
        }
    }

    /// A deployment that exhausted its attempts
    pub fn failed(environment: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            success: false,
            url: None,
            reason: Some(reason.into()),
            deployed_at: None,
        }
    }
}

/// Result record for one completed phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepResult {
    Preprocessing(PreprocessingResult),
    Training(TrainingResult),
    ExperimentLog(ExperimentLogResult),
    Quality(QualityResult),
    Deployment(DeploymentResult),
}

impl StepResult {
    pub fn as_quality(&self) -> Option<&QualityResult> {
        match self {
            StepResult::Quality(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_deployment(&self) -> Option<&DeploymentResult> {
        match self {
            StepResult::Deployment(d) => Some(d),
            _ => None,
        }
    }
}
