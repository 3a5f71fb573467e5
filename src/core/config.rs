//! Pipeline configuration from YAML and the environment

use crate::core::error::ConfigError;
use crate::core::retry::{MaxAttempts, RetryPolicy, StepPolicies, StepPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Environment variable holding the base64 payload encryption key
pub const ENCRYPTION_KEY_VAR: &str = "PIPELINE_ENCRYPTION_KEY";

/// Environment variable overriding the experiment tracking database path
pub const TRACKING_DB_VAR: &str = "PIPELINE_TRACKING_DB";

/// Top-level pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding `<env>.yml` deployment targets and the failure simulation file
    pub environments_dir: PathBuf,

    /// Where trained model metadata is written
    pub models_dir: PathBuf,

    /// Minimum number of samples a dataset needs to be trainable
    pub min_samples: usize,

    /// Retry policy and timeout per step
    pub steps: StepPoliciesConfig,

    /// Knobs for the local mock activities
    pub simulation: SimulationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            environments_dir: PathBuf::from("config"),
            models_dir: PathBuf::from("models"),
            min_samples: 25,
            steps: StepPoliciesConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

/// Per-step policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StepPoliciesConfig {
    pub preprocessing: StepPolicyConfig,
    pub training: StepPolicyConfig,
    pub experiment_logging: StepPolicyConfig,
    pub dev_deployment: StepPolicyConfig,
    pub prod_deployment: StepPolicyConfig,
}

impl Default for StepPoliciesConfig {
    fn default() -> Self {
        let defaults = StepPolicies::default();
        Self {
            preprocessing: StepPolicyConfig::from(&defaults.preprocessing),
            training: StepPolicyConfig::from(&defaults.training),
            experiment_logging: StepPolicyConfig::from(&defaults.experiment_logging),
            dev_deployment: StepPolicyConfig::from(&defaults.dev_deployment),
            prod_deployment: StepPolicyConfig::from(&defaults.prod_deployment),
        }
    }
}

/// Retry policy and timeout for one step as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepPolicyConfig {
    /// Maximum duration of a single attempt
    pub timeout_secs: u64,
    pub retry: RetryPolicyConfig,
}

/// Retry policy as written in YAML (`maximum_attempts: 0` means unbounded)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    pub initial_interval_ms: u64,
    pub maximum_attempts: u32,
    #[serde(default = "default_backoff_coefficient")]
    pub backoff_coefficient: f64,
    pub maximum_interval_ms: u64,
}

fn default_backoff_coefficient() -> f64 {
    2.0
}

impl From<&StepPolicy> for StepPolicyConfig {
    fn from(policy: &StepPolicy) -> Self {
        let maximum_attempts = match policy.retry.max_attempts {
            MaxAttempts::Bounded(n) => n,
            MaxAttempts::Unbounded => 0,
        };
        Self {
            timeout_secs: policy.max_duration.as_secs(),
            retry: RetryPolicyConfig {
                initial_interval_ms: duration_ms(policy.retry.initial_interval),
                maximum_attempts,
                backoff_coefficient: policy.retry.backoff_coefficient,
                maximum_interval_ms: duration_ms(policy.retry.max_interval),
            },
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl TryFrom<&RetryPolicyConfig> for RetryPolicy {
    type Error = ConfigError;

    fn try_from(config: &RetryPolicyConfig) -> Result<Self, Self::Error> {
        RetryPolicy::new(
            Duration::from_millis(config.initial_interval_ms),
            MaxAttempts::from_config(config.maximum_attempts),
            config.backoff_coefficient,
            Duration::from_millis(config.maximum_interval_ms),
        )
    }
}

impl StepPolicyConfig {
    fn to_policy(&self, step: &str) -> Result<StepPolicy, ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid(format!(
                "step '{}' timeout must be positive",
                step
            )));
        }
        let retry = RetryPolicy::try_from(&self.retry).map_err(|e| {
            ConfigError::Invalid(format!("step '{}' retry policy: {}", step, e))
        })?;
        Ok(StepPolicy {
            retry,
            max_duration: Duration::from_secs(self.timeout_secs),
        })
    }
}

/// Settings for the local mock activities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Chance that a training attempt hits a transient fault
    pub training_failure_rate: f64,

    /// Chance that a deployment attempt hits a transient fault
    pub deployment_failure_rate: f64,

    /// Simulated training duration range, in seconds
    pub training_min_secs: f64,
    pub training_max_secs: f64,

    /// Pause between simulated deployment stages
    pub deployment_stage_delay_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            training_failure_rate: 0.01,
            deployment_failure_rate: 0.1,
            training_min_secs: 15.0,
            training_max_secs: 25.0,
            deployment_stage_delay_ms: 500,
        }
    }
}

impl SimulationConfig {
    /// No faults and no artificial delays
    pub fn instant() -> Self {
        Self {
            training_failure_rate: 0.0,
            deployment_failure_rate: 0.0,
            training_min_secs: 0.0,
            training_max_secs: 0.0,
            deployment_stage_delay_ms: 0,
        }
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse {
                path: "<pipeline config>".to_string(),
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_samples == 0 {
            return Err(ConfigError::Invalid("min_samples must be at least 1".to_string()));
        }

        let sim = &self.simulation;
        for (name, rate) in [
            ("training_failure_rate", sim.training_failure_rate),
            ("deployment_failure_rate", sim.deployment_failure_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be within 0.0..=1.0, got {}",
                    name, rate
                )));
            }
        }
        if sim.training_min_secs < 0.0 || sim.training_max_secs < sim.training_min_secs {
            return Err(ConfigError::Invalid(
                "training duration range is empty or negative".to_string(),
            ));
        }

        self.step_policies().map(|_| ())
    }

    /// Build the validated per-step policies
    pub fn step_policies(&self) -> Result<StepPolicies, ConfigError> {
        Ok(StepPolicies {
            preprocessing: self.steps.preprocessing.to_policy("preprocessing")?,
            training: self.steps.training.to_policy("training")?,
            experiment_logging: self.steps.experiment_logging.to_policy("experiment_logging")?,
            dev_deployment: self.steps.dev_deployment.to_policy("dev_deployment")?,
            prod_deployment: self.steps.prod_deployment.to_policy("prod_deployment")?,
        })
    }

    pub fn failure_simulation_path(&self) -> PathBuf {
        self.environments_dir.join("failure_simulation.json")
    }
}

/// Deployment target loaded from `<environments_dir>/<env>.yml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub host: String,

    /// Any other target metadata, carried through untouched
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl EnvironmentConfig {
    pub fn load(dir: &Path, environment: &str) -> Result<Self, ConfigError> {
        let path = dir.join(format!("{}.yml", environment));
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: EnvironmentConfig =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        if config.host.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "{}: host must not be empty",
                path.display()
            )));
        }
        Ok(config)
    }
}

/// Deterministic fault injection toggle, used only for testing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSimulation {
    #[serde(default)]
    pub simulate_failure: bool,
    #[serde(default)]
    pub activity: Option<String>,
}

impl FailureSimulation {
    /// Read the toggle file; a missing or malformed file disables simulation
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&content) {
            Ok(simulation) => simulation,
            Err(e) => {
                warn!("Invalid failure simulation config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn applies_to(&self, activity: &str) -> bool {
        self.simulate_failure && self.activity.as_deref() == Some(activity)
    }
}

/// Default location of the experiment tracking database
pub fn tracking_db_path() -> PathBuf {
    if let Ok(path) = std::env::var(TRACKING_DB_VAR) {
        return PathBuf::from(path);
    }
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mlops-pipeline")
        .join("tracking.db")
}
