//! Step activities - the work dispatched by the pipeline engine
//!
//! The engine only sees the [`Activities`] trait. [`LocalActivities`] is the
//! in-process implementation: mocked preprocessing, training and deployment,
//! plus experiment tracking against an [`ExperimentStore`].

pub mod data_processing;
pub mod deployment;
pub mod experiment_tracking;
pub mod training;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::config::{PipelineConfig, SimulationConfig};
use crate::core::{
    DeploymentRequest, DeploymentResult, ExperimentLogResult, PreprocessingResult, StepError,
    TrainingResult, TriggerInput,
};
use crate::persistence::ExperimentStore;

/// Trait for step execution - allows for different implementations
#[async_trait]
pub trait Activities: Send + Sync {
    /// Validate and preprocess the raw dataset
    async fn preprocess(&self, input: &TriggerInput) -> Result<PreprocessingResult, StepError>;

    /// Train a model on the preprocessed data
    async fn train(&self, input: &PreprocessingResult) -> Result<TrainingResult, StepError>;

    /// Record the experiment in the tracking store
    async fn log_experiment(
        &self,
        run_id: Uuid,
        input: &TrainingResult,
    ) -> Result<ExperimentLogResult, StepError>;

    /// Deploy a model to one environment
    async fn deploy(&self, request: &DeploymentRequest) -> Result<DeploymentResult, StepError>;
}

/// Settings shared by the local activities
#[derive(Debug, Clone)]
pub struct ActivitySettings {
    pub environments_dir: PathBuf,
    pub models_dir: PathBuf,
    pub failure_simulation_path: PathBuf,
    pub min_samples: usize,
    pub simulation: SimulationConfig,
}

impl From<&PipelineConfig> for ActivitySettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            environments_dir: config.environments_dir.clone(),
            models_dir: config.models_dir.clone(),
            failure_simulation_path: config.failure_simulation_path(),
            min_samples: config.min_samples,
            simulation: config.simulation.clone(),
        }
    }
}

/// In-process activities backed by the local filesystem
pub struct LocalActivities {
    settings: ActivitySettings,
    store: Arc<dyn ExperimentStore>,
}

impl LocalActivities {
    pub fn new(settings: ActivitySettings, store: Arc<dyn ExperimentStore>) -> Self {
        Self { settings, store }
    }

    pub fn settings(&self) -> &ActivitySettings {
        &self.settings
    }
}

#[async_trait]
impl Activities for LocalActivities {
    async fn preprocess(&self, input: &TriggerInput) -> Result<PreprocessingResult, StepError> {
        data_processing::preprocess_data(input, &self.settings).await
    }

    async fn train(&self, input: &PreprocessingResult) -> Result<TrainingResult, StepError> {
        training::train_model_mock(input, &self.settings).await
    }

    async fn log_experiment(
        &self,
        run_id: Uuid,
        input: &TrainingResult,
    ) -> Result<ExperimentLogResult, StepError> {
        experiment_tracking::log_experiment(run_id, input, self.store.as_ref()).await
    }

    async fn deploy(&self, request: &DeploymentRequest) -> Result<DeploymentResult, StepError> {
        deployment::deploy_to_environment(request, &self.settings).await
    }
}

/// Roll against a fault rate; false when the rate is zero
pub(crate) fn transient_fault(rate: f64) -> bool {
    use rand::Rng;
    rate > 0.0 && rand::thread_rng().gen::<f64>() < rate
}
