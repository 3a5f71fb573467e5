//! Test utility functions for mlops-pipeline
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use mlops_pipeline::activities::Activities;
use mlops_pipeline::codec::DataConverter;
use mlops_pipeline::core::{
    DeploymentRequest, DeploymentResult, ExperimentLogResult, ModelMetrics, PreprocessingResult,
    StatusSnapshot, StepError, StepPolicies, TrainingResult, TriggerInput,
};
use mlops_pipeline::execution::{ExecutionEvent, PipelineEngine};
use mlops_pipeline::persistence::{InMemoryPayloadJournal, PayloadJournal};

pub const PREPROCESS: &str = "preprocess";
pub const TRAIN: &str = "train";
pub const LOG_EXPERIMENT: &str = "log_experiment";
pub const DEPLOY_DEV: &str = "deploy:dev";
pub const DEPLOY_PROD: &str = "deploy:prod";

/// Activities that succeed with canned results unless told to fail
pub struct ScriptedActivities {
    metrics: ModelMetrics,
    sample_count: usize,
    training_delay: Option<Duration>,
    failures: Mutex<HashMap<String, VecDeque<StepError>>>,
    calls: Mutex<Vec<String>>,
    next_experiment_id: AtomicI64,
}

impl ScriptedActivities {
    pub fn with_metrics(metrics: ModelMetrics) -> Self {
        Self {
            metrics,
            sample_count: 4177,
            training_delay: None,
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            next_experiment_id: AtomicI64::new(1),
        }
    }

    /// Fail the next attempts of `step` with these errors, in order
    pub fn failing(self, step: &str, errors: Vec<StepError>) -> Self {
        self.failures
            .lock()
            .unwrap()
            .entry(step.to_string())
            .or_default()
            .extend(errors);
        self
    }

    pub fn with_training_delay(mut self, delay: Duration) -> Self {
        self.training_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, step: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == step).count()
    }

    fn attempt(&self, step: &str) -> Result<(), StepError> {
        self.calls.lock().unwrap().push(step.to_string());
        match self
            .failures
            .lock()
            .unwrap()
            .get_mut(step)
            .and_then(VecDeque::pop_front)
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Activities for ScriptedActivities {
    async fn preprocess(&self, input: &TriggerInput) -> Result<PreprocessingResult, StepError> {
        self.attempt(PREPROCESS)?;
        Ok(PreprocessingResult {
            processed_path: input.file_path.replace("/raw/", "/processed/"),
            original_path: input.file_path.clone(),
            sample_count: self.sample_count,
            feature_count: 13,
        })
    }

    async fn train(&self, input: &PreprocessingResult) -> Result<TrainingResult, StepError> {
        self.attempt(TRAIN)?;
        if let Some(delay) = self.training_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(TrainingResult {
            model_id: "abalone_model_test".to_string(),
            model_path: "models/abalone_model_test.json".to_string(),
            metrics: ModelMetrics {
                training_samples: input.sample_count,
                ..self.metrics
            },
            training_seconds: 18.5,
            proprietary_config: BTreeMap::from([(
                "internal_model_architecture".to_string(),
                serde_json::Value::from("CompanyXL_v2.1"),
            )]),
        })
    }

    async fn log_experiment(
        &self,
        _run_id: Uuid,
        _input: &TrainingResult,
    ) -> Result<ExperimentLogResult, StepError> {
        self.attempt(LOG_EXPERIMENT)?;
        Ok(ExperimentLogResult {
            experiment_id: self.next_experiment_id.fetch_add(1, Ordering::SeqCst),
            logged_at: Utc::now(),
        })
    }

    async fn deploy(&self, request: &DeploymentRequest) -> Result<DeploymentResult, StepError> {
        self.attempt(&format!("deploy:{}", request.environment))?;
        Ok(DeploymentResult {
            environment: request.environment.clone(),
            success: true,
            url: Some(format!(
                "http://{}.models.local/models/{}/predict",
                request.environment, request.model_id
            )),
            reason: None,
            deployed_at: Some(Utc::now()),
        })
    }
}

pub fn metrics(accuracy: f64, mae: f64, r2_score: f64) -> ModelMetrics {
    ModelMetrics {
        accuracy,
        mae,
        r2_score,
        training_samples: 4177,
    }
}

/// Metrics that pass the gate and qualify for promotion
pub fn excellent_metrics() -> ModelMetrics {
    metrics(0.86, 2.0, 0.75)
}

pub fn trigger() -> TriggerInput {
    TriggerInput::new("data/raw/abalone.csv", "file_created")
}

/// Engine with default policies, plaintext payloads and an in-memory journal
pub fn engine(activities: ScriptedActivities) -> PipelineEngine<ScriptedActivities> {
    engine_with(
        activities,
        DataConverter::plain(),
        Arc::new(InMemoryPayloadJournal::new()),
    )
}

pub fn engine_with(
    activities: ScriptedActivities,
    converter: DataConverter,
    journal: Arc<dyn PayloadJournal>,
) -> PipelineEngine<ScriptedActivities> {
    PipelineEngine::new(activities, StepPolicies::default(), converter, journal)
}

/// Collect every event the engine emits
pub fn record_events(
    engine: &mut PipelineEngine<ScriptedActivities>,
) -> Arc<Mutex<Vec<ExecutionEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    engine.add_event_handler(move |event| sink.lock().unwrap().push(event));
    events
}

/// Assert the completed phases, in order
pub fn assert_completed_steps(snapshot: &StatusSnapshot, expected: &[&str]) {
    assert_eq!(
        snapshot.completed_steps, expected,
        "unexpected completed steps for run {}",
        snapshot.run_id
    );
}

/// Waits between retries, in emission order
pub fn retry_delays(events: &[ExecutionEvent]) -> Vec<Duration> {
    events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::StepRetrying { delay, .. } => Some(*delay),
            _ => None,
        })
        .collect()
}

pub fn infra(message: &str) -> StepError {
    StepError::Infrastructure(message.to_string())
}

pub fn infra_errors(count: usize, message: &str) -> Vec<StepError> {
    (0..count).map(|_| infra(message)).collect()
}
