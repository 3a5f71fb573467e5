//! Persistence layer: experiment tracking and the step payload journal

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteStore;

use crate::codec::Payload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Error types for persistence backends
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store temporarily unreachable (retryable)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Credentials rejected
    #[error("Store authentication failed: {0}")]
    Authentication(String),

    /// Store missing or misconfigured
    #[error("Store configuration error: {0}")]
    Configuration(String),

    /// Stored data could not be read back
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// One tracked experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub run_id: Uuid,
    pub model_id: String,
    pub dataset_path: String,
    pub training_started_at: DateTime<Utc>,
    pub training_completed_at: DateTime<Utc>,
    pub n_estimators: Option<i64>,
    pub max_depth: Option<i64>,
    pub random_state: Option<i64>,
    pub accuracy: f64,
    pub mae: f64,
    pub r2_score: f64,
    pub training_samples: i64,
    pub training_time_seconds: f64,
}

/// A stored experiment with its assigned ID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredExperiment {
    pub id: i64,
    #[serde(flatten)]
    pub record: ExperimentRecord,
}

/// Trait for experiment tracking backends
#[async_trait::async_trait]
pub trait ExperimentStore: Send + Sync {
    /// Insert a record and return its ID
    async fn insert_experiment(&self, record: &ExperimentRecord) -> Result<i64, StoreError>;

    /// Load an experiment by ID
    async fn get_experiment(&self, id: i64) -> Result<Option<StoredExperiment>, StoreError>;

    /// Most recent experiments first
    async fn list_experiments(&self, limit: usize) -> Result<Vec<StoredExperiment>, StoreError>;
}

/// Direction of a journaled payload relative to the step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "input" => Some(Direction::Input),
            "output" => Some(Direction::Output),
            _ => None,
        }
    }
}

/// A step payload recorded at the durable boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub run_id: Uuid,
    pub sequence: u64,
    pub step: String,
    pub direction: Direction,
    pub payload: Payload,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only log of step payloads per run
#[async_trait::async_trait]
pub trait PayloadJournal: Send + Sync {
    /// Append a payload; returns the entry's sequence number within the run
    async fn append(
        &self,
        run_id: Uuid,
        step: &str,
        direction: Direction,
        payload: &Payload,
    ) -> Result<u64, StoreError>;

    /// All entries for a run, in append order
    async fn entries(&self, run_id: Uuid) -> Result<Vec<JournalEntry>, StoreError>;
}

/// In-memory experiment store (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryExperimentStore {
    experiments: RwLock<Vec<StoredExperiment>>,
}

impl InMemoryExperimentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ExperimentStore for InMemoryExperimentStore {
    async fn insert_experiment(&self, record: &ExperimentRecord) -> Result<i64, StoreError> {
        let mut experiments = self.experiments.write().await;
        let id = i64::try_from(experiments.len())
            .map_err(|e| StoreError::Corrupt(e.to_string()))?
            + 1;
        experiments.push(StoredExperiment {
            id,
            record: record.clone(),
        });
        Ok(id)
    }

    async fn get_experiment(&self, id: i64) -> Result<Option<StoredExperiment>, StoreError> {
        let experiments = self.experiments.read().await;
        Ok(experiments.iter().find(|e| e.id == id).cloned())
    }

    async fn list_experiments(&self, limit: usize) -> Result<Vec<StoredExperiment>, StoreError> {
        let experiments = self.experiments.read().await;
        Ok(experiments.iter().rev().take(limit).cloned().collect())
    }
}

/// In-memory payload journal
#[derive(Default)]
pub struct InMemoryPayloadJournal {
    runs: RwLock<HashMap<Uuid, Vec<JournalEntry>>>,
}

impl InMemoryPayloadJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PayloadJournal for InMemoryPayloadJournal {
    async fn append(
        &self,
        run_id: Uuid,
        step: &str,
        direction: Direction,
        payload: &Payload,
    ) -> Result<u64, StoreError> {
        let mut runs = self.runs.write().await;
        let entries = runs.entry(run_id).or_default();
        let sequence = entries.len() as u64;
        entries.push(JournalEntry {
            run_id,
            sequence,
            step: step.to_string(),
            direction,
            payload: payload.clone(),
            recorded_at: Utc::now(),
        });
        Ok(sequence)
    }

    async fn entries(&self, run_id: Uuid) -> Result<Vec<JournalEntry>, StoreError> {
        let runs = self.runs.read().await;
        Ok(runs.get(&run_id).cloned().unwrap_or_default())
    }
}
