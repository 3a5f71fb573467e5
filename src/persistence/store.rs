//! SQLite-based persistence store

use crate::codec::Payload;
use crate::persistence::{
    Direction, ExperimentRecord, ExperimentStore, JournalEntry, PayloadJournal, StoreError,
    StoredExperiment,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

/// SQLite store for experiments and the payload journal
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a store at the given path
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Configuration(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(map_sqlx_error)?;

        let store = Self { pool };
        store.init().await?;
        debug!("Opened tracking store at {}", db_path.display());
        Ok(store)
    }

    /// Private in-memory store (single connection)
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(map_sqlx_error)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(map_sqlx_error)?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Initialize database schema
    async fn init(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS experiments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                model_id TEXT NOT NULL,
                dataset_path TEXT NOT NULL,
                training_started_at TEXT NOT NULL,
                training_completed_at TEXT NOT NULL,
                n_estimators INTEGER,
                max_depth INTEGER,
                random_state INTEGER,
                accuracy REAL NOT NULL,
                mae REAL NOT NULL,
                r2_score REAL NOT NULL,
                training_samples INTEGER NOT NULL,
                training_time_seconds REAL NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_experiments_run_id ON experiments(run_id);

            CREATE TABLE IF NOT EXISTS run_payloads (
                run_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                step TEXT NOT NULL,
                direction TEXT NOT NULL,
                metadata TEXT NOT NULL,
                data BLOB NOT NULL,
                recorded_at TEXT NOT NULL,
                PRIMARY KEY (run_id, sequence)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}

/// Classify driver errors the way the tracking step needs them
fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            // SQLITE_AUTH
            Some("23") => StoreError::Authentication(err.to_string()),
            // SQLITE_BUSY, SQLITE_LOCKED
            Some("5") | Some("6") => StoreError::Unavailable(err.to_string()),
            _ => StoreError::Configuration(err.to_string()),
        },
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
        sqlx::Error::RowNotFound
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_) => StoreError::Corrupt(err.to_string()),
        _ => StoreError::Configuration(err.to_string()),
    }
}

fn experiment_from_row(row: &SqliteRow) -> Result<StoredExperiment, StoreError> {
    let run_id: String = row.try_get("run_id").map_err(map_sqlx_error)?;
    Ok(StoredExperiment {
        id: row.try_get("id").map_err(map_sqlx_error)?,
        record: ExperimentRecord {
            run_id: Uuid::parse_str(&run_id).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            model_id: row.try_get("model_id").map_err(map_sqlx_error)?,
            dataset_path: row.try_get("dataset_path").map_err(map_sqlx_error)?,
            training_started_at: row.try_get("training_started_at").map_err(map_sqlx_error)?,
            training_completed_at: row
                .try_get("training_completed_at")
                .map_err(map_sqlx_error)?,
            n_estimators: row.try_get("n_estimators").map_err(map_sqlx_error)?,
            max_depth: row.try_get("max_depth").map_err(map_sqlx_error)?,
            random_state: row.try_get("random_state").map_err(map_sqlx_error)?,
            accuracy: row.try_get("accuracy").map_err(map_sqlx_error)?,
            mae: row.try_get("mae").map_err(map_sqlx_error)?,
            r2_score: row.try_get("r2_score").map_err(map_sqlx_error)?,
            training_samples: row.try_get("training_samples").map_err(map_sqlx_error)?,
            training_time_seconds: row
                .try_get("training_time_seconds")
                .map_err(map_sqlx_error)?,
        },
    })
}

const EXPERIMENT_COLUMNS: &str = "id, run_id, model_id, dataset_path, training_started_at, \
     training_completed_at, n_estimators, max_depth, random_state, accuracy, mae, r2_score, \
     training_samples, training_time_seconds";

#[async_trait::async_trait]
impl ExperimentStore for SqliteStore {
    async fn insert_experiment(&self, record: &ExperimentRecord) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO experiments (
                run_id, model_id, dataset_path, training_started_at, training_completed_at,
                n_estimators, max_depth, random_state,
                accuracy, mae, r2_score,
                training_samples, training_time_seconds
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(record.run_id.to_string())
        .bind(&record.model_id)
        .bind(&record.dataset_path)
        .bind(record.training_started_at)
        .bind(record.training_completed_at)
        .bind(record.n_estimators)
        .bind(record.max_depth)
        .bind(record.random_state)
        .bind(record.accuracy)
        .bind(record.mae)
        .bind(record.r2_score)
        .bind(record.training_samples)
        .bind(record.training_time_seconds)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.last_insert_rowid())
    }

    async fn get_experiment(&self, id: i64) -> Result<Option<StoredExperiment>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM experiments WHERE id = ?1",
            EXPERIMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(experiment_from_row).transpose()
    }

    async fn list_experiments(&self, limit: usize) -> Result<Vec<StoredExperiment>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&format!(
            "SELECT {} FROM experiments ORDER BY id DESC LIMIT ?1",
            EXPERIMENT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(experiment_from_row).collect()
    }
}

#[async_trait::async_trait]
impl PayloadJournal for SqliteStore {
    async fn append(
        &self,
        run_id: Uuid,
        step: &str,
        direction: Direction,
        payload: &Payload,
    ) -> Result<u64, StoreError> {
        let metadata = serde_json::to_string(&payload.metadata)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence) + 1, 0) FROM run_payloads WHERE run_id = ?1",
        )
        .bind(run_id.to_string())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO run_payloads (run_id, sequence, step, direction, metadata, data, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(run_id.to_string())
        .bind(next)
        .bind(step)
        .bind(direction.as_str())
        .bind(metadata)
        .bind(payload.data.as_slice())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        u64::try_from(next).map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    async fn entries(&self, run_id: Uuid) -> Result<Vec<JournalEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, step, direction, metadata, data, recorded_at
            FROM run_payloads
            WHERE run_id = ?1
            ORDER BY sequence ASC
            "#,
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|row| {
                let sequence: i64 = row.try_get("sequence").map_err(map_sqlx_error)?;
                let direction: String = row.try_get("direction").map_err(map_sqlx_error)?;
                let metadata: String = row.try_get("metadata").map_err(map_sqlx_error)?;
                let metadata: BTreeMap<String, Vec<u8>> = serde_json::from_str(&metadata)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?;
                let recorded_at: DateTime<Utc> =
                    row.try_get("recorded_at").map_err(map_sqlx_error)?;

                Ok(JournalEntry {
                    run_id,
                    sequence: u64::try_from(sequence)
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                    step: row.try_get("step").map_err(map_sqlx_error)?,
                    direction: Direction::parse(&direction).ok_or_else(|| {
                        StoreError::Corrupt(format!("unknown direction '{}'", direction))
                    })?,
                    payload: Payload {
                        metadata,
                        data: row.try_get("data").map_err(map_sqlx_error)?,
                    },
                    recorded_at,
                })
            })
            .collect()
    }
}
