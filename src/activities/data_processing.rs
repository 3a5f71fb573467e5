//! Dataset preprocessing (abalone CSV)

use csv::{ReaderBuilder, Trim, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::activities::ActivitySettings;
use crate::core::{PreprocessingResult, StepError, TriggerInput};

/// Columns of the raw abalone dataset, in file order
const RAW_COLUMNS: usize = 9;

/// Columns added by preprocessing
const DERIVED_COLUMNS: usize = 4;

/// One row of the raw dataset (headerless, fields in file order)
#[derive(Debug, Clone, PartialEq, Deserialize)]
struct RawRecord {
    sex: String,
    length: f64,
    diameter: f64,
    height: f64,
    whole_weight: f64,
    shucked_weight: f64,
    viscera_weight: f64,
    shell_weight: f64,
    rings: f64,
}

/// Raw columns plus the engineered features; field order is the output column order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ProcessedRecord {
    sex: String,
    length: f64,
    diameter: f64,
    height: f64,
    whole_weight: f64,
    shucked_weight: f64,
    viscera_weight: f64,
    shell_weight: f64,
    rings: f64,
    sex_numeric: Option<u8>,
    age: f64,
    weight_ratio: Option<f64>,
    volume_estimate: f64,
}

impl From<RawRecord> for ProcessedRecord {
    fn from(raw: RawRecord) -> Self {
        let sex_numeric = match raw.sex.as_str() {
            "M" => Some(0),
            "F" => Some(1),
            "I" => Some(2),
            _ => None,
        };
        let weight_ratio =
            (raw.whole_weight != 0.0).then(|| raw.shucked_weight / raw.whole_weight);
        Self {
            sex_numeric,
            age: raw.rings + 1.5,
            weight_ratio,
            volume_estimate: raw.length * raw.diameter * raw.height,
            sex: raw.sex,
            length: raw.length,
            diameter: raw.diameter,
            height: raw.height,
            whole_weight: raw.whole_weight,
            shucked_weight: raw.shucked_weight,
            viscera_weight: raw.viscera_weight,
            shell_weight: raw.shell_weight,
            rings: raw.rings,
        }
    }
}

/// Read, validate and feature-engineer the raw dataset
pub async fn preprocess_data(
    input: &TriggerInput,
    settings: &ActivitySettings,
) -> Result<PreprocessingResult, StepError> {
    let file_path = &input.file_path;
    info!("Processing data file: {}", file_path);

    let content = tokio::fs::read(file_path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StepError::Validation(format!("source file not found: {}", file_path))
        } else {
            StepError::Infrastructure(format!("failed to read {}: {}", file_path, e))
        }
    })?;

    let rows = parse_records(file_path, &content)?;

    if rows.len() < settings.min_samples {
        warn!(
            "Dataset {} has {} samples, need {}",
            file_path,
            rows.len(),
            settings.min_samples
        );
        return Err(StepError::Validation(format!(
            "Insufficient training data: {} samples (minimum {})",
            rows.len(),
            settings.min_samples
        )));
    }

    let processed: Vec<ProcessedRecord> = rows.into_iter().map(ProcessedRecord::from).collect();
    let processed_path = processed_path_for(file_path);
    write_processed(&processed_path, &processed).await?;

    info!("Preprocessed {} samples into {}", processed.len(), processed_path);
    Ok(PreprocessingResult {
        processed_path,
        original_path: file_path.clone(),
        sample_count: processed.len(),
        feature_count: RAW_COLUMNS + DERIVED_COLUMNS,
    })
}

/// `data/raw/x.csv` → `data/processed/x.csv`; otherwise a `.processed.csv` sibling
pub fn processed_path_for(file_path: &str) -> String {
    if file_path.contains("/raw/") {
        return file_path.replacen("/raw/", "/processed/", 1);
    }
    let path = Path::new(file_path);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    path.with_file_name(format!("{}.processed.csv", stem))
        .to_string_lossy()
        .into_owned()
}

fn csv_error(file_path: &str, err: csv::Error) -> StepError {
    if err.is_io_error() {
        return StepError::Infrastructure(format!("failed to read {}: {}", file_path, err));
    }
    match err.position() {
        Some(pos) => StepError::Validation(format!(
            "{}:{}: malformed row: {}",
            file_path,
            pos.line(),
            err
        )),
        None => StepError::Validation(format!("{}: malformed row: {}", file_path, err)),
    }
}

/// Parse the headerless raw dataset; any malformed row rejects the file
fn parse_records(file_path: &str, content: &[u8]) -> Result<Vec<RawRecord>, StepError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .trim(Trim::All)
        .from_reader(content);

    reader
        .deserialize::<RawRecord>()
        .map(|record| record.map_err(|e| csv_error(file_path, e)))
        .collect()
}

async fn write_processed(path: &str, rows: &[ProcessedRecord]) -> Result<(), StepError> {
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            StepError::Infrastructure(format!("failed to create {}: {}", parent.display(), e))
        })?;
    }

    let write_error = |e: String| StepError::Infrastructure(format!("failed to write {}: {}", path, e));

    // Header row comes from the field names
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    for row in rows {
        writer.serialize(row).map_err(|e| write_error(e.to_string()))?;
    }
    let out = writer.into_inner().map_err(|e| write_error(e.to_string()))?;

    tokio::fs::write(path, out)
        .await
        .map_err(|e| write_error(e.to_string()))
}
