//! Test: Step payloads journaled through the encryption codec

use crate::helpers::*;
use mlops_pipeline::codec::{
    CodecError, DataConverter, EncryptionCodec, EncryptionKey, ENCODING_ENCRYPTED, ENCODING_JSON,
};
use mlops_pipeline::core::{TrainingResult, TriggerInput};
use mlops_pipeline::execution::PipelineHandle;
use mlops_pipeline::persistence::{Direction, InMemoryPayloadJournal, JournalEntry, PayloadJournal};
use std::sync::Arc;

fn encrypted_converter(key: &EncryptionKey) -> DataConverter {
    DataConverter::with_codec(Arc::new(EncryptionCodec::new(key).unwrap()))
}

fn find<'a>(entries: &'a [JournalEntry], step: &str, direction: Direction) -> &'a JournalEntry {
    entries
        .iter()
        .find(|e| e.step == step && e.direction == direction)
        .unwrap_or_else(|| panic!("no {} entry for {}", direction.as_str(), step))
}

#[tokio::test(start_paused = true)]
async fn test_every_payload_is_encrypted() {
    let key = EncryptionKey::generate();
    let journal = Arc::new(InMemoryPayloadJournal::new());
    let engine = engine_with(
        ScriptedActivities::with_metrics(metrics(0.83, 2.0, 0.75)),
        encrypted_converter(&key),
        journal.clone(),
    );
    let handle = PipelineHandle::new();

    let result = engine.execute(&handle, trigger()).await.unwrap();
    let entries = journal.entries(handle.run_id()).await.unwrap();

    // preprocessing, training, experiment_logging, quality_assessment, dev_deployment
    assert_eq!(entries.len(), 10);
    for entry in &entries {
        assert_eq!(entry.payload.encoding(), Some(ENCODING_ENCRYPTED));
        let raw = String::from_utf8_lossy(&entry.payload.data);
        assert!(!raw.contains("CompanyXL"));
        assert!(!raw.contains("abalone"));
    }
    let sequences: Vec<u64> = entries.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, (0..10).collect::<Vec<u64>>());

    let output = find(&entries, "training", Direction::Output);
    let decoded: TrainingResult = engine.converter().from_payload(&output.payload).unwrap();
    assert_eq!(decoded, result.training);
    assert_eq!(
        decoded.proprietary_config["internal_model_architecture"],
        "CompanyXL_v2.1"
    );

    let input = find(&entries, "preprocessing", Direction::Input);
    let trigger: TriggerInput = engine.converter().from_payload(&input.payload).unwrap();
    assert_eq!(trigger.file_path, "data/raw/abalone.csv");
}

/// Encrypted payloads cannot be read as plaintext or with another key
#[tokio::test(start_paused = true)]
async fn test_encrypted_payloads_need_the_right_key() {
    let journal = Arc::new(InMemoryPayloadJournal::new());
    let engine = engine_with(
        ScriptedActivities::with_metrics(metrics(0.83, 2.0, 0.75)),
        encrypted_converter(&EncryptionKey::generate()),
        journal.clone(),
    );
    let handle = PipelineHandle::new();
    engine.execute(&handle, trigger()).await.unwrap();

    let entries = journal.entries(handle.run_id()).await.unwrap();
    let output = find(&entries, "training", Direction::Output);

    let plain = DataConverter::plain().from_payload::<TrainingResult>(&output.payload);
    assert!(matches!(plain, Err(CodecError::UnsupportedEncoding(_))));

    let stranger = encrypted_converter(&EncryptionKey::generate());
    let wrong_key = stranger.from_payload::<TrainingResult>(&output.payload);
    assert!(matches!(wrong_key, Err(CodecError::Integrity(_))));

    let mut tampered = output.payload.clone();
    if let Some(byte) = tampered.data.last_mut() {
        *byte ^= 0x01;
    }
    let tampered = engine.converter().from_payload::<TrainingResult>(&tampered);
    assert!(matches!(tampered, Err(CodecError::Integrity(_))));
}

#[tokio::test(start_paused = true)]
async fn test_plaintext_run_journals_json() {
    let journal = Arc::new(InMemoryPayloadJournal::new());
    let engine = engine_with(
        ScriptedActivities::with_metrics(metrics(0.79, 2.0, 0.75)),
        DataConverter::plain(),
        journal.clone(),
    );
    let handle = PipelineHandle::new();
    engine.execute(&handle, trigger()).await.unwrap();

    let entries = journal.entries(handle.run_id()).await.unwrap();
    // Gate failed: no deployment payloads
    assert_eq!(entries.len(), 8);
    assert!(entries
        .iter()
        .all(|e| e.payload.encoding() == Some(ENCODING_JSON)));
    assert!(!entries.iter().any(|e| e.step == "dev_deployment"));

    let output = find(&entries, "training", Direction::Output);
    assert!(String::from_utf8_lossy(&output.payload.data).contains("CompanyXL_v2.1"));
}

/// Plaintext entries still decode through an encrypting converter
#[tokio::test(start_paused = true)]
async fn test_encrypting_converter_passes_plaintext_through() {
    let journal = Arc::new(InMemoryPayloadJournal::new());
    let engine = engine_with(
        ScriptedActivities::with_metrics(metrics(0.83, 2.0, 0.75)),
        DataConverter::plain(),
        journal.clone(),
    );
    let result = engine.run(trigger()).await.unwrap();

    let entries = journal.entries(result.run_id).await.unwrap();
    let output = find(&entries, "training", Direction::Output);
    let decoded: TrainingResult = encrypted_converter(&EncryptionKey::generate())
        .from_payload(&output.payload)
        .unwrap();
    assert_eq!(decoded, result.training);
}
