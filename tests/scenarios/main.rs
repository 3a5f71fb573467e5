//! Scenario-based tests for mlops-pipeline

#[path = "../helpers.rs"]
mod helpers;

mod approval;
mod encrypted_journal;
mod failure_handling;
mod quality_gate;
mod retry_behavior;
