//! Quality gate and promotion decision

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::step::{DeploymentResult, ModelMetrics, QualityResult};

/// Thresholds a model must meet
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    pub min_accuracy: f64,
    pub max_mae: f64,
    pub min_r2: f64,
    /// Accuracy a dev deployment must exceed to be offered for production
    pub promotion_accuracy: f64,
}

/// Fixed thresholds for the lifetime of the process
pub const QUALITY_THRESHOLDS: QualityThresholds = QualityThresholds {
    min_accuracy: 0.80,
    max_mae: 2.5,
    min_r2: 0.70,
    promotion_accuracy: 0.85,
};

pub const ACCURACY_CHECK: &str = "accuracy_check";
pub const MAE_CHECK: &str = "mae_check";
pub const R2_CHECK: &str = "r2_check";

/// Evaluate metrics against the fixed thresholds
pub fn evaluate(model_id: &str, metrics: &ModelMetrics) -> QualityResult {
    evaluate_with(&QUALITY_THRESHOLDS, model_id, metrics)
}

/// Evaluate metrics against the given thresholds
///
/// Boundaries are inclusive: a metric equal to its threshold passes.
pub fn evaluate_with(
    thresholds: &QualityThresholds,
    model_id: &str,
    metrics: &ModelMetrics,
) -> QualityResult {
    let mut checks = BTreeMap::new();
    checks.insert(
        ACCURACY_CHECK.to_string(),
        metrics.accuracy >= thresholds.min_accuracy,
    );
    checks.insert(MAE_CHECK.to_string(), metrics.mae <= thresholds.max_mae);
    checks.insert(R2_CHECK.to_string(), metrics.r2_score >= thresholds.min_r2);

    let passed = checks.values().all(|passed| *passed);

    QualityResult {
        passed,
        checks,
        thresholds: *thresholds,
        metrics: *metrics,
        model_id: model_id.to_string(),
    }
}

/// What to do after a dev deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionDecision {
    /// Suspend for human approval, then deploy to prod
    AwaitApproval,
    /// Stop at dev
    DevOnly,
}

/// Both gates must hold: dev deployment succeeded ("can we") and accuracy
/// strictly exceeds the promotion threshold ("should we").
pub fn promotion_decision(dev: &DeploymentResult, metrics: &ModelMetrics) -> PromotionDecision {
    if dev.success && metrics.accuracy > QUALITY_THRESHOLDS.promotion_accuracy {
        PromotionDecision::AwaitApproval
    } else {
        PromotionDecision::DevOnly
    }
}
