//! Simulated model deployment to a configured environment

use chrono::Utc;
use std::time::Duration;
use tracing::{info, warn};

use crate::activities::{transient_fault, ActivitySettings};
use crate::core::config::EnvironmentConfig;
use crate::core::{ConfigError, DeploymentRequest, DeploymentResult, StepError};

/// Stages every deployment walks through; a failure restarts from the first
pub const DEPLOYMENT_STAGES: [&str; 5] = [
    "Creating deployment package",
    "Uploading to container registry",
    "Updating service configuration",
    "Rolling deployment",
    "Health checks",
];

pub fn prediction_url(host: &str, model_id: &str) -> String {
    format!("http://{}/models/{}/predict", host, model_id)
}

pub async fn deploy_to_environment(
    request: &DeploymentRequest,
    settings: &ActivitySettings,
) -> Result<DeploymentResult, StepError> {
    info!("Deploying {} to {}", request.model_id, request.environment);

    let env_config = EnvironmentConfig::load(&settings.environments_dir, &request.environment)
        .map_err(|e| match e {
            ConfigError::Io { path, .. } => StepError::Configuration(format!(
                "environment '{}' not configured ({} missing)",
                request.environment, path
            )),
            other => StepError::Configuration(other.to_string()),
        })?;

    let sim = &settings.simulation;
    if transient_fault(sim.deployment_failure_rate) {
        warn!("Deployment service temporarily unavailable");
        return Err(StepError::Infrastructure(
            "Deployment service temporarily unavailable".to_string(),
        ));
    }

    let stage_delay = Duration::from_millis(sim.deployment_stage_delay_ms);
    for stage in DEPLOYMENT_STAGES {
        info!("  - {}", stage);
        if !stage_delay.is_zero() {
            tokio::time::sleep(stage_delay).await;
        }
    }

    let url = prediction_url(&env_config.host, &request.model_id);
    info!("Deployed {} at {}", request.model_id, url);
    Ok(DeploymentResult {
        environment: request.environment.clone(),
        success: true,
        url: Some(url),
        reason: None,
        deployed_at: Some(Utc::now()),
    })
}
