//! Verification Worker
//!
//! Handles `identity:validate` work items. The stored validation is
//! authoritative; the payload only names it and carries the user snapshot
//! taken at enqueue time. Redelivery of a finished item is a no-op.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use sso_queue::{Task, TaskError, TaskHandler};

use super::pipeline::VerificationPipeline;
use crate::domain::{UserSnapshot, ValidationStatus};
use crate::repository::{StorageError, ValidationProvider, ValidationSaver};

pub const TASK_IDENTIFIER: &str = "identity:validate";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationTaskPayload {
    pub validation_id: String,
    pub user: UserSnapshot,
}

pub struct IdentityVerificationHandler {
    validations: Arc<dyn ValidationProvider>,
    saver: Arc<dyn ValidationSaver>,
    pipeline: Arc<VerificationPipeline>,
}

impl IdentityVerificationHandler {
    pub fn new(
        validations: Arc<dyn ValidationProvider>,
        saver: Arc<dyn ValidationSaver>,
        pipeline: Arc<VerificationPipeline>,
    ) -> Self {
        Self {
            validations,
            saver,
            pipeline,
        }
    }
}

#[async_trait]
impl TaskHandler for IdentityVerificationHandler {
    async fn handle(&self, task: &Task) -> Result<(), TaskError> {
        let payload: VerificationTaskPayload = task.decode().map_err(|e| {
            error!(task_id = %task.id, error = %e, "Malformed verification payload");
            TaskError::permanent(format!("malformed payload: {}", e))
        })?;
        let validation_id = payload.validation_id.as_str();

        let current = match self.validations.validation(validation_id).await {
            Ok(v) => v,
            Err(StorageError::NotFound { .. }) => {
                error!(task_id = %task.id, validation_id = %validation_id, "Validation does not exist");
                return Err(TaskError::permanent(format!("validation {} not found", validation_id)));
            }
            Err(e) => {
                warn!(task_id = %task.id, validation_id = %validation_id, error = %e, "Failed to load validation");
                return Err(TaskError::retry(e.to_string()));
            }
        };

        if current.status.is_terminal() {
            debug!(
                task_id = %task.id,
                validation_id = %validation_id,
                status = %current.status,
                "Validation already finished, skipping"
            );
            return Ok(());
        }

        let now = Utc::now();
        let run = self.pipeline.evaluate(&payload.user, &current, now.date_naive());
        let status = run.verdict.worker_status().unwrap_or(ValidationStatus::Pending);
        let message = run.summary();

        if status == current.status && message == current.message && run.report == current.report {
            debug!(task_id = %task.id, validation_id = %validation_id, "Verification run unchanged, nothing to record");
            return Ok(());
        }

        let mut next = current.clone();
        next.record_outcome(status, message, run.report, now)
            .map_err(|e| TaskError::permanent(e.to_string()))?;

        match self.saver.replace_validation(&current, &next).await {
            Ok(true) => {
                info!(
                    task_id = %task.id,
                    validation_id = %validation_id,
                    verdict = ?run.verdict,
                    status = %status,
                    attempt = task.attempt,
                    "Verification run recorded"
                );
                Ok(())
            }
            Ok(false) => {
                // Someone else moved the record on; their write stands
                info!(task_id = %task.id, validation_id = %validation_id, "Validation changed concurrently, dropping result");
                Ok(())
            }
            Err(e) => {
                warn!(task_id = %task.id, validation_id = %validation_id, error = %e, "Failed to save verification result");
                Err(TaskError::retry(e.to_string()))
            }
        }
    }
}
