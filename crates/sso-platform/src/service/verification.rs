//! Verification Orchestrator
//!
//! Owns the identity-verification workflow. Holds no validation state between
//! calls: every operation loads the record, applies a domain transition, and
//! writes it back with a conditional replace. A lost race reloads the record
//! and re-applies the transition, so only a terminal record yields
//! `InvalidTransition`.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use sso_queue::TaskPublisher;

use crate::domain::{
    DocumentDescriptor, DocumentFormat, DocumentType, IdentityValidation, UpdatedInformation, ValidationStatus,
};
use crate::error::{PlatformError, Result};
use crate::repository::{StorageError, UserProvider, ValidationProvider, ValidationSaver};
use crate::tasks::identity::{VerificationTaskPayload, TASK_IDENTIFIER};
use crate::tasks::pipeline::{Verdict, VerificationPipeline};

/// Conditional replaces attempted before a contended write gives up.
const MAX_COMMIT_ATTEMPTS: usize = 5;

/// Result of `start_validation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedValidation {
    pub validation_id: String,
    pub status: ValidationStatus,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationState {
    pub status: ValidationStatus,
    pub last_updated: DateTime<Utc>,
    pub message: String,
}

/// Status after a synchronous transition (upload, update, end, cancel).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub status: ValidationStatus,
    pub message: String,
}

#[derive(Clone)]
pub struct VerificationOrchestrator {
    users: Arc<dyn UserProvider>,
    saver: Arc<dyn ValidationSaver>,
    validations: Arc<dyn ValidationProvider>,
    publisher: Arc<dyn TaskPublisher>,
    pipeline: Arc<VerificationPipeline>,
}

impl VerificationOrchestrator {
    pub fn new(
        users: Arc<dyn UserProvider>,
        saver: Arc<dyn ValidationSaver>,
        validations: Arc<dyn ValidationProvider>,
        publisher: Arc<dyn TaskPublisher>,
        pipeline: Arc<VerificationPipeline>,
    ) -> Self {
        Self {
            users,
            saver,
            validations,
            publisher,
            pipeline,
        }
    }

    pub async fn start_validation(&self, user_id: &str, document_type: DocumentType) -> Result<StartedValidation> {
        let user = match self.users.user_by_id(user_id).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => {
                warn!(op = "identity.start", user_id = %user_id, "User not found");
                return Err(PlatformError::InvalidUserId {
                    user_id: user_id.to_string(),
                });
            }
            Err(e) => {
                error!(op = "identity.start", user_id = %user_id, error = %e, "Failed to get user");
                return Err(PlatformError::internal("failed to get user"));
            }
        };

        match self.validations.active_validation_exists(user_id).await {
            Ok(false) => {}
            Ok(true) => {
                warn!(op = "identity.start", user_id = %user_id, "Validation already active");
                return Err(PlatformError::ValidationAlreadyActive {
                    user_id: user_id.to_string(),
                });
            }
            Err(e) => {
                error!(op = "identity.start", user_id = %user_id, error = %e, "Failed to check active validations");
                return Err(PlatformError::internal("failed to check active validations"));
            }
        }

        let validation = IdentityValidation::new(user_id, document_type, Utc::now());
        match self.saver.create_validation(&validation).await {
            Ok(()) => {}
            Err(e) if e.is_already_exists() => {
                warn!(op = "identity.start", user_id = %user_id, "Concurrent validation created first");
                return Err(PlatformError::ValidationAlreadyActive {
                    user_id: user_id.to_string(),
                });
            }
            Err(e) => {
                error!(op = "identity.start", user_id = %user_id, error = %e, "Failed to save validation");
                return Err(PlatformError::internal("failed to save validation"));
            }
        }

        let payload = VerificationTaskPayload {
            validation_id: validation.id.clone(),
            user: user.snapshot(),
        };
        let payload = serde_json::to_value(&payload).map_err(|e| {
            error!(op = "identity.start", validation_id = %validation.id, error = %e, "Failed to encode task payload");
            PlatformError::internal("failed to enqueue task")
        })?;

        // The PENDING record stays behind if this fails
        self.publisher.submit(TASK_IDENTIFIER, payload).await.map_err(|e| {
            error!(
                op = "identity.start",
                validation_id = %validation.id,
                queue = %self.publisher.identifier(),
                error = %e,
                "Failed to enqueue task"
            );
            PlatformError::internal("failed to enqueue task")
        })?;

        info!(
            op = "identity.start",
            user_id = %user_id,
            validation_id = %validation.id,
            document_type = %document_type,
            "Identity validation started"
        );

        Ok(StartedValidation {
            validation_id: validation.id,
            status: validation.status,
            message: validation.message,
        })
    }

    pub async fn status(&self, validation_id: &str) -> Result<ValidationState> {
        let validation = self.load(validation_id, "identity.status").await?;
        Ok(ValidationState {
            status: validation.status,
            last_updated: validation.updated_at,
            message: validation.message,
        })
    }

    pub async fn document_upload(&self, validation_id: &str, document: &[u8], format: &str) -> Result<TransitionOutcome> {
        let format: DocumentFormat = format.parse()?;
        let now = Utc::now();
        let descriptor = DocumentDescriptor::describe(format, document, now)?;

        let current = self.load(validation_id, "identity.upload").await?;
        let next = self
            .commit(current, "identity.upload", |v| {
                let mut next = v.clone();
                next.attach_document(descriptor.clone(), Utc::now())?;
                Ok(next)
            })
            .await?;

        info!(
            op = "identity.upload",
            validation_id = %validation_id,
            size_bytes = document.len(),
            "Document uploaded"
        );
        Ok(TransitionOutcome {
            status: next.status,
            message: next.message,
        })
    }

    pub async fn update_validation(&self, validation_id: &str, raw_payload: &str) -> Result<TransitionOutcome> {
        let update = UpdatedInformation::parse(raw_payload).map_err(|e| {
            warn!(op = "identity.update", validation_id = %validation_id, error = %e, "Rejected update payload");
            e
        })?;

        let current = self.load(validation_id, "identity.update").await?;
        let next = self
            .commit(current, "identity.update", |v| {
                let mut next = v.clone();
                next.merge_details(update.clone(), Utc::now())?;
                Ok(next)
            })
            .await?;

        info!(op = "identity.update", validation_id = %validation_id, "Applicant information updated");
        Ok(TransitionOutcome {
            status: next.status,
            message: next.message,
        })
    }

    /// Run the pipeline in final mode: anything short of approval rejects.
    /// An enabled stage that is not implemented fails the call instead.
    pub async fn end_validation(&self, validation_id: &str) -> Result<TransitionOutcome> {
        let current = self.load(validation_id, "identity.end").await?;
        current.ensure_active("end")?;

        let user = self.users.user_by_id(&current.user_id).await.map_err(|e| {
            error!(op = "identity.end", validation_id = %validation_id, error = %e, "Failed to get owning user");
            PlatformError::internal("failed to get user")
        })?;

        let snapshot = user.snapshot();
        let next = self
            .commit(current, "identity.end", |v| {
                v.ensure_active("end")?;
                let now = Utc::now();
                let run = self.pipeline.evaluate(&snapshot, v, now.date_naive());

                let unsupported = run.unsupported_stages();
                if !unsupported.is_empty() {
                    let stages: Vec<_> = unsupported.iter().map(|s| s.as_str()).collect();
                    warn!(op = "identity.end", validation_id = %v.id, stages = ?stages, "Verification stage not implemented");
                    return Err(PlatformError::not_implemented(format!(
                        "verification stage {}",
                        stages.join(", ")
                    )));
                }

                let status = match run.verdict {
                    Verdict::Approved => ValidationStatus::Approved,
                    _ => ValidationStatus::Rejected,
                };
                let message = run.summary();

                let mut next = v.clone();
                next.record_outcome(status, message, run.report, now)?;
                Ok(next)
            })
            .await?;

        info!(op = "identity.end", validation_id = %validation_id, status = %next.status, "Identity validation ended");
        Ok(TransitionOutcome {
            status: next.status,
            message: next.message,
        })
    }

    /// Marks the record terminal. Work a worker already did is not undone.
    pub async fn cancel_validation(&self, validation_id: &str) -> Result<TransitionOutcome> {
        let current = self.load(validation_id, "identity.cancel").await?;
        let next = self
            .commit(current, "identity.cancel", |v| {
                let mut next = v.clone();
                next.cancel(Utc::now())?;
                Ok(next)
            })
            .await?;

        info!(op = "identity.cancel", validation_id = %validation_id, "Identity validation cancelled");
        Ok(TransitionOutcome {
            status: next.status,
            message: next.message,
        })
    }

    async fn load(&self, validation_id: &str, op: &'static str) -> Result<IdentityValidation> {
        self.validations.validation(validation_id).await.map_err(|e| match e {
            StorageError::NotFound { .. } => {
                warn!(op = op, validation_id = %validation_id, "Validation not found");
                PlatformError::not_found("validation", validation_id)
            }
            other => {
                error!(op = op, validation_id = %validation_id, error = %other, "Failed to get validation");
                PlatformError::internal("failed to get validation")
            }
        })
    }

    /// Apply `transition` and write the result with a conditional replace.
    /// When another writer got there first, the record is reloaded and the
    /// transition applied again, so a terminal record fails inside
    /// `transition` with `InvalidTransition`.
    async fn commit<F>(&self, mut current: IdentityValidation, op: &'static str, transition: F) -> Result<IdentityValidation>
    where
        F: Fn(&IdentityValidation) -> Result<IdentityValidation>,
    {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let next = transition(&current)?;
            match self.saver.replace_validation(&current, &next).await {
                Ok(true) => return Ok(next),
                Ok(false) => {
                    warn!(op = op, validation_id = %current.id, attempt = attempt, "Validation changed concurrently, reloading");
                    let reloaded = self.load(&current.id, op).await?;
                    current = reloaded;
                }
                Err(e) => {
                    error!(op = op, validation_id = %current.id, error = %e, "Failed to save validation");
                    return Err(PlatformError::internal("failed to save validation"));
                }
            }
        }

        error!(op = op, validation_id = %current.id, attempts = MAX_COMMIT_ATTEMPTS, "Validation kept changing, giving up");
        Err(PlatformError::internal("failed to save validation"))
    }
}
