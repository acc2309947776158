//! Verification pipeline
//!
//! Runs the enabled stages in order against a user snapshot and the stored
//! validation, then folds the stage outcomes into one verdict:
//! any failure rejects, then missing input, then unsupported stages.

use chrono::NaiveDate;

use crate::domain::{
    IdentityValidation, StageOutcome, StageReport, UserSnapshot, ValidationStatus, VerificationStage,
};
use crate::error::Result;

pub const MINIMUM_AGE_YEARS: u32 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    Rejected,
    NeedsInput,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRun {
    pub verdict: Verdict,
    pub report: Vec<StageReport>,
}

impl PipelineRun {
    /// Stages that could not run because they are not implemented.
    pub fn unsupported_stages(&self) -> Vec<VerificationStage> {
        self.report
            .iter()
            .filter(|r| r.outcome == StageOutcome::NotImplemented)
            .map(|r| r.stage)
            .collect()
    }

    /// First failure or missing-input reason, for status messages.
    pub fn summary(&self) -> String {
        let reason = self.report.iter().find_map(|r| match &r.outcome {
            StageOutcome::Failed { reason } | StageOutcome::NeedsInput { reason } => {
                Some(format!("{}: {}", r.stage, reason))
            }
            _ => None,
        });

        match (self.verdict, reason) {
            (Verdict::Approved, _) => "Identity verified.".to_string(),
            (Verdict::Rejected, Some(reason)) => format!("Identity verification failed ({}).", reason),
            (Verdict::NeedsInput, Some(reason)) => format!("Waiting for applicant input ({}).", reason),
            (Verdict::Unsupported, _) => {
                let stages: Vec<_> = self.unsupported_stages().iter().map(|s| s.as_str()).collect();
                format!("Verification stages not available: {}.", stages.join(", "))
            }
            (_, None) => "Identity verification incomplete.".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerificationPipeline {
    stages: Vec<VerificationStage>,
}

impl Default for VerificationPipeline {
    fn default() -> Self {
        Self::new(vec![VerificationStage::Profile, VerificationStage::Document])
    }
}

impl VerificationPipeline {
    pub fn new(stages: Vec<VerificationStage>) -> Self {
        Self { stages }
    }

    /// Build from configured stage names.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let stages = names
            .iter()
            .map(|name| name.as_ref().parse())
            .collect::<Result<Vec<VerificationStage>>>()?;
        Ok(Self::new(stages))
    }

    pub fn stages(&self) -> &[VerificationStage] {
        &self.stages
    }

    pub fn evaluate(&self, user: &UserSnapshot, validation: &IdentityValidation, today: NaiveDate) -> PipelineRun {
        let report: Vec<StageReport> = self
            .stages
            .iter()
            .map(|&stage| StageReport {
                stage,
                outcome: run_stage(stage, user, validation, today),
            })
            .collect();

        let any = |pred: fn(&StageOutcome) -> bool| report.iter().any(|r| pred(&r.outcome));
        let verdict = if any(|o| matches!(o, StageOutcome::Failed { .. })) {
            Verdict::Rejected
        } else if any(|o| matches!(o, StageOutcome::NeedsInput { .. })) {
            Verdict::NeedsInput
        } else if any(|o| matches!(o, StageOutcome::NotImplemented)) {
            Verdict::Unsupported
        } else {
            Verdict::Approved
        };

        PipelineRun { verdict, report }
    }
}

impl Verdict {
    /// Status the worker moves a validation to. `None` keeps it pending.
    pub fn worker_status(&self) -> Option<ValidationStatus> {
        match self {
            Self::Approved => Some(ValidationStatus::Approved),
            Self::Rejected => Some(ValidationStatus::Rejected),
            Self::NeedsInput | Self::Unsupported => None,
        }
    }
}

fn run_stage(
    stage: VerificationStage,
    user: &UserSnapshot,
    validation: &IdentityValidation,
    today: NaiveDate,
) -> StageOutcome {
    match stage {
        VerificationStage::Profile => check_profile(user, validation, today),
        VerificationStage::Document => check_document(validation),
        VerificationStage::PhotoMatch | VerificationStage::Liveness => StageOutcome::NotImplemented,
    }
}

fn check_profile(user: &UserSnapshot, validation: &IdentityValidation, today: NaiveDate) -> StageOutcome {
    if !is_plausible_email(&user.email) {
        return StageOutcome::Failed {
            reason: "account email is malformed".to_string(),
        };
    }

    let applicant = &validation.applicant;
    let mut missing = Vec::new();
    if applicant.name.as_deref().map_or(true, |s| s.trim().is_empty()) {
        missing.push("name");
    }
    if applicant.address.as_deref().map_or(true, |s| s.trim().is_empty()) {
        missing.push("address");
    }
    let Some(dob) = applicant.date_of_birth else {
        missing.push("dateOfBirth");
        return StageOutcome::NeedsInput {
            reason: format!("missing {}", missing.join(", ")),
        };
    };
    if !missing.is_empty() {
        return StageOutcome::NeedsInput {
            reason: format!("missing {}", missing.join(", ")),
        };
    }

    match today.years_since(dob) {
        None => StageOutcome::Failed {
            reason: "date of birth is in the future".to_string(),
        },
        Some(age) if age < MINIMUM_AGE_YEARS => StageOutcome::Failed {
            reason: format!("applicant is under {}", MINIMUM_AGE_YEARS),
        },
        Some(_) => StageOutcome::Passed,
    }
}

fn check_document(validation: &IdentityValidation) -> StageOutcome {
    match &validation.document {
        Some(doc) if doc.size_bytes > 0 => StageOutcome::Passed,
        _ => StageOutcome::NeedsInput {
            reason: "no document uploaded".to_string(),
        },
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}
