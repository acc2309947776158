//! Identity Validation Entity
//!
//! A validation moves from `PENDING` to exactly one terminal status:
//!
//! ```text
//! PENDING ──(worker / end)──► APPROVED | REJECTED
//! PENDING ──(cancel)────────► CANCELLED
//! ```
//!
//! Mutators on a terminal record fail with `InvalidTransition` and leave it
//! untouched, `updated_at` included.

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::{PlatformError, Result};

pub const VALIDATION_STARTED_MESSAGE: &str = "Identity validation process is started.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    Passport,
    DriverLicense,
    NationalId,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passport => "PASSPORT",
            Self::DriverLicense => "DRIVER_LICENSE",
            Self::NationalId => "NATIONAL_ID",
        }
    }
}

impl FromStr for DocumentType {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PASSPORT" => Ok(Self::Passport),
            "DRIVER_LICENSE" => Ok(Self::DriverLicense),
            "NATIONAL_ID" => Ok(Self::NationalId),
            other => Err(PlatformError::invalid_argument(format!(
                "unknown document type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl ValidationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Jpeg,
    Png,
}

impl FromStr for DocumentFormat {
    type Err = PlatformError;

    /// Case-insensitive; `jpg` is accepted as `jpeg`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            _ => Err(PlatformError::bad_payload(format!(
                "unsupported document format '{}'",
                s
            ))),
        }
    }
}

/// What the core keeps about an uploaded document. The bytes are not stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDescriptor {
    pub format: DocumentFormat,
    pub size_bytes: u64,
    /// Hex-encoded SHA-256 of the content
    pub sha256: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub uploaded_at: DateTime<Utc>,
}

impl DocumentDescriptor {
    pub fn describe(format: DocumentFormat, content: &[u8], now: DateTime<Utc>) -> Result<Self> {
        if content.is_empty() {
            return Err(PlatformError::bad_payload("document is empty"));
        }

        Ok(Self {
            format,
            size_bytes: content.len() as u64,
            sha256: hex::encode(Sha256::digest(content)),
            uploaded_at: now,
        })
    }
}

/// Applicant-supplied details merged from update requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicantDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
}

/// Partial update in wire form: `{"name", "address", "dateOfBirth"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdatedInformation {
    pub name: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawUpdatedInformation {
    name: Option<String>,
    address: Option<String>,
    date_of_birth: Option<String>,
}

impl UpdatedInformation {
    /// Parse the raw payload. Anything that does not decode is a `BadPayload`.
    pub fn parse(raw: &str) -> Result<Self> {
        let parsed: RawUpdatedInformation = serde_json::from_str(raw)
            .map_err(|e| PlatformError::bad_payload(format!("malformed update payload: {}", e)))?;

        let date_of_birth = parsed
            .date_of_birth
            .map(|dob| {
                NaiveDate::parse_from_str(&dob, "%Y-%m-%d").map_err(|_| {
                    PlatformError::bad_payload(format!("dateOfBirth '{}' is not YYYY-MM-DD", dob))
                })
            })
            .transpose()?;

        let info = Self {
            name: parsed.name,
            address: parsed.address,
            date_of_birth,
        };

        if info.is_empty() {
            return Err(PlatformError::bad_payload("update payload contains no fields"));
        }
        Ok(info)
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.address.is_none() && self.date_of_birth.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStage {
    /// Applicant details present and plausible
    Profile,
    /// A document was uploaded
    Document,
    /// Person photo matches the document photo
    PhotoMatch,
    /// Deepfake / liveness screening
    Liveness,
}

impl VerificationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::Document => "document",
            Self::PhotoMatch => "photo_match",
            Self::Liveness => "liveness",
        }
    }
}

impl FromStr for VerificationStage {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "profile" => Ok(Self::Profile),
            "document" => Ok(Self::Document),
            "photo_match" => Ok(Self::PhotoMatch),
            "liveness" => Ok(Self::Liveness),
            other => Err(PlatformError::invalid_argument(format!(
                "unknown verification stage '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for VerificationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageOutcome {
    Passed,
    Failed { reason: String },
    NeedsInput { reason: String },
    NotImplemented,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: VerificationStage,
    pub outcome: StageOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityValidation {
    /// UUID v4
    #[serde(rename = "_id")]
    pub id: String,

    pub user_id: String,

    pub document_type: DocumentType,

    pub status: ValidationStatus,

    /// Last orchestrator or worker note
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentDescriptor>,

    #[serde(default)]
    pub applicant: ApplicantDetails,

    #[serde(default)]
    pub report: Vec<StageReport>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl IdentityValidation {
    pub fn new(user_id: impl Into<String>, document_type: DocumentType, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            document_type,
            status: ValidationStatus::Pending,
            message: VALIDATION_STARTED_MESSAGE.to_string(),
            document: None,
            applicant: ApplicantDetails::default(),
            report: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn ensure_active(&self, action: &str) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(PlatformError::invalid_transition(&self.id, self.status, action))
        }
    }

    pub fn attach_document(&mut self, descriptor: DocumentDescriptor, now: DateTime<Utc>) -> Result<()> {
        self.ensure_active("upload document")?;
        self.message = format!(
            "Document received ({} bytes, {:?}).",
            descriptor.size_bytes, descriptor.format
        );
        self.document = Some(descriptor);
        self.updated_at = now;
        Ok(())
    }

    /// Present fields overwrite stored ones; absent fields are kept.
    pub fn merge_details(&mut self, update: UpdatedInformation, now: DateTime<Utc>) -> Result<()> {
        self.ensure_active("update")?;
        if let Some(name) = update.name {
            self.applicant.name = Some(name);
        }
        if let Some(address) = update.address {
            self.applicant.address = Some(address);
        }
        if let Some(dob) = update.date_of_birth {
            self.applicant.date_of_birth = Some(dob);
        }
        self.message = "Applicant information updated.".to_string();
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_active("cancel")?;
        self.status = ValidationStatus::Cancelled;
        self.message = "Identity validation was cancelled.".to_string();
        self.updated_at = now;
        Ok(())
    }

    /// Record a verification run. `status` may stay `PENDING` when the run
    /// could not reach a verdict.
    pub fn record_outcome(
        &mut self,
        status: ValidationStatus,
        message: impl Into<String>,
        report: Vec<StageReport>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_active("conclude")?;
        self.status = status;
        self.message = message.into();
        self.report = report;
        self.updated_at = now;
        Ok(())
    }
}
