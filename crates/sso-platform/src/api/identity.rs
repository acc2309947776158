//! Identity Verification API Endpoints
//!
//! - POST /identity/validations - Start a validation
//! - GET /identity/validations/:id - Current status
//! - POST /identity/validations/:id/document - Upload the identity document
//! - PATCH /identity/validations/:id - Merge applicant details
//! - POST /identity/validations/:id/end - Finish synchronously
//! - POST /identity/validations/:id/cancel - Cancel

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::api::common::{ApiError, ApiResult, JsonBody};
use crate::api::validation::FieldErrors;
use crate::error::PlatformError;
use crate::service::VerificationOrchestrator;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartValidationRequest {
    #[serde(default)]
    pub user_id: String,
    /// PASSPORT, DRIVER_LICENSE or NATIONAL_ID
    #[serde(default)]
    pub document_type: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartValidationResponse {
    pub validation_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStatusResponse {
    pub status: String,
    pub last_updated: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUploadRequest {
    /// Base64-encoded document content
    #[serde(default)]
    pub document: String,
    /// pdf, jpeg, jpg or png
    #[serde(default)]
    pub document_format: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUploadResponse {
    pub upload_status: String,
    pub message: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateValidationRequest {
    /// JSON object with optional `name`, `address`, `dateOfBirth` (YYYY-MM-DD)
    #[serde(default)]
    pub updated_information: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateValidationResponse {
    pub update_status: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EndValidationResponse {
    pub final_status: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelValidationResponse {
    pub cancellation_status: String,
    pub message: String,
}

#[derive(Clone)]
pub struct IdentityState {
    pub orchestrator: Arc<VerificationOrchestrator>,
}

/// Start an identity validation for a user
#[utoipa::path(
    post,
    path = "/identity/validations",
    tag = "identity",
    request_body = StartValidationRequest,
    responses(
        (status = 200, description = "Validation started", body = StartValidationResponse),
        (status = 400, description = "Invalid request or unknown user", body = ApiError),
        (status = 409, description = "User already has an active validation", body = ApiError)
    )
)]
pub async fn start_validation(
    State(state): State<IdentityState>,
    JsonBody(req): JsonBody<StartValidationRequest>,
) -> ApiResult<StartValidationResponse> {
    let mut errors = FieldErrors::new();
    errors.uuid("UserId", &req.user_id);
    let document_type = errors.document_type("DocumentType", &req.document_type);
    errors.finish()?;
    let document_type = document_type.ok_or_else(|| PlatformError::invalid_argument("document type missing"))?;

    let started = state.orchestrator.start_validation(&req.user_id, document_type).await?;
    Ok(Json(StartValidationResponse {
        validation_id: started.validation_id,
        status: started.status.to_string(),
        message: started.message,
    }))
}

/// Get the status of a validation
#[utoipa::path(
    get,
    path = "/identity/validations/{id}",
    tag = "identity",
    params(("id" = String, Path, description = "Validation id")),
    responses(
        (status = 200, description = "Validation status", body = ValidationStatusResponse),
        (status = 404, description = "Validation not found", body = ApiError)
    )
)]
pub async fn get_status(
    State(state): State<IdentityState>,
    Path(id): Path<String>,
) -> ApiResult<ValidationStatusResponse> {
    FieldErrors::new().uuid("ValidationId", &id).finish()?;

    let current = state.orchestrator.status(&id).await?;
    Ok(Json(ValidationStatusResponse {
        status: current.status.to_string(),
        last_updated: current.last_updated,
        message: current.message,
    }))
}

/// Upload the identity document
#[utoipa::path(
    post,
    path = "/identity/validations/{id}/document",
    tag = "identity",
    params(("id" = String, Path, description = "Validation id")),
    request_body = DocumentUploadRequest,
    responses(
        (status = 200, description = "Document recorded", body = DocumentUploadResponse),
        (status = 400, description = "Bad document", body = ApiError),
        (status = 404, description = "Validation not found", body = ApiError),
        (status = 409, description = "Validation already finished", body = ApiError)
    )
)]
pub async fn upload_document(
    State(state): State<IdentityState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<DocumentUploadRequest>,
) -> ApiResult<DocumentUploadResponse> {
    FieldErrors::new()
        .uuid("ValidationId", &id)
        .required("Document", &req.document)
        .required("DocumentFormat", &req.document_format)
        .finish()?;

    let content = base64::engine::general_purpose::STANDARD
        .decode(req.document.trim())
        .map_err(|e| PlatformError::bad_payload(format!("document is not valid base64: {}", e)))?;

    let outcome = state
        .orchestrator
        .document_upload(&id, &content, &req.document_format)
        .await?;
    Ok(Json(DocumentUploadResponse {
        upload_status: outcome.status.to_string(),
        message: outcome.message,
    }))
}

/// Merge applicant details into a validation
#[utoipa::path(
    patch,
    path = "/identity/validations/{id}",
    tag = "identity",
    params(("id" = String, Path, description = "Validation id")),
    request_body = UpdateValidationRequest,
    responses(
        (status = 200, description = "Details merged", body = UpdateValidationResponse),
        (status = 400, description = "Malformed payload", body = ApiError),
        (status = 404, description = "Validation not found", body = ApiError),
        (status = 409, description = "Validation already finished", body = ApiError)
    )
)]
pub async fn update_validation(
    State(state): State<IdentityState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateValidationRequest>,
) -> ApiResult<UpdateValidationResponse> {
    FieldErrors::new()
        .uuid("ValidationId", &id)
        .required("UpdatedInformation", &req.updated_information)
        .finish()?;

    let outcome = state.orchestrator.update_validation(&id, &req.updated_information).await?;
    Ok(Json(UpdateValidationResponse {
        update_status: outcome.status.to_string(),
        message: outcome.message,
    }))
}

/// Finish a validation now
#[utoipa::path(
    post,
    path = "/identity/validations/{id}/end",
    tag = "identity",
    params(("id" = String, Path, description = "Validation id")),
    responses(
        (status = 200, description = "Validation finished", body = EndValidationResponse),
        (status = 404, description = "Validation not found", body = ApiError),
        (status = 409, description = "Validation already finished", body = ApiError),
        (status = 501, description = "An enabled verification stage is not available", body = ApiError)
    )
)]
pub async fn end_validation(
    State(state): State<IdentityState>,
    Path(id): Path<String>,
) -> ApiResult<EndValidationResponse> {
    FieldErrors::new().uuid("ValidationId", &id).finish()?;

    let outcome = state.orchestrator.end_validation(&id).await?;
    Ok(Json(EndValidationResponse {
        final_status: outcome.status.to_string(),
        message: outcome.message,
    }))
}

/// Cancel a validation
#[utoipa::path(
    post,
    path = "/identity/validations/{id}/cancel",
    tag = "identity",
    params(("id" = String, Path, description = "Validation id")),
    responses(
        (status = 200, description = "Validation cancelled", body = CancelValidationResponse),
        (status = 404, description = "Validation not found", body = ApiError),
        (status = 409, description = "Validation already finished", body = ApiError)
    )
)]
pub async fn cancel_validation(
    State(state): State<IdentityState>,
    Path(id): Path<String>,
) -> ApiResult<CancelValidationResponse> {
    FieldErrors::new().uuid("ValidationId", &id).finish()?;

    let outcome = state.orchestrator.cancel_validation(&id).await?;
    Ok(Json(CancelValidationResponse {
        cancellation_status: outcome.status.to_string(),
        message: outcome.message,
    }))
}

pub fn identity_router(state: IdentityState) -> Router {
    Router::new()
        .route("/validations", post(start_validation))
        .route("/validations/:id", get(get_status).patch(update_validation))
        .route("/validations/:id/document", post(upload_document))
        .route("/validations/:id/end", post(end_validation))
        .route("/validations/:id/cancel", post(cancel_validation))
        .with_state(state)
}
