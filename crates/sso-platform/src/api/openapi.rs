//! OpenAPI Documentation

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Auth SSO API",
        version = "1.0.0",
        description = "Credentials, permission checks, and identity verification"
    ),
    servers(
        (url = "http://localhost:44044", description = "Local development")
    ),
    tags(
        (name = "auth", description = "Registration, login, and authorization"),
        (name = "identity", description = "Identity verification workflow"),
        (name = "monitoring", description = "Health")
    ),
    paths(
        super::auth::register,
        super::auth::login,
        super::auth::authorize,
        super::identity::start_validation,
        super::identity::get_status,
        super::identity::upload_document,
        super::identity::update_validation,
        super::identity::end_validation,
        super::identity::cancel_validation,
        super::health::health,
    ),
    components(schemas(
        super::common::ApiError,
        super::auth::RegisterRequest,
        super::auth::RegisterResponse,
        super::auth::LoginRequest,
        super::auth::LoginResponse,
        super::auth::AuthorizeRequest,
        super::auth::AuthorizeResponse,
        super::identity::StartValidationRequest,
        super::identity::StartValidationResponse,
        super::identity::ValidationStatusResponse,
        super::identity::DocumentUploadRequest,
        super::identity::DocumentUploadResponse,
        super::identity::UpdateValidationRequest,
        super::identity::UpdateValidationResponse,
        super::identity::EndValidationResponse,
        super::identity::CancelValidationResponse,
        super::health::HealthResponse,
    ))
)]
pub struct ApiDoc;
