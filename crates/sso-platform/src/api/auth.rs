//! Auth API Endpoints
//!
//! - POST /auth/register - Create a user
//! - POST /auth/login - Exchange credentials for an application token
//! - POST /auth/authorize - Check a permission grant

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::api::common::{ApiError, ApiResult, JsonBody};
use crate::api::validation::FieldErrors;
use crate::service::CredentialService;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    /// Relying application id
    #[serde(default)]
    pub app_id: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    /// HS512-signed session token
    pub token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeRequest {
    #[serde(default)]
    pub permission: String,
    #[serde(default)]
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthorizeResponse {
    pub authorized: bool,
}

#[derive(Clone)]
pub struct AuthState {
    pub credentials: Arc<CredentialService>,
}

/// Register a new user
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "User created", body = RegisterResponse),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 409, description = "User already exists", body = ApiError)
    )
)]
pub async fn register(
    State(state): State<AuthState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> ApiResult<RegisterResponse> {
    FieldErrors::new()
        .email("Email", &req.email)
        .password("Password", &req.password)
        .finish()?;

    let user_id = state.credentials.register_new_user(&req.email, &req.password).await?;
    Ok(Json(RegisterResponse { user_id }))
}

/// Log in to an application
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ApiError),
        (status = 404, description = "Application not found", body = ApiError)
    )
)]
pub async fn login(
    State(state): State<AuthState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let mut errors = FieldErrors::new();
    errors
        .email("Email", &req.email)
        .password("Password", &req.password)
        .positive("AppId", req.app_id);
    if req.app_id > i64::from(i32::MAX) {
        errors.fail("AppId", "max");
    }
    errors.finish()?;

    let token = state
        .credentials
        .login(&req.email, &req.password, req.app_id as i32)
        .await?;
    Ok(Json(LoginResponse { token }))
}

/// Check whether a user holds a permission
#[utoipa::path(
    post,
    path = "/auth/authorize",
    tag = "auth",
    request_body = AuthorizeRequest,
    responses(
        (status = 200, description = "Permission checked", body = AuthorizeResponse),
        (status = 403, description = "Check could not be completed", body = ApiError)
    )
)]
pub async fn authorize(
    State(state): State<AuthState>,
    JsonBody(req): JsonBody<AuthorizeRequest>,
) -> ApiResult<AuthorizeResponse> {
    FieldErrors::new()
        .required("Permission", &req.permission)
        .uuid("UserId", &req.user_id)
        .finish()?;

    let authorized = state.credentials.authorize(&req.permission, &req.user_id).await?;
    Ok(Json(AuthorizeResponse { authorized }))
}

pub fn auth_router(state: AuthState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/authorize", post(authorize))
        .with_state(state)
}
