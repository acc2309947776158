//! API Layer
//!
//! HTTP/JSON transport over the credential and verification services.
//! Requests are validated here; error kinds map to status codes in `common`.

pub mod auth;
pub mod common;
pub mod health;
pub mod identity;
pub mod openapi;
pub mod validation;

pub use auth::{auth_router, AuthState};
pub use common::{ApiError, ApiResult};
pub use health::health_router;
pub use identity::{identity_router, IdentityState};
pub use openapi::ApiDoc;

use axum::Router;

/// All platform routes, without transport layers (tracing, CORS, docs).
pub fn platform_router(auth: AuthState, identity: IdentityState) -> Router {
    Router::new()
        .merge(health_router())
        .nest("/auth", auth_router(auth))
        .nest("/identity", identity_router(identity))
}
