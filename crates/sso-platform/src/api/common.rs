//! Common API types and utilities

use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::{ErrorKind, PlatformError};

/// Standard API error response
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    /// Stable error code, e.g. `INVALID_TRANSITION`
    pub error: String,
    pub message: String,
}

pub type ApiResult<T> = Result<Json<T>, PlatformError>;

/// JSON request body. Malformed or mistyped bodies are rejected as
/// `INVALID_ARGUMENT` in the `ApiError` shape instead of axum's plain text.
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = PlatformError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(PlatformError::invalid_argument(rejection.body_text())),
        }
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidCredentials => StatusCode::UNAUTHORIZED,
        ErrorKind::NotAuthorized => StatusCode::FORBIDDEN,
        ErrorKind::UserExists | ErrorKind::ValidationAlreadyActive | ErrorKind::InvalidTransition => {
            StatusCode::CONFLICT
        }
        ErrorKind::NotFound | ErrorKind::AppNotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidUserId | ErrorKind::BadPayload | ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for PlatformError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let body = ApiError {
            error: kind.code().to_string(),
            message: self.to_string(),
        };
        (status_for(kind), Json(body)).into_response()
    }
}
