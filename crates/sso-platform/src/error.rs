//! Platform Error Types

use thiserror::Error;

use crate::domain::ValidationStatus;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("User already exists")]
    UserExists,

    #[error("Application not found: {app_id}")]
    AppNotFound { app_id: i32 },

    #[error("Not authorized")]
    NotAuthorized,

    #[error("Invalid user id: {user_id}")]
    InvalidUserId { user_id: String },

    #[error("User {user_id} already has an active identity validation")]
    ValidationAlreadyActive { user_id: String },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Cannot {action} validation {id} in status {status}")]
    InvalidTransition {
        id: String,
        status: ValidationStatus,
        action: String,
    },

    #[error("Bad payload: {message}")]
    BadPayload { message: String },

    #[error("{message}")]
    InvalidArgument { message: String },

    #[error("Not implemented: {operation}")]
    NotImplemented { operation: String },

    /// Never carries backend detail; that is logged where it happens.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Stable, transport-independent error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidCredentials,
    UserExists,
    AppNotFound,
    NotAuthorized,
    InvalidUserId,
    ValidationAlreadyActive,
    NotFound,
    InvalidTransition,
    BadPayload,
    InvalidArgument,
    NotImplemented,
    Internal,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::UserExists => "USER_EXISTS",
            Self::AppNotFound => "APP_NOT_FOUND",
            Self::NotAuthorized => "NOT_AUTHORIZED",
            Self::InvalidUserId => "INVALID_USER_ID",
            Self::ValidationAlreadyActive => "VALIDATION_ALREADY_ACTIVE",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidTransition => "INVALID_TRANSITION",
            Self::BadPayload => "BAD_PAYLOAD",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NotImplemented => "NOT_IMPLEMENTED",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn fault_class(&self) -> FaultClass {
        match self {
            Self::NotAuthorized => FaultClass::Auth,
            Self::Internal | Self::NotImplemented => FaultClass::Server,
            _ => FaultClass::Client,
        }
    }
}

/// Who is at fault, for transports that only distinguish a few classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    Client,
    Auth,
    Server,
}

impl PlatformError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCredentials => ErrorKind::InvalidCredentials,
            Self::UserExists => ErrorKind::UserExists,
            Self::AppNotFound { .. } => ErrorKind::AppNotFound,
            Self::NotAuthorized => ErrorKind::NotAuthorized,
            Self::InvalidUserId { .. } => ErrorKind::InvalidUserId,
            Self::ValidationAlreadyActive { .. } => ErrorKind::ValidationAlreadyActive,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::BadPayload { .. } => ErrorKind::BadPayload,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::NotImplemented { .. } => ErrorKind::NotImplemented,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn fault_class(&self) -> FaultClass {
        self.kind().fault_class()
    }

    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn invalid_transition(id: impl Into<String>, status: ValidationStatus, action: impl Into<String>) -> Self {
        Self::InvalidTransition {
            id: id.into(),
            status,
            action: action.into(),
        }
    }

    pub fn bad_payload(message: impl Into<String>) -> Self {
        Self::BadPayload { message: message.into() }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    pub fn not_implemented(operation: impl Into<String>) -> Self {
        Self::NotImplemented { operation: operation.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, PlatformError>;
