//! Repository Layer
//!
//! Storage capabilities consumed by the services, with a MongoDB and an
//! in-memory implementation. Services only see the traits.

pub mod application;
pub mod indexes;
pub mod memory;
pub mod user;
pub mod validation;

pub use application::ApplicationRepository;
pub use memory::InMemoryStore;
pub use user::UserRepository;
pub use validation::ValidationRepository;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Application, IdentityValidation, PasswordHash, User};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("{entity} already exists")]
    AlreadyExists { entity: &'static str },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

impl From<mongodb::error::Error> for StorageError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[async_trait]
pub trait UserSaver: Send + Sync {
    /// Persist a new user and return its id. Duplicate email is `AlreadyExists`.
    async fn save_user(&self, email: &str, password_hash: &PasswordHash) -> StorageResult<String>;
}

#[async_trait]
pub trait UserProvider: Send + Sync {
    async fn user(&self, email: &str) -> StorageResult<User>;

    async fn user_by_id(&self, id: &str) -> StorageResult<User>;
}

#[async_trait]
pub trait AppProvider: Send + Sync {
    async fn app(&self, app_id: i32) -> StorageResult<Application>;
}

#[async_trait]
pub trait PermissionProvider: Send + Sync {
    async fn can(&self, permission: &str, user_id: &str) -> StorageResult<bool>;
}

#[async_trait]
pub trait ValidationSaver: Send + Sync {
    /// Insert a new validation. A second active validation for the same user
    /// is `AlreadyExists`.
    async fn create_validation(&self, validation: &IdentityValidation) -> StorageResult<()>;

    /// Replace `current` with `replacement` only if the stored record still
    /// has `current`'s status and `updated_at`. Returns `false` when another
    /// writer got there first.
    async fn replace_validation(
        &self,
        current: &IdentityValidation,
        replacement: &IdentityValidation,
    ) -> StorageResult<bool>;
}

#[async_trait]
pub trait ValidationProvider: Send + Sync {
    async fn validation(&self, id: &str) -> StorageResult<IdentityValidation>;

    async fn active_validation_exists(&self, user_id: &str) -> StorageResult<bool>;
}

/// Duplicate-key write error (E11000).
pub(crate) fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};

    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == 11000
    )
}
