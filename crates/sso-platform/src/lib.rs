//! Auth SSO Platform
//!
//! Core platform providing:
//! - Registration and login with Argon2id password hashes
//! - HS512 session tokens signed per relying application
//! - Fail-closed permission checks
//! - An identity-verification workflow driven by background workers
//!
//! Services depend only on the storage capabilities in `repository` and the
//! work dispatcher in `sso_queue`.

pub mod api;
pub mod domain;
pub mod error;
pub mod repository;
pub mod service;
pub mod tasks;

pub use domain::*;
pub use error::{ErrorKind, FaultClass, PlatformError};
