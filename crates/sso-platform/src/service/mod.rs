//! Service Layer

pub mod auth;
pub mod password;
pub mod permission;
pub mod token;
pub mod verification;

pub use auth::CredentialService;
pub use password::{Argon2Config, PasswordError, PasswordService};
pub use permission::PermissionService;
pub use token::{TokenClaims, TokenError, TokenIssuer};
pub use verification::{StartedValidation, TransitionOutcome, ValidationState, VerificationOrchestrator};
