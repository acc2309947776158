//! Credential Service
//!
//! Login, registration, and permission checks. Stateless: every call reads
//! what it needs through the storage capabilities.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::password::PasswordService;
use super::permission::PermissionService;
use super::token::TokenIssuer;
use crate::error::{PlatformError, Result};
use crate::repository::{AppProvider, UserProvider, UserSaver};

#[derive(Clone)]
pub struct CredentialService {
    user_saver: Arc<dyn UserSaver>,
    user_provider: Arc<dyn UserProvider>,
    app_provider: Arc<dyn AppProvider>,
    permissions: PermissionService,
    passwords: PasswordService,
    token_ttl: Duration,
}

impl CredentialService {
    pub fn new(
        user_saver: Arc<dyn UserSaver>,
        user_provider: Arc<dyn UserProvider>,
        app_provider: Arc<dyn AppProvider>,
        permissions: PermissionService,
        passwords: PasswordService,
        token_ttl: Duration,
    ) -> Self {
        Self {
            user_saver,
            user_provider,
            app_provider,
            permissions,
            passwords,
            token_ttl,
        }
    }

    /// Check credentials and return a token for `app_id`.
    pub async fn login(&self, email: &str, password: &str, app_id: i32) -> Result<String> {
        let user = match self.user_provider.user(email).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => {
                warn!(op = "auth.login", "User not found");
                return Err(PlatformError::InvalidCredentials);
            }
            Err(e) => {
                error!(op = "auth.login", error = %e, "Failed to get user");
                return Err(PlatformError::internal("failed to get user"));
            }
        };

        let Some(stored) = user.password_hash.as_ref() else {
            warn!(op = "auth.login", user_id = %user.id, "User has no password hash");
            return Err(PlatformError::InvalidCredentials);
        };

        match self.passwords.verify_password(password, stored).await {
            Ok(true) => {}
            Ok(false) => {
                info!(op = "auth.login", user_id = %user.id, "Invalid credentials");
                return Err(PlatformError::InvalidCredentials);
            }
            Err(e) => {
                warn!(op = "auth.login", user_id = %user.id, error = %e, "Password comparison failed");
                return Err(PlatformError::InvalidCredentials);
            }
        }

        let app = match self.app_provider.app(app_id).await {
            Ok(app) => app,
            Err(e) if e.is_not_found() => {
                warn!(op = "auth.login", app_id = app_id, "App not found");
                return Err(PlatformError::AppNotFound { app_id });
            }
            Err(e) => {
                error!(op = "auth.login", app_id = app_id, error = %e, "Failed to get app");
                return Err(PlatformError::internal("failed to get app"));
            }
        };

        let token = TokenIssuer::issue(&user, &app, self.token_ttl).map_err(|e| {
            error!(op = "auth.login", user_id = %user.id, app_id = app_id, error = %e, "Failed to generate token");
            PlatformError::internal("failed to generate token")
        })?;

        info!(op = "auth.login", user_id = %user.id, app_id = app_id, "User logged in");
        Ok(token)
    }

    /// Create a user and return its id.
    pub async fn register_new_user(&self, email: &str, password: &str) -> Result<String> {
        let hash = self.passwords.hash_password(password).await.map_err(|e| {
            error!(op = "auth.register", error = %e, "Failed to generate password hash");
            PlatformError::internal("failed to generate password hash")
        })?;

        match self.user_saver.save_user(email, &hash).await {
            Ok(user_id) => {
                info!(op = "auth.register", user_id = %user_id, "User registered");
                Ok(user_id)
            }
            Err(e) if e.is_already_exists() => {
                warn!(op = "auth.register", "User already exists");
                Err(PlatformError::UserExists)
            }
            Err(e) => {
                error!(op = "auth.register", error = %e, "Failed to save user");
                Err(PlatformError::internal("failed to save user"))
            }
        }
    }

    /// Fail-closed: any lookup error is `NotAuthorized`, never `true`.
    pub async fn authorize(&self, permission: &str, user_id: &str) -> Result<bool> {
        match self.permissions.can(permission, user_id).await {
            Ok(allowed) => {
                info!(op = "auth.authorize", user_id = %user_id, permission = %permission, allowed = allowed, "Permission checked");
                Ok(allowed)
            }
            Err(e) => {
                warn!(op = "auth.authorize", user_id = %user_id, permission = %permission, error = %e, "Permission check failed");
                Err(PlatformError::NotAuthorized)
            }
        }
    }
}
