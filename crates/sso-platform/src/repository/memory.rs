//! In-memory storage for tests and local development.
//!
//! One mutex guards all state and is held for each whole operation, which
//! gives the same atomicity the MongoDB indexes and conditional replaces do.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{
    AppProvider, PermissionProvider, StorageError, StorageResult, UserProvider, UserSaver,
    ValidationProvider, ValidationSaver,
};
use crate::domain::{Application, IdentityValidation, PasswordHash, User};

#[derive(Default)]
struct State {
    users: HashMap<String, User>,
    apps: HashMap<i32, Application>,
    validations: HashMap<String, IdentityValidation>,
}

impl State {
    fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users.values().find(|u| u.email == email)
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every operation fails with a backend error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn insert_app(&self, app: Application) {
        self.state.lock().apps.insert(app.id, app);
    }

    pub fn grant_permission(&self, user_id: &str, permission: &str) -> StorageResult<()> {
        let mut state = self.state.lock();
        let user = state
            .users
            .get_mut(user_id)
            .ok_or(StorageError::NotFound { entity: "user" })?;
        user.grant_permission(permission);
        Ok(())
    }

    pub fn validations_for_user(&self, user_id: &str) -> Vec<IdentityValidation> {
        let mut found: Vec<_> = self
            .state
            .lock()
            .validations
            .values()
            .filter(|v| v.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by_key(|v| v.created_at);
        found
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StorageError::Backend("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl UserSaver for InMemoryStore {
    async fn save_user(&self, email: &str, password_hash: &PasswordHash) -> StorageResult<String> {
        self.check_available()?;
        let mut state = self.state.lock();

        if state.user_by_email(email).is_some() {
            return Err(StorageError::AlreadyExists { entity: "user" });
        }

        let id = uuid::Uuid::new_v4().to_string();
        let user = User::new(id.clone(), email).with_password_hash(password_hash.clone());
        state.users.insert(id.clone(), user);
        Ok(id)
    }
}

#[async_trait]
impl UserProvider for InMemoryStore {
    async fn user(&self, email: &str) -> StorageResult<User> {
        self.check_available()?;
        self.state
            .lock()
            .user_by_email(email)
            .cloned()
            .ok_or(StorageError::NotFound { entity: "user" })
    }

    async fn user_by_id(&self, id: &str) -> StorageResult<User> {
        self.check_available()?;
        self.state
            .lock()
            .users
            .get(id)
            .cloned()
            .ok_or(StorageError::NotFound { entity: "user" })
    }
}

#[async_trait]
impl AppProvider for InMemoryStore {
    async fn app(&self, app_id: i32) -> StorageResult<Application> {
        self.check_available()?;
        self.state
            .lock()
            .apps
            .get(&app_id)
            .cloned()
            .ok_or(StorageError::NotFound { entity: "app" })
    }
}

#[async_trait]
impl PermissionProvider for InMemoryStore {
    async fn can(&self, permission: &str, user_id: &str) -> StorageResult<bool> {
        self.check_available()?;
        self.state
            .lock()
            .users
            .get(user_id)
            .map(|u| u.has_permission(permission))
            .ok_or(StorageError::NotFound { entity: "user" })
    }
}

#[async_trait]
impl ValidationSaver for InMemoryStore {
    async fn create_validation(&self, validation: &IdentityValidation) -> StorageResult<()> {
        self.check_available()?;
        let mut state = self.state.lock();

        let duplicate_active = validation.is_active()
            && state
                .validations
                .values()
                .any(|v| v.user_id == validation.user_id && v.is_active());
        if duplicate_active || state.validations.contains_key(&validation.id) {
            return Err(StorageError::AlreadyExists { entity: "validation" });
        }

        state.validations.insert(validation.id.clone(), validation.clone());
        Ok(())
    }

    async fn replace_validation(
        &self,
        current: &IdentityValidation,
        replacement: &IdentityValidation,
    ) -> StorageResult<bool> {
        self.check_available()?;
        let mut state = self.state.lock();

        match state.validations.get_mut(&current.id) {
            Some(stored) if stored.status == current.status && stored.updated_at == current.updated_at => {
                *stored = replacement.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ValidationProvider for InMemoryStore {
    async fn validation(&self, id: &str) -> StorageResult<IdentityValidation> {
        self.check_available()?;
        self.state
            .lock()
            .validations
            .get(id)
            .cloned()
            .ok_or(StorageError::NotFound { entity: "validation" })
    }

    async fn active_validation_exists(&self, user_id: &str) -> StorageResult<bool> {
        self.check_available()?;
        Ok(self
            .state
            .lock()
            .validations
            .values()
            .any(|v| v.user_id == user_id && v.is_active()))
    }
}
