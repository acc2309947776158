//! Permission Service

use std::sync::Arc;

use crate::repository::{PermissionProvider, StorageResult};

#[derive(Clone)]
pub struct PermissionService {
    provider: Arc<dyn PermissionProvider>,
}

impl PermissionService {
    pub fn new(provider: Arc<dyn PermissionProvider>) -> Self {
        Self { provider }
    }

    /// Can `user_id` perform `permission`? Errors are passed through; callers
    /// decide how to treat them.
    pub async fn can(&self, permission: &str, user_id: &str) -> StorageResult<bool> {
        self.provider.can(permission, user_id).await
    }
}
