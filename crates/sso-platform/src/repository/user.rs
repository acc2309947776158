//! User Repository

use async_trait::async_trait;
use mongodb::{bson::doc, Collection, Database};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{is_duplicate_key, PermissionProvider, StorageError, StorageResult, UserProvider, UserSaver};
use crate::domain::{PasswordHash, Permission, User};

/// Stored shape of a user in the `users` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserDocument {
    unique_id: String,
    email: String,
    password_hash: String,
    #[serde(default)]
    permissions: Vec<String>,
}

impl From<UserDocument> for User {
    fn from(doc: UserDocument) -> Self {
        User {
            id: doc.unique_id,
            email: doc.email,
            password_hash: Some(PasswordHash::new(doc.password_hash)),
            permissions: doc.permissions.into_iter().map(Permission::new).collect(),
        }
    }
}

pub struct UserRepository {
    collection: Collection<UserDocument>,
}

impl UserRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("users"),
        }
    }
}

#[async_trait]
impl UserSaver for UserRepository {
    async fn save_user(&self, email: &str, password_hash: &PasswordHash) -> StorageResult<String> {
        let doc = UserDocument {
            unique_id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            password_hash: password_hash.as_str().to_string(),
            permissions: Vec::new(),
        };

        match self.collection.insert_one(&doc).await {
            Ok(_) => {
                debug!(user_id = %doc.unique_id, "User inserted");
                Ok(doc.unique_id)
            }
            Err(e) if is_duplicate_key(&e) => Err(StorageError::AlreadyExists { entity: "user" }),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl UserProvider for UserRepository {
    async fn user(&self, email: &str) -> StorageResult<User> {
        self.collection
            .find_one(doc! { "email": email })
            .await?
            .map(User::from)
            .ok_or(StorageError::NotFound { entity: "user" })
    }

    async fn user_by_id(&self, id: &str) -> StorageResult<User> {
        self.collection
            .find_one(doc! { "uniqueId": id })
            .await?
            .map(User::from)
            .ok_or(StorageError::NotFound { entity: "user" })
    }
}

#[async_trait]
impl PermissionProvider for UserRepository {
    async fn can(&self, permission: &str, user_id: &str) -> StorageResult<bool> {
        if self.collection.count_documents(doc! { "uniqueId": user_id }).await? == 0 {
            return Err(StorageError::NotFound { entity: "user" });
        }

        let granted = self
            .collection
            .count_documents(doc! { "uniqueId": user_id, "permissions": permission })
            .await?;
        Ok(granted > 0)
    }
}
