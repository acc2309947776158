//! Identity Validation Repository

use async_trait::async_trait;
use mongodb::{bson::doc, Collection, Database};

use super::{is_duplicate_key, StorageError, StorageResult, ValidationProvider, ValidationSaver};
use crate::domain::{IdentityValidation, ValidationStatus};

pub struct ValidationRepository {
    collection: Collection<IdentityValidation>,
}

impl ValidationRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("validations"),
        }
    }
}

#[async_trait]
impl ValidationSaver for ValidationRepository {
    async fn create_validation(&self, validation: &IdentityValidation) -> StorageResult<()> {
        // The partial unique index on active validations rejects a second one
        match self.collection.insert_one(validation).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(StorageError::AlreadyExists { entity: "validation" }),
            Err(e) => Err(e.into()),
        }
    }

    async fn replace_validation(
        &self,
        current: &IdentityValidation,
        replacement: &IdentityValidation,
    ) -> StorageResult<bool> {
        let previous = self
            .collection
            .find_one_and_replace(
                doc! {
                    "_id": &current.id,
                    "status": current.status.as_str(),
                    "updatedAt": bson::DateTime::from_chrono(current.updated_at),
                },
                replacement,
            )
            .await?;
        Ok(previous.is_some())
    }
}

#[async_trait]
impl ValidationProvider for ValidationRepository {
    async fn validation(&self, id: &str) -> StorageResult<IdentityValidation> {
        self.collection
            .find_one(doc! { "_id": id })
            .await?
            .ok_or(StorageError::NotFound { entity: "validation" })
    }

    async fn active_validation_exists(&self, user_id: &str) -> StorageResult<bool> {
        let count = self
            .collection
            .count_documents(doc! {
                "userId": user_id,
                "status": ValidationStatus::Pending.as_str(),
            })
            .await?;
        Ok(count > 0)
    }
}
