//! Application Repository
//!
//! Applications are provisioned out of band; the platform only reads them.

use async_trait::async_trait;
use mongodb::{bson::doc, Collection, Database};

use super::{AppProvider, StorageError, StorageResult};
use crate::domain::Application;

pub struct ApplicationRepository {
    collection: Collection<Application>,
}

impl ApplicationRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("apps"),
        }
    }
}

#[async_trait]
impl AppProvider for ApplicationRepository {
    async fn app(&self, app_id: i32) -> StorageResult<Application> {
        self.collection
            .find_one(doc! { "appID": app_id })
            .await?
            .ok_or(StorageError::NotFound { entity: "app" })
    }
}
