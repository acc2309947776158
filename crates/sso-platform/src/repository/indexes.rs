//! Index setup. Called once at startup; the unique indexes are what make
//! email uniqueness and the one-active-validation rule hold under concurrency.

use mongodb::bson::{doc, Document};
use mongodb::options::IndexOptions;
use mongodb::{Database, IndexModel};
use tracing::info;

use super::StorageResult;
use crate::domain::ValidationStatus;

pub async fn ensure_indexes(db: &Database) -> StorageResult<()> {
    let users = db.collection::<Document>("users");
    users
        .create_indexes(vec![
            IndexModel::builder()
                .keys(doc! { "email": 1 })
                .options(IndexOptions::builder().name("uniq_email".to_string()).unique(true).build())
                .build(),
            IndexModel::builder()
                .keys(doc! { "uniqueId": 1 })
                .options(IndexOptions::builder().name("uniq_unique_id".to_string()).unique(true).build())
                .build(),
        ])
        .await?;

    let apps = db.collection::<Document>("apps");
    apps.create_index(
        IndexModel::builder()
            .keys(doc! { "appID": 1 })
            .options(IndexOptions::builder().name("uniq_app_id".to_string()).unique(true).build())
            .build(),
    )
    .await?;

    let validations = db.collection::<Document>("validations");
    validations
        .create_index(
            IndexModel::builder()
                .keys(doc! { "userId": 1 })
                .options(
                    IndexOptions::builder()
                        .name("uniq_active_validation_per_user".to_string())
                        .unique(true)
                        .partial_filter_expression(doc! { "status": ValidationStatus::Pending.as_str() })
                        .build(),
                )
                .build(),
        )
        .await?;

    info!("Ensured indexes on users, apps, validations");
    Ok(())
}
