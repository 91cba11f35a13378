//! Creates the `users` collection with its unique indexes.

use crate::migration::{MigrationContext, MigrationEntry, MigrationUnit, Reverted};
use crate::store::IndexSpec;
use async_trait::async_trait;
use tracing::info;

pub const IDENTIFIER: &str = "v0.0.1_create-users_0001";

const COLLECTION: &str = "users";

const USERNAME_INDEX: &str = "idx_username_unique";
const MOBILE_PHONE_INDEX: &str = "idx_mobilePhone_unique";
const EMAIL_INDEX: &str = "idx_email_unique";

pub fn entry() -> MigrationEntry {
    MigrationEntry::new(IDENTIFIER, file!(), |ctx| {
        Box::new(CreateUsersCollection::new(ctx))
    })
}

fn indexes() -> [IndexSpec; 3] {
    [
        IndexSpec::ascending(USERNAME_INDEX, "username").unique(),
        IndexSpec::ascending(MOBILE_PHONE_INDEX, "mobilePhone").unique(),
        // Email is optional, so only documents that have one are checked
        IndexSpec::ascending(EMAIL_INDEX, "email").unique().sparse(),
    ]
}

pub struct CreateUsersCollection {
    ctx: MigrationContext,
}

impl CreateUsersCollection {
    pub fn new(ctx: MigrationContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl MigrationUnit for CreateUsersCollection {
    async fn up(&self) -> anyhow::Result<()> {
        self.ctx.create_collection_if_absent(COLLECTION).await?;
        info!(migration = IDENTIFIER, collection = COLLECTION, "Collection ready");

        for index in indexes() {
            self.ctx.create_index_if_absent(COLLECTION, &index).await?;
            info!(migration = IDENTIFIER, index = %index.name, "Index ready");
        }
        Ok(())
    }

    async fn down(&self) -> anyhow::Result<Reverted> {
        for index in indexes().iter().rev() {
            self.ctx.drop_index_if_present(COLLECTION, &index.name).await?;
            info!(migration = IDENTIFIER, index = %index.name, "Index dropped");
        }

        self.ctx.drop_collection_if_present(COLLECTION).await?;
        info!(migration = IDENTIFIER, collection = COLLECTION, "Collection dropped");
        Ok(Reverted::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn migration() -> (Arc<MemoryStore>, CreateUsersCollection) {
        let store = Arc::new(MemoryStore::new());
        let migration =
            CreateUsersCollection::new(MigrationContext::new(store.clone(), "migrations"));
        (store, migration)
    }

    #[tokio::test]
    async fn test_up_creates_collection_and_indexes() {
        let (store, migration) = migration();
        migration.up().await.unwrap();

        assert_eq!(store.collection_names().await, vec!["users".to_string()]);
        let email = store.index(COLLECTION, EMAIL_INDEX).await.unwrap();
        assert!(email.unique);
        assert!(email.sparse);
        let username = store.index(COLLECTION, USERNAME_INDEX).await.unwrap();
        assert!(username.unique);
        assert!(!username.sparse);
        assert!(store.index(COLLECTION, MOBILE_PHONE_INDEX).await.is_some());
    }

    #[tokio::test]
    async fn test_down_reverts_up() {
        let (store, migration) = migration();
        migration.up().await.unwrap();

        assert_eq!(migration.down().await.unwrap(), Reverted::Done);
        assert!(store.collection_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_down_after_partial_up() {
        let (store, migration) = migration();
        migration
            .ctx
            .create_collection_if_absent(COLLECTION)
            .await
            .unwrap();

        assert_eq!(migration.down().await.unwrap(), Reverted::Done);
        assert!(store.collection_names().await.is_empty());
    }
}
