//! Bootstrap migration - creates the ledger collection and its indexes.
//!
//! Runs before anything is recorded, so it must tolerate a partially created
//! ledger. It has no down step: removing the ledger would erase the history
//! the executor relies on.

use crate::migration::{MigrationContext, MigrationEntry, MigrationUnit};
use crate::store::{IndexDirection, IndexSpec};
use async_trait::async_trait;
use tracing::info;

pub const IDENTIFIER: &str = "v0.0.0_create-migrations_0001";

/// Unique index on the migration identifier.
pub const IDENTIFIER_INDEX: &str = "idx_identifier_unique";

/// Unique index preventing reuse of an order slot within a version.
pub const VERSION_ORDER_NAME_INDEX: &str = "idx_version_order_name_unique";

pub fn entry() -> MigrationEntry {
    MigrationEntry::new(IDENTIFIER, file!(), |ctx| {
        Box::new(CreateMigrationsCollection::new(ctx))
    })
}

pub struct CreateMigrationsCollection {
    ctx: MigrationContext,
}

impl CreateMigrationsCollection {
    pub fn new(ctx: MigrationContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl MigrationUnit for CreateMigrationsCollection {
    async fn up(&self) -> anyhow::Result<()> {
        let collection = self.ctx.ledger_collection();

        self.ctx.create_collection_if_absent(collection).await?;
        info!(migration = IDENTIFIER, collection, "Ledger collection ready");

        self.ctx
            .create_index_if_absent(
                collection,
                &IndexSpec::ascending(IDENTIFIER_INDEX, "identifier").unique(),
            )
            .await?;
        info!(migration = IDENTIFIER, index = IDENTIFIER_INDEX, "Index ready");

        self.ctx
            .create_index_if_absent(
                collection,
                &IndexSpec::new(
                    VERSION_ORDER_NAME_INDEX,
                    [
                        ("version", IndexDirection::Ascending),
                        ("order", IndexDirection::Ascending),
                        ("name", IndexDirection::Ascending),
                    ],
                )
                .unique(),
            )
            .await?;
        info!(migration = IDENTIFIER, index = VERSION_ORDER_NAME_INDEX, "Index ready");

        Ok(())
    }
}
