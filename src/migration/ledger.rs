//! The ledger: persisted record of applied migrations.
//!
//! The ledger collection and its unique indexes are created by the bootstrap
//! migration, not here, so every read tolerates the collection being absent.

use super::types::{MigrationDescriptor, MigrationError, MigrationRecord};
use crate::store::{SchemaStore, StoreError};
use crate::version::SemVer;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

pub struct Ledger {
    store: Arc<dyn SchemaStore>,
    collection: String,
}

impl Ledger {
    pub fn new(store: Arc<dyn SchemaStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Identifiers of all applied migrations; empty on a virgin database.
    pub async fn list_applied(&self) -> Result<BTreeSet<String>, MigrationError> {
        Ok(self
            .records()
            .await?
            .into_iter()
            .map(|r| r.identifier)
            .collect())
    }

    /// All ledger records, ordered by version then order.
    pub async fn records(&self) -> Result<Vec<MigrationRecord>, MigrationError> {
        if !self.store.has_collection(&self.collection).await? {
            debug!(collection = %self.collection, "Ledger collection does not exist yet");
            return Ok(Vec::new());
        }

        let mut records = match self.store.find_records(&self.collection).await {
            Ok(records) => records,
            Err(StoreError::CollectionNotFound(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        // Unparseable versions sort last rather than failing a read
        records.sort_by_key(|r| {
            let version = SemVer::parse(&r.version).ok();
            (version.is_none(), version, r.order)
        });
        Ok(records)
    }

    /// Record a migration as applied.
    ///
    /// A collision on the ledger's unique index fails with
    /// [`MigrationError::DuplicateRecord`].
    pub async fn record(
        &self,
        descriptor: &MigrationDescriptor,
    ) -> Result<MigrationRecord, MigrationError> {
        let record = MigrationRecord::from_descriptor(descriptor, crate::utils::now());
        match self.store.insert_record(&self.collection, &record).await {
            Ok(()) => Ok(record),
            Err(StoreError::DuplicateKey(_)) => Err(MigrationError::DuplicateRecord(
                descriptor.identifier.clone(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a migration's record. Returns `false` if there was none.
    pub async fn unrecord(&self, identifier: &str) -> Result<bool, MigrationError> {
        let deleted = self.store.delete_record(&self.collection, identifier).await?;
        Ok(deleted > 0)
    }
}
