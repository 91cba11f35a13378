//! Context handed to every migration unit, with idempotent schema helpers.

use crate::store::{IndexSpec, SchemaStore, StoreError};
use std::sync::Arc;
use tracing::debug;

/// Explicit dependencies of a migration unit.
///
/// Each unit receives its own clone at instantiation; there is no global state.
#[derive(Clone)]
pub struct MigrationContext {
    store: Arc<dyn SchemaStore>,
    ledger_collection: String,
}

impl MigrationContext {
    pub fn new(store: Arc<dyn SchemaStore>, ledger_collection: impl Into<String>) -> Self {
        Self {
            store,
            ledger_collection: ledger_collection.into(),
        }
    }

    /// The underlying database handle, for operations the helpers do not cover.
    pub fn store(&self) -> &Arc<dyn SchemaStore> {
        &self.store
    }

    /// Name of the collection holding applied-migration records.
    pub fn ledger_collection(&self) -> &str {
        &self.ledger_collection
    }

    /// Create a collection unless it already exists.
    ///
    /// Returns `true` if this call created it. A concurrent creation that wins
    /// the race also counts as "already exists"; any other failure propagates.
    pub async fn create_collection_if_absent(&self, name: &str) -> Result<bool, StoreError> {
        if self.store.has_collection(name).await? {
            debug!(collection = name, "Collection already exists");
            return Ok(false);
        }
        match self.store.create_collection(name).await {
            Ok(()) => Ok(true),
            Err(StoreError::CollectionExists(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create an index unless one with the same name exists.
    ///
    /// An existing index with that name is left untouched, even if its
    /// definition differs.
    pub async fn create_index_if_absent(
        &self,
        collection: &str,
        index: &IndexSpec,
    ) -> Result<bool, StoreError> {
        let existing = self.store.index_names(collection).await?;
        if existing.iter().any(|name| name == &index.name) {
            debug!(collection, index = %index.name, "Index already exists");
            return Ok(false);
        }
        self.store.create_index(collection, index).await?;
        Ok(true)
    }

    /// Drop an index if it exists. Returns `true` if this call dropped it.
    pub async fn drop_index_if_present(
        &self,
        collection: &str,
        name: &str,
    ) -> Result<bool, StoreError> {
        let existing = self.store.index_names(collection).await?;
        if !existing.iter().any(|n| n == name) {
            return Ok(false);
        }
        match self.store.drop_index(collection, name).await {
            Ok(()) => Ok(true),
            Err(StoreError::IndexNotFound { .. }) | Err(StoreError::CollectionNotFound(_)) => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Drop a collection if it exists. Returns `true` if this call dropped it.
    pub async fn drop_collection_if_present(&self, name: &str) -> Result<bool, StoreError> {
        if !self.store.has_collection(name).await? {
            return Ok(false);
        }
        self.store.drop_collection(name).await?;
        Ok(true)
    }
}
