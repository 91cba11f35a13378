//! Database handle used by the migration engine.
//!
//! The engine only needs a handful of capabilities from the target database:
//! listing, creating and dropping collections and indexes, plus CRUD on the
//! ledger collection. [`SchemaStore`] captures exactly that set so the
//! executor can run against MongoDB in production and against
//! [`MemoryStore`] in tests.

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use crate::migration::MigrationRecord;
use async_trait::async_trait;
use thiserror::Error;

/// Error types for store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Index {index} not found on collection {collection}")]
    IndexNotFound { collection: String, index: String },

    #[error("Index {index} on collection {collection} conflicts with an existing index: {reason}")]
    IndexConflict {
        collection: String,
        index: String,
        reason: String,
    },

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),
}

/// Sort direction of one index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexDirection {
    Ascending,
    Descending,
}

impl IndexDirection {
    pub fn as_i32(self) -> i32 {
        match self {
            IndexDirection::Ascending => 1,
            IndexDirection::Descending => -1,
        }
    }
}

/// A named index definition: key fields plus the options the engine supports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub keys: Vec<(String, IndexDirection)>,
    pub unique: bool,
    pub sparse: bool,
}

impl IndexSpec {
    /// Create a non-unique, non-sparse index over the given keys.
    pub fn new<I, K>(name: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = (K, IndexDirection)>,
        K: Into<String>,
    {
        Self {
            name: name.into(),
            keys: keys.into_iter().map(|(k, d)| (k.into(), d)).collect(),
            unique: false,
            sparse: false,
        }
    }

    /// Single-field ascending index.
    pub fn ascending(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(name, [(field.into(), IndexDirection::Ascending)])
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Only index documents that carry at least one of the key fields.
    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    pub fn key_fields(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|(field, _)| field.as_str())
    }
}

/// Connection handle capabilities required by the migration engine.
///
/// Implementations report "already exists" and "not found" conditions through
/// the dedicated [`StoreError`] variants so callers can tell them apart from
/// genuine failures.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Short description of the backend for log output.
    fn describe(&self) -> String;

    async fn has_collection(&self, name: &str) -> Result<bool, StoreError>;

    /// Fails with [`StoreError::CollectionExists`] if the collection is already there.
    async fn create_collection(&self, name: &str) -> Result<(), StoreError>;

    /// Dropping a missing collection succeeds.
    async fn drop_collection(&self, name: &str) -> Result<(), StoreError>;

    /// Index names of a collection; empty when the collection does not exist.
    async fn index_names(&self, collection: &str) -> Result<Vec<String>, StoreError>;

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<(), StoreError>;

    async fn drop_index(&self, collection: &str, name: &str) -> Result<(), StoreError>;

    async fn find_records(&self, collection: &str) -> Result<Vec<MigrationRecord>, StoreError>;

    /// Fails with [`StoreError::DuplicateKey`] when a unique index rejects the record.
    async fn insert_record(
        &self,
        collection: &str,
        record: &MigrationRecord,
    ) -> Result<(), StoreError>;

    /// Returns the number of deleted records (0 or 1).
    async fn delete_record(&self, collection: &str, identifier: &str) -> Result<u64, StoreError>;

    /// Release the underlying connection.
    async fn shutdown(&self);
}
