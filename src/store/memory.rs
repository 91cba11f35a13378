use super::{IndexSpec, SchemaStore, StoreError};
use crate::migration::MigrationRecord;
use async_trait::async_trait;
use mongodb::bson::{self, Bson, Document};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// Name MongoDB gives the implicit primary key index.
const ID_INDEX: &str = "_id_";

#[derive(Debug, Default)]
struct MemoryCollection {
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

impl MemoryCollection {
    /// Values of the index key fields, or `None` when a sparse index skips the document.
    fn index_key(index: &IndexSpec, document: &Document) -> Option<Vec<Bson>> {
        let values: Vec<Option<&Bson>> = index.key_fields().map(|f| document.get(f)).collect();
        if index.sparse && values.iter().all(Option::is_none) {
            return None;
        }
        Some(
            values
                .into_iter()
                .map(|v| v.cloned().unwrap_or(Bson::Null))
                .collect(),
        )
    }

    fn violated_index(&self, document: &Document) -> Option<&IndexSpec> {
        self.indexes.iter().filter(|i| i.unique).find(|index| {
            let Some(key) = Self::index_key(index, document) else {
                return false;
            };
            self.documents
                .iter()
                .any(|existing| Self::index_key(index, existing).as_ref() == Some(&key))
        })
    }

    fn has_duplicates(&self, index: &IndexSpec) -> bool {
        let mut seen = Vec::new();
        for document in &self.documents {
            if let Some(key) = Self::index_key(index, document) {
                if seen.contains(&key) {
                    return true;
                }
                seen.push(key);
            }
        }
        false
    }
}

/// In-process [`SchemaStore`] that mirrors the MongoDB behaviours the engine
/// relies on: implicit collection creation on insert, unique and sparse
/// index enforcement, and "already exists" / "not found" errors.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<BTreeMap<String, MemoryCollection>>,
    shutdowns: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all existing collections.
    pub async fn collection_names(&self) -> Vec<String> {
        self.collections.lock().await.keys().cloned().collect()
    }

    /// Definition of a named index, if present.
    pub async fn index(&self, collection: &str, name: &str) -> Option<IndexSpec> {
        self.collections
            .lock()
            .await
            .get(collection)
            .and_then(|c| c.indexes.iter().find(|i| i.name == name).cloned())
    }

    /// Number of times [`SchemaStore::shutdown`] has been called.
    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchemaStore for MemoryStore {
    fn describe(&self) -> String {
        "in-memory store".to_string()
    }

    async fn has_collection(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.collections.lock().await.contains_key(name))
    }

    async fn create_collection(&self, name: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.lock().await;
        if collections.contains_key(name) {
            return Err(StoreError::CollectionExists(name.to_string()));
        }
        collections.insert(name.to_string(), MemoryCollection::default());
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<(), StoreError> {
        self.collections.lock().await.remove(name);
        Ok(())
    }

    async fn index_names(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        let collections = self.collections.lock().await;
        Ok(match collections.get(collection) {
            Some(c) => std::iter::once(ID_INDEX.to_string())
                .chain(c.indexes.iter().map(|i| i.name.clone()))
                .collect(),
            None => Vec::new(),
        })
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<(), StoreError> {
        let mut collections = self.collections.lock().await;
        let target = collections.entry(collection.to_string()).or_default();

        if let Some(existing) = target.indexes.iter().find(|i| i.name == index.name) {
            if existing == index {
                return Ok(());
            }
            return Err(StoreError::IndexConflict {
                collection: collection.to_string(),
                index: index.name.clone(),
                reason: "an index with the same name has different keys or options".to_string(),
            });
        }
        if let Some(existing) = target.indexes.iter().find(|i| i.keys == index.keys) {
            return Err(StoreError::IndexConflict {
                collection: collection.to_string(),
                index: index.name.clone(),
                reason: format!("index {} already covers the same keys", existing.name),
            });
        }
        if index.unique && target.has_duplicates(index) {
            return Err(StoreError::DuplicateKey(format!(
                "existing documents in {} violate unique index {}",
                collection, index.name
            )));
        }

        target.indexes.push(index.clone());
        Ok(())
    }

    async fn drop_index(&self, collection: &str, name: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.lock().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        let before = target.indexes.len();
        target.indexes.retain(|i| i.name != name);
        if target.indexes.len() == before {
            return Err(StoreError::IndexNotFound {
                collection: collection.to_string(),
                index: name.to_string(),
            });
        }
        Ok(())
    }

    async fn find_records(&self, collection: &str) -> Result<Vec<MigrationRecord>, StoreError> {
        let collections = self.collections.lock().await;
        let Some(source) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        source
            .documents
            .iter()
            .map(|d| {
                bson::from_document(d.clone())
                    .map_err(|e| StoreError::Serialization(e.to_string()))
            })
            .collect()
    }

    async fn insert_record(
        &self,
        collection: &str,
        record: &MigrationRecord,
    ) -> Result<(), StoreError> {
        let document =
            bson::to_document(record).map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut collections = self.collections.lock().await;
        let target = collections.entry(collection.to_string()).or_default();
        if let Some(index) = target.violated_index(&document) {
            return Err(StoreError::DuplicateKey(format!(
                "E11000 duplicate key error collection: {} index: {}",
                collection, index.name
            )));
        }
        target.documents.push(document);
        Ok(())
    }

    async fn delete_record(&self, collection: &str, identifier: &str) -> Result<u64, StoreError> {
        let mut collections = self.collections.lock().await;
        let Some(target) = collections.get_mut(collection) else {
            return Ok(0);
        };
        match target
            .documents
            .iter()
            .position(|d| d.get_str("identifier").ok() == Some(identifier))
        {
            Some(position) => {
                target.documents.remove(position);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}
