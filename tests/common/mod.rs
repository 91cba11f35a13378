//! Shared helpers for integration tests.

#![allow(dead_code)]

use anyhow::bail;
use async_trait::async_trait;
use mongo_migrator::config::RunnerSettings;
use mongo_migrator::migration::naming::parse_identifier;
use mongo_migrator::migration::{
    Ledger, MigrationContext, MigrationEntry, MigrationExecutor, MigrationRecord,
    MigrationRegistry, MigrationUnit, Reverted,
};
use mongo_migrator::store::{IndexSpec, MemoryStore, SchemaStore, StoreError};
use mongo_migrator::utils::MIGRATIONS_COLLECTION;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const A: &str = "v0.0.1_a_1";
pub const B: &str = "v0.0.1_b_2";
pub const C: &str = "v0.0.2_c_1";
pub const D: &str = "v0.0.10_d_1";

/// Ordered log of `up:<name>` / `down:<name>` calls across all units.
pub type Journal = Arc<Mutex<Vec<String>>>;

/// How a scripted migration behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    /// Creates its collection, then fails.
    FailUp,
    FailDown,
    /// Has no down step.
    NoDown,
    /// Never finishes its up step.
    HangUp,
    /// Another runner records the migration while its up step runs.
    RecordedElsewhere,
}

/// Migration that creates (and drops) a collection named after itself.
pub struct ScriptedMigration {
    identifier: String,
    name: String,
    behavior: Behavior,
    journal: Journal,
    ctx: MigrationContext,
}

impl ScriptedMigration {
    fn log(&self, step: &str) {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{step}:{}", self.name));
    }
}

#[async_trait]
impl MigrationUnit for ScriptedMigration {
    async fn up(&self) -> anyhow::Result<()> {
        self.log("up");
        match self.behavior {
            Behavior::HangUp => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Behavior::RecordedElsewhere => {
                let descriptor = parse_identifier(&self.identifier, "concurrent runner")
                    .map_err(|e| anyhow::anyhow!("{e}"))?;
                Ledger::new(self.ctx.store().clone(), self.ctx.ledger_collection())
                    .record(&descriptor)
                    .await?;
            }
            _ => {}
        }
        self.ctx.create_collection_if_absent(&self.name).await?;
        if self.behavior == Behavior::FailUp {
            bail!("{} exploded", self.name);
        }
        Ok(())
    }

    async fn down(&self) -> anyhow::Result<Reverted> {
        if self.behavior == Behavior::NoDown {
            return Ok(Reverted::Unsupported);
        }
        self.log("down");
        if self.behavior == Behavior::FailDown {
            bail!("{} refused to revert", self.name);
        }
        self.ctx.drop_collection_if_present(&self.name).await?;
        Ok(Reverted::Done)
    }
}

/// Registry entry for a scripted migration.
pub fn scripted(identifier: &str, behavior: Behavior, journal: &Journal) -> MigrationEntry {
    let name = parse_identifier(identifier, "test")
        .expect("test identifiers are valid")
        .name;
    let owned = identifier.to_string();
    let journal = journal.clone();
    MigrationEntry::new(identifier, format!("tests/{identifier}.rs"), move |ctx| {
        Box::new(ScriptedMigration {
            identifier: owned.clone(),
            name: name.clone(),
            behavior,
            journal: journal.clone(),
            ctx,
        })
    })
}

pub fn registry(entries: Vec<MigrationEntry>) -> Arc<MigrationRegistry> {
    let mut registry = MigrationRegistry::new();
    for entry in entries {
        registry.register(entry);
    }
    Arc::new(registry)
}

/// Registry of A, B, C and D, all succeeding unless overridden.
pub fn abcd(journal: &Journal, overrides: &[(&str, Behavior)]) -> Arc<MigrationRegistry> {
    let behavior = |id: &str| {
        overrides
            .iter()
            .find(|(o, _)| *o == id)
            .map(|(_, b)| *b)
            .unwrap_or(Behavior::Succeed)
    };
    registry(
        [A, B, C, D]
            .into_iter()
            .map(|id| scripted(id, behavior(id), journal))
            .collect(),
    )
}

pub fn executor(store: &Arc<MemoryStore>, registry: Arc<MigrationRegistry>) -> MigrationExecutor {
    MigrationExecutor::new(store.clone(), registry, RunnerSettings::default())
}

/// Write ledger records directly, as a previous run would have.
pub async fn seed(store: &Arc<MemoryStore>, identifiers: &[&str]) {
    let ledger = Ledger::new(store.clone(), MIGRATIONS_COLLECTION);
    for identifier in identifiers {
        let descriptor = parse_identifier(identifier, "seed").expect("Should parse identifier");
        ledger.record(&descriptor).await.expect("Should seed record");
    }
}

/// Identifiers currently in the ledger.
pub async fn applied(store: &Arc<MemoryStore>) -> BTreeSet<String> {
    Ledger::new(store.clone(), MIGRATIONS_COLLECTION)
        .list_applied()
        .await
        .expect("Should read ledger")
}

pub fn set(identifiers: &[&str]) -> BTreeSet<String> {
    identifiers.iter().map(|s| s.to_string()).collect()
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

/// Store that delegates to a [`MemoryStore`] but fails chosen ledger writes.
pub struct FailingLedgerStore {
    pub inner: Arc<MemoryStore>,
    /// Identifier whose insert fails with a non-duplicate error.
    pub fail_insert_for: Option<String>,
    pub fail_deletes: bool,
}

fn injected(operation: &str) -> StoreError {
    StoreError::Serialization(format!("injected {operation} failure"))
}

#[async_trait]
impl SchemaStore for FailingLedgerStore {
    fn describe(&self) -> String {
        "failing ledger store".to_string()
    }

    async fn has_collection(&self, name: &str) -> Result<bool, StoreError> {
        self.inner.has_collection(name).await
    }

    async fn create_collection(&self, name: &str) -> Result<(), StoreError> {
        self.inner.create_collection(name).await
    }

    async fn drop_collection(&self, name: &str) -> Result<(), StoreError> {
        self.inner.drop_collection(name).await
    }

    async fn index_names(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        self.inner.index_names(collection).await
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<(), StoreError> {
        self.inner.create_index(collection, index).await
    }

    async fn drop_index(&self, collection: &str, name: &str) -> Result<(), StoreError> {
        self.inner.drop_index(collection, name).await
    }

    async fn find_records(&self, collection: &str) -> Result<Vec<MigrationRecord>, StoreError> {
        self.inner.find_records(collection).await
    }

    async fn insert_record(
        &self,
        collection: &str,
        record: &MigrationRecord,
    ) -> Result<(), StoreError> {
        if self.fail_insert_for.as_deref() == Some(record.identifier.as_str()) {
            return Err(injected("insert"));
        }
        self.inner.insert_record(collection, record).await
    }

    async fn delete_record(&self, collection: &str, identifier: &str) -> Result<u64, StoreError> {
        if self.fail_deletes {
            return Err(injected("delete"));
        }
        self.inner.delete_record(collection, identifier).await
    }

    async fn shutdown(&self) {
        self.inner.shutdown().await
    }
}
