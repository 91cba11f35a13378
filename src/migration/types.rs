//! Types for the migration system.

use crate::store::StoreError;
use crate::version::SemVer;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A migration name that failed to parse, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidName {
    pub name: String,
    pub reason: String,
}

impl fmt::Display for InvalidName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.reason)
    }
}

fn join_display<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn rollback_summary(failures: &[MigrationError]) -> String {
    if failures.is_empty() {
        String::new()
    } else {
        format!(" ({} rollback failure(s): {})", failures.len(), join_display(failures))
    }
}

/// Error types for migration operations.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Invalid migration name(s): {}", join_display(.0))]
    InvalidNameFormat(Vec<InvalidName>),

    #[error("Duplicate migration identifier {identifier} (registered by {first} and {second})")]
    DuplicateIdentifier {
        identifier: String,
        first: String,
        second: String,
    },

    #[error("Migrations {first} and {second} both use order {order} in version {version}")]
    AmbiguousOrder {
        first: String,
        second: String,
        version: SemVer,
        order: u32,
    },

    #[error("Applied migration(s) no longer present: {}", .0.join(", "))]
    OrphanRecord(Vec<String>),

    #[error("Migration {0} is applied but an earlier migration is still pending")]
    OutOfOrderExecution(String),

    #[error("No migration registered for {0}")]
    UnknownMigration(String),

    #[error("Migration {identifier} failed: {cause}{}", rollback_summary(.rollback_failures))]
    MigrationFailed {
        identifier: String,
        cause: String,
        rollback_failures: Vec<MigrationError>,
    },

    #[error("Ledger already holds a record for {0}")]
    DuplicateRecord(String),

    #[error("Rollback failed for migration {identifier}: {reason}")]
    RollbackFailed { identifier: String, reason: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// A parsed migration identifier.
///
/// Descriptors are derived from registered migration names and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationDescriptor {
    /// Source file of the migration unit.
    pub source: String,
    /// Canonical name without extension, unique across the system.
    pub identifier: String,
    pub version: SemVer,
    pub name: String,
    /// Tie-breaker within one version.
    pub order: u32,
}

/// A ledger entry for one applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRecord {
    pub identifier: String,
    pub version: String,
    pub order: u32,
    pub name: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub applied_at: DateTime<Utc>,
}

impl MigrationRecord {
    /// Snapshot a descriptor at apply time.
    pub fn from_descriptor(descriptor: &MigrationDescriptor, applied_at: DateTime<Utc>) -> Self {
        Self {
            identifier: descriptor.identifier.clone(),
            version: descriptor.version.to_string(),
            order: descriptor.order,
            name: descriptor.name.clone(),
            applied_at,
        }
    }
}

/// Outcome of a migration's `down` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reverted {
    /// The migration's effects were undone.
    Done,
    /// The migration cannot be reverted.
    Unsupported,
}

/// Trait for a single migration unit.
///
/// Units are built by a factory that hands them a
/// [`MigrationContext`](super::MigrationContext); `up` is required, `down`
/// defaults to [`Reverted::Unsupported`].
#[async_trait]
pub trait MigrationUnit: Send + Sync {
    /// Apply the migration.
    async fn up(&self) -> anyhow::Result<()>;

    /// Revert the migration.
    async fn down(&self) -> anyhow::Result<Reverted> {
        Ok(Reverted::Unsupported)
    }
}

/// Result of a completed migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    /// Number of discovered migrations.
    pub total: usize,
    /// Number of migrations already applied when the run started.
    pub applied_before: usize,
    /// Identifiers applied during this run, in order.
    pub applied: Vec<String>,
}

/// Applied/pending state of one discovered migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    pub identifier: String,
    pub version: String,
    pub order: u32,
    pub name: String,
    pub applied_at: Option<DateTime<Utc>>,
}

impl StatusEntry {
    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }
}

/// Read-only view of the ledger against the discovered migrations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub entries: Vec<StatusEntry>,
}

impl MigrationStatus {
    pub fn pending(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries.iter().filter(|e| !e.is_applied())
    }

    pub fn applied(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries.iter().filter(|e| e.is_applied())
    }
}
