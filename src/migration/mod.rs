//! Migration system for MongoDB schemas.
//!
//! This module discovers, orders and applies schema migrations, keeping a
//! ledger of what has been applied in the target database.
//!
//! # Overview
//!
//! - Migrations are registered in a `MigrationRegistry` under identifiers of
//!   the form `v<major>.<minor>.<patch>_<name>_<order>`
//! - Discovery parses every identifier and orders them by version, then order
//! - The ledger history must be a prefix of that order before anything runs
//! - The `MigrationExecutor` applies each pending migration and records it
//! - On failure, this run's migrations are rolled back newest first
//!
//! # Usage
//!
//! ```ignore
//! let registry = create_registry();
//! let executor = MigrationExecutor::new(store, registry, RunnerSettings::default());
//! let report = executor.run().await?;
//! ```

mod context;
mod executor;
mod ledger;
pub mod migrations;
pub mod naming;
mod registry;
mod types;
mod validate;

pub use context::MigrationContext;
pub use executor::{MigrationExecutor, RunState};
pub use ledger::Ledger;
pub use registry::{sort_descriptors, MigrationEntry, MigrationFactory, MigrationRegistry};
pub use types::{
    InvalidName, MigrationDescriptor, MigrationError, MigrationRecord, MigrationReport,
    MigrationStatus, MigrationUnit, Reverted, StatusEntry,
};
pub use validate::{pending, validate_integrity};

use std::sync::Arc;

/// Create the default migration registry with all available migrations.
///
/// Registration order does not matter; discovery sorts by identifier.
pub fn create_registry() -> Arc<MigrationRegistry> {
    let mut registry = MigrationRegistry::new();

    registry.register(migrations::v0_0_0_create_migrations::entry());
    registry.register(migrations::v0_0_1_create_users::entry());

    Arc::new(registry)
}
