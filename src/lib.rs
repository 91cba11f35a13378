pub mod config;
pub mod migration;
pub mod store;
pub mod utils;
pub mod version;

// Re-export commonly used types
pub use config::{ConfigError, MongoSettings, RunnerSettings};
pub use migration::{
    create_registry, MigrationContext, MigrationEntry, MigrationError, MigrationExecutor,
    MigrationRegistry, MigrationReport, MigrationStatus, MigrationUnit, Reverted,
};
pub use store::{IndexDirection, IndexSpec, MemoryStore, MongoStore, SchemaStore, StoreError};
pub use version::{SemVer, VersionError};
