//! Semantic versions used in migration identifiers.

mod types;

pub use types::{SemVer, VersionError};
