//! Migration identifier parsing.
//!
//! Identifiers follow `v<major>.<minor>.<patch>_<name>_<order>`, for example
//! `v0.0.1_create-users_0001`. The fixed source extension is stripped before
//! parsing.

use super::types::{InvalidName, MigrationDescriptor};
use crate::version::SemVer;
use once_cell::sync::Lazy;
use regex::Regex;

/// Source extension stripped from identifiers.
pub const MIGRATION_EXTENSION: &str = ".rs";

const EXPECTED_FORMAT: &str = "expected v<major>.<minor>.<patch>_<name>_<order>";

static MIGRATION_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^v([0-9]+\.[0-9]+\.[0-9]+)_(.+)_([0-9]+)$")
        .expect("migration name regex should compile")
});

/// Strip the fixed extension, if present.
pub fn strip_extension(raw: &str) -> &str {
    raw.strip_suffix(MIGRATION_EXTENSION).unwrap_or(raw)
}

/// Parse a migration identifier into a descriptor.
///
/// A name whose last `_`-separated segment is all digits is rejected: in
/// `v0.0.1_step_2_0001` the split between name and order cannot be told
/// apart from intent, so it is reported rather than guessed.
pub fn parse_identifier(raw: &str, source: &str) -> Result<MigrationDescriptor, InvalidName> {
    let identifier = strip_extension(raw);
    let invalid = |reason: String| InvalidName {
        name: raw.to_string(),
        reason,
    };

    let captures = MIGRATION_NAME_REGEX
        .captures(identifier)
        .ok_or_else(|| invalid(EXPECTED_FORMAT.to_string()))?;

    let version = SemVer::parse(&captures[1]).map_err(|e| invalid(e.to_string()))?;
    let name = &captures[2];
    let order: u32 = captures[3]
        .parse()
        .map_err(|_| invalid(format!("order {} is out of range", &captures[3])))?;

    if let Some((_, tail)) = name.rsplit_once('_') {
        if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid(format!(
                "ambiguous: name {name:?} ends in a numeric segment that could be the order"
            )));
        }
    }

    Ok(MigrationDescriptor {
        source: source.to_string(),
        identifier: identifier.to_string(),
        version,
        name: name.to_string(),
        order,
    })
}
