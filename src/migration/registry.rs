//! Migration registry: the table of known migration units and their discovery.

use super::context::MigrationContext;
use super::naming::{parse_identifier, strip_extension};
use super::types::{MigrationDescriptor, MigrationError, MigrationUnit};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds a migration unit from its context.
pub type MigrationFactory = Arc<dyn Fn(MigrationContext) -> Box<dyn MigrationUnit> + Send + Sync>;

/// One registered migration: its identifier, source file and constructor.
#[derive(Clone)]
pub struct MigrationEntry {
    identifier: String,
    source: String,
    factory: MigrationFactory,
}

impl MigrationEntry {
    pub fn new<F>(identifier: impl Into<String>, source: impl Into<String>, factory: F) -> Self
    where
        F: Fn(MigrationContext) -> Box<dyn MigrationUnit> + Send + Sync + 'static,
    {
        Self {
            identifier: identifier.into(),
            source: source.into(),
            factory: Arc::new(factory),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for MigrationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationEntry")
            .field("identifier", &self.identifier)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Registry of all available migrations.
///
/// Entries are kept in registration order; [`discover`](Self::discover)
/// validates their names and produces the total execution order.
#[derive(Debug, Default)]
pub struct MigrationRegistry {
    entries: Vec<MigrationEntry>,
}

impl MigrationRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register a migration.
    pub fn register(&mut self, entry: MigrationEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse and order every registered migration.
    ///
    /// Fails closed: all malformed names are reported together, and duplicate
    /// identifiers or two migrations sharing a version and order are rejected.
    pub fn discover(&self) -> Result<Vec<MigrationDescriptor>, MigrationError> {
        let mut descriptors = Vec::with_capacity(self.entries.len());
        let mut invalid = Vec::new();

        for entry in &self.entries {
            match parse_identifier(&entry.identifier, &entry.source) {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(e) => invalid.push(e),
            }
        }

        if !invalid.is_empty() {
            return Err(MigrationError::InvalidNameFormat(invalid));
        }

        let mut seen: HashMap<&str, &str> = HashMap::new();
        for descriptor in &descriptors {
            if let Some(first) = seen.insert(&descriptor.identifier, &descriptor.source) {
                return Err(MigrationError::DuplicateIdentifier {
                    identifier: descriptor.identifier.clone(),
                    first: first.to_string(),
                    second: descriptor.source.clone(),
                });
            }
        }

        let sorted = sort_descriptors(descriptors);

        if let Some(pair) = sorted
            .windows(2)
            .find(|w| w[0].version == w[1].version && w[0].order == w[1].order)
        {
            return Err(MigrationError::AmbiguousOrder {
                first: pair[0].identifier.clone(),
                second: pair[1].identifier.clone(),
                version: pair[0].version,
                order: pair[0].order,
            });
        }

        Ok(sorted)
    }

    /// Build the unit registered under `identifier`.
    pub fn instantiate(
        &self,
        identifier: &str,
        ctx: MigrationContext,
    ) -> Result<Box<dyn MigrationUnit>, MigrationError> {
        self.entries
            .iter()
            .find(|e| strip_extension(&e.identifier) == identifier)
            .map(|e| (e.factory)(ctx))
            .ok_or_else(|| MigrationError::UnknownMigration(identifier.to_string()))
    }
}

/// Order descriptors by version, then by order within a version.
///
/// The sort is stable, so descriptors with equal keys keep their input order.
pub fn sort_descriptors(mut descriptors: Vec<MigrationDescriptor>) -> Vec<MigrationDescriptor> {
    descriptors.sort_by(|a, b| a.version.cmp(&b.version).then(a.order.cmp(&b.order)));
    descriptors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::Reverted;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    // Mock migration for testing
    struct MockMigration;

    #[async_trait]
    impl MigrationUnit for MockMigration {
        async fn up(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn down(&self) -> anyhow::Result<Reverted> {
            Ok(Reverted::Done)
        }
    }

    fn mock(identifier: &str) -> MigrationEntry {
        MigrationEntry::new(identifier, format!("{identifier}.rs"), |_ctx| {
            Box::new(MockMigration)
        })
    }

    fn registry(identifiers: &[&str]) -> MigrationRegistry {
        let mut registry = MigrationRegistry::new();
        for identifier in identifiers {
            registry.register(mock(identifier));
        }
        registry
    }

    fn identifiers(descriptors: &[MigrationDescriptor]) -> Vec<&str> {
        descriptors.iter().map(|d| d.identifier.as_str()).collect()
    }

    #[test]
    fn test_empty_registry() {
        let registry = MigrationRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.discover().unwrap().is_empty());
    }

    #[test]
    fn test_discover_sorts_by_version_then_order() {
        let registry = registry(&[
            "v0.0.10_later_1",
            "v0.0.2_second_2",
            "v0.0.2_first_1",
            "v0.0.9_middle_1",
            "v0.1.0_minor_1",
        ]);

        let sorted = registry.discover().unwrap();
        assert_eq!(
            identifiers(&sorted),
            vec![
                "v0.0.2_first_1",
                "v0.0.2_second_2",
                "v0.0.9_middle_1",
                "v0.0.10_later_1",
                "v0.1.0_minor_1",
            ]
        );
    }

    #[test]
    fn test_discover_reports_every_bad_name() {
        let registry = registry(&[
            "v0.0.1_ok_1",
            "bad_name.rs",
            "v0.0.2_ok_1",
            "v1_also-bad_1",
        ]);

        match registry.discover() {
            Err(MigrationError::InvalidNameFormat(names)) => {
                let names: Vec<&str> = names.iter().map(|n| n.name.as_str()).collect();
                assert_eq!(names, vec!["bad_name.rs", "v1_also-bad_1"]);
            }
            other => panic!("expected InvalidNameFormat, got {other:?}"),
        }
    }

    #[test]
    fn test_discover_rejects_duplicate_identifier() {
        let registry = registry(&["v0.0.1_a_1", "v0.0.1_a_1.rs"]);
        let result = registry.discover();
        assert!(matches!(
            result,
            Err(MigrationError::DuplicateIdentifier { identifier, .. }) if identifier == "v0.0.1_a_1"
        ));
    }

    #[test]
    fn test_discover_rejects_shared_order_slot() {
        let registry = registry(&["v0.0.1_a_1", "v0.0.1_b_1"]);
        let result = registry.discover();
        assert!(matches!(
            result,
            Err(MigrationError::AmbiguousOrder { order: 1, .. })
        ));
    }

    #[test]
    fn test_same_order_in_different_versions_is_fine() {
        let registry = registry(&["v0.0.2_b_1", "v0.0.1_a_1"]);
        let sorted = registry.discover().unwrap();
        assert_eq!(identifiers(&sorted), vec!["v0.0.1_a_1", "v0.0.2_b_1"]);
    }

    #[test]
    fn test_sort_is_stable_for_equal_keys() {
        let make = |identifier: &str, source: &str| MigrationDescriptor {
            source: source.to_string(),
            identifier: identifier.to_string(),
            version: crate::version::SemVer::new(0, 0, 1),
            name: identifier.to_string(),
            order: 1,
        };
        let sorted = sort_descriptors(vec![make("b", "1"), make("a", "2")]);
        assert_eq!(identifiers(&sorted), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_instantiate() {
        let registry = registry(&["v0.0.1_a_1.rs"]);
        let ctx = MigrationContext::new(Arc::new(MemoryStore::new()), "migrations");

        let unit = registry.instantiate("v0.0.1_a_1", ctx.clone()).unwrap();
        assert_eq!(unit.down().await.unwrap(), Reverted::Done);

        let missing = registry.instantiate("v0.0.2_b_1", ctx);
        assert!(matches!(missing, Err(MigrationError::UnknownMigration(_))));
    }
}
