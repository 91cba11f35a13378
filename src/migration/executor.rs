//! Migration executor for running migrations.

use super::context::MigrationContext;
use super::ledger::Ledger;
use super::registry::MigrationRegistry;
use super::types::{
    MigrationDescriptor, MigrationError, MigrationReport, MigrationStatus, MigrationUnit,
    Reverted, StatusEntry,
};
use super::validate::{pending, validate_integrity};
use crate::config::RunnerSettings;
use crate::store::SchemaStore;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Stages of a migration run.
///
/// `Connecting` is entered by the store's constructor, before an executor
/// exists; the executor drives every later stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Connecting,
    Discovering,
    Validating,
    Applying,
    Committed,
    RollingBack,
    Disconnected,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Connecting => "connecting",
            RunState::Discovering => "discovering",
            RunState::Validating => "validating",
            RunState::Applying => "applying",
            RunState::Committed => "committed",
            RunState::RollingBack => "rolling-back",
            RunState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// A unit touched during the current run, kept for rollback.
struct AppliedUnit<'a> {
    descriptor: &'a MigrationDescriptor,
    unit: Box<dyn MigrationUnit>,
    /// Whether this run may own a ledger record for the unit.
    recorded: bool,
}

/// Executor for running migrations.
///
/// The executor owns the connection for the lifetime of a run. Both
/// [`run`](Self::run) and [`status`](Self::status) consume it and shut the
/// store down exactly once, whatever the outcome.
pub struct MigrationExecutor {
    store: Arc<dyn SchemaStore>,
    registry: Arc<MigrationRegistry>,
    ledger: Ledger,
    context: MigrationContext,
    unit_timeout: Option<Duration>,
}

impl MigrationExecutor {
    /// Create a new executor over a connected store.
    pub fn new(
        store: Arc<dyn SchemaStore>,
        registry: Arc<MigrationRegistry>,
        settings: RunnerSettings,
    ) -> Self {
        let ledger = Ledger::new(store.clone(), settings.ledger_collection.clone());
        let context = MigrationContext::new(store.clone(), settings.ledger_collection.clone());
        Self {
            store,
            registry,
            ledger,
            context,
            unit_timeout: settings.unit_timeout(),
        }
    }

    /// Apply all pending migrations.
    ///
    /// This method:
    /// 1. Discovers and orders the registered migrations
    /// 2. Checks the ledger history is a prefix of that order
    /// 3. Applies each pending migration and records it in the ledger
    /// 4. Rolls back this run's migrations in reverse order on failure
    /// 5. Releases the connection
    pub async fn run(self) -> Result<MigrationReport, MigrationError> {
        let result = self.migrate().await;
        self.disconnect().await;
        result
    }

    /// Report applied and pending migrations without changing anything.
    pub async fn status(self) -> Result<MigrationStatus, MigrationError> {
        let result = self.inspect().await;
        self.disconnect().await;
        result
    }

    async fn migrate(&self) -> Result<MigrationReport, MigrationError> {
        let sorted = self.discover()?;
        let applied = self.validate(&sorted).await?;
        let pending = pending(&sorted, &applied);

        info!(
            total = sorted.len(),
            applied = applied.len(),
            pending = pending.len(),
            "Migration plan ready"
        );

        let mut report = MigrationReport {
            total: sorted.len(),
            applied_before: applied.len(),
            applied: Vec::new(),
        };

        if pending.is_empty() {
            info!("No pending migrations");
            return Ok(report);
        }

        self.enter(RunState::Applying);
        let mut applied_this_run: Vec<AppliedUnit<'_>> = Vec::new();

        for descriptor in pending {
            let identifier = &descriptor.identifier;
            info!(identifier = %identifier, source = %descriptor.source, "Applying migration");

            let unit = match self.registry.instantiate(identifier, self.context.clone()) {
                Ok(unit) => unit,
                Err(e) => {
                    let cause = e.to_string();
                    return Err(self.roll_back(descriptor, cause, applied_this_run).await);
                }
            };

            let outcome = self.guarded(unit.up()).await;
            if let Err(e) = outcome {
                let cause = format!("{e:#}");
                error!(identifier = %identifier, error = %cause, "Migration failed");
                // Its up step may have partially run, so it is reverted first
                applied_this_run.push(AppliedUnit {
                    descriptor,
                    unit,
                    recorded: false,
                });
                return Err(self.roll_back(descriptor, cause, applied_this_run).await);
            }

            let recording = self.ledger.record(descriptor).await;
            if let Err(e) = recording {
                error!(identifier = %identifier, error = %e, "Failed to record migration");
                // A duplicate belongs to a concurrent runner: neither its record nor
                // its schema changes are ours to undo.
                if !matches!(e, MigrationError::DuplicateRecord(_)) {
                    applied_this_run.push(AppliedUnit {
                        descriptor,
                        unit,
                        recorded: true,
                    });
                }
                return Err(self.roll_back(descriptor, e.to_string(), applied_this_run).await);
            }

            info!(identifier = %identifier, "Migration applied");
            report.applied.push(identifier.clone());
            applied_this_run.push(AppliedUnit {
                descriptor,
                unit,
                recorded: true,
            });
        }

        self.enter(RunState::Committed);
        info!(count = report.applied.len(), "All pending migrations applied");
        Ok(report)
    }

    async fn inspect(&self) -> Result<MigrationStatus, MigrationError> {
        let sorted = self.discover()?;
        self.validate(&sorted).await?;

        let mut applied_at: HashMap<String, _> = self
            .ledger
            .records()
            .await?
            .into_iter()
            .map(|r| (r.identifier, r.applied_at))
            .collect();

        let entries = sorted
            .into_iter()
            .map(|d| StatusEntry {
                applied_at: applied_at.remove(&d.identifier),
                version: d.version.to_string(),
                identifier: d.identifier,
                order: d.order,
                name: d.name,
            })
            .collect();

        Ok(MigrationStatus { entries })
    }

    fn discover(&self) -> Result<Vec<MigrationDescriptor>, MigrationError> {
        self.enter(RunState::Discovering);
        let sorted = self.registry.discover().map_err(|e| {
            error!(error = %e, "Migration discovery failed");
            e
        })?;
        debug!(count = sorted.len(), "Discovered migrations");
        Ok(sorted)
    }

    async fn validate(
        &self,
        sorted: &[MigrationDescriptor],
    ) -> Result<BTreeSet<String>, MigrationError> {
        self.enter(RunState::Validating);
        let applied = self.ledger.list_applied().await?;
        validate_integrity(sorted, &applied).map_err(|e| {
            error!(error = %e, "Migration history is inconsistent, nothing was applied");
            e
        })?;
        Ok(applied)
    }

    /// Revert every unit touched in this run, newest first, and build the
    /// terminal error for the original failure.
    async fn roll_back(
        &self,
        failed: &MigrationDescriptor,
        cause: String,
        applied_this_run: Vec<AppliedUnit<'_>>,
    ) -> MigrationError {
        let mut rollback_failures = Vec::new();

        if !applied_this_run.is_empty() {
            self.enter(RunState::RollingBack);
            warn!(count = applied_this_run.len(), "Rolling back migrations from this run");

            for applied in applied_this_run.iter().rev() {
                if let Err(e) = self.roll_back_unit(applied).await {
                    error!(error = %e, "Rollback failed");
                    rollback_failures.push(e);
                }
            }
        }

        MigrationError::MigrationFailed {
            identifier: failed.identifier.clone(),
            cause,
            rollback_failures,
        }
    }

    async fn roll_back_unit(&self, applied: &AppliedUnit<'_>) -> Result<(), MigrationError> {
        let identifier = &applied.descriptor.identifier;
        info!(identifier = %identifier, "Rolling back migration");

        let down_failure = match self.guarded(applied.unit.down()).await {
            Ok(Reverted::Done) => None,
            Ok(Reverted::Unsupported) => {
                // Effects of up may still be present, so the record stays
                warn!(identifier = %identifier, "Migration has no down step");
                let reason = if applied.recorded {
                    "migration has no down step; ledger record kept"
                } else {
                    "migration has no down step"
                };
                return Err(MigrationError::RollbackFailed {
                    identifier: identifier.clone(),
                    reason: reason.to_string(),
                });
            }
            Err(e) => Some(format!("down failed: {e:#}")),
        };

        let unrecord_failure = if applied.recorded {
            match self.ledger.unrecord(identifier).await {
                Ok(_) => None,
                Err(e) => Some(format!("could not remove ledger record: {e}")),
            }
        } else {
            None
        };

        let reasons: Vec<String> = down_failure.into_iter().chain(unrecord_failure).collect();
        if reasons.is_empty() {
            info!(identifier = %identifier, "Migration rolled back");
            Ok(())
        } else {
            Err(MigrationError::RollbackFailed {
                identifier: identifier.clone(),
                reason: reasons.join("; "),
            })
        }
    }

    /// Run a unit step under the configured deadline, if any.
    async fn guarded<T, F>(&self, step: F) -> anyhow::Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match self.unit_timeout {
            Some(limit) => match tokio::time::timeout(limit, step).await {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!("timed out after {}s", limit.as_secs())),
            },
            None => step.await,
        }
    }

    fn enter(&self, state: RunState) {
        debug!(state = %state, "Migration run state");
    }

    async fn disconnect(&self) {
        self.store.shutdown().await;
        self.enter(RunState::Disconnected);
        info!(store = %self.store.describe(), "Disconnected");
    }
}
