//! Migration runner
//!
//! Applies pending migrations in ascending name order and reverts the most
//! recently applied one. The whole batch runs under the store's exclusive
//! lock so two operators cannot double-apply; each migration's own
//! transaction boundary is authoritative for atomicity.

use std::collections::BTreeSet;

use super::plan::{MigrationPlan, MigrationStatus};
use super::recorder;
use super::registry::MigrationRegistry;
use super::store::MigrationStore;
use super::{MigrationError, Result};

/// Outcome of [`MigrationRunner::apply_pending`]
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// Names applied in this batch, in order
    pub applied: Vec<String>,
}

/// Applies and reverts migrations against a [`MigrationStore`]
///
/// # Examples
///
/// ```rust
/// use tidemark::{MemoryStore, Migration, MigrationRegistry, MigrationRunner};
///
/// # async fn example() -> tidemark::Result<()> {
/// let mut registry = MigrationRegistry::new();
/// registry.register(Migration::new("20240101000000_noop"))?;
///
/// let runner = MigrationRunner::new(MemoryStore::new(), registry);
/// let result = runner.apply_pending().await?;
/// assert_eq!(result.applied, vec!["20240101000000_noop"]);
///
/// // Nothing pending: a second run is a no-op
/// assert!(runner.apply_pending().await?.applied.is_empty());
/// # Ok(())
/// # }
/// ```
pub struct MigrationRunner<S: MigrationStore> {
    store: S,
    registry: MigrationRegistry,
}

impl<S: MigrationStore> MigrationRunner<S> {
    pub fn new(store: S, registry: MigrationRegistry) -> Self {
        Self { store, registry }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    /// Compute the pending batch: registry minus ledger, ascending
    ///
    /// Enforces the prefix invariant: once an unapplied migration is seen,
    /// no later-named migration may be recorded as applied. A violation
    /// fails with [`MigrationError::LedgerGap`] instead of silently
    /// skipping, since later migrations may assume the missing one's schema
    /// state. Ledger rows the registry does not know are logged and
    /// otherwise ignored here.
    pub async fn plan(&self) -> Result<MigrationPlan> {
        self.store.ensure_ledger().await?;
        let applied = self.store.applied().await?;

        let applied_names: BTreeSet<&str> =
            applied.iter().map(|r| r.name.as_str()).collect();
        for record in &applied {
            if !self.registry.contains(&record.name) {
                tracing::warn!(
                    name = %record.name,
                    "ledger records a migration unknown to the registry"
                );
            }
        }

        let mut pending = Vec::new();
        let mut first_missing: Option<&str> = None;
        for migration in self.registry.list() {
            if applied_names.contains(migration.name.as_str()) {
                if let Some(missing) = first_missing {
                    return Err(MigrationError::LedgerGap {
                        missing: missing.to_string(),
                        applied_after: migration.name.clone(),
                    });
                }
            } else {
                first_missing.get_or_insert(migration.name.as_str());
                pending.push(migration.clone());
            }
        }

        Ok(MigrationPlan {
            migrations: pending,
        })
    }

    /// Apply every pending migration in order
    ///
    /// Stops at the first failure and surfaces it unchanged; migrations
    /// already applied in the batch stay applied. A run with nothing
    /// pending is a no-op.
    pub async fn apply_pending(&self) -> Result<ExecutionResult> {
        self.store.acquire_lock().await?;
        let result = self.apply_pending_locked().await;
        // The lock must come off even after a failed batch
        if let Err(err) = self.store.release_lock().await {
            tracing::warn!(error = %err, "failed to release migration lock");
        }
        result
    }

    async fn apply_pending_locked(&self) -> Result<ExecutionResult> {
        let plan = self.plan().await?;
        if plan.is_empty() {
            tracing::info!("no pending migrations");
            return Ok(ExecutionResult::default());
        }

        let mut applied = Vec::with_capacity(plan.len());
        for migration in &plan.migrations {
            tracing::info!(name = %migration.name, "applying migration");
            self.store.apply(migration).await?;
            applied.push(migration.name.clone());
        }

        tracing::info!(count = applied.len(), "migrations applied");
        Ok(ExecutionResult { applied })
    }

    /// Revert the most recently applied migration
    ///
    /// Picks the latest ledger row by `applied_at` (ties broken by name
    /// descending), runs its `down` operations and deletes the row.
    /// Returns the reverted name. Fails with
    /// [`MigrationError::NothingToRevert`] on an empty ledger,
    /// [`MigrationError::NotFound`] if the registry does not know the
    /// recorded name, and [`MigrationError::Irreversible`] if the
    /// migration declares no `down` operations.
    pub async fn revert_last(&self) -> Result<String> {
        self.store.acquire_lock().await?;
        let result = self.revert_last_locked().await;
        if let Err(err) = self.store.release_lock().await {
            tracing::warn!(error = %err, "failed to release migration lock");
        }
        result
    }

    async fn revert_last_locked(&self) -> Result<String> {
        self.store.ensure_ledger().await?;
        let applied = self.store.applied().await?;

        let last = recorder::most_recent(&applied).ok_or(MigrationError::NothingToRevert)?;
        let migration = self.registry.get(&last.name)?;
        if !migration.is_reversible() {
            return Err(MigrationError::Irreversible(migration.name.clone()));
        }

        tracing::info!(name = %migration.name, "reverting migration");
        self.store.revert(migration).await?;
        Ok(migration.name.clone())
    }

    /// Per-migration status: every registered migration in order, then any
    /// ledger rows the registry does not know
    pub async fn status(&self) -> Result<Vec<MigrationStatus>> {
        self.store.ensure_ledger().await?;
        let applied = self.store.applied().await?;

        let mut statuses: Vec<MigrationStatus> = self
            .registry
            .list()
            .map(|migration| MigrationStatus {
                name: migration.name.clone(),
                applied_at: applied
                    .iter()
                    .find(|r| r.name == migration.name)
                    .map(|r| r.applied_at),
                known: true,
            })
            .collect();

        for record in &applied {
            if !self.registry.contains(&record.name) {
                statuses.push(MigrationStatus {
                    name: record.name.clone(),
                    applied_at: Some(record.applied_at),
                    known: false,
                });
            }
        }

        Ok(statuses)
    }
}
