//! Migration execution plan

use chrono::{DateTime, Utc};

use super::migration::Migration;

/// Ordered batch of migrations the runner is about to apply
///
/// Always ascending by name; built by
/// [`crate::MigrationRunner::plan`] after the ledger prefix check, so a
/// plan never contains a migration older than one already applied.
#[derive(Debug, Clone, Default)]
pub struct MigrationPlan {
    pub migrations: Vec<Migration>,
}

impl MigrationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.migrations.iter().map(|m| m.name.as_str()).collect()
    }
}

/// One line of `migrate status` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub name: String,
    /// `None` for pending migrations
    pub applied_at: Option<DateTime<Utc>>,
    /// `false` for ledger rows the registry does not know, a sign the
    /// binary is older than the database
    pub known: bool,
}

impl MigrationStatus {
    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }
}
