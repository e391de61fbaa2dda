//! Migration definition

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::operations::Operation;
use super::{MigrationError, Result};

/// Names are timestamp-prefixed so that lexicographic order is
/// chronological: `20240131093000_create_users`.
static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{8,14}_[a-z0-9_]+$").expect("valid name pattern"));

/// A schema migration: a named, ordered delta with forward and reverse
/// operations
///
/// Migrations are immutable once authored. The `down` list must restore the
/// schema shape `up` produced from; a migration with an empty `down` is
/// irreversible and [`crate::MigrationRunner::revert_last`] refuses it.
///
/// # Examples
///
/// ```rust
/// use tidemark::{FieldType, Migration, Operation, ColumnDefinition};
///
/// let migration = Migration::new("20240101120000_create_users")
///     .up(Operation::CreateTable {
///         name: "users".to_string(),
///         columns: vec![ColumnDefinition::new("id", FieldType::BigInteger).primary_key()],
///         constraints: vec![],
///     })
///     .down(Operation::DropTable {
///         name: "users".to_string(),
///     });
///
/// assert!(migration.is_reversible());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    /// Sortable unique name (timestamp-prefixed)
    pub name: String,

    /// Forward operations
    #[serde(default)]
    pub up: Vec<Operation>,

    /// Reverse operations
    #[serde(default)]
    pub down: Vec<Operation>,

    /// Whether operations and the ledger write run in one transaction
    #[serde(default = "default_atomic")]
    pub atomic: bool,
}

fn default_atomic() -> bool {
    true
}

impl Migration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            up: Vec::new(),
            down: Vec::new(),
            atomic: true,
        }
    }

    /// Append a forward operation
    pub fn up(mut self, operation: Operation) -> Self {
        self.up.push(operation);
        self
    }

    /// Append a reverse operation
    ///
    /// Reverse operations run in the order given; list them so they unwind
    /// the forward operations last-to-first.
    pub fn down(mut self, operation: Operation) -> Self {
        self.down.push(operation);
        self
    }

    /// Disable the per-migration transaction
    ///
    /// Needed for statements the store cannot run inside a transaction
    /// (e.g. `CREATE INDEX CONCURRENTLY`). A non-atomic migration that
    /// fails midway leaves its earlier operations in place, unledgered.
    pub fn non_atomic(mut self) -> Self {
        self.atomic = false;
        self
    }

    pub fn is_reversible(&self) -> bool {
        !self.down.is_empty()
    }

    /// Validate the name shape
    pub fn validate_name(name: &str) -> Result<()> {
        if NAME_PATTERN.is_match(name) {
            Ok(())
        } else {
            Err(MigrationError::InvalidName(name.to_string()))
        }
    }
}
