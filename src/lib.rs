//! # Tidemark
//!
//! Ledgered schema migrations for SQL databases.
//!
//! A migration is a named, ordered schema delta with forward (`up`) and
//! reverse (`down`) operations. Migrations are registered in a
//! [`MigrationRegistry`], applied in ascending name order by a
//! [`MigrationRunner`], and recorded in a persisted ledger table
//! (`tidemark_migrations`) holding one row per applied migration.
//!
//! ## Example
//!
//! ```rust
//! use tidemark::{
//!     FieldType, Migration, MigrationRegistry, MigrationRunner, MemoryStore,
//!     Operation, ColumnDefinition,
//! };
//!
//! # async fn example() -> tidemark::Result<()> {
//! let mut registry = MigrationRegistry::new();
//! registry.register(
//!     Migration::new("20240101120000_create_users")
//!         .up(Operation::CreateTable {
//!             name: "users".to_string(),
//!             columns: vec![
//!                 ColumnDefinition::new("id", FieldType::BigInteger)
//!                     .primary_key()
//!                     .auto_increment(),
//!                 ColumnDefinition::new("email", FieldType::VarChar(255))
//!                     .not_null()
//!                     .unique(),
//!             ],
//!             constraints: vec![],
//!         })
//!         .down(Operation::DropTable {
//!             name: "users".to_string(),
//!         }),
//! )?;
//!
//! let runner = MigrationRunner::new(MemoryStore::new(), registry);
//! let result = runner.apply_pending().await?;
//! assert_eq!(result.applied, vec!["20240101120000_create_users"]);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod executor;
pub mod fields;
pub mod loader;
pub mod migration;
pub mod operations;
pub mod plan;
pub mod recorder;
pub mod registry;
pub mod state;
pub mod store;

pub use config::Config;
pub use executor::{ExecutionResult, MigrationRunner};
pub use fields::FieldType;
pub use loader::MigrationLoader;
pub use migration::Migration;
pub use operations::{
    ColumnDefinition, Constraint, ForeignKeyAction, ForeignKeyDef, Operation, SqlDialect,
};
pub use plan::{MigrationPlan, MigrationStatus};
pub use recorder::{AppliedMigration, LEDGER_TABLE};
pub use registry::{MigrationProvider, MigrationRegistry};
pub use state::{SchemaState, TableState};
#[cfg(feature = "mysql")]
pub use store::MySqlStore;
#[cfg(feature = "postgres")]
pub use store::PostgresStore;
#[cfg(feature = "sqlite")]
pub use store::SqliteStore;
pub use store::{MemoryStore, MigrationStore};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Migration not found: {0}")]
    NotFound(String),

    #[error("Nothing to revert: no applied migrations recorded")]
    NothingToRevert,

    #[error("Database unreachable: {0}")]
    ConnectionError(String),

    #[error("Schema conflict: {0}")]
    SchemaConflict(String),

    /// Applied records must form a prefix of the name-sorted registry.
    /// A gap means a migration was skipped, which is operator error.
    #[error("Ledger gap: {missing} is pending but {applied_after} is already applied")]
    LedgerGap {
        missing: String,
        applied_after: String,
    },

    #[error("Duplicate migration name: {0}")]
    DuplicateName(String),

    #[error("Invalid migration name: {0} (expected <timestamp>_<slug>, e.g. 20240131093000_create_users)")]
    InvalidName(String),

    #[error("Irreversible migration: {0} declares no down operations")]
    Irreversible(String),

    #[error("Failed to acquire migration lock: {0}")]
    LockTimeout(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MigrationError>;

// Prelude for migration authoring
pub mod prelude {
    pub use super::{
        ColumnDefinition, Constraint, FieldType, ForeignKeyAction, ForeignKeyDef, Migration,
        MigrationProvider, MigrationRegistry, Operation,
    };
}
