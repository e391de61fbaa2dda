//! Migration registry
//!
//! An append-only, ordered set of uniquely named migrations. Registration
//! happens at build/deploy time, either through the builder API or by
//! implementing [`MigrationProvider`] next to your migration modules, never
//! at runtime.

use std::collections::BTreeMap;

use super::migration::Migration;
use super::{MigrationError, Result};

/// Trait for types that provide migrations
///
/// Lets an application collect its migration modules in one place and hand
/// them to the runner:
///
/// ```rust,ignore
/// use tidemark::{Migration, MigrationProvider, MigrationRegistry};
///
/// // pub mod m20240101120000_create_users;
/// // pub mod m20240102090000_add_email;
///
/// pub struct AppMigrations;
///
/// impl MigrationProvider for AppMigrations {
///     fn migrations() -> Vec<Migration> {
///         vec![
///             m20240101120000_create_users::migration(),
///             m20240102090000_add_email::migration(),
///         ]
///     }
/// }
///
/// let registry = MigrationRegistry::from_provider::<AppMigrations>()?;
/// ```
pub trait MigrationProvider {
    /// All migrations provided by this type, in any order; the registry
    /// sorts by name.
    fn migrations() -> Vec<Migration>;
}

/// Ordered set of uniquely named migrations
///
/// Iteration order is always ascending by name, which for
/// timestamp-prefixed names is chronological authoring order.
#[derive(Debug, Clone, Default)]
pub struct MigrationRegistry {
    migrations: BTreeMap<String, Migration>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a [`MigrationProvider`]
    pub fn from_provider<P: MigrationProvider>() -> Result<Self> {
        let mut registry = Self::new();
        for migration in P::migrations() {
            registry.register(migration)?;
        }
        Ok(registry)
    }

    /// Add a migration
    ///
    /// Fails with [`MigrationError::InvalidName`] for malformed names and
    /// [`MigrationError::DuplicateName`] if the name is already registered.
    pub fn register(&mut self, migration: Migration) -> Result<()> {
        Migration::validate_name(&migration.name)?;
        if self.migrations.contains_key(&migration.name) {
            return Err(MigrationError::DuplicateName(migration.name));
        }
        self.migrations.insert(migration.name.clone(), migration);
        Ok(())
    }

    /// All migrations in ascending name order
    pub fn list(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.values()
    }

    /// Look up a migration by name
    pub fn get(&self, name: &str) -> Result<&Migration> {
        self.migrations
            .get(name)
            .ok_or_else(|| MigrationError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.migrations.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Highest-named (most recent) migration, if any
    pub fn latest(&self) -> Option<&Migration> {
        self.migrations.values().next_back()
    }
}
