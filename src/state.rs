//! In-memory schema state
//!
//! Tracks the structural shape of the schema (tables, columns, constraints,
//! indexes) as operations are applied. The [`crate::store::MemoryStore`]
//! executes against this instead of a database, and tests use state equality
//! to check that `down` restores what `up` changed.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use super::operations::{ColumnDefinition, Constraint, Operation};
use super::{MigrationError, Result};

/// Secondary index shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexState {
    pub columns: Vec<String>,
    pub unique: bool,
}

/// One table: ordered columns plus named constraints and indexes
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableState {
    pub columns: IndexMap<String, ColumnDefinition>,
    pub constraints: IndexMap<String, Constraint>,
    pub indexes: IndexMap<String, IndexState>,
}

impl TableState {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }
}

/// Full schema shape, keyed by table name
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaState {
    tables: BTreeMap<String, TableState>,
}

impl SchemaState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table(&self, name: &str) -> Option<&TableState> {
        self.tables.get(name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Apply one operation, validating it against the current shape
    ///
    /// Structural conflicts (creating an existing table, dropping a missing
    /// column, reusing a constraint name) fail with
    /// [`MigrationError::SchemaConflict`] and leave the state untouched.
    /// [`Operation::RunSql`] has no structural interpretation and is a no-op
    /// here.
    pub fn apply(&mut self, operation: &Operation) -> Result<()> {
        match operation {
            Operation::CreateTable {
                name,
                columns,
                constraints,
            } => {
                if self.tables.contains_key(name) {
                    return Err(conflict(format!("table {} already exists", name)));
                }
                let mut table = TableState::default();
                for column in columns {
                    if table.columns.contains_key(&column.name) {
                        return Err(conflict(format!(
                            "duplicate column {} in table {}",
                            column.name, name
                        )));
                    }
                    table.columns.insert(column.name.clone(), column.clone());
                }
                for constraint in constraints {
                    if let Constraint::ForeignKey(fk) = constraint
                        && !self.tables.contains_key(&fk.referenced_table)
                        && fk.referenced_table != *name
                    {
                        return Err(conflict(format!(
                            "foreign key {} references unknown table {}",
                            fk.name, fk.referenced_table
                        )));
                    }
                    if table.constraints.contains_key(constraint.name()) {
                        return Err(conflict(format!(
                            "duplicate constraint {} in table {}",
                            constraint.name(),
                            name
                        )));
                    }
                    table
                        .constraints
                        .insert(constraint.name().to_string(), constraint.clone());
                }
                self.tables.insert(name.clone(), table);
                Ok(())
            }
            Operation::DropTable { name } => {
                if self.tables.remove(name).is_none() {
                    return Err(conflict(format!("table {} does not exist", name)));
                }
                Ok(())
            }
            Operation::AddColumn { table, column } => {
                let entry = self.table_mut(table)?;
                if entry.columns.contains_key(&column.name) {
                    return Err(conflict(format!(
                        "column {}.{} already exists",
                        table, column.name
                    )));
                }
                entry.columns.insert(column.name.clone(), column.clone());
                Ok(())
            }
            Operation::DropColumn { table, column } => {
                let entry = self.table_mut(table)?;
                if entry.columns.shift_remove(column).is_none() {
                    return Err(conflict(format!(
                        "column {}.{} does not exist",
                        table, column
                    )));
                }
                Ok(())
            }
            Operation::AddForeignKey { table, foreign_key } => {
                if !self.tables.contains_key(&foreign_key.referenced_table) {
                    return Err(conflict(format!(
                        "foreign key {} references unknown table {}",
                        foreign_key.name, foreign_key.referenced_table
                    )));
                }
                let entry = self.table_mut(table)?;
                if entry.constraints.contains_key(&foreign_key.name) {
                    return Err(conflict(format!(
                        "constraint {} already exists on {}",
                        foreign_key.name, table
                    )));
                }
                entry.constraints.insert(
                    foreign_key.name.clone(),
                    Constraint::ForeignKey(foreign_key.clone()),
                );
                Ok(())
            }
            Operation::DropForeignKey { table, name } | Operation::DropUnique { table, name } => {
                let entry = self.table_mut(table)?;
                if entry.constraints.shift_remove(name).is_none() {
                    return Err(conflict(format!(
                        "constraint {} does not exist on {}",
                        name, table
                    )));
                }
                Ok(())
            }
            Operation::AddUnique {
                table,
                name,
                columns,
            } => {
                let entry = self.table_mut(table)?;
                if entry.constraints.contains_key(name) {
                    return Err(conflict(format!(
                        "constraint {} already exists on {}",
                        name, table
                    )));
                }
                for column in columns {
                    if !entry.columns.contains_key(column) {
                        return Err(conflict(format!(
                            "unique {} references unknown column {}.{}",
                            name, table, column
                        )));
                    }
                }
                entry.constraints.insert(
                    name.clone(),
                    Constraint::Unique {
                        name: name.clone(),
                        columns: columns.clone(),
                    },
                );
                Ok(())
            }
            Operation::CreateIndex {
                table,
                name,
                columns,
                unique,
            } => {
                let entry = self.table_mut(table)?;
                if entry.indexes.contains_key(name) {
                    return Err(conflict(format!("index {} already exists", name)));
                }
                for column in columns {
                    if !entry.columns.contains_key(column) {
                        return Err(conflict(format!(
                            "index {} references unknown column {}.{}",
                            name, table, column
                        )));
                    }
                }
                entry.indexes.insert(
                    name.clone(),
                    IndexState {
                        columns: columns.clone(),
                        unique: *unique,
                    },
                );
                Ok(())
            }
            Operation::DropIndex { table, name } => {
                let entry = self.table_mut(table)?;
                if entry.indexes.shift_remove(name).is_none() {
                    return Err(conflict(format!("index {} does not exist", name)));
                }
                Ok(())
            }
            // Raw SQL is opaque to the tracker
            Operation::RunSql { .. } => Ok(()),
        }
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut TableState> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| conflict(format!("table {} does not exist", name)))
    }
}

fn conflict(message: String) -> MigrationError {
    MigrationError::SchemaConflict(message)
}
