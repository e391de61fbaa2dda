//! Schema mutation operations
//!
//! Each migration carries a tagged list of [`Operation`] values describing one
//! structural change apiece: create/drop table, add/drop column, add/drop
//! foreign key, unique constraint or index, plus a raw-SQL escape hatch for
//! statements with no structured equivalent (e.g. `ALTER COLUMN ... DROP NOT
//! NULL`).
//!
//! Operations render to SQL per dialect with [`Operation::to_sql`]. Rendering
//! is pure; execution happens in a [`crate::store::MigrationStore`].

use pg_escape::quote_identifier;
use serde::{Deserialize, Serialize};

use super::fields::FieldType;

/// SQL dialect used when rendering operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    Postgres,
    Mysql,
    Sqlite,
}

impl SqlDialect {
    pub fn name(&self) -> &str {
        match self {
            SqlDialect::Postgres => "postgres",
            SqlDialect::Mysql => "mysql",
            SqlDialect::Sqlite => "sqlite",
        }
    }
}

/// Referential action for foreign keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl std::fmt::Display for ForeignKeyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForeignKeyAction::NoAction => write!(f, "NO ACTION"),
            ForeignKeyAction::Restrict => write!(f, "RESTRICT"),
            ForeignKeyAction::Cascade => write!(f, "CASCADE"),
            ForeignKeyAction::SetNull => write!(f, "SET NULL"),
            ForeignKeyAction::SetDefault => write!(f, "SET DEFAULT"),
        }
    }
}

/// Column definition for create-table and add-column operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub not_null: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub auto_increment: bool,
    /// Default value, spliced into the DDL verbatim. Quote string
    /// literals yourself: `Some("'pending'".to_string())`.
    #[serde(default)]
    pub default: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            not_null: false,
            unique: false,
            primary_key: false,
            auto_increment: false,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn default_value(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Foreign key definition
///
/// Used both as a table-level constraint in [`Operation::CreateTable`] and as
/// the payload of [`Operation::AddForeignKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub on_delete: ForeignKeyAction,
    pub on_update: ForeignKeyAction,
}

impl ForeignKeyDef {
    pub fn new(
        name: impl Into<String>,
        columns: Vec<String>,
        referenced_table: impl Into<String>,
        referenced_columns: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            columns,
            referenced_table: referenced_table.into(),
            referenced_columns,
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
        }
    }

    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }

    pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = action;
        self
    }
}

impl std::fmt::Display for ForeignKeyDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let columns = self
            .columns
            .iter()
            .map(|c| quote_identifier(c).to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let referenced = self
            .referenced_columns
            .iter()
            .map(|c| quote_identifier(c).to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            quote_identifier(&self.name),
            columns,
            quote_identifier(&self.referenced_table),
            referenced,
            self.on_delete,
            self.on_update,
        )
    }
}

/// Table-level constraint definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Constraint {
    /// Composite primary key. Single-column primary keys are declared on
    /// the column itself.
    PrimaryKey { name: String, columns: Vec<String> },
    ForeignKey(ForeignKeyDef),
    Unique { name: String, columns: Vec<String> },
    Check { name: String, expression: String },
}

impl Constraint {
    /// Constraint name, as recorded in the schema
    pub fn name(&self) -> &str {
        match self {
            Constraint::PrimaryKey { name, .. } => name,
            Constraint::ForeignKey(fk) => &fk.name,
            Constraint::Unique { name, .. } => name,
            Constraint::Check { name, .. } => name,
        }
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constraint::PrimaryKey { name, columns } => {
                let columns = columns
                    .iter()
                    .map(|c| quote_identifier(c).to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(
                    f,
                    "CONSTRAINT {} PRIMARY KEY ({})",
                    quote_identifier(name),
                    columns
                )
            }
            Constraint::ForeignKey(fk) => write!(f, "{}", fk),
            Constraint::Unique { name, columns } => {
                let columns = columns
                    .iter()
                    .map(|c| quote_identifier(c).to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(
                    f,
                    "CONSTRAINT {} UNIQUE ({})",
                    quote_identifier(name),
                    columns
                )
            }
            Constraint::Check { name, expression } => {
                write!(
                    f,
                    "CONSTRAINT {} CHECK ({})",
                    quote_identifier(name),
                    expression
                )
            }
        }
    }
}

/// A single structural schema change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Operation {
    CreateTable {
        name: String,
        columns: Vec<ColumnDefinition>,
        #[serde(default)]
        constraints: Vec<Constraint>,
    },
    DropTable {
        name: String,
    },
    AddColumn {
        table: String,
        column: ColumnDefinition,
    },
    DropColumn {
        table: String,
        column: String,
    },
    AddForeignKey {
        table: String,
        foreign_key: ForeignKeyDef,
    },
    DropForeignKey {
        table: String,
        name: String,
    },
    AddUnique {
        table: String,
        name: String,
        columns: Vec<String>,
    },
    DropUnique {
        table: String,
        name: String,
    },
    CreateIndex {
        table: String,
        name: String,
        columns: Vec<String>,
        #[serde(default)]
        unique: bool,
    },
    DropIndex {
        table: String,
        name: String,
    },
    /// Raw passthrough statement. One statement per operation; the schema
    /// state tracker cannot interpret it structurally.
    RunSql {
        sql: String,
    },
}

impl Operation {
    /// Render this operation as a single SQL statement for the dialect
    ///
    /// Operations a dialect cannot express (e.g. `ALTER TABLE ... ADD
    /// FOREIGN KEY` on SQLite) render as a `--` comment; stores skip those
    /// with a warning instead of executing them.
    pub fn to_sql(&self, dialect: &SqlDialect) -> String {
        match self {
            Operation::CreateTable {
                name,
                columns,
                constraints,
            } => {
                let pk_columns: Vec<&String> = columns
                    .iter()
                    .filter(|col| col.primary_key)
                    .map(|col| &col.name)
                    .collect();
                let has_composite_pk = pk_columns.len() > 1;

                let mut parts = Vec::new();
                for col in columns {
                    if has_composite_pk {
                        parts.push(format!(
                            "  {}",
                            Self::column_to_sql_without_pk(col, dialect)
                        ));
                    } else {
                        parts.push(format!("  {}", Self::column_to_sql(col, dialect)));
                    }
                }

                if has_composite_pk {
                    let pk_name = format!("{}_pkey", name);
                    let quoted = pk_columns
                        .iter()
                        .map(|c| quote_identifier(c).to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    parts.push(format!(
                        "  CONSTRAINT {} PRIMARY KEY ({})",
                        quote_identifier(&pk_name),
                        quoted
                    ));
                }

                for constraint in constraints {
                    parts.push(format!("  {}", constraint));
                }

                format!(
                    "CREATE TABLE {} (\n{}\n);",
                    quote_identifier(name),
                    parts.join(",\n")
                )
            }
            Operation::DropTable { name } => {
                format!("DROP TABLE {};", quote_identifier(name))
            }
            Operation::AddColumn { table, column } => {
                format!(
                    "ALTER TABLE {} ADD COLUMN {};",
                    quote_identifier(table),
                    Self::column_to_sql(column, dialect)
                )
            }
            Operation::DropColumn { table, column } => {
                format!(
                    "ALTER TABLE {} DROP COLUMN {};",
                    quote_identifier(table),
                    quote_identifier(column)
                )
            }
            Operation::AddForeignKey { table, foreign_key } => match dialect {
                SqlDialect::Postgres | SqlDialect::Mysql => {
                    format!(
                        "ALTER TABLE {} ADD {};",
                        quote_identifier(table),
                        foreign_key
                    )
                }
                SqlDialect::Sqlite => format!(
                    "-- SQLite cannot add a foreign key to {}, table recreation required",
                    quote_identifier(table)
                ),
            },
            Operation::DropForeignKey { table, name } => match dialect {
                SqlDialect::Postgres => format!(
                    "ALTER TABLE {} DROP CONSTRAINT {};",
                    quote_identifier(table),
                    quote_identifier(name)
                ),
                SqlDialect::Mysql => format!(
                    "ALTER TABLE {} DROP FOREIGN KEY {};",
                    quote_identifier(table),
                    quote_identifier(name)
                ),
                SqlDialect::Sqlite => format!(
                    "-- SQLite cannot drop a foreign key from {}, table recreation required",
                    quote_identifier(table)
                ),
            },
            Operation::AddUnique {
                table,
                name,
                columns,
            } => {
                let quoted = columns
                    .iter()
                    .map(|c| quote_identifier(c).to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                match dialect {
                    SqlDialect::Postgres | SqlDialect::Mysql => format!(
                        "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({});",
                        quote_identifier(table),
                        quote_identifier(name),
                        quoted
                    ),
                    // SQLite: a unique index is the only post-hoc spelling
                    SqlDialect::Sqlite => format!(
                        "CREATE UNIQUE INDEX {} ON {} ({});",
                        quote_identifier(name),
                        quote_identifier(table),
                        quoted
                    ),
                }
            }
            Operation::DropUnique { table, name } => match dialect {
                SqlDialect::Postgres => format!(
                    "ALTER TABLE {} DROP CONSTRAINT {};",
                    quote_identifier(table),
                    quote_identifier(name)
                ),
                SqlDialect::Mysql => format!(
                    "ALTER TABLE {} DROP INDEX {};",
                    quote_identifier(table),
                    quote_identifier(name)
                ),
                SqlDialect::Sqlite => format!("DROP INDEX {};", quote_identifier(name)),
            },
            Operation::CreateIndex {
                table,
                name,
                columns,
                unique,
            } => {
                let unique_str = if *unique { "UNIQUE " } else { "" };
                let quoted = columns
                    .iter()
                    .map(|c| quote_identifier(c).to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "CREATE {}INDEX {} ON {} ({});",
                    unique_str,
                    quote_identifier(name),
                    quote_identifier(table),
                    quoted
                )
            }
            Operation::DropIndex { table, name } => match dialect {
                // MySQL scopes index names to the table
                SqlDialect::Mysql => format!(
                    "DROP INDEX {} ON {};",
                    quote_identifier(name),
                    quote_identifier(table)
                ),
                SqlDialect::Postgres | SqlDialect::Sqlite => {
                    format!("DROP INDEX {};", quote_identifier(name))
                }
            },
            Operation::RunSql { sql } => sql.trim().to_string(),
        }
    }

    /// Short human-readable label for logs and status output
    pub fn describe(&self) -> String {
        match self {
            Operation::CreateTable { name, .. } => format!("create table {}", name),
            Operation::DropTable { name } => format!("drop table {}", name),
            Operation::AddColumn { table, column } => {
                format!("add column {}.{}", table, column.name)
            }
            Operation::DropColumn { table, column } => {
                format!("drop column {}.{}", table, column)
            }
            Operation::AddForeignKey { table, foreign_key } => {
                format!("add foreign key {} on {}", foreign_key.name, table)
            }
            Operation::DropForeignKey { table, name } => {
                format!("drop foreign key {} on {}", name, table)
            }
            Operation::AddUnique { table, name, .. } => {
                format!("add unique {} on {}", name, table)
            }
            Operation::DropUnique { table, name } => {
                format!("drop unique {} on {}", name, table)
            }
            Operation::CreateIndex { table, name, .. } => {
                format!("create index {} on {}", name, table)
            }
            Operation::DropIndex { table, name } => {
                format!("drop index {} on {}", name, table)
            }
            Operation::RunSql { .. } => "run raw sql".to_string(),
        }
    }

    fn column_to_sql(column: &ColumnDefinition, dialect: &SqlDialect) -> String {
        // SQLite AUTOINCREMENT is only valid as INTEGER PRIMARY KEY
        if column.auto_increment && matches!(dialect, SqlDialect::Sqlite) {
            return format!(
                "{} INTEGER PRIMARY KEY AUTOINCREMENT",
                quote_identifier(&column.name)
            );
        }

        let mut sql = Self::column_to_sql_without_pk(column, dialect);
        if column.primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if column.auto_increment {
            match dialect {
                SqlDialect::Postgres => sql.push_str(" GENERATED BY DEFAULT AS IDENTITY"),
                SqlDialect::Mysql => sql.push_str(" AUTO_INCREMENT"),
                SqlDialect::Sqlite => {}
            }
        }
        sql
    }

    fn column_to_sql_without_pk(column: &ColumnDefinition, dialect: &SqlDialect) -> String {
        let mut sql = format!(
            "{} {}",
            quote_identifier(&column.name),
            column.field_type.to_sql_for_dialect(dialect)
        );
        if column.not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default {
            sql.push_str(&format!(" DEFAULT {}", default));
        }
        if column.unique {
            sql.push_str(" UNIQUE");
        }
        sql
    }
}

/// True for statements rendered as a bare `--` comment, which stores skip
pub(crate) fn is_comment_only(sql: &str) -> bool {
    sql.trim_start().starts_with("--")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_table() -> Operation {
        Operation::CreateTable {
            name: "users".to_string(),
            columns: vec![
                ColumnDefinition::new("id", FieldType::BigInteger)
                    .primary_key()
                    .auto_increment(),
                ColumnDefinition::new("email", FieldType::VarChar(255))
                    .not_null()
                    .unique(),
                ColumnDefinition::new("active", FieldType::Boolean)
                    .not_null()
                    .default_value("TRUE"),
            ],
            constraints: vec![],
        }
    }

    #[test]
    fn test_create_table_postgres() {
        let sql = users_table().to_sql(&SqlDialect::Postgres);
        assert!(sql.starts_with("CREATE TABLE users ("));
        assert!(sql.contains("id BIGINT PRIMARY KEY GENERATED BY DEFAULT AS IDENTITY"));
        assert!(sql.contains("email VARCHAR(255) NOT NULL UNIQUE"));
        assert!(sql.contains("active BOOLEAN NOT NULL DEFAULT TRUE"));
    }

    #[test]
    fn test_create_table_sqlite_autoincrement() {
        let sql = users_table().to_sql(&SqlDialect::Sqlite);
        assert!(sql.contains("id INTEGER PRIMARY KEY AUTOINCREMENT"));
    }

    #[test]
    fn test_create_table_composite_pk() {
        let op = Operation::CreateTable {
            name: "memberships".to_string(),
            columns: vec![
                ColumnDefinition::new("user_id", FieldType::BigInteger).primary_key(),
                ColumnDefinition::new("group_id", FieldType::BigInteger).primary_key(),
            ],
            constraints: vec![],
        };
        let sql = op.to_sql(&SqlDialect::Postgres);
        assert!(sql.contains("CONSTRAINT memberships_pkey PRIMARY KEY (user_id, group_id)"));
        // No column-level PRIMARY KEY alongside the composite constraint
        assert!(!sql.contains("BIGINT PRIMARY KEY"));
    }

    #[test]
    fn test_add_foreign_key_per_dialect() {
        let op = Operation::AddForeignKey {
            table: "posts".to_string(),
            foreign_key: ForeignKeyDef::new(
                "fk_posts_author",
                vec!["author_id".to_string()],
                "users",
                vec!["id".to_string()],
            )
            .on_delete(ForeignKeyAction::Cascade),
        };
        let pg = op.to_sql(&SqlDialect::Postgres);
        assert!(pg.contains(
            "ADD CONSTRAINT fk_posts_author FOREIGN KEY (author_id) REFERENCES users (id)"
        ));
        assert!(pg.contains("ON DELETE CASCADE"));

        let sqlite = op.to_sql(&SqlDialect::Sqlite);
        assert!(is_comment_only(&sqlite));
    }

    #[test]
    fn test_add_unique_is_index_on_sqlite() {
        let op = Operation::AddUnique {
            table: "users".to_string(),
            name: "uq_users_email".to_string(),
            columns: vec!["email".to_string()],
        };
        assert_eq!(
            op.to_sql(&SqlDialect::Sqlite),
            "CREATE UNIQUE INDEX uq_users_email ON users (email);"
        );
        assert_eq!(
            op.to_sql(&SqlDialect::Postgres),
            "ALTER TABLE users ADD CONSTRAINT uq_users_email UNIQUE (email);"
        );
    }

    #[test]
    fn test_drop_index_mysql_scoped_to_table() {
        let op = Operation::DropIndex {
            table: "users".to_string(),
            name: "idx_users_email".to_string(),
        };
        assert_eq!(
            op.to_sql(&SqlDialect::Mysql),
            "DROP INDEX idx_users_email ON users;"
        );
        assert_eq!(
            op.to_sql(&SqlDialect::Postgres),
            "DROP INDEX idx_users_email;"
        );
    }

    #[test]
    fn test_run_sql_passthrough() {
        let op = Operation::RunSql {
            sql: "  ALTER TABLE users ALTER COLUMN email DROP NOT NULL  ".to_string(),
        };
        assert_eq!(
            op.to_sql(&SqlDialect::Postgres),
            "ALTER TABLE users ALTER COLUMN email DROP NOT NULL"
        );
    }

    #[test]
    fn test_operation_serde_round_trip() {
        let op = users_table();
        let json = serde_json::to_string(&op).unwrap();
        let back: Operation = serde_json::from_str(&json).unwrap();
        assert_eq!(op, back);
    }
}
