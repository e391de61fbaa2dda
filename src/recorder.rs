//! Migration ledger
//!
//! One row per applied migration: `{name (unique), applied_at}`. A row is
//! inserted when `apply` succeeds and deleted when `revert` succeeds, inside
//! the same transaction as the schema mutations where the store supports
//! transactional DDL.
//!
//! SQL for the ledger is built with sea-query so the same statements render
//! correctly for every supported dialect.

use chrono::{DateTime, NaiveDateTime, Utc};
use sea_query::{
    Alias, ColumnDef, Expr, ExprTrait, MysqlQueryBuilder, Order, PostgresQueryBuilder, Query,
    QueryStatementBuilder, SchemaStatementBuilder, SqliteQueryBuilder, Table,
};

use super::operations::SqlDialect;
use super::{MigrationError, Result};

/// Name of the ledger table
pub const LEDGER_TABLE: &str = "tidemark_migrations";

/// Timestamp format stored in the ledger (UTC, second precision)
pub(crate) const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Persisted record of one applied migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// Most recently applied record: latest `applied_at`, ties broken by name
/// descending
pub fn most_recent(records: &[AppliedMigration]) -> Option<&AppliedMigration> {
    records
        .iter()
        .max_by(|a, b| (a.applied_at, &a.name).cmp(&(b.applied_at, &b.name)))
}

/// `CREATE TABLE IF NOT EXISTS` for the ledger
pub(crate) fn create_ledger_sql(dialect: &SqlDialect) -> String {
    let mut stmt = Table::create();
    stmt.table(Alias::new(LEDGER_TABLE))
        .if_not_exists()
        .col(
            ColumnDef::new(Alias::new("name"))
                .string_len(255)
                .not_null()
                .primary_key(),
        )
        .col(
            ColumnDef::new(Alias::new("applied_at"))
                .date_time()
                .not_null(),
        );

    match dialect {
        SqlDialect::Postgres => stmt.to_string(PostgresQueryBuilder),
        SqlDialect::Mysql => stmt.to_string(MysqlQueryBuilder),
        SqlDialect::Sqlite => stmt.to_string(SqliteQueryBuilder),
    }
}

/// `INSERT` recording a migration as applied
pub(crate) fn insert_record_sql(
    dialect: &SqlDialect,
    name: &str,
    applied_at: DateTime<Utc>,
) -> String {
    let stmt = Query::insert()
        .into_table(Alias::new(LEDGER_TABLE))
        .columns([Alias::new("name"), Alias::new("applied_at")])
        .values_panic([
            name.to_string().into(),
            applied_at.format(TS_FORMAT).to_string().into(),
        ])
        .to_owned();

    match dialect {
        SqlDialect::Postgres => stmt.to_string(PostgresQueryBuilder),
        SqlDialect::Mysql => stmt.to_string(MysqlQueryBuilder),
        SqlDialect::Sqlite => stmt.to_string(SqliteQueryBuilder),
    }
}

/// `DELETE` removing a migration's record on revert
pub(crate) fn delete_record_sql(dialect: &SqlDialect, name: &str) -> String {
    let stmt = Query::delete()
        .from_table(Alias::new(LEDGER_TABLE))
        .and_where(Expr::col(Alias::new("name")).eq(name))
        .to_owned();

    match dialect {
        SqlDialect::Postgres => stmt.to_string(PostgresQueryBuilder),
        SqlDialect::Mysql => stmt.to_string(MysqlQueryBuilder),
        SqlDialect::Sqlite => stmt.to_string(SqliteQueryBuilder),
    }
}

/// `SELECT name, applied_at` over the whole ledger, application order
pub(crate) fn select_records_sql(dialect: &SqlDialect) -> String {
    let stmt = Query::select()
        .columns([Alias::new("name"), Alias::new("applied_at")])
        .from(Alias::new(LEDGER_TABLE))
        .order_by(Alias::new("applied_at"), Order::Asc)
        .order_by(Alias::new("name"), Order::Asc)
        .to_owned();

    match dialect {
        SqlDialect::Postgres => stmt.to_string(PostgresQueryBuilder),
        SqlDialect::Mysql => stmt.to_string(MysqlQueryBuilder),
        SqlDialect::Sqlite => stmt.to_string(SqliteQueryBuilder),
    }
}

/// Parse a ledger timestamp stored as text (SQLite keeps TIMESTAMP as TEXT)
pub(crate) fn parse_applied_at(raw: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            MigrationError::SchemaConflict(format!(
                "unparseable ledger timestamp '{}': {}",
                raw, e
            ))
        })
}
