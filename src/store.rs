//! Migration stores
//!
//! [`MigrationStore`] is the runner's only view of the database: ensure the
//! ledger exists, read it, apply or revert one migration, and hold the
//! exclusive migration lock. Concrete stores exist for SQLite, PostgreSQL
//! and MySQL over sqlx pools, plus an in-process [`MemoryStore`] that
//! executes against a structural [`SchemaState`] for tests and dry runs.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::migration::Migration;
use super::operations::{self, Operation, SqlDialect};
use super::recorder::{self, AppliedMigration};
use super::state::SchemaState;
use super::{MigrationError, Result};

/// Name used for the store-level advisory lock
const LOCK_NAME: &str = "tidemark_migrations";

/// Schema-mutation interface consumed by the runner
///
/// `apply` and `revert` are atomic where the store supports transactional
/// DDL: the migration's operations and its ledger write either all take
/// effect or none do. A failed `apply` must leave the ledger without the
/// migration's row.
#[async_trait]
pub trait MigrationStore: Send + Sync {
    fn dialect(&self) -> SqlDialect;

    /// Create the ledger table if it does not exist
    async fn ensure_ledger(&self) -> Result<()>;

    /// All ledger rows in application order
    async fn applied(&self) -> Result<Vec<AppliedMigration>>;

    /// Run `migration.up` and insert the ledger row
    async fn apply(&self, migration: &Migration) -> Result<()>;

    /// Run `migration.down` and delete the ledger row
    async fn revert(&self, migration: &Migration) -> Result<()>;

    /// Take the exclusive migration lock; blocks other runners
    async fn acquire_lock(&self) -> Result<()>;

    /// Release the migration lock; must succeed even after a failed batch
    async fn release_lock(&self) -> Result<()>;
}

#[async_trait]
impl<T: MigrationStore + ?Sized> MigrationStore for Box<T> {
    fn dialect(&self) -> SqlDialect {
        (**self).dialect()
    }

    async fn ensure_ledger(&self) -> Result<()> {
        (**self).ensure_ledger().await
    }

    async fn applied(&self) -> Result<Vec<AppliedMigration>> {
        (**self).applied().await
    }

    async fn apply(&self, migration: &Migration) -> Result<()> {
        (**self).apply(migration).await
    }

    async fn revert(&self, migration: &Migration) -> Result<()> {
        (**self).revert(migration).await
    }

    async fn acquire_lock(&self) -> Result<()> {
        (**self).acquire_lock().await
    }

    async fn release_lock(&self) -> Result<()> {
        (**self).release_lock().await
    }
}

/// Open a store for a database URL, picking the backend by scheme
///
/// # Examples
///
/// ```rust,no_run
/// # async fn example() -> tidemark::Result<()> {
/// let store = tidemark::store::connect("sqlite::memory:").await?;
/// store.ensure_ledger().await?;
/// # Ok(())
/// # }
/// ```
pub async fn connect(url: &str) -> Result<Box<dyn MigrationStore>> {
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        #[cfg(feature = "postgres")]
        {
            return Ok(Box::new(PostgresStore::connect(url).await?));
        }
        #[cfg(not(feature = "postgres"))]
        {
            return Err(MigrationError::Config(
                "postgres support not compiled in (enable the `postgres` feature)".to_string(),
            ));
        }
    }
    if url.starts_with("mysql://") {
        #[cfg(feature = "mysql")]
        {
            return Ok(Box::new(MySqlStore::connect(url).await?));
        }
        #[cfg(not(feature = "mysql"))]
        {
            return Err(MigrationError::Config(
                "mysql support not compiled in (enable the `mysql` feature)".to_string(),
            ));
        }
    }
    if url.starts_with("sqlite:") {
        #[cfg(feature = "sqlite")]
        {
            return Ok(Box::new(SqliteStore::connect(url).await?));
        }
        #[cfg(not(feature = "sqlite"))]
        {
            return Err(MigrationError::Config(
                "sqlite support not compiled in (enable the `sqlite` feature)".to_string(),
            ));
        }
    }
    Err(MigrationError::Config(format!(
        "unsupported database URL: {}",
        url
    )))
}

/// Classify driver errors per the failure model: unreachable store vs.
/// rejected mutation vs. everything else
#[cfg(any(feature = "postgres", feature = "sqlite", feature = "mysql"))]
fn map_sqlx(err: sqlx::Error) -> MigrationError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Configuration(_) => MigrationError::ConnectionError(err.to_string()),
        sqlx::Error::Database(ref db) => MigrationError::SchemaConflict(db.message().to_string()),
        other => MigrationError::SqlError(other),
    }
}

/// Render operations to statements, dropping ones the dialect cannot express
#[cfg(any(feature = "postgres", feature = "sqlite", feature = "mysql"))]
fn render_operations(ops: &[Operation], dialect: &SqlDialect) -> Vec<String> {
    ops.iter()
        .filter_map(|op| {
            let sql = op.to_sql(dialect);
            if operations::is_comment_only(&sql) {
                tracing::warn!(
                    operation = %op.describe(),
                    dialect = dialect.name(),
                    "skipping operation not expressible in this dialect"
                );
                None
            } else {
                Some(sql)
            }
        })
        .collect()
}

/// Execute statements, all in one transaction when `atomic`
#[cfg(any(feature = "postgres", feature = "sqlite", feature = "mysql"))]
async fn execute_batch<DB>(
    pool: &sqlx::Pool<DB>,
    statements: &[String],
    atomic: bool,
) -> Result<()>
where
    DB: sqlx::Database,
    for<'c> &'c mut DB::Connection: sqlx::Executor<'c, Database = DB>,
    for<'c> &'c sqlx::Pool<DB>: sqlx::Executor<'c, Database = DB>,
    for<'q> DB::Arguments<'q>: sqlx::IntoArguments<'q, DB>,
{
    if atomic {
        let mut tx = pool.begin().await.map_err(map_sqlx)?;
        for sql in statements {
            tracing::debug!(statement = %sql, "executing");
            sqlx::query(sql).execute(&mut *tx).await.map_err(map_sqlx)?;
        }
        tx.commit().await.map_err(map_sqlx)?;
    } else {
        for sql in statements {
            tracing::debug!(statement = %sql, "executing");
            sqlx::query(sql).execute(pool).await.map_err(map_sqlx)?;
        }
    }
    Ok(())
}

// ============================================================================
// SQLite
// ============================================================================

#[cfg(feature = "sqlite")]
pub struct SqliteStore {
    pool: sqlx::SqlitePool,
}

#[cfg(feature = "sqlite")]
impl SqliteStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = sqlx::SqlitePool::connect(url)
            .await
            .map_err(|e| MigrationError::ConnectionError(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }
}

#[cfg(feature = "sqlite")]
#[async_trait]
impl MigrationStore for SqliteStore {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    async fn ensure_ledger(&self) -> Result<()> {
        let sql = recorder::create_ledger_sql(&SqlDialect::Sqlite);
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn applied(&self) -> Result<Vec<AppliedMigration>> {
        use sqlx::Row;

        let sql = recorder::select_records_sql(&SqlDialect::Sqlite);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name")?;
            // SQLite stores TIMESTAMP as TEXT
            let raw: String = row.try_get("applied_at")?;
            records.push(AppliedMigration {
                name,
                applied_at: recorder::parse_applied_at(&raw)?,
            });
        }
        Ok(records)
    }

    async fn apply(&self, migration: &Migration) -> Result<()> {
        let mut statements = render_operations(&migration.up, &SqlDialect::Sqlite);
        statements.push(recorder::insert_record_sql(
            &SqlDialect::Sqlite,
            &migration.name,
            Utc::now(),
        ));
        execute_batch(&self.pool, &statements, migration.atomic).await
    }

    async fn revert(&self, migration: &Migration) -> Result<()> {
        let mut statements = render_operations(&migration.down, &SqlDialect::Sqlite);
        statements.push(recorder::delete_record_sql(
            &SqlDialect::Sqlite,
            &migration.name,
        ));
        execute_batch(&self.pool, &statements, migration.atomic).await
    }

    // SQLite serializes writers through transaction isolation; no separate
    // advisory lock exists.
    async fn acquire_lock(&self) -> Result<()> {
        Ok(())
    }

    async fn release_lock(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// PostgreSQL
// ============================================================================

#[cfg(feature = "postgres")]
pub struct PostgresStore {
    pool: sqlx::PgPool,
    /// Advisory locks are session-scoped, so the connection that took the
    /// lock is parked here until release.
    lock_conn: tokio::sync::Mutex<Option<sqlx::pool::PoolConnection<sqlx::Postgres>>>,
}

#[cfg(feature = "postgres")]
impl PostgresStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = sqlx::PgPool::connect(url)
            .await
            .map_err(|e| MigrationError::ConnectionError(e.to_string()))?;
        Ok(Self::new(pool))
    }

    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            pool,
            lock_conn: tokio::sync::Mutex::new(None),
        }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

#[cfg(feature = "postgres")]
#[async_trait]
impl MigrationStore for PostgresStore {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Postgres
    }

    async fn ensure_ledger(&self) -> Result<()> {
        let sql = recorder::create_ledger_sql(&SqlDialect::Postgres);
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn applied(&self) -> Result<Vec<AppliedMigration>> {
        use sqlx::Row;

        let sql = recorder::select_records_sql(&SqlDialect::Postgres);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name")?;
            let applied_at: chrono::NaiveDateTime = row.try_get("applied_at")?;
            records.push(AppliedMigration {
                name,
                applied_at: applied_at.and_utc(),
            });
        }
        Ok(records)
    }

    async fn apply(&self, migration: &Migration) -> Result<()> {
        let mut statements = render_operations(&migration.up, &SqlDialect::Postgres);
        statements.push(recorder::insert_record_sql(
            &SqlDialect::Postgres,
            &migration.name,
            Utc::now(),
        ));
        execute_batch(&self.pool, &statements, migration.atomic).await
    }

    async fn revert(&self, migration: &Migration) -> Result<()> {
        let mut statements = render_operations(&migration.down, &SqlDialect::Postgres);
        statements.push(recorder::delete_record_sql(
            &SqlDialect::Postgres,
            &migration.name,
        ));
        execute_batch(&self.pool, &statements, migration.atomic).await
    }

    async fn acquire_lock(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx)?;
        sqlx::query(&format!(
            "SELECT pg_advisory_lock(hashtext('{}'))",
            LOCK_NAME
        ))
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx)?;
        *self.lock_conn.lock().await = Some(conn);
        Ok(())
    }

    async fn release_lock(&self) -> Result<()> {
        if let Some(mut conn) = self.lock_conn.lock().await.take() {
            sqlx::query(&format!(
                "SELECT pg_advisory_unlock(hashtext('{}'))",
                LOCK_NAME
            ))
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx)?;
        }
        Ok(())
    }
}

// ============================================================================
// MySQL
// ============================================================================

#[cfg(feature = "mysql")]
pub struct MySqlStore {
    pool: sqlx::MySqlPool,
    lock_conn: tokio::sync::Mutex<Option<sqlx::pool::PoolConnection<sqlx::MySql>>>,
}

#[cfg(feature = "mysql")]
impl MySqlStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = sqlx::MySqlPool::connect(url)
            .await
            .map_err(|e| MigrationError::ConnectionError(e.to_string()))?;
        Ok(Self::new(pool))
    }

    pub fn new(pool: sqlx::MySqlPool) -> Self {
        Self {
            pool,
            lock_conn: tokio::sync::Mutex::new(None),
        }
    }

    pub fn pool(&self) -> &sqlx::MySqlPool {
        &self.pool
    }
}

#[cfg(feature = "mysql")]
#[async_trait]
impl MigrationStore for MySqlStore {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Mysql
    }

    async fn ensure_ledger(&self) -> Result<()> {
        let sql = recorder::create_ledger_sql(&SqlDialect::Mysql);
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn applied(&self) -> Result<Vec<AppliedMigration>> {
        use sqlx::Row;

        let sql = recorder::select_records_sql(&SqlDialect::Mysql);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name")?;
            let applied_at: chrono::NaiveDateTime = row.try_get("applied_at")?;
            records.push(AppliedMigration {
                name,
                applied_at: applied_at.and_utc(),
            });
        }
        Ok(records)
    }

    // MySQL DDL auto-commits, so atomicity here only covers the ledger
    // write relative to the last statement.
    async fn apply(&self, migration: &Migration) -> Result<()> {
        let mut statements = render_operations(&migration.up, &SqlDialect::Mysql);
        statements.push(recorder::insert_record_sql(
            &SqlDialect::Mysql,
            &migration.name,
            Utc::now(),
        ));
        execute_batch(&self.pool, &statements, migration.atomic).await
    }

    async fn revert(&self, migration: &Migration) -> Result<()> {
        let mut statements = render_operations(&migration.down, &SqlDialect::Mysql);
        statements.push(recorder::delete_record_sql(
            &SqlDialect::Mysql,
            &migration.name,
        ));
        execute_batch(&self.pool, &statements, migration.atomic).await
    }

    async fn acquire_lock(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx)?;
        let locked: Option<i64> =
            sqlx::query_scalar(&format!("SELECT GET_LOCK('{}', 10)", LOCK_NAME))
                .fetch_one(&mut *conn)
                .await
                .map_err(map_sqlx)?;
        if locked != Some(1) {
            return Err(MigrationError::LockTimeout(
                "timed out after 10s waiting for GET_LOCK".to_string(),
            ));
        }
        *self.lock_conn.lock().await = Some(conn);
        Ok(())
    }

    async fn release_lock(&self) -> Result<()> {
        if let Some(mut conn) = self.lock_conn.lock().await.take() {
            sqlx::query(&format!("SELECT RELEASE_LOCK('{}')", LOCK_NAME))
                .execute(&mut *conn)
                .await
                .map_err(map_sqlx)?;
        }
        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// In-process store over a structural [`SchemaState`]
///
/// Applies operations to the tracked schema shape with copy-on-write
/// atomicity: a failing operation leaves both the schema and the ledger
/// exactly as they were. Raw SQL operations are recorded verbatim but not
/// interpreted. Used by tests and dry runs; migrations always behave
/// atomically here regardless of their `atomic` flag.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    schema: SchemaState,
    ledger: Vec<AppliedMigration>,
    raw_statements: Vec<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current schema shape
    pub fn schema(&self) -> SchemaState {
        self.inner.lock().schema.clone()
    }

    /// Snapshot of the ledger
    pub fn ledger(&self) -> Vec<AppliedMigration> {
        self.inner.lock().ledger.clone()
    }

    /// Raw SQL statements seen so far, in execution order
    pub fn raw_statements(&self) -> Vec<String> {
        self.inner.lock().raw_statements.clone()
    }
}

#[async_trait]
impl MigrationStore for MemoryStore {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    async fn ensure_ledger(&self) -> Result<()> {
        Ok(())
    }

    async fn applied(&self) -> Result<Vec<AppliedMigration>> {
        Ok(self.inner.lock().ledger.clone())
    }

    async fn apply(&self, migration: &Migration) -> Result<()> {
        let mut inner = self.inner.lock();
        // mirrors the ledger's primary key
        if inner.ledger.iter().any(|r| r.name == migration.name) {
            return Err(MigrationError::SchemaConflict(format!(
                "ledger already records {}",
                migration.name
            )));
        }

        let mut schema = inner.schema.clone();
        let mut raw = Vec::new();
        for op in &migration.up {
            if let Operation::RunSql { sql } = op {
                raw.push(sql.trim().to_string());
            }
            schema.apply(op)?;
        }

        inner.schema = schema;
        inner.raw_statements.extend(raw);
        inner.ledger.push(AppliedMigration {
            name: migration.name.clone(),
            applied_at: Utc::now(),
        });
        Ok(())
    }

    async fn revert(&self, migration: &Migration) -> Result<()> {
        let mut inner = self.inner.lock();
        let Some(pos) = inner.ledger.iter().position(|r| r.name == migration.name) else {
            return Err(MigrationError::NotFound(migration.name.clone()));
        };

        let mut schema = inner.schema.clone();
        let mut raw = Vec::new();
        for op in &migration.down {
            if let Operation::RunSql { sql } = op {
                raw.push(sql.trim().to_string());
            }
            schema.apply(op)?;
        }

        inner.schema = schema;
        inner.raw_statements.extend(raw);
        inner.ledger.remove(pos);
        Ok(())
    }

    async fn acquire_lock(&self) -> Result<()> {
        Ok(())
    }

    async fn release_lock(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::fields::FieldType;
    use super::super::operations::ColumnDefinition;
    use super::*;

    fn create_users() -> Migration {
        Migration::new("20240101000000_create_users")
            .up(Operation::CreateTable {
                name: "users".to_string(),
                columns: vec![ColumnDefinition::new("id", FieldType::BigInteger).primary_key()],
                constraints: vec![],
            })
            .down(Operation::DropTable {
                name: "users".to_string(),
            })
    }

    #[tokio::test]
    async fn test_memory_store_apply_records_ledger() {
        let store = MemoryStore::new();
        store.apply(&create_users()).await.unwrap();

        assert!(store.schema().has_table("users"));
        let ledger = store.ledger();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].name, "20240101000000_create_users");
    }

    #[tokio::test]
    async fn test_memory_store_failed_apply_changes_nothing() {
        let store = MemoryStore::new();
        store.apply(&create_users()).await.unwrap();

        // Second create of the same table fails mid-batch...
        let bad = Migration::new("20240102000000_create_users_again")
            .up(Operation::AddColumn {
                table: "users".to_string(),
                column: ColumnDefinition::new("email", FieldType::Text),
            })
            .up(Operation::CreateTable {
                name: "users".to_string(),
                columns: vec![],
                constraints: vec![],
            });
        let err = store.apply(&bad).await.unwrap_err();
        assert!(matches!(err, MigrationError::SchemaConflict(_)));

        // ...and the earlier AddColumn in the same migration is rolled back
        assert!(!store.schema().table("users").unwrap().has_column("email"));
        assert_eq!(store.ledger().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_revert_removes_record() {
        let store = MemoryStore::new();
        let migration = create_users();
        store.apply(&migration).await.unwrap();
        store.revert(&migration).await.unwrap();

        assert!(store.schema().is_empty());
        assert!(store.ledger().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_records_raw_sql() {
        let store = MemoryStore::new();
        let migration = Migration::new("20240101000000_tune").up(Operation::RunSql {
            sql: "ALTER TABLE users ALTER COLUMN email DROP NOT NULL".to_string(),
        });
        store.apply(&migration).await.unwrap();
        assert_eq!(
            store.raw_statements(),
            vec!["ALTER TABLE users ALTER COLUMN email DROP NOT NULL"]
        );
    }
}
