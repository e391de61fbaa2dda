//! Runner behavior against the in-memory store

use tidemark::{
    ColumnDefinition, FieldType, MemoryStore, Migration, MigrationError, MigrationRegistry,
    MigrationRunner, MigrationStore, Operation,
};

/// Create-table migration with a matching drop in `down`
fn table_migration(name: &str, table: &str) -> Migration {
    Migration::new(name)
        .up(Operation::CreateTable {
            name: table.to_string(),
            columns: vec![
                ColumnDefinition::new("id", FieldType::BigInteger).primary_key(),
                ColumnDefinition::new("label", FieldType::VarChar(100)).not_null(),
            ],
            constraints: vec![],
        })
        .down(Operation::DropTable {
            name: table.to_string(),
        })
}

fn registry_of(migrations: Vec<Migration>) -> MigrationRegistry {
    let mut registry = MigrationRegistry::new();
    for migration in migrations {
        registry.register(migration).unwrap();
    }
    registry
}

#[tokio::test]
async fn test_empty_ledger_applies_all_in_order() {
    let registry = registry_of(vec![
        // Registration order must not affect application order
        table_migration("20240103000000_create_c", "c"),
        table_migration("20240101000000_create_a", "a"),
        table_migration("20240102000000_create_b", "b"),
    ]);
    let runner = MigrationRunner::new(MemoryStore::new(), registry);

    let result = runner.apply_pending().await.unwrap();
    assert_eq!(
        result.applied,
        vec![
            "20240101000000_create_a",
            "20240102000000_create_b",
            "20240103000000_create_c"
        ]
    );

    let ledger = runner.store().ledger();
    let names: Vec<&str> = ledger.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "20240101000000_create_a",
            "20240102000000_create_b",
            "20240103000000_create_c"
        ]
    );
}

#[tokio::test]
async fn test_partially_applied_ledger_applies_only_the_tail() {
    let a = table_migration("20240101000000_create_a", "a");
    let b = table_migration("20240102000000_create_b", "b");
    let c = table_migration("20240103000000_create_c", "c");

    let store = MemoryStore::new();
    store.apply(&a).await.unwrap();
    store.apply(&b).await.unwrap();

    let runner = MigrationRunner::new(store, registry_of(vec![a, b, c]));
    let result = runner.apply_pending().await.unwrap();
    assert_eq!(result.applied, vec!["20240103000000_create_c"]);
    assert_eq!(runner.store().ledger().len(), 3);
}

#[tokio::test]
async fn test_apply_pending_is_idempotent() {
    let registry = registry_of(vec![table_migration("20240101000000_create_a", "a")]);
    let runner = MigrationRunner::new(MemoryStore::new(), registry);

    assert_eq!(runner.apply_pending().await.unwrap().applied.len(), 1);
    let ledger_before = runner.store().ledger();

    // No new migrations: a second run changes nothing
    assert!(runner.apply_pending().await.unwrap().applied.is_empty());
    assert_eq!(runner.store().ledger(), ledger_before);
}

#[tokio::test]
async fn test_revert_last_removes_newest_record_and_runs_down() {
    let registry = registry_of(vec![
        table_migration("20240101000000_create_a", "a"),
        table_migration("20240102000000_create_b", "b"),
        table_migration("20240103000000_create_c", "c"),
    ]);
    let runner = MigrationRunner::new(MemoryStore::new(), registry);
    runner.apply_pending().await.unwrap();

    let reverted = runner.revert_last().await.unwrap();
    assert_eq!(reverted, "20240103000000_create_c");

    let names: Vec<String> = runner
        .store()
        .ledger()
        .iter()
        .map(|r| r.name.clone())
        .collect();
    assert_eq!(
        names,
        vec!["20240101000000_create_a", "20240102000000_create_b"]
    );
    // C's down ran: its table is gone, the others remain
    assert!(!runner.store().schema().has_table("c"));
    assert!(runner.store().schema().has_table("a"));
    assert!(runner.store().schema().has_table("b"));
}

#[tokio::test]
async fn test_failed_migration_leaves_ledger_unchanged_for_it() {
    let a = table_migration("20240101000000_create_a", "a");
    // B adds a column, then collides with A's table: the second operation
    // fails and the whole migration must roll back
    let b = Migration::new("20240102000000_break")
        .up(Operation::AddColumn {
            table: "a".to_string(),
            column: ColumnDefinition::new("extra", FieldType::Text),
        })
        .up(Operation::CreateTable {
            name: "a".to_string(),
            columns: vec![],
            constraints: vec![],
        });
    let c = table_migration("20240103000000_create_c", "c");

    let runner = MigrationRunner::new(MemoryStore::new(), registry_of(vec![a, b, c]));
    let err = runner.apply_pending().await.unwrap_err();
    assert!(matches!(err, MigrationError::SchemaConflict(_)));

    // A stays applied, B rolled back fully, C never ran
    let names: Vec<String> = runner
        .store()
        .ledger()
        .iter()
        .map(|r| r.name.clone())
        .collect();
    assert_eq!(names, vec!["20240101000000_create_a"]);
    assert!(!runner.store().schema().table("a").unwrap().has_column("extra"));
    assert!(!runner.store().schema().has_table("c"));
}

#[tokio::test]
async fn test_ledger_gap_is_flagged_not_skipped() {
    let a = table_migration("20240101000000_create_a", "a");
    let b = table_migration("20240102000000_create_b", "b");

    // Only B is recorded as applied: A is a gap
    let store = MemoryStore::new();
    store.apply(&b).await.unwrap();

    let runner = MigrationRunner::new(store, registry_of(vec![a, b]));
    let err = runner.apply_pending().await.unwrap_err();
    match err {
        MigrationError::LedgerGap {
            missing,
            applied_after,
        } => {
            assert_eq!(missing, "20240101000000_create_a");
            assert_eq!(applied_after, "20240102000000_create_b");
        }
        other => panic!("expected LedgerGap, got {other}"),
    }
}

#[tokio::test]
async fn test_revert_on_empty_ledger() {
    let runner = MigrationRunner::new(MemoryStore::new(), MigrationRegistry::new());
    let err = runner.revert_last().await.unwrap_err();
    assert!(matches!(err, MigrationError::NothingToRevert));
}

#[tokio::test]
async fn test_revert_unknown_ledger_row_is_not_found() {
    let stray = table_migration("20240105000000_stray", "stray");
    let store = MemoryStore::new();
    store.apply(&stray).await.unwrap();

    // Registry does not know the recorded migration
    let runner = MigrationRunner::new(store, MigrationRegistry::new());
    let err = runner.revert_last().await.unwrap_err();
    assert!(matches!(err, MigrationError::NotFound(_)));
}

#[tokio::test]
async fn test_revert_irreversible_migration_refused() {
    let seed = Migration::new("20240101000000_seed").up(Operation::RunSql {
        sql: "INSERT INTO flags (name) VALUES ('beta')".to_string(),
    });
    let runner = MigrationRunner::new(MemoryStore::new(), registry_of(vec![seed]));
    runner.apply_pending().await.unwrap();

    let err = runner.revert_last().await.unwrap_err();
    assert!(matches!(err, MigrationError::Irreversible(_)));
}

#[tokio::test]
async fn test_down_restores_schema_exactly() {
    let base = table_migration("20240101000000_create_users", "users");
    let change = Migration::new("20240102000000_add_email")
        .up(Operation::AddColumn {
            table: "users".to_string(),
            column: ColumnDefinition::new("email", FieldType::VarChar(255)).not_null(),
        })
        .up(Operation::CreateIndex {
            table: "users".to_string(),
            name: "idx_users_email".to_string(),
            columns: vec!["email".to_string()],
            unique: true,
        })
        .down(Operation::DropIndex {
            table: "users".to_string(),
            name: "idx_users_email".to_string(),
        })
        .down(Operation::DropColumn {
            table: "users".to_string(),
            column: "email".to_string(),
        });

    let runner = MigrationRunner::new(MemoryStore::new(), registry_of(vec![base, change]));
    runner.apply_pending().await.unwrap();
    let after_both = runner.store().schema();

    runner.revert_last().await.unwrap();
    let after_revert = runner.store().schema();

    // down(up(M)) restores the prior shape exactly
    assert_ne!(after_both, after_revert);
    assert!(!after_revert.table("users").unwrap().has_column("email"));
    assert!(after_revert.table("users").unwrap().indexes.is_empty());
}

#[tokio::test]
async fn test_status_lists_applied_pending_and_strays() {
    let a = table_migration("20240101000000_create_a", "a");
    let b = table_migration("20240102000000_create_b", "b");
    let stray = table_migration("20240105000000_stray", "stray");

    let store = MemoryStore::new();
    store.apply(&a).await.unwrap();
    store.apply(&stray).await.unwrap();

    let runner = MigrationRunner::new(store, registry_of(vec![a, b]));
    let statuses = runner.status().await.unwrap();

    assert_eq!(statuses.len(), 3);
    assert!(statuses[0].is_applied() && statuses[0].known);
    assert_eq!(statuses[1].name, "20240102000000_create_b");
    assert!(!statuses[1].is_applied());
    assert_eq!(statuses[2].name, "20240105000000_stray");
    assert!(statuses[2].is_applied() && !statuses[2].known);
}
