//! Migration loader
//!
//! Loads migration files from a directory into a registry. Each migration
//! is one JSON file named after the migration it contains:
//! `20240131093000_create_users.json`. Files that do not end in `.json` or
//! do not start with a digit are skipped, so READMEs and editor droppings
//! in the migrations directory are harmless.

use std::fs;
use std::path::{Path, PathBuf};

use super::migration::Migration;
use super::registry::MigrationRegistry;
use super::{MigrationError, Result};

/// Loads migrations from disk
pub struct MigrationLoader {
    root: PathBuf,
}

impl MigrationLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load every migration file under the root into a registry
    ///
    /// A missing root directory yields an empty registry. Duplicate or
    /// malformed names fail loading; a file whose stem disagrees with the
    /// `name` field inside it fails with [`MigrationError::InvalidName`].
    pub fn load(&self) -> Result<MigrationRegistry> {
        let mut registry = MigrationRegistry::new();

        if !self.root.exists() {
            tracing::warn!(root = %self.root.display(), "migrations directory does not exist");
            return Ok(registry);
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|e| e.to_str()) == Some("json")
                    && path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(|c: char| c.is_ascii_digit()))
            })
            .collect();
        // Deterministic load order regardless of directory iteration order
        paths.sort();

        for path in paths {
            let migration = self.load_file(&path)?;
            tracing::debug!(name = %migration.name, file = %path.display(), "loaded migration");
            registry.register(migration)?;
        }

        Ok(registry)
    }

    fn load_file(&self, path: &Path) -> Result<Migration> {
        let contents = fs::read_to_string(path)?;
        let migration: Migration = serde_json::from_str(&contents)?;

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        if stem != migration.name {
            return Err(MigrationError::InvalidName(format!(
                "{} declares name {} but the file is named {}",
                path.display(),
                migration.name,
                stem
            )));
        }

        Ok(migration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut file = fs::File::create(dir.join(name)).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn test_load_sorted_migrations() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "20240102000000_second.json",
            r#"{"name": "20240102000000_second"}"#,
        );
        write_file(
            dir.path(),
            "20240101000000_first.json",
            r#"{"name": "20240101000000_first"}"#,
        );

        let registry = MigrationLoader::new(dir.path()).load().unwrap();
        let names: Vec<&str> = registry.list().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["20240101000000_first", "20240102000000_second"]);
    }

    #[test]
    fn test_non_json_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "README.md", "# migrations");
        write_file(dir.path(), "notes.txt", "todo");
        write_file(
            dir.path(),
            "20240101000000_first.json",
            r#"{"name": "20240101000000_first"}"#,
        );

        let registry = MigrationLoader::new(dir.path()).load().unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_missing_root_is_empty() {
        let registry = MigrationLoader::new("/nonexistent/migrations")
            .load()
            .unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stem_name_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "20240101000000_first.json",
            r#"{"name": "20240101000000_other"}"#,
        );

        let err = MigrationLoader::new(dir.path()).load().unwrap_err();
        assert!(matches!(err, MigrationError::InvalidName(_)));
    }

    #[test]
    fn test_full_migration_file() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "20240101000000_create_users.json",
            r#"{
                "name": "20240101000000_create_users",
                "up": [
                    {
                        "type": "CreateTable",
                        "name": "users",
                        "columns": [
                            {"name": "id", "field_type": "BigInteger", "primary_key": true},
                            {"name": "email", "field_type": {"VarChar": 255}, "not_null": true}
                        ]
                    }
                ],
                "down": [
                    {"type": "DropTable", "name": "users"}
                ]
            }"#,
        );

        let registry = MigrationLoader::new(dir.path()).load().unwrap();
        let migration = registry.get("20240101000000_create_users").unwrap();
        assert_eq!(migration.up.len(), 1);
        assert_eq!(migration.down.len(), 1);
        assert!(migration.atomic);
    }
}
