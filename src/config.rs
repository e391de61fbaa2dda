//! Runner configuration
//!
//! Resolution order: explicit CLI flags beat environment variables beat the
//! config file. The file is TOML:
//!
//! ```toml
//! database_url = "postgres://localhost/app"
//! migrations_dir = "migrations"
//! ```
//!
//! `TIDEMARK_DATABASE_URL` (or plain `DATABASE_URL`) overrides the file.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{MigrationError, Result};

/// Default config file looked up in the working directory
pub const CONFIG_FILE: &str = "tidemark.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

impl Config {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            migrations_dir: default_migrations_dir(),
        }
    }

    /// Resolve configuration from file and environment
    ///
    /// `path` forces a specific config file; otherwise `tidemark.toml` is
    /// read if present. Fails with [`MigrationError::Config`] when no
    /// database URL can be found anywhere.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Some(Self::from_file(path)?),
            None => {
                let default = Path::new(CONFIG_FILE);
                if default.exists() {
                    Some(Self::from_file(default)?)
                } else {
                    None
                }
            }
        };

        if let Some(url) = env_database_url() {
            match &mut config {
                Some(config) => config.database_url = url,
                None => {
                    config = Some(Config {
                        database_url: url,
                        migrations_dir: default_migrations_dir(),
                    })
                }
            }
        }

        config.ok_or_else(|| {
            MigrationError::Config(format!(
                "no database URL: set TIDEMARK_DATABASE_URL or create {}",
                CONFIG_FILE
            ))
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| MigrationError::Config(format!("{}: {}", path.display(), e)))
    }
}

fn env_database_url() -> Option<String> {
    std::env::var("TIDEMARK_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
        .filter(|url| !url.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tidemark.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "database_url = \"sqlite:app.db\"").unwrap();
        writeln!(file, "migrations_dir = \"db/migrations\"").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.database_url, "sqlite:app.db");
        assert_eq!(config.migrations_dir, PathBuf::from("db/migrations"));
    }

    #[test]
    fn test_migrations_dir_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tidemark.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "database_url = \"sqlite:app.db\"").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.migrations_dir, PathBuf::from("migrations"));
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tidemark.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "database_url = 42").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, MigrationError::Config(_)));
    }
}
