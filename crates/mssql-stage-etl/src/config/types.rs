//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration.
    pub source: DatabaseConfig,

    /// Staging (destination) database configuration.
    pub destination: DatabaseConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// SQL Server connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Schema used for unqualified table names (default: "dbo").
    #[serde(default = "default_dbo_schema")]
    pub schema: String,

    /// Encrypt connection (default: "true").
    #[serde(default = "default_true_string")]
    pub encrypt: String,

    /// Trust server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Tables to export from the source, paired by position with `import_tables`.
    #[serde(default)]
    pub export_tables: Vec<String>,

    /// Staging tables to load, paired by position with `export_tables`.
    #[serde(default)]
    pub import_tables: Vec<String>,

    /// Directory for intermediate files and the constraint snapshot.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// How the import commits inserted rows (default: per_row).
    #[serde(default)]
    pub commit_mode: CommitMode,

    /// Rows per commit in `batch` mode. Defaults to 500 if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_batch_size: Option<usize>,

    /// Keep the intermediate file when an import fails after the source was cleared.
    #[serde(default = "default_true")]
    pub keep_failed_exports: bool,

    /// Persist captured foreign keys to `constraints.json` before dropping them.
    #[serde(default = "default_true")]
    pub constraint_snapshot: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            export_tables: Vec::new(),
            import_tables: Vec::new(),
            staging_dir: default_staging_dir(),
            commit_mode: CommitMode::default(),
            commit_batch_size: None,
            keep_failed_exports: true,
            constraint_snapshot: true,
        }
    }
}

impl MigrationConfig {
    pub fn get_commit_batch_size(&self) -> usize {
        self.commit_batch_size.unwrap_or(500)
    }

    /// Rows per transaction, or `None` when every row commits on its own.
    pub fn rows_per_commit(&self) -> Option<usize> {
        match self.commit_mode {
            CommitMode::PerRow => None,
            CommitMode::Batch => Some(self.get_commit_batch_size()),
            CommitMode::SingleTransaction => Some(usize::MAX),
        }
    }

    /// Path of the constraint snapshot file.
    pub fn snapshot_path(&self) -> PathBuf {
        self.staging_dir.join("constraints.json")
    }
}

/// Commit strategy for the import loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// Each INSERT commits on its own. A failure leaves the table partially loaded.
    #[default]
    PerRow,

    /// Commit every `commit_batch_size` rows.
    Batch,

    /// One transaction per table; a failure leaves the table untouched.
    SingleTransaction,
}

// Default value functions for serde
fn default_mssql_port() -> u16 {
    1433
}

fn default_dbo_schema() -> String {
    "dbo".to_string()
}

fn default_true_string() -> String {
    "true".to_string()
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}
