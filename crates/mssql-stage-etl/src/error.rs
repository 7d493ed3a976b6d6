//! Error types for the staging migration library.

use thiserror::Error;

/// Exit code for configuration errors (invalid YAML, missing fields, etc.).
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for database connection and query errors.
pub const EXIT_DATABASE_ERROR: u8 = 2;
/// Exit code for a failed foreign key drop or restore.
pub const EXIT_CONSTRAINT_ERROR: u8 = 3;
/// Exit code for table transfer errors that escaped the run loop.
pub const EXIT_TRANSFER_ERROR: u8 = 4;
/// Exit code for filesystem errors.
pub const EXIT_IO_ERROR: u8 = 7;
/// Exit code for a run stopped by a signal.
pub const EXIT_CANCELLED: u8 = 130;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source and destination table lists have different lengths.
    #[error("Configuration mismatch: {sources} source tables but {destinations} destination tables")]
    ConfigurationMismatch { sources: usize, destinations: usize },

    /// A referenced table does not exist.
    #[error("Table {0} does not exist")]
    SchemaObjectMissing(String),

    /// Export wrote fewer records than rows read.
    #[error("Export of {table} incomplete: {written} of {read} rows written")]
    ExportIncomplete {
        table: String,
        read: usize,
        written: usize,
    },

    /// Dropping or restoring a foreign key failed. Fatal to the run.
    #[error("Failed to {operation} constraint {constraint} on {table}: {message}")]
    ConstraintOperation {
        operation: &'static str,
        constraint: String,
        table: String,
        message: String,
    },

    /// Data transfer failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// Database query or protocol error
    #[error("Database error: {0}")]
    Database(#[from] tiberius::error::Error),

    /// Connection setup error with context
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Intermediate file read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Whether the error only concerns one table and the run may continue.
    ///
    /// A driver error that means the connection itself is gone is not.
    pub fn is_table_local(&self) -> bool {
        match self {
            MigrateError::Database(e) => !matches!(
                e,
                tiberius::error::Error::Io { .. }
                    | tiberius::error::Error::Protocol(_)
                    | tiberius::error::Error::Tls(_)
                    | tiberius::error::Error::Routing { .. }
            ),
            MigrateError::SchemaObjectMissing(_)
            | MigrateError::ExportIncomplete { .. }
            | MigrateError::Transfer { .. }
            | MigrateError::Io(_)
            | MigrateError::Csv(_) => true,
            _ => false,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_)
            | MigrateError::ConfigurationMismatch { .. }
            | MigrateError::Yaml(_)
            | MigrateError::Json(_) => EXIT_CONFIG_ERROR,
            MigrateError::Database(_) | MigrateError::Connection { .. } => EXIT_DATABASE_ERROR,
            MigrateError::ConstraintOperation { .. } => EXIT_CONSTRAINT_ERROR,
            MigrateError::SchemaObjectMissing(_)
            | MigrateError::ExportIncomplete { .. }
            | MigrateError::Transfer { .. }
            | MigrateError::Csv(_) => EXIT_TRANSFER_ERROR,
            MigrateError::Io(_) => EXIT_IO_ERROR,
            MigrateError::Cancelled => EXIT_CANCELLED,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(
            MigrateError::ConstraintOperation {
                operation: "drop",
                constraint: "FK_a".into(),
                table: "dbo.a".into(),
                message: "boom".into(),
            }
            .exit_code(),
            EXIT_CONSTRAINT_ERROR
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(MigrateError::from(io).exit_code(), EXIT_IO_ERROR);
        assert_eq!(MigrateError::Cancelled.exit_code(), EXIT_CANCELLED);
    }

    #[test]
    fn test_constraint_errors_are_not_table_local() {
        let err = MigrateError::ConstraintOperation {
            operation: "restore",
            constraint: "FK_a".into(),
            table: "dbo.a".into(),
            message: "conflict".into(),
        };
        assert!(!err.is_table_local());
        assert!(MigrateError::SchemaObjectMissing("dbo.a".into()).is_table_local());
    }

    #[test]
    fn test_lost_connection_is_not_table_local() {
        let reset = MigrateError::Database(tiberius::error::Error::Io {
            kind: std::io::ErrorKind::ConnectionReset,
            message: "connection reset by peer".into(),
        });
        assert!(!reset.is_table_local());

        let conversion = MigrateError::Database(tiberius::error::Error::Conversion(
            "cannot convert 'abc' to int".into(),
        ));
        assert!(conversion.is_table_local());
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = MigrateError::from(io);
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: IO error: denied"));
    }
}
