//! Configuration validation.

use super::{Config, DatabaseConfig};
use crate::error::{MigrateError, Result};
use crate::identifier::TableName;

/// Validate the configuration.
///
/// Mismatched table list lengths are deliberately not rejected here; the
/// orchestrator reports them as a failed run without touching either database.
pub fn validate(config: &Config) -> Result<()> {
    validate_database("source", &config.source)?;
    validate_database("destination", &config.destination)?;

    // Cannot migrate into the same database
    if config.source.host == config.destination.host
        && config.source.port == config.destination.port
        && config.source.database == config.destination.database
    {
        return Err(MigrateError::Config(
            "source and destination cannot be the same database".into(),
        ));
    }

    for table in config
        .migration
        .export_tables
        .iter()
        .chain(config.migration.import_tables.iter())
    {
        TableName::parse(table).map_err(|e| {
            MigrateError::Config(format!("invalid table name {:?}: {}", table, e))
        })?;
    }

    if let Some(0) = config.migration.commit_batch_size {
        return Err(MigrateError::Config(
            "migration.commit_batch_size must be at least 1".into(),
        ));
    }

    Ok(())
}

fn validate_database(side: &str, db: &DatabaseConfig) -> Result<()> {
    if db.host.is_empty() {
        return Err(MigrateError::Config(format!("{}.host is required", side)));
    }
    if db.database.is_empty() {
        return Err(MigrateError::Config(format!("{}.database is required", side)));
    }
    if db.user.is_empty() {
        return Err(MigrateError::Config(format!("{}.user is required", side)));
    }
    if db.schema.is_empty() {
        return Err(MigrateError::Config(format!("{}.schema is required", side)));
    }
    Ok(())
}
