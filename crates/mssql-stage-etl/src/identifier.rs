//! Identifier validation and SQL Server quoting.
//!
//! Table, column and constraint names cannot be bound as parameters, so every
//! identifier that reaches generated DDL or DML goes through [`quote_mssql`].

use crate::error::{MigrateError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum identifier length for SQL Server (sysname is nvarchar(128)).
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes and
/// identifiers longer than 128 characters.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "Identifier exceeds maximum length of {} characters: {:?}",
            MAX_IDENTIFIER_LENGTH, name
        )));
    }

    Ok(())
}

/// Quote a SQL Server identifier using brackets.
///
/// ```ignore
/// assert_eq!(quote_mssql("users")?, "[users]");
/// assert_eq!(quote_mssql("table]name")?, "[table]]name]");
/// ```
pub fn quote_mssql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("[{}]", name.replace(']', "]]")))
}

/// A table reference, optionally schema-qualified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableName {
    /// Schema name, if the table was qualified.
    pub schema: Option<String>,

    /// Table name.
    pub name: String,
}

impl TableName {
    /// Parse `table` or `schema.table`.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let mut parts = text.split('.');
        let (schema, name) = match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, None) => (None, name),
            (Some(schema), Some(name), None) => (Some(schema), name),
            _ => {
                return Err(MigrateError::Config(format!(
                    "Table name must be 'table' or 'schema.table', got {:?}",
                    text
                )))
            }
        };

        if let Some(schema) = schema {
            validate_identifier(schema)?;
        }
        validate_identifier(name)?;

        Ok(Self {
            schema: schema.map(str::to_string),
            name: name.to_string(),
        })
    }

    /// Build a schema-qualified name.
    pub fn qualified(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Fill in `schema` if the name is unqualified.
    pub fn with_default_schema(mut self, schema: &str) -> Self {
        if self.schema.is_none() {
            self.schema = Some(schema.to_string());
        }
        self
    }

    /// Bracket-quoted form for generated SQL, e.g. `[dbo].[Sales]`.
    pub fn quoted(&self) -> Result<String> {
        match &self.schema {
            Some(schema) => Ok(format!("{}.{}", quote_mssql(schema)?, quote_mssql(&self.name)?)),
            None => quote_mssql(&self.name),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}
