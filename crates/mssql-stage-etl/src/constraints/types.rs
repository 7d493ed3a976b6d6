//! Foreign key descriptors captured from the source catalog.

use crate::error::Result;
use crate::identifier::{quote_mssql, TableName};
use serde::{Deserialize, Serialize};

/// Snapshot of one foreign key constraint, taken before it is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDescriptor {
    /// Constraint name.
    pub constraint_name: String,

    /// Table owning the constraint.
    pub child_table: TableName,

    /// Referencing columns, in key order.
    pub child_columns: Vec<String>,

    /// Referenced table.
    pub parent_table: TableName,

    /// Referenced columns, in key order.
    pub parent_columns: Vec<String>,

    /// ON DELETE action.
    #[serde(default)]
    pub on_delete: ReferentialAction,

    /// ON UPDATE action.
    #[serde(default)]
    pub on_update: ReferentialAction,
}

impl ForeignKeyDescriptor {
    /// Single-column foreign key with default referential actions.
    pub fn new(
        constraint_name: impl Into<String>,
        child_table: TableName,
        child_column: impl Into<String>,
        parent_table: TableName,
        parent_column: impl Into<String>,
    ) -> Self {
        Self {
            constraint_name: constraint_name.into(),
            child_table,
            child_columns: vec![child_column.into()],
            parent_table,
            parent_columns: vec![parent_column.into()],
            on_delete: ReferentialAction::NoAction,
            on_update: ReferentialAction::NoAction,
        }
    }

    /// `ALTER TABLE <child> DROP CONSTRAINT <name>`
    pub fn drop_sql(&self) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.child_table.quoted()?,
            quote_mssql(&self.constraint_name)?
        ))
    }

    /// `ALTER TABLE <child> ADD CONSTRAINT <name> FOREIGN KEY (<cols>) REFERENCES <parent>(<cols>)`
    pub fn add_sql(&self) -> Result<String> {
        let mut sql = format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({})",
            self.child_table.quoted()?,
            quote_mssql(&self.constraint_name)?,
            quote_list(&self.child_columns)?,
            self.parent_table.quoted()?,
            quote_list(&self.parent_columns)?
        );

        if self.on_delete != ReferentialAction::NoAction {
            sql.push_str(" ON DELETE ");
            sql.push_str(self.on_delete.as_sql());
        }
        if self.on_update != ReferentialAction::NoAction {
            sql.push_str(" ON UPDATE ");
            sql.push_str(self.on_update.as_sql());
        }

        Ok(sql)
    }
}

fn quote_list(columns: &[String]) -> Result<String> {
    let quoted = columns
        .iter()
        .map(|c| quote_mssql(c))
        .collect::<Result<Vec<_>>>()?;
    Ok(quoted.join(", "))
}

/// Referential action of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    /// Map `sys.foreign_keys.*_referential_action_desc` values.
    pub fn from_catalog(desc: &str) -> Self {
        match desc.to_uppercase().as_str() {
            "CASCADE" => ReferentialAction::Cascade,
            "SET_NULL" => ReferentialAction::SetNull,
            "SET_DEFAULT" => ReferentialAction::SetDefault,
            _ => ReferentialAction::NoAction,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}
