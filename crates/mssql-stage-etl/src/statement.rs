//! INSERT statement construction for the import loop.

use crate::error::Result;
use crate::identifier::TableName;
use crate::inference::{classify, InferredValue};

/// A positional INSERT for one intermediate record.
///
/// The column list is implicit: values must follow the destination table's
/// column order, which is not checked here.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    table: TableName,
    values: Vec<InferredValue>,
}

impl InsertStatement {
    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Classified values, in column order.
    pub fn values(&self) -> &[InferredValue] {
        &self.values
    }

    /// Parameterized SQL, `INSERT INTO [schema].[table] VALUES (@P1,@P2,...)`.
    pub fn sql(&self) -> Result<String> {
        let placeholders: Vec<String> = (1..=self.values.len())
            .map(|i| format!("@P{}", i))
            .collect();
        Ok(format!(
            "INSERT INTO {} VALUES ({})",
            self.table.quoted()?,
            placeholders.join(",")
        ))
    }

    /// Literal SQL text, `INSERT INTO T VALUES (1,'2023/07/04','abc')`.
    ///
    /// Not safe to execute: text values are not escaped.
    pub fn render_literal(&self) -> String {
        let values: Vec<String> = self.values.iter().map(InferredValue::render_literal).collect();
        format!("INSERT INTO {} VALUES ({})", self.table, values.join(","))
    }
}

/// Build an INSERT for `table` from text fields, classifying each field.
///
/// An empty field list is accepted and yields `VALUES ()`.
pub fn build_insert<S: AsRef<str>>(table: &TableName, values: &[S]) -> InsertStatement {
    InsertStatement {
        table: table.clone(),
        values: values.iter().map(|v| classify(v.as_ref())).collect(),
    }
}
