//! Database sessions.
//!
//! Each component receives the session it works on explicitly. A run holds
//! two of them: one on the source database and one on the staging database.

mod mssql;

#[cfg(test)]
pub(crate) mod memory;

pub use mssql::MssqlSession;

use crate::constraints::ForeignKeyDescriptor;
use crate::error::Result;
use crate::identifier::TableName;
use crate::statement::InsertStatement;
use async_trait::async_trait;

/// One row with every field rendered as text; `None` is SQL NULL.
pub type TextRow = Vec<Option<String>>;

/// Operations the migration needs from a database session.
///
/// Statements run in autocommit mode unless a transaction was opened with
/// [`begin_transaction`](SqlSession::begin_transaction).
#[async_trait]
pub trait SqlSession: Send + Sync {
    /// Short label for log lines ("source", "destination").
    fn label(&self) -> &str;

    /// Round-trip a trivial query.
    async fn ping(&self) -> Result<()>;

    /// Every foreign key in the database, one descriptor per constraint,
    /// ordered by child table then constraint name.
    async fn foreign_keys(&self) -> Result<Vec<ForeignKeyDescriptor>>;

    /// Drop a foreign key from its child table.
    async fn drop_foreign_key(&self, fk: &ForeignKeyDescriptor) -> Result<()>;

    /// Re-create a foreign key from its descriptor.
    async fn add_foreign_key(&self, fk: &ForeignKeyDescriptor) -> Result<()>;

    /// `SELECT * FROM <table>`, fields in column order.
    async fn select_all(&self, table: &TableName) -> Result<Vec<TextRow>>;

    /// `TRUNCATE TABLE <table>`
    async fn truncate(&self, table: &TableName) -> Result<()>;

    /// Number of rows currently in the table.
    async fn count_rows(&self, table: &TableName) -> Result<i64>;

    /// Execute one INSERT with bound values. Returns rows affected.
    async fn insert(&self, stmt: &InsertStatement) -> Result<u64>;

    async fn begin_transaction(&self) -> Result<()>;

    async fn commit(&self) -> Result<()>;

    async fn rollback(&self) -> Result<()>;
}
