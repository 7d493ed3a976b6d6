//! Per-table job state.

use crate::error::{MigrateError, Result};
use crate::identifier::TableName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Job status.
///
/// `pending -> exported -> cleared -> imported` on the happy path; any
/// non-terminal status may move to `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Exported,
    Cleared,
    Imported,
    Failed,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferStatus::Imported | TransferStatus::Failed)
    }

    fn next(self) -> Option<TransferStatus> {
        match self {
            TransferStatus::Pending => Some(TransferStatus::Exported),
            TransferStatus::Exported => Some(TransferStatus::Cleared),
            TransferStatus::Cleared => Some(TransferStatus::Imported),
            TransferStatus::Imported | TransferStatus::Failed => None,
        }
    }
}

/// One configured (source, destination) table pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableTransferJob {
    pub source_table: TableName,
    pub destination_table: TableName,
    pub status: TransferStatus,

    /// Rows read from the source table.
    pub rows: usize,

    /// Rows inserted into the destination table.
    pub rows_imported: u64,

    /// Why the job failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TableTransferJob {
    pub fn new(source_table: TableName, destination_table: TableName) -> Self {
        Self {
            source_table,
            destination_table,
            status: TransferStatus::Pending,
            rows: 0,
            rows_imported: 0,
            error: None,
            completed_at: None,
        }
    }

    fn advance(&mut self, to: TransferStatus) -> Result<()> {
        if self.status.next() != Some(to) {
            return Err(MigrateError::transfer(
                self.source_table.to_string(),
                format!("invalid status change {:?} -> {:?}", self.status, to),
            ));
        }
        self.status = to;
        Ok(())
    }

    pub fn mark_exported(&mut self, rows: usize) -> Result<()> {
        self.advance(TransferStatus::Exported)?;
        self.rows = rows;
        Ok(())
    }

    pub fn mark_cleared(&mut self) -> Result<()> {
        self.advance(TransferStatus::Cleared)
    }

    pub fn mark_imported(&mut self, rows_imported: u64) -> Result<()> {
        self.advance(TransferStatus::Imported)?;
        self.rows_imported = rows_imported;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the job as failed. A job in a terminal state is left as it is, so
    /// a failed job keeps its first error and an imported job stays imported.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = TransferStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    pub fn is_success(&self) -> bool {
        self.status == TransferStatus::Imported
    }
}
