//! Export, clear and import of a single table pair.
//!
//! Rows leave the source through an intermediate file, the source table is
//! truncated, and the file is loaded into the staging table one INSERT per
//! record. How often the import commits depends on [`CommitMode`].
//!
//! [`CommitMode`]: crate::config::CommitMode

mod job;

pub use job::{TableTransferJob, TransferStatus};

use crate::config::MigrationConfig;
use crate::error::Result;
use crate::identifier::TableName;
use crate::intermediate::{export_rows, intermediate_path, IntermediateFile};
use crate::session::SqlSession;
use crate::statement::build_insert;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Moves rows from a source session to a destination session.
pub struct TableTransfer<'a, S: SqlSession + ?Sized, D: SqlSession + ?Sized> {
    source: &'a S,
    destination: &'a D,
    staging_dir: PathBuf,
    rows_per_commit: Option<usize>,
}

impl<'a, S: SqlSession + ?Sized, D: SqlSession + ?Sized> TableTransfer<'a, S, D> {
    pub fn new(source: &'a S, destination: &'a D, migration: &MigrationConfig) -> Self {
        Self {
            source,
            destination,
            staging_dir: migration.staging_dir.clone(),
            rows_per_commit: migration.rows_per_commit(),
        }
    }

    /// Read every row of `table` into its intermediate file.
    ///
    /// Returns `None` when fewer records were written than rows read; the
    /// partial file is gone by then. A missing table is an error.
    pub async fn export_table(
        &self,
        table: &TableName,
        destination: &TableName,
    ) -> Result<Option<IntermediateFile>> {
        let start = Instant::now();
        let rows = self.source.select_all(table).await?;

        std::fs::create_dir_all(&self.staging_dir)?;
        let path = intermediate_path(&self.staging_dir, table, destination);
        let file = export_rows(&path, &rows)?;

        match &file {
            Some(f) => info!(
                "{}: exported {} rows to {:?} in {:?}",
                table,
                f.records(),
                f.path(),
                start.elapsed()
            ),
            None => warn!("{}: export incomplete, intermediate file discarded", table),
        }
        Ok(file)
    }

    /// Truncate `table` and check that it is empty afterwards.
    pub async fn clear_table(&self, table: &TableName) -> Result<bool> {
        self.source.truncate(table).await?;
        let remaining = self.source.count_rows(table).await?;
        if remaining != 0 {
            warn!("{}: {} rows left after TRUNCATE", table, remaining);
            return Ok(false);
        }
        debug!("{}: cleared", table);
        Ok(true)
    }

    /// Insert every record of `file` into `table`, in file order.
    ///
    /// In per-row mode a failure leaves the rows inserted so far in place. In
    /// the transactional modes the open transaction is rolled back, so only
    /// earlier committed batches remain.
    pub async fn import_table(&self, table: &TableName, file: &IntermediateFile) -> Result<u64> {
        let start = Instant::now();
        let records = file.read_records()?;

        let inserted = match self.rows_per_commit {
            None => {
                let mut inserted = 0u64;
                for record in &records {
                    self.destination.insert(&build_insert(table, record)).await?;
                    inserted += 1;
                }
                inserted
            }
            Some(batch_size) => self.import_batched(table, &records, batch_size).await?,
        };

        info!(
            "{}: imported {} rows in {:?}",
            table,
            inserted,
            start.elapsed()
        );
        Ok(inserted)
    }

    async fn import_batched(
        &self,
        table: &TableName,
        records: &[Vec<String>],
        batch_size: usize,
    ) -> Result<u64> {
        let mut inserted = 0u64;
        let mut in_transaction = 0usize;

        for record in records {
            if in_transaction == 0 {
                self.destination.begin_transaction().await?;
            }

            if let Err(e) = self.destination.insert(&build_insert(table, record)).await {
                warn!(
                    "{}: insert failed, rolling back {} uncommitted rows",
                    table, in_transaction
                );
                if let Err(rollback_err) = self.destination.rollback().await {
                    error!("{}: rollback failed: {}", table, rollback_err);
                }
                return Err(e);
            }
            in_transaction += 1;

            if in_transaction >= batch_size {
                self.commit_or_rollback(table).await?;
                inserted += in_transaction as u64;
                in_transaction = 0;
            }
        }

        if in_transaction > 0 {
            self.commit_or_rollback(table).await?;
            inserted += in_transaction as u64;
        }
        Ok(inserted)
    }

    /// A failed COMMIT can leave the transaction open on the connection.
    async fn commit_or_rollback(&self, table: &TableName) -> Result<()> {
        if let Err(e) = self.destination.commit().await {
            warn!("{}: commit failed, rolling back", table);
            if let Err(rollback_err) = self.destination.rollback().await {
                error!("{}: rollback failed: {}", table, rollback_err);
            }
            return Err(e);
        }
        Ok(())
    }
}
