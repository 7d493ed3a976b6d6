//! Migration orchestrator - coordinates the whole staging run.
//!
//! A run pairs the configured tables, drops every foreign key on the source,
//! moves each pair through export, clear and import, then restores the
//! foreign keys exactly once. Table-local failures are counted and the run
//! moves on; constraint failures abort it.

use crate::config::{Config, DatabaseConfig};
use crate::constraints::{ConstraintManager, DroppedConstraints, ForeignKeyDescriptor};
use crate::error::{MigrateError, Result};
use crate::identifier::TableName;
use crate::intermediate::IntermediateFile;
use crate::session::{MssqlSession, SqlSession};
use crate::transfer::{TableTransfer, TableTransferJob, TransferStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Pair source and destination tables by position.
pub fn plan_jobs(export_tables: &[String], import_tables: &[String]) -> Result<Vec<TableTransferJob>> {
    if export_tables.len() != import_tables.len() {
        return Err(MigrateError::ConfigurationMismatch {
            sources: export_tables.len(),
            destinations: import_tables.len(),
        });
    }

    export_tables
        .iter()
        .zip(import_tables)
        .map(|(source, destination)| {
            Ok(TableTransferJob::new(
                TableName::parse(source)?,
                TableName::parse(destination)?,
            ))
        })
        .collect()
}

/// Outcome of one configured table.
#[derive(Debug, Clone, Serialize)]
pub struct TableOutcome {
    pub source_table: String,

    /// `None` when the source table had no configured partner.
    pub destination_table: Option<String>,

    pub status: TransferStatus,
    pub rows: usize,
    pub rows_imported: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&TableTransferJob> for TableOutcome {
    fn from(job: &TableTransferJob) -> Self {
        Self {
            source_table: job.source_table.to_string(),
            destination_table: Some(job.destination_table.to_string()),
            status: job.status,
            rows: job.rows,
            rows_imported: job.rows_imported,
            error: job.error.clone(),
        }
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationSummary {
    pub source_database: String,
    pub destination_database: String,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Tables loaded into the staging database.
    pub success_count: usize,

    /// Tables that failed or were never attempted.
    pub failure_count: usize,

    pub constraints_dropped: usize,
    pub constraints_restored: usize,

    /// The run was stopped by a signal between tables.
    pub cancelled: bool,

    /// Per-table outcomes, in configuration order.
    pub tables: Vec<TableOutcome>,
}

impl MigrationSummary {
    pub fn total(&self) -> usize {
        self.success_count + self.failure_count
    }

    /// Share of successful tables, truncated to a whole percent.
    pub fn success_percent(&self) -> usize {
        percent(self.success_count, self.total())
    }

    /// Share of failed tables, truncated to a whole percent.
    pub fn failure_percent(&self) -> usize {
        percent(self.failure_count, self.total())
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn percent(part: usize, total: usize) -> usize {
    if total == 0 {
        0
    } else {
        part * 100 / total
    }
}

/// What a run would do, without touching either database.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationPlan {
    pub jobs: Vec<TableTransferJob>,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    pub staging_dir: PathBuf,
}

/// Connection test results.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    pub destination_connected: bool,
    pub destination_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_error: Option<String>,
    pub healthy: bool,
}

/// Connect to both databases and report latency.
pub async fn health_check(config: &Config) -> HealthCheckResult {
    let (source_connected, source_latency_ms, source_error) =
        probe(&config.source, "source").await;
    let (destination_connected, destination_latency_ms, destination_error) =
        probe(&config.destination, "destination").await;

    HealthCheckResult {
        source_connected,
        source_latency_ms,
        source_error,
        destination_connected,
        destination_latency_ms,
        destination_error,
        healthy: source_connected && destination_connected,
    }
}

async fn probe(config: &DatabaseConfig, label: &str) -> (bool, u64, Option<String>) {
    let start = Instant::now();
    let result = MssqlSession::connect(config, label).await;
    let latency = start.elapsed().as_millis() as u64;
    match result {
        Ok(_) => (true, latency, None),
        Err(e) => (false, latency, Some(e.to_string())),
    }
}

/// Migration orchestrator.
pub struct Orchestrator<S: SqlSession = MssqlSession, D: SqlSession = MssqlSession> {
    config: Config,
    source: S,
    destination: D,
}

impl Orchestrator {
    /// Open one session on each database.
    pub async fn connect(config: Config) -> Result<Self> {
        config.validate()?;
        let source = MssqlSession::connect(&config.source, "source").await?;
        let destination = MssqlSession::connect(&config.destination, "destination").await?;
        Ok(Self::with_sessions(config, source, destination))
    }
}

impl<S: SqlSession, D: SqlSession> Orchestrator<S, D> {
    /// Build an orchestrator around existing sessions.
    pub fn with_sessions(config: Config, source: S, destination: D) -> Self {
        Self {
            config,
            source,
            destination,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Configured table pairs, unqualified names resolved against each
    /// side's default schema.
    fn jobs(&self) -> Result<Vec<TableTransferJob>> {
        let migration = &self.config.migration;
        let mut jobs = plan_jobs(&migration.export_tables, &migration.import_tables)?;
        for job in &mut jobs {
            job.source_table = job
                .source_table
                .clone()
                .with_default_schema(&self.config.source.schema);
            job.destination_table = job
                .destination_table
                .clone()
                .with_default_schema(&self.config.destination.schema);
        }
        Ok(jobs)
    }

    /// Dry run: list the jobs and the foreign keys that would be dropped.
    pub async fn plan(&self) -> Result<MigrationPlan> {
        let jobs = self.jobs()?;
        let foreign_keys = ConstraintManager::new(&self.source).capture().await?;
        info!(
            "Dry run: {} table pairs, {} foreign keys would be dropped",
            jobs.len(),
            foreign_keys.len()
        );
        Ok(MigrationPlan {
            jobs,
            foreign_keys,
            staging_dir: self.config.migration.staging_dir.clone(),
        })
    }

    /// Restore foreign keys recorded in a snapshot by an aborted run.
    pub async fn restore_constraints(&self, snapshot: &Path) -> Result<usize> {
        let dropped = DroppedConstraints::load_snapshot(snapshot)?;
        ConstraintManager::new(&self.source).restore_all(dropped).await
    }

    /// Run the migration. Cancellation is honored between tables.
    pub async fn run(&self, cancel: CancellationToken) -> Result<MigrationSummary> {
        let started_at = Utc::now();
        let migration = &self.config.migration;

        info!(
            "ETL from {} to {}",
            self.config.source.database, self.config.destination.database
        );

        let mut jobs = match self.jobs() {
            Ok(jobs) => jobs,
            Err(e @ MigrateError::ConfigurationMismatch { .. }) => {
                error!("{}; no table will be transferred", e);
                let tables = migration
                    .export_tables
                    .iter()
                    .enumerate()
                    .map(|(i, source)| TableOutcome {
                        source_table: source.clone(),
                        destination_table: migration.import_tables.get(i).cloned(),
                        status: TransferStatus::Failed,
                        rows: 0,
                        rows_imported: 0,
                        error: Some(e.to_string()),
                    })
                    .collect();
                return Ok(self.summarize(started_at, tables, 0, 0, false));
            }
            Err(e) => return Err(e),
        };

        std::fs::create_dir_all(&migration.staging_dir)?;

        let mut manager = ConstraintManager::new(&self.source);
        if migration.constraint_snapshot {
            manager = manager.with_snapshot(migration.snapshot_path());
        }

        info!("Phase 1: Dropping foreign keys on {}", self.config.source.database);
        let dropped = manager.capture_and_drop_all().await?;
        let constraints_dropped = dropped.len();

        info!("Phase 2: Transferring {} tables", jobs.len());
        let transfer = TableTransfer::new(&self.source, &self.destination, migration);
        let mut fatal = None;
        let mut cancelled = false;

        for job in jobs.iter_mut() {
            if cancel.is_cancelled() {
                if !cancelled {
                    warn!("Cancellation requested, skipping remaining tables");
                    cancelled = true;
                }
                job.mark_failed("cancelled");
                continue;
            }
            if fatal.is_some() {
                job.mark_failed("not attempted");
                continue;
            }

            let result = self.transfer_one(&transfer, job).await;
            match result {
                Ok(()) if job.is_success() => {
                    info!("{} -> {}: successful", job.source_table, job.destination_table);
                }
                Ok(()) => {
                    warn!(
                        "{} -> {}: unsuccessful ({})",
                        job.source_table,
                        job.destination_table,
                        job.error.as_deref().unwrap_or("unknown")
                    );
                }
                Err(e) if e.is_table_local() => {
                    warn!(
                        "{} -> {}: unsuccessful ({})",
                        job.source_table, job.destination_table, e
                    );
                    job.mark_failed(e.to_string());
                }
                Err(e) => {
                    error!("{}: {}", job.source_table, e);
                    job.mark_failed(e.to_string());
                    fatal = Some(e);
                }
            }
        }

        info!("Phase 3: Restoring foreign keys on {}", self.config.source.database);
        let restored = manager.restore_all(dropped).await;

        if let Some(e) = fatal {
            if let Err(restore_err) = restored {
                error!("Foreign key restore after failed run: {}", restore_err);
            }
            return Err(e);
        }
        let constraints_restored = restored?;

        let tables = jobs.iter().map(TableOutcome::from).collect();
        Ok(self.summarize(
            started_at,
            tables,
            constraints_dropped,
            constraints_restored,
            cancelled,
        ))
    }

    /// Export, clear and import one pair, recording progress on `job`.
    ///
    /// Returns `Ok` with the job marked failed for an incomplete export or a
    /// truncate that did not empty the table.
    async fn transfer_one(
        &self,
        transfer: &TableTransfer<'_, S, D>,
        job: &mut TableTransferJob,
    ) -> Result<()> {
        let file = match transfer
            .export_table(&job.source_table, &job.destination_table)
            .await?
        {
            Some(file) => file,
            None => {
                job.mark_failed("export incomplete");
                return Ok(());
            }
        };
        job.mark_exported(file.records())?;

        let result = self.clear_and_import(transfer, job, &file).await;
        match result {
            Ok(()) if job.is_success() => {
                // the rows are loaded; a leftover file does not undo that
                if let Err(e) = file.remove() {
                    warn!("Could not remove intermediate file: {}", e);
                }
                Ok(())
            }
            result => {
                self.handle_failed_file(file);
                result
            }
        }
    }

    async fn clear_and_import(
        &self,
        transfer: &TableTransfer<'_, S, D>,
        job: &mut TableTransferJob,
        file: &IntermediateFile,
    ) -> Result<()> {
        if !transfer.clear_table(&job.source_table).await? {
            job.mark_failed("source table not empty after truncate");
            return Ok(());
        }
        job.mark_cleared()?;

        let imported = transfer
            .import_table(&job.destination_table, file)
            .await?;
        job.mark_imported(imported)
    }

    fn handle_failed_file(&self, file: IntermediateFile) {
        if self.config.migration.keep_failed_exports {
            warn!("Keeping intermediate file {:?}", file.path());
        } else if let Err(e) = file.remove() {
            warn!("Could not remove intermediate file: {}", e);
        }
    }

    fn summarize(
        &self,
        started_at: DateTime<Utc>,
        tables: Vec<TableOutcome>,
        constraints_dropped: usize,
        constraints_restored: usize,
        cancelled: bool,
    ) -> MigrationSummary {
        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let success_count = tables
            .iter()
            .filter(|t| t.status == TransferStatus::Imported)
            .count();

        MigrationSummary {
            source_database: self.config.source.database.clone(),
            destination_database: self.config.destination.database.clone(),
            started_at,
            completed_at,
            duration_seconds: duration,
            success_count,
            failure_count: tables.len() - success_count,
            constraints_dropped,
            constraints_restored,
            cancelled,
            tables,
        }
    }
}
