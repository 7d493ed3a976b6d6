//! # mssql-stage-etl
//!
//! Reload a fixed set of SQL Server tables into a staging database.
//!
//! A run:
//!
//! - **Drops every foreign key** on the source database and records them
//! - **Exports** each source table to a CSV intermediate file
//! - **Truncates** the source table and checks it is empty
//! - **Imports** the file into the paired staging table, inferring each
//!   field's type (integer, date or text) from its text
//! - **Restores** the recorded foreign keys exactly once
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_stage_etl::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> mssql_stage_etl::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::connect(config).await?;
//!     let summary = orchestrator.run(CancellationToken::new()).await?;
//!     println!("{} of {} tables loaded", summary.success_count, summary.total());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod constraints;
pub mod error;
pub mod identifier;
pub mod inference;
pub mod intermediate;
pub mod orchestrator;
pub mod session;
pub mod statement;
pub mod transfer;

// Re-exports for convenient access
pub use config::{CommitMode, Config, DatabaseConfig, MigrationConfig};
pub use constraints::{ConstraintManager, DroppedConstraints, ForeignKeyDescriptor};
pub use error::{MigrateError, Result};
pub use identifier::TableName;
pub use inference::{classify, classify_and_render, FieldKind, InferredValue};
pub use orchestrator::{
    health_check, plan_jobs, HealthCheckResult, MigrationPlan, MigrationSummary, Orchestrator,
    TableOutcome,
};
pub use session::{MssqlSession, SqlSession};
pub use statement::{build_insert, InsertStatement};
pub use transfer::{TableTransfer, TableTransferJob, TransferStatus};
