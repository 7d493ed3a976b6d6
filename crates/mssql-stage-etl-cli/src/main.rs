//! mssql-stage-etl CLI - reload SQL Server tables into a staging database.

use clap::{Parser, Subcommand};
use mssql_stage_etl::error::EXIT_CANCELLED;
use mssql_stage_etl::{
    health_check, Config, MigrateError, MigrationPlan, MigrationSummary, Orchestrator,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mssql-stage-etl")]
#[command(about = "Reload SQL Server tables into a staging database")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drop foreign keys, move every configured table, restore foreign keys
    Run {
        /// Dry run: show table pairs and foreign keys without changing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Re-create foreign keys recorded by an interrupted run
    RestoreConstraints {
        /// Snapshot file [default: <staging_dir>/constraints.json]
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run { dry_run } => {
            let orchestrator = Orchestrator::connect(config).await?;

            if dry_run {
                let plan = orchestrator.plan().await?;
                if cli.output_json {
                    println!("{}", serde_json::to_string_pretty(&plan)?);
                } else {
                    print_plan(&plan);
                }
                return Ok(ExitCode::SUCCESS);
            }

            let cancel_token = setup_signal_handler().await?;
            let summary = orchestrator.run(cancel_token).await?;

            if cli.output_json {
                println!("{}", summary.to_json()?);
            } else {
                print_summary(&summary);
            }

            if summary.cancelled {
                return Ok(ExitCode::from(EXIT_CANCELLED));
            }
        }

        Commands::RestoreConstraints { snapshot } => {
            let path = snapshot.unwrap_or_else(|| config.migration.snapshot_path());
            if !path.exists() {
                return Err(MigrateError::Config(format!(
                    "Constraint snapshot not found: {:?}",
                    path
                )));
            }

            let orchestrator = Orchestrator::connect(config).await?;
            let restored = orchestrator.restore_constraints(&path).await?;
            println!("Restored {} foreign keys from {:?}", restored, path);
        }

        Commands::HealthCheck => {
            let result = health_check(&config).await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source ({}): {} ({}ms)",
                    config.source.database,
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Destination ({}): {} ({}ms)",
                    config.destination.database,
                    if result.destination_connected { "OK" } else { "FAILED" },
                    result.destination_latency_ms
                );
                if let Some(ref err) = result.destination_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::connection(
                    "Health check failed",
                    "connecting to source and destination",
                ));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_summary(summary: &MigrationSummary) {
    println!(
        "ETL from {} to {}:",
        summary.source_database, summary.destination_database
    );
    for table in &summary.tables {
        let outcome = if table.status == mssql_stage_etl::TransferStatus::Imported {
            "successful"
        } else {
            "unsuccessful"
        };
        println!(
            "  {} -> {}: {}",
            table.source_table,
            table.destination_table.as_deref().unwrap_or("?"),
            outcome
        );
        if let Some(ref err) = table.error {
            println!("    Error: {}", err);
        }
    }
    println!(
        "Successful: {} ({}%)",
        summary.success_count,
        summary.success_percent()
    );
    println!(
        "Unsuccessful: {} ({}%)",
        summary.failure_count,
        summary.failure_percent()
    );
    println!(
        "Foreign keys dropped/restored: {}/{}",
        summary.constraints_dropped, summary.constraints_restored
    );
    println!("Duration: {:.2}s", summary.duration_seconds);
    if summary.cancelled {
        println!("Run was cancelled; remaining tables were not transferred");
    }
}

fn print_plan(plan: &MigrationPlan) {
    println!("Dry run - nothing will be changed");
    println!("  Staging directory: {:?}", plan.staging_dir);
    println!("  Table pairs:");
    for job in &plan.jobs {
        println!("    {} -> {}", job.source_table, job.destination_table);
    }
    println!("  Foreign keys to drop and restore:");
    for fk in &plan.foreign_keys {
        println!(
            "    {} on {} -> {}",
            fk.constraint_name, fk.child_table, fk.parent_table
        );
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().try_init().map_err(|e| e.to_string())
    } else {
        subscriber.try_init().map_err(|e| e.to_string())
    }
}

/// Setup signal handlers for cancellation between tables.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
#[cfg(unix)]
async fn setup_signal_handler() -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => eprintln!("\nReceived SIGINT. Finishing current table, then restoring foreign keys..."),
            _ = sigterm.recv() => eprintln!("\nReceived SIGTERM. Finishing current table, then restoring foreign keys..."),
        }
        token.cancel();
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
async fn setup_signal_handler() -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Finishing current table, then restoring foreign keys...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}
