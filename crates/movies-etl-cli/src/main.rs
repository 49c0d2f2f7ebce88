//! movies-etl CLI - one-shot SQLite to PostgreSQL migration of the movies catalogue.

use clap::{Parser, Subcommand};
use movies_etl::{Config, EtlError, Orchestrator, RunReport, RunStatus};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Exit code when the run finished but something was left behind.
const EXIT_COMPLETED_WITH_ERRORS: u8 = 6;

/// Exit code when the run was interrupted by a signal.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "movies-etl")]
#[command(about = "Migrate the movies catalogue from SQLite to PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override the SQLite source path
    #[arg(long, env = "ETL_SOURCE_PATH")]
    source_path: Option<PathBuf>,

    /// Override the PostgreSQL target DSN
    #[arg(long, env = "ETL_TARGET_DSN", hide_env_values = true)]
    target_dsn: Option<String>,

    /// Override the target schema
    #[arg(long, env = "ETL_TARGET_SCHEMA")]
    target_schema: Option<String>,

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
    /// Run the full migration
    Run {
        /// Override the number of rows read per page
        #[arg(long, env = "ETL_CHUNK_SIZE")]
        chunk_size: Option<usize>,

        /// Leave foreign keys uninstalled
        #[arg(long)]
        skip_foreign_keys: bool,
    },

    /// Validate row counts between source and target
    Validate,

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

async fn run() -> Result<ExitCode, EtlError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(EtlError::Config)?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    // Apply overrides
    if let Some(path) = cli.source_path {
        config.source.path = path;
    }
    if let Some(dsn) = cli.target_dsn {
        config.target.dsn = dsn;
    }
    if let Some(schema) = cli.target_schema {
        config.target.schema = schema;
    }
    if let Commands::Run {
        chunk_size,
        skip_foreign_keys,
    } = &cli.command
    {
        if let Some(size) = chunk_size {
            config.etl.chunk_size = *size;
        }
        if *skip_foreign_keys {
            config.etl.create_foreign_keys = false;
        }
    }
    config.validate()?;

    let cancel_token = setup_signal_handler()?;

    match cli.command {
        Commands::Run { .. } => {
            let Some(orchestrator) = open(&config, &cancel_token).await? else {
                return Ok(interrupted());
            };

            let outcome = tokio::select! {
                report = orchestrator.run() => Some(report),
                _ = cancel_token.cancelled() => None,
            };
            orchestrator.close().await;

            let Some(report) = outcome else {
                eprintln!("Run interrupted; target may hold a partial load");
                return Ok(interrupted());
            };

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                print_report(&report);
            }

            if report.status == RunStatus::CompletedWithErrors {
                return Ok(ExitCode::from(EXIT_COMPLETED_WITH_ERRORS));
            }
        }

        Commands::Validate => {
            let Some(orchestrator) = open(&config, &cancel_token).await? else {
                return Ok(interrupted());
            };
            let checks = orchestrator.validate().await;
            orchestrator.close().await;
            let checks = checks?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&checks)?);
            } else {
                for check in &checks {
                    println!(
                        "  {}: source={} target={} {}",
                        check.table,
                        check.source_rows,
                        check.target_rows,
                        if check.matches { "OK" } else { "MISMATCH" }
                    );
                }
            }

            let mismatched = checks.iter().filter(|c| !c.matches).count();
            if mismatched > 0 {
                warn!("{} tables differ between source and target", mismatched);
                return Ok(ExitCode::from(EXIT_COMPLETED_WITH_ERRORS));
            }
            println!("Validation completed successfully");
        }

        Commands::HealthCheck => {
            let Some(orchestrator) = open(&config, &cancel_token).await? else {
                return Ok(interrupted());
            };
            let result = orchestrator.health_check().await;
            orchestrator.close().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (SQLite): {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target (PostgreSQL): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if let Some(err) = result.failure() {
                return Err(err);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Open both stores unless a shutdown signal arrives first. A store that was
/// already opened is released when the open future is dropped.
async fn open(
    config: &Config,
    cancel_token: &CancellationToken,
) -> Result<Option<Orchestrator>, EtlError> {
    tokio::select! {
        opened = Orchestrator::new(config) => opened.map(Some),
        _ = cancel_token.cancelled() => Ok(None),
    }
}

fn interrupted() -> ExitCode {
    eprintln!("Interrupted; connections closed");
    ExitCode::from(EXIT_INTERRUPTED)
}

fn print_report(report: &RunReport) {
    let headline = match report.status {
        RunStatus::Completed => "Migration completed!",
        RunStatus::CompletedWithErrors => "Migration completed with errors!",
    };
    println!("\n{}", headline);
    println!("  Run ID: {}", report.run_id);
    println!("  Duration: {:.2}s", report.duration_seconds);
    println!("  Tables: {}/{}", report.tables_success, report.tables_total);
    println!("  Rows: {}", report.rows_loaded);
    if report.rows_skipped > 0 {
        println!("  Rows skipped: {}", report.rows_skipped);
    }
    if report.chunks_dropped > 0 {
        println!(
            "  Chunks dropped: {} ({} rows)",
            report.chunks_dropped, report.rows_dropped
        );
    }
    let failed: Vec<&str> = report.failed_tables().iter().map(|t| t.as_str()).collect();
    if !failed.is_empty() {
        println!("  Failed tables: {}", failed.join(", "));
    }
    if report.foreign_keys.attempted {
        println!(
            "  Foreign keys: {}/{}",
            report.foreign_keys.installed.len(),
            report.foreign_keys.installed.len() + report.foreign_keys.failed.len()
        );
    }
    for failure in &report.foreign_keys.failed {
        println!("    {} on {}: {}", failure.constraint, failure.table, failure.error);
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
        .with_target(false);

    if format == "json" {
        subscriber.json().try_init().map_err(|e| e.to_string())
    } else {
        subscriber.try_init().map_err(|e| e.to_string())
    }
}

/// Cancel the returned token on SIGINT or SIGTERM.
#[cfg(unix)]
fn setup_signal_handler() -> Result<CancellationToken, EtlError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        eprintln!("\nReceived {}. Abandoning run and closing connections...", name);
        token.cancel();
    });

    Ok(cancel_token)
}

/// Cancel the returned token on Ctrl-C.
#[cfg(not(unix))]
fn setup_signal_handler() -> Result<CancellationToken, EtlError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Abandoning run and closing connections...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}
