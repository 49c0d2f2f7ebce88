//! ETL orchestrator: coordinates the table pipelines and the finalize phase.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::{Config, EtlConfig};
use crate::core::TableName;
use crate::error::{EtlError, Result};
use crate::finalize::{install_foreign_keys, FinalizeReport};
use crate::pipeline::{run_table, TableReport};
use crate::source::{SourceReader, SqliteReader};
use crate::target::{PgWriter, TargetWriter};

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// A table failed, a chunk was dropped or a constraint was not installed.
    CompletedWithErrors,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique run identifier.
    pub run_id: String,

    pub status: RunStatus,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    pub tables_total: usize,
    pub tables_success: usize,
    pub tables_failed: usize,

    pub rows_loaded: u64,
    pub rows_skipped: u64,
    pub rows_dropped: u64,
    pub chunks_dropped: u64,

    /// Per-table outcomes, in catalogue order.
    pub tables: Vec<TableReport>,

    pub foreign_keys: FinalizeReport,
}

impl RunReport {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Names of the tables that failed.
    pub fn failed_tables(&self) -> Vec<TableName> {
        self.tables
            .iter()
            .filter(|t| t.is_failed())
            .map(|t| t.table)
            .collect()
    }
}

/// Row counts of one table on both sides.
#[derive(Debug, Clone, Serialize)]
pub struct RowCountCheck {
    pub table: TableName,
    pub source_rows: i64,
    pub target_rows: i64,
    pub matches: bool,
}

/// Result of probing both stores.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub source_connected: bool,
    pub source_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_error: Option<String>,
}

impl HealthCheckResult {
    /// Connection error for the first store that did not answer, if any.
    pub fn failure(&self) -> Option<EtlError> {
        let unreachable = |error: &Option<String>| {
            error.clone().unwrap_or_else(|| "health check failed".to_string())
        };
        if !self.source_connected {
            Some(EtlError::connection("source", unreachable(&self.source_error)))
        } else if !self.target_connected {
            Some(EtlError::connection("target", unreachable(&self.target_error)))
        } else {
            None
        }
    }
}

/// Drives every table pipeline and then the finalize phase.
pub struct Orchestrator {
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    etl: EtlConfig,
}

impl Orchestrator {
    /// Open the source, then the target. The source is closed again if the
    /// target cannot be opened.
    pub async fn new(config: &Config) -> Result<Self> {
        let source = SqliteReader::open(&config.source).await?;
        let target = match PgWriter::open(&config.target, &config.etl).await {
            Ok(target) => target,
            Err(e) => {
                source.close().await;
                return Err(e);
            }
        };

        Ok(Self::with_stores(
            Arc::new(source),
            Arc::new(target),
            config.etl.clone(),
        ))
    }

    /// Build an orchestrator over already opened stores.
    pub fn with_stores(
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        etl: EtlConfig,
    ) -> Self {
        Self {
            source,
            target,
            etl,
        }
    }

    /// Run every table concurrently, wait for all of them, then install the
    /// foreign keys.
    ///
    /// Table failures are reported, not returned. Dropping the returned
    /// future aborts the table tasks.
    pub async fn run(&self) -> RunReport {
        let started_at = Utc::now();
        let timer = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        info!(
            "Starting run {}: {} -> {}, {} tables, chunk size {}",
            run_id,
            self.source.db_type(),
            self.target.db_type(),
            TableName::ALL.len(),
            self.etl.chunk_size
        );

        let mut reports = self.load_tables().await;

        let foreign_keys = if self.etl.create_foreign_keys {
            install_foreign_keys(self.target.as_ref()).await
        } else {
            info!("Foreign key creation disabled");
            FinalizeReport::default()
        };

        let tables: Vec<TableReport> = TableName::ALL
            .iter()
            .filter_map(|t| reports.remove(t))
            .collect();

        let completed_at = Utc::now();
        let report = summarize(run_id, started_at, completed_at, timer, tables, foreign_keys);
        log_summary(&report);
        report
    }

    /// Spawn one pipeline per table and collect every outcome.
    async fn load_tables(&self) -> BTreeMap<TableName, TableReport> {
        let mut set = JoinSet::new();
        for table in TableName::ALL {
            let source = self.source.clone();
            let target = self.target.clone();
            let etl = self.etl.clone();
            set.spawn(async move { run_table(source, target, table, &etl).await });
        }

        let mut reports = BTreeMap::new();
        let mut lost = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(report) => {
                    reports.insert(report.table, report);
                }
                Err(e) => {
                    error!("Table task did not complete: {}", e);
                    lost.push(e.to_string());
                }
            }
        }

        // A panicked task cannot name its table; every table without a
        // report is one of them.
        for table in TableName::ALL {
            if !reports.contains_key(&table) {
                let cause = EtlError::Task(lost.join("; "));
                let err = EtlError::pipeline(table, cause);
                reports.insert(table, TableReport::failed(table, &err));
            }
        }
        reports
    }

    /// Compare per-table row counts between source and target.
    pub async fn validate(&self) -> Result<Vec<RowCountCheck>> {
        let mut results = Vec::with_capacity(TableName::ALL.len());

        for table in TableName::ALL {
            let source_rows = self.source.row_count(table).await?;
            let target_rows = self.target.row_count(table).await?;
            let matches = source_rows == target_rows;

            if matches {
                info!("{}: {} rows (match)", table, source_rows);
            } else {
                warn!(
                    "{}: source={} target={} (MISMATCH)",
                    table, source_rows, target_rows
                );
            }

            results.push(RowCountCheck {
                table,
                source_rows,
                target_rows,
                matches,
            });
        }

        Ok(results)
    }

    /// Round-trip a trivial query on both stores.
    pub async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let source = self.source.ping().await;
        let source_latency_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let target = self.target.ping().await;
        let target_latency_ms = start.elapsed().as_millis() as u64;

        HealthCheckResult {
            healthy: source.is_ok() && target.is_ok(),
            source_connected: source.is_ok(),
            source_latency_ms,
            source_error: source.err().map(|e| e.to_string()),
            target_connected: target.is_ok(),
            target_latency_ms,
            target_error: target.err().map(|e| e.to_string()),
        }
    }

    /// Release the source connection and the target pool.
    pub async fn close(&self) {
        self.source.close().await;
        self.target.close().await;
        info!("Connections closed");
    }
}

fn summarize(
    run_id: String,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    timer: Instant,
    tables: Vec<TableReport>,
    foreign_keys: FinalizeReport,
) -> RunReport {
    let tables_failed = tables.iter().filter(|t| t.is_failed()).count();
    let chunks_dropped: u64 = tables.iter().map(|t| t.chunks_dropped).sum();

    let status = if tables_failed > 0 || chunks_dropped > 0 || !foreign_keys.is_clean() {
        RunStatus::CompletedWithErrors
    } else {
        RunStatus::Completed
    };

    RunReport {
        run_id,
        status,
        started_at,
        completed_at,
        duration_seconds: timer.elapsed().as_secs_f64(),
        tables_total: tables.len(),
        tables_success: tables.len() - tables_failed,
        tables_failed,
        rows_loaded: tables.iter().map(|t| t.rows_loaded).sum(),
        rows_skipped: tables.iter().map(|t| t.rows_skipped).sum(),
        rows_dropped: tables.iter().map(|t| t.rows_dropped).sum(),
        chunks_dropped,
        tables,
        foreign_keys,
    }
}

fn log_summary(report: &RunReport) {
    for t in &report.tables {
        match &t.error {
            None => info!(
                "  {}: {:?}, {} rows loaded, {} skipped, {} chunks dropped",
                t.table, t.status, t.rows_loaded, t.rows_skipped, t.chunks_dropped
            ),
            Some(e) => error!("  {}: {:?}: {}", t.table, t.status, e),
        }
    }
    for failure in &report.foreign_keys.failed {
        warn!("  constraint {} on {}: {}", failure.constraint, failure.table, failure.error);
    }

    info!(
        "All data has been processed: {} rows in {:.1}s ({:?})",
        report.rows_loaded, report.duration_seconds, report.status
    );
}
