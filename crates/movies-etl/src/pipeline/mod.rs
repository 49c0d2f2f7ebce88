//! Per-table extract, transform and load.
//!
//! Extraction runs in its own task and stays up to `read_ahead` pages ahead
//! of loading through a bounded channel. Pages are loaded in the order they
//! were read.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::config::{EtlConfig, RowPolicy};
use crate::core::TableName;
use crate::error::{EtlError, Result};
use crate::schema::Record;
use crate::source::{stream_table, RawChunk, SourceReader};
use crate::target::TargetWriter;
use crate::transform::transform;

/// Where a table pipeline is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TablePhase {
    Extracting,
    Transforming,
    Loading,
    Done,
    Failed,
}

impl TablePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TablePhase::Done | TablePhase::Failed)
    }
}

/// Outcome of one table pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub table: TableName,
    /// `Done` or `Failed`.
    pub status: TablePhase,
    pub chunks_loaded: u64,
    pub chunks_dropped: u64,
    pub rows_loaded: u64,
    /// Rows in dropped chunks.
    pub rows_dropped: u64,
    /// Rows that failed validation and were left out.
    pub rows_skipped: u64,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableReport {
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            status: TablePhase::Extracting,
            chunks_loaded: 0,
            chunks_dropped: 0,
            rows_loaded: 0,
            rows_dropped: 0,
            rows_skipped: 0,
            duration_ms: 0,
            error: None,
        }
    }

    /// A table whose task never reported back.
    pub fn failed(table: TableName, err: &EtlError) -> Self {
        let mut report = Self::new(table);
        report.status = TablePhase::Failed;
        report.error = Some(err.to_string());
        report
    }

    pub fn is_failed(&self) -> bool {
        self.status == TablePhase::Failed
    }
}

/// Move one table from source to target.
///
/// Never returns an error: a table-fatal failure is wrapped as a pipeline
/// error, logged and recorded in the report.
pub async fn run_table(
    reader: Arc<dyn SourceReader>,
    writer: Arc<dyn TargetWriter>,
    table: TableName,
    config: &EtlConfig,
) -> TableReport {
    let start = Instant::now();
    let mut report = TableReport::new(table);
    info!("{}: starting transfer", table);

    let result = drive(reader, writer.as_ref(), table, config, &mut report).await;
    report.duration_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(()) => {
            report.status = TablePhase::Done;
            info!(
                "{}: done, {} rows in {} chunks ({} chunks dropped, {} rows skipped) in {}ms",
                table,
                report.rows_loaded,
                report.chunks_loaded,
                report.chunks_dropped,
                report.rows_skipped,
                report.duration_ms
            );
        }
        Err(e) => {
            let err = EtlError::pipeline(table, e);
            error!("{}", err);
            report.status = TablePhase::Failed;
            report.error = Some(err.to_string());
        }
    }
    report
}

async fn drive(
    reader: Arc<dyn SourceReader>,
    writer: &dyn TargetWriter,
    table: TableName,
    config: &EtlConfig,
    report: &mut TableReport,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<Result<RawChunk>>(config.read_ahead);

    let mut chunks = stream_table(reader, table, config.chunk_size);
    let extractor = tokio::spawn(async move {
        while let Some(item) = chunks.next().await {
            if tx.send(item).await.is_err() {
                // Loader stopped
                break;
            }
        }
    });

    while let Some(item) = rx.recv().await {
        let chunk = item?;
        let offset = chunk.offset;

        report.status = TablePhase::Transforming;
        trace!("{}: {:?} at offset {}", table, report.status, offset);
        let records = validate_chunk(chunk, config.on_invalid_row, report)?;
        let rows = transform(records);
        if rows.is_empty() {
            report.status = TablePhase::Extracting;
            continue;
        }

        report.status = TablePhase::Loading;
        let count = rows.len() as u64;
        match writer.bulk_insert(table, rows).await {
            Ok(written) => {
                report.chunks_loaded += 1;
                report.rows_loaded += written;
                debug!("{}: loaded {} rows at offset {}", table, written, offset);
            }
            Err(e) => {
                report.chunks_dropped += 1;
                report.rows_dropped += count;
                warn!("{}: dropping chunk at offset {}: {}", table, offset, e);
            }
        }
        report.status = TablePhase::Extracting;
    }

    extractor
        .await
        .map_err(|e| EtlError::Task(format!("extraction of {}: {}", table, e)))
}

/// Validate every row of a chunk under `policy`.
fn validate_chunk(
    chunk: RawChunk,
    policy: RowPolicy,
    report: &mut TableReport,
) -> Result<Vec<Record>> {
    let mut records = Vec::with_capacity(chunk.rows.len());
    for (idx, raw) in chunk.rows.iter().enumerate() {
        match Record::from_raw(chunk.table, raw) {
            Ok(record) => records.push(record),
            Err(e) if policy == RowPolicy::Skip => {
                report.rows_skipped += 1;
                warn!("Skipping row {}: {}", chunk.offset + idx as u64, e);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(records)
}
