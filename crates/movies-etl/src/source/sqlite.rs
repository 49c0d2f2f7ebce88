//! SQLite source reader.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, ConnectOptions, Connection, Row, TypeInfo, ValueRef};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{RawRow, RawValue, SourceReader};
use crate::config::SourceConfig;
use crate::core::TableName;
use crate::error::{EtlError, Result};

/// Reads the source catalogue through one SQLite connection.
///
/// The connection is not shared between concurrent reads: every access goes
/// through the mutex, so table pipelines take turns.
pub struct SqliteReader {
    conn: Mutex<Option<SqliteConnection>>,
    path: String,
}

impl SqliteReader {
    /// Open the source database read-only. The file must already exist.
    pub async fn open(config: &SourceConfig) -> Result<Self> {
        let path = config.path.display().to_string();
        let conn = SqliteConnectOptions::new()
            .filename(&config.path)
            .read_only(true)
            .create_if_missing(false)
            .connect()
            .await
            .map_err(|e| EtlError::connection("source", format!("{}: {}", path, e)))?;

        info!("Connected to SQLite source: {}", path);

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path,
        })
    }

    /// Quote an SQLite identifier.
    fn quote_ident(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Convert a row into column name to value pairs, keeping each value's
    /// storage class.
    fn decode_row(row: &SqliteRow) -> std::result::Result<RawRow, sqlx::Error> {
        let mut out = RawRow::with_capacity(row.columns().len());
        for (idx, column) in row.columns().iter().enumerate() {
            out.insert(column.name().to_string(), Self::decode_value(row, idx)?);
        }
        Ok(out)
    }

    fn decode_value(row: &SqliteRow, idx: usize) -> std::result::Result<RawValue, sqlx::Error> {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(RawValue::Null);
        }

        let storage = raw.type_info().name().to_ascii_uppercase();
        let value = match storage.as_str() {
            "INTEGER" | "INT" | "INT8" | "BIGINT" | "BOOLEAN" => {
                RawValue::Integer(row.try_get_unchecked(idx)?)
            }
            "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => RawValue::Real(row.try_get_unchecked(idx)?),
            "BLOB" => RawValue::Blob(row.try_get_unchecked(idx)?),
            _ => RawValue::Text(row.try_get_unchecked(idx)?),
        };
        Ok(value)
    }
}

#[async_trait]
impl SourceReader for SqliteReader {
    async fn read_chunk(
        &self,
        table: TableName,
        offset: u64,
        page_size: usize,
    ) -> Result<Vec<RawRow>> {
        let sql = format!(
            "SELECT * FROM {} ORDER BY rowid LIMIT ? OFFSET ?",
            Self::quote_ident(table.as_str())
        );

        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| EtlError::read(table, "source connection is closed"))?;

        let rows = sqlx::query(&sql)
            .bind(page_size as i64)
            .bind(offset as i64)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| EtlError::read(table, e))?;
        drop(guard);

        let decoded = rows
            .iter()
            .map(Self::decode_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| EtlError::read(table, e))?;

        debug!(
            "{}: read {} rows at offset {}",
            table,
            decoded.len(),
            offset
        );
        Ok(decoded)
    }

    async fn row_count(&self, table: TableName) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", Self::quote_ident(table.as_str()));

        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| EtlError::read(table, "source connection is closed"))?;

        let row = sqlx::query(&sql)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| EtlError::read(table, e))?;

        row.try_get::<i64, _>(0).map_err(|e| EtlError::read(table, e))
    }

    async fn ping(&self) -> Result<()> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| EtlError::connection("source", "connection is closed"))?;
        conn.ping()
            .await
            .map_err(|e| EtlError::connection("source", e))
    }

    fn db_type(&self) -> &str {
        "sqlite"
    }

    async fn close(&self) {
        let conn = self.conn.lock().await.take();
        if let Some(conn) = conn {
            if let Err(e) = conn.close().await {
                warn!("Error closing SQLite source {}: {}", self.path, e);
            } else {
                debug!("Closed SQLite source {}", self.path);
            }
        }
    }
}
