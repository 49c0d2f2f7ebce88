//! Source database operations.
//!
//! The source is read page by page through a single connection. Pages are
//! exposed as a lazy, finite stream of chunks per table.

mod sqlite;

pub use sqlite::SqliteReader;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::core::TableName;
use crate::error::Result;

/// A primitive value as stored by the source.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl RawValue {
    /// Storage class name, used in validation messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            RawValue::Null => "null",
            RawValue::Integer(_) => "integer",
            RawValue::Real(_) => "real",
            RawValue::Text(_) => "text",
            RawValue::Blob(_) => "blob",
        }
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::Text(v.to_string())
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        RawValue::Integer(v)
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Real(v)
    }
}

/// A source row: column name to value.
pub type RawRow = HashMap<String, RawValue>;

/// One page of rows read from a table.
#[derive(Debug, Clone)]
pub struct RawChunk {
    pub table: TableName,
    /// Offset the page was read at.
    pub offset: u64,
    pub rows: Vec<RawRow>,
}

/// Read pages from a source database.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Read at most `page_size` rows starting at `offset`.
    ///
    /// Returns an empty page once `offset` is past the last row. Failures are
    /// not retried.
    async fn read_chunk(
        &self,
        table: TableName,
        offset: u64,
        page_size: usize,
    ) -> Result<Vec<RawRow>>;

    /// Count the rows of a table.
    async fn row_count(&self, table: TableName) -> Result<i64>;

    /// Round-trip a trivial query.
    async fn ping(&self) -> Result<()>;

    /// Get the database type.
    fn db_type(&self) -> &str;

    /// Release the connection. Safe to call more than once.
    async fn close(&self);
}

/// Stream a table page by page.
///
/// The offset advances by `page_size` after each non-empty page and the
/// stream ends on the first empty page. An error is yielded once and ends
/// the stream. The stream cannot be rewound; read the table again by
/// calling this function again.
pub fn stream_table(
    reader: Arc<dyn SourceReader>,
    table: TableName,
    page_size: usize,
) -> BoxStream<'static, Result<RawChunk>> {
    stream::unfold(Some(0u64), move |next_offset| {
        let reader = reader.clone();
        async move {
            let offset = next_offset?;
            match reader.read_chunk(table, offset, page_size).await {
                Ok(rows) if rows.is_empty() => None,
                Ok(rows) => {
                    let next = offset + page_size as u64;
                    Some((Ok(RawChunk { table, offset, rows }), Some(next)))
                }
                Err(e) => Some((Err(e), None)),
            }
        }
    })
    .boxed()
}
