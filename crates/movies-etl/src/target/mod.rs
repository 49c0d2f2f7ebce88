//! Target database operations.
//!
//! The target receives rows through bulk COPY and, once every table has been
//! loaded, the foreign keys between them.

pub mod copy;
mod postgres;
mod tls;

pub use copy::CopyEncoder;
pub use postgres::PgWriter;

use async_trait::async_trait;

use crate::core::{ForeignKeySpec, Row, TableName};
use crate::error::Result;

/// Write rows and constraints to a target database.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Append `rows` to `table` as one operation and return the number of
    /// rows written. An empty batch returns 0 without touching the store.
    async fn bulk_insert(&self, table: TableName, rows: Vec<Row>) -> Result<u64>;

    /// Add a foreign key constraint.
    async fn install_foreign_key(&self, fk: &ForeignKeySpec) -> Result<()>;

    /// Count the rows of a table.
    async fn row_count(&self, table: TableName) -> Result<i64>;

    /// Round-trip a trivial query.
    async fn ping(&self) -> Result<()>;

    /// Get the database type.
    fn db_type(&self) -> &str;

    /// Release every connection. Safe to call more than once.
    async fn close(&self);
}
