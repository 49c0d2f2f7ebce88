//! # movies-etl
//!
//! One-shot migration of the movies catalogue from SQLite to PostgreSQL.
//!
//! The five catalogue tables are moved concurrently, each through its own
//! extract, validate, transform and load pipeline:
//!
//! - **Paged reads** from the SQLite source with bounded read-ahead
//! - **Typed records** validated row by row before anything is written
//! - **Bulk loads** using the PostgreSQL COPY protocol
//! - **Foreign keys** installed only after every table has been loaded
//! - **Run report** with per-table counts, serializable to JSON
//!
//! ## Example
//!
//! ```rust,no_run
//! use movies_etl::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> movies_etl::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(&config).await?;
//!     let report = orchestrator.run().await;
//!     orchestrator.close().await;
//!     println!("Loaded {} rows", report.rows_loaded);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod finalize;
pub mod orchestrator;
pub mod pipeline;
pub mod schema;
pub mod source;
pub mod target;
pub mod transform;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use config::{Config, EtlConfig, RowPolicy, SourceConfig, SslMode, TargetConfig};
pub use core::{Row, SqlValue, TableName};
pub use error::{EtlError, Result};
pub use finalize::FinalizeReport;
pub use orchestrator::{HealthCheckResult, Orchestrator, RowCountCheck, RunReport, RunStatus};
pub use pipeline::{TablePhase, TableReport};
pub use source::{SourceReader, SqliteReader};
pub use target::{PgWriter, TargetWriter};
