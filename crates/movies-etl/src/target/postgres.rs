//! PostgreSQL target writer.
//!
//! Uses deadpool-postgres for connection pooling and the text COPY protocol
//! for bulk loads.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod, Runtime};
use futures::SinkExt;
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info, warn};

use super::copy::{qualify_table, quote_ident, CopyEncoder};
use super::{tls, TargetWriter};
use crate::config::{EtlConfig, TargetConfig};
use crate::core::table::REFERENCED_COLUMN;
use crate::core::{ForeignKeySpec, Row, TableName};
use crate::error::{EtlError, Result};

/// TCP connect timeout for new connections.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long an operation waits for a free pool slot.
const POOL_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// PostgreSQL target writer.
pub struct PgWriter {
    pool: Pool,
    schema: String,
    encoder: CopyEncoder,
}

impl PgWriter {
    /// Open the pool and establish `min_pool_size` connections up front.
    pub async fn open(target: &TargetConfig, etl: &EtlConfig) -> Result<Self> {
        let writer = Self::build(target, etl)?;
        writer.warm_up(target.min_pool_size).await?;

        info!(
            "Connected to PostgreSQL target: {} (schema {}, pool {}..={})",
            target.redacted_dsn(),
            writer.schema,
            target.min_pool_size,
            target.max_pool_size
        );
        Ok(writer)
    }

    /// Build the writer without connecting.
    fn build(target: &TargetConfig, etl: &EtlConfig) -> Result<Self> {
        if target.min_pool_size == 0 || target.min_pool_size > target.max_pool_size {
            return Err(EtlError::Config(format!(
                "invalid pool bounds: min {} max {}",
                target.min_pool_size, target.max_pool_size
            )));
        }

        let mut chars = etl.delimiter.chars();
        let delimiter = match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii() => c,
            _ => {
                return Err(EtlError::Config(format!(
                    "COPY delimiter must be a single one-byte character, got {:?}",
                    etl.delimiter
                )))
            }
        };

        let mut pg_config: PgConfig = target
            .dsn
            .parse()
            .map_err(|e| EtlError::Config(format!("invalid target.dsn: {}", e)))?;
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(CONNECT_TIMEOUT);
        if pg_config.get_application_name().is_none() {
            pg_config.application_name("movies-etl");
        }

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = match tls::connector(target.ssl_mode) {
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config)
            }
            Some(connector) => Manager::from_config(pg_config, connector, mgr_config),
        };

        let pool = Pool::builder(mgr)
            .max_size(target.max_pool_size)
            .runtime(Runtime::Tokio1)
            .wait_timeout(Some(POOL_WAIT_TIMEOUT))
            .build()
            .map_err(|e| EtlError::Config(format!("creating PostgreSQL target pool: {}", e)))?;

        Ok(Self {
            pool,
            schema: target.schema.clone(),
            encoder: CopyEncoder::new(delimiter, etl.null_value.clone()),
        })
    }

    /// Hold `count` connections at once so the pool starts with that many.
    async fn warm_up(&self, count: usize) -> Result<()> {
        let mut held = Vec::with_capacity(count);
        for _ in 0..count {
            let client = self
                .pool
                .get()
                .await
                .map_err(|e| EtlError::connection("target", e))?;
            held.push(client);
        }

        if let Some(client) = held.first() {
            client
                .simple_query("SELECT 1")
                .await
                .map_err(|e| EtlError::connection("target", describe(&e)))?;
        }

        debug!("Established {} target connections", held.len());
        Ok(())
    }

    async fn client(&self) -> std::result::Result<Object, String> {
        self.pool
            .get()
            .await
            .map_err(|e| format!("acquiring connection: {}", e))
    }

    fn qualified(&self, table: TableName) -> String {
        qualify_table(&self.schema, table.as_str())
    }
}

/// `ALTER TABLE` statement adding `fk` in `schema`.
pub fn foreign_key_sql(schema: &str, fk: &ForeignKeySpec) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}){}",
        qualify_table(schema, fk.table.as_str()),
        quote_ident(&fk.name),
        quote_ident(fk.column),
        qualify_table(schema, fk.references.as_str()),
        quote_ident(REFERENCED_COLUMN),
        fk.on_delete.as_sql()
    )
}

/// Server message with detail when the error came from the database.
fn describe(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => match db.detail() {
            Some(detail) => format!("{} ({})", db.message(), detail),
            None => db.message().to_string(),
        },
        None => e.to_string(),
    }
}

#[async_trait]
impl TargetWriter for PgWriter {
    async fn bulk_insert(&self, table: TableName, rows: Vec<Row>) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let (columns, data) = self.encoder.encode(table, &rows)?;
        let sql = self.encoder.statement(&self.qualified(table), &columns);

        let client = self
            .client()
            .await
            .map_err(|e| EtlError::load(table, e))?;

        let sink = client
            .copy_in(&sql)
            .await
            .map_err(|e| EtlError::load(table, format!("initiating COPY: {}", describe(&e))))?;

        tokio::pin!(sink);
        sink.send(data)
            .await
            .map_err(|e| EtlError::load(table, format!("sending COPY data: {}", describe(&e))))?;
        let written = sink
            .finish()
            .await
            .map_err(|e| EtlError::load(table, format!("finishing COPY: {}", describe(&e))))?;

        debug!("{}: copied {} rows", table, written);
        Ok(written)
    }

    async fn install_foreign_key(&self, fk: &ForeignKeySpec) -> Result<()> {
        let constraint_error = |message: String| EtlError::Constraint {
            table: fk.table,
            constraint: fk.name.clone(),
            message,
        };

        let client = self.client().await.map_err(constraint_error)?;
        let sql = foreign_key_sql(&self.schema, fk);
        client
            .batch_execute(&sql)
            .await
            .map_err(|e| constraint_error(describe(&e)))?;

        debug!("Created foreign key {} on {}.{}", fk.name, self.schema, fk.table);
        Ok(())
    }

    async fn row_count(&self, table: TableName) -> Result<i64> {
        let client = self.client().await.map_err(|e| EtlError::read(table, e))?;
        let sql = format!("SELECT COUNT(*)::int8 FROM {}", self.qualified(table));
        let row = client
            .query_one(&sql, &[])
            .await
            .map_err(|e| EtlError::read(table, describe(&e)))?;
        Ok(row.get::<_, i64>(0))
    }

    async fn ping(&self) -> Result<()> {
        let client = self
            .client()
            .await
            .map_err(|e| EtlError::connection("target", e))?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| EtlError::connection("target", describe(&e)))?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close();
            debug!("Closed PostgreSQL target pool");
        }
    }
}
