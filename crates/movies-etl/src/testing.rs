//! In-memory source and target used by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::{ForeignKeySpec, Row, SqlValue, TableName};
use crate::error::{EtlError, Result};
use crate::source::{RawRow, SourceReader};
use crate::target::TargetWriter;

/// Source backed by vectors of rows.
#[derive(Default)]
pub struct MemorySource {
    tables: HashMap<TableName, Vec<RawRow>>,
    fail_at: HashMap<TableName, u64>,
    closed: AtomicBool,
}

impl MemorySource {
    pub fn with_table(mut self, table: TableName, rows: Vec<RawRow>) -> Self {
        self.tables.insert(table, rows);
        self
    }

    /// Make the read of `table` at `offset` fail.
    pub fn fail_read_at(mut self, table: TableName, offset: u64) -> Self {
        self.fail_at.insert(table, offset);
        self
    }

    /// Every table present, empty.
    pub fn empty() -> Self {
        TableName::ALL
            .into_iter()
            .fold(Self::default(), |s, t| s.with_table(t, Vec::new()))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn read_chunk(
        &self,
        table: TableName,
        offset: u64,
        page_size: usize,
    ) -> Result<Vec<RawRow>> {
        if self.is_closed() {
            return Err(EtlError::read(table, "source connection is closed"));
        }
        if self.fail_at.get(&table) == Some(&offset) {
            return Err(EtlError::read(table, "disk I/O error"));
        }
        let rows = self
            .tables
            .get(&table)
            .ok_or_else(|| EtlError::read(table, format!("no such table: {}", table)))?;

        let start = (offset as usize).min(rows.len());
        let end = start.saturating_add(page_size).min(rows.len());
        Ok(rows[start..end].to_vec())
    }

    async fn row_count(&self, table: TableName) -> Result<i64> {
        self.tables
            .get(&table)
            .map(|rows| rows.len() as i64)
            .ok_or_else(|| EtlError::read(table, format!("no such table: {}", table)))
    }

    async fn ping(&self) -> Result<()> {
        if self.is_closed() {
            return Err(EtlError::connection("source", "connection is closed"));
        }
        Ok(())
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// One call observed by [`RecordingWriter`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriterCall {
    BulkInsert { table: TableName, rows: usize },
    InstallForeignKey { table: TableName, name: String },
}

/// Target that keeps rows in memory and records every call.
///
/// Foreign keys are checked against the stored rows, so dangling references
/// fail the way a real database would.
#[derive(Default)]
pub struct RecordingWriter {
    calls: Mutex<Vec<WriterCall>>,
    stored: Mutex<HashMap<TableName, Vec<Row>>>,
    insert_counts: Mutex<HashMap<TableName, usize>>,
    fail_inserts: HashSet<(TableName, usize)>,
    panic_on: HashSet<TableName>,
    closed: AtomicBool,
}

impl RecordingWriter {
    /// Make the `nth` (0-based) non-empty insert into `table` fail.
    pub fn fail_insert(mut self, table: TableName, nth: usize) -> Self {
        self.fail_inserts.insert((table, nth));
        self
    }

    /// Panic on any insert into `table`.
    pub fn panic_on_insert(mut self, table: TableName) -> Self {
        self.panic_on.insert(table);
        self
    }

    pub fn calls(&self) -> Vec<WriterCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Row counts of every insert call into `table`, failed ones included.
    pub fn inserts(&self, table: TableName) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                WriterCall::BulkInsert { table: t, rows } if t == table => Some(rows),
                _ => None,
            })
            .collect()
    }

    /// Names of the constraints attempted on `table`, in order.
    pub fn foreign_keys(&self, table: TableName) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                WriterCall::InstallForeignKey { table: t, name } if t == table => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn stored(&self, table: TableName) -> usize {
        self.stored
            .lock()
            .unwrap()
            .get(&table)
            .map_or(0, Vec::len)
    }

    /// `id` of every stored row of `table`, in the order rows were written.
    pub fn stored_ids(&self, table: TableName) -> Vec<SqlValue> {
        self.stored
            .lock()
            .unwrap()
            .get(&table)
            .into_iter()
            .flatten()
            .filter_map(|row| row.get("id").cloned())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TargetWriter for RecordingWriter {
    async fn bulk_insert(&self, table: TableName, rows: Vec<Row>) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        if self.panic_on.contains(&table) {
            panic!("writer exploded on {}", table);
        }

        let nth = {
            let mut counts = self.insert_counts.lock().unwrap();
            let n = counts.entry(table).or_insert(0);
            *n += 1;
            *n - 1
        };
        self.calls.lock().unwrap().push(WriterCall::BulkInsert {
            table,
            rows: rows.len(),
        });

        if self.fail_inserts.contains(&(table, nth)) {
            return Err(EtlError::load(table, "duplicate key value violates unique constraint"));
        }

        let written = rows.len() as u64;
        self.stored
            .lock()
            .unwrap()
            .entry(table)
            .or_default()
            .extend(rows);
        Ok(written)
    }

    async fn install_foreign_key(&self, fk: &ForeignKeySpec) -> Result<()> {
        self.calls.lock().unwrap().push(WriterCall::InstallForeignKey {
            table: fk.table,
            name: fk.name.clone(),
        });

        let stored = self.stored.lock().unwrap();
        let referenced: Vec<&SqlValue> = stored
            .get(&fk.references)
            .into_iter()
            .flatten()
            .filter_map(|row| row.get("id"))
            .collect();
        let dangling = stored
            .get(&fk.table)
            .into_iter()
            .flatten()
            .filter_map(|row| row.get(fk.column))
            .find(|value| !referenced.contains(value));

        match dangling {
            Some(value) => Err(EtlError::Constraint {
                table: fk.table,
                constraint: fk.name.clone(),
                message: format!(
                    "Key ({})=({:?}) is not present in table \"{}\"",
                    fk.column, value, fk.references
                ),
            }),
            None => Ok(()),
        }
    }

    async fn row_count(&self, table: TableName) -> Result<i64> {
        Ok(self.stored(table) as i64)
    }

    async fn ping(&self) -> Result<()> {
        if self.is_closed() {
            return Err(EtlError::connection("target", "pool is closed"));
        }
        Ok(())
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Builders for valid raw source rows.
pub mod raw {
    use uuid::Uuid;

    use crate::source::{RawRow, RawValue};

    const CREATED: &str = "2021-06-16 20:14:09.221855+00";

    fn row(pairs: Vec<(&str, RawValue)>) -> RawRow {
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    fn id(value: Uuid) -> RawValue {
        RawValue::Text(value.to_string())
    }

    pub fn film_work(uuid: Uuid) -> RawRow {
        row(vec![
            ("id", id(uuid)),
            ("title", "Star Bugs".into()),
            ("description", "A film about bugs in space".into()),
            ("creation_date", RawValue::Null),
            ("certificate", RawValue::Null),
            ("file_path", RawValue::Null),
            ("rating", 8.5.into()),
            ("type", "movie".into()),
            ("subscription_required", 0i64.into()),
            ("created_at", CREATED.into()),
            ("updated_at", CREATED.into()),
        ])
    }

    pub fn genre(uuid: Uuid) -> RawRow {
        row(vec![
            ("id", id(uuid)),
            ("name", "Sci-Fi".into()),
            ("description", RawValue::Null),
            ("created_at", CREATED.into()),
            ("updated_at", CREATED.into()),
        ])
    }

    pub fn person(uuid: Uuid) -> RawRow {
        row(vec![
            ("id", id(uuid)),
            ("full_name", "Ada Lovelace".into()),
            ("birth_date", RawValue::Null),
            ("created_at", CREATED.into()),
            ("updated_at", CREATED.into()),
        ])
    }

    pub fn genre_film_work(film_work: Uuid, genre: Uuid) -> RawRow {
        row(vec![
            ("id", id(Uuid::new_v4())),
            ("film_work_id", id(film_work)),
            ("genre_id", id(genre)),
            ("created_at", CREATED.into()),
        ])
    }

    pub fn person_film_work(film_work: Uuid, person: Uuid) -> RawRow {
        row(vec![
            ("id", id(Uuid::new_v4())),
            ("film_work_id", id(film_work)),
            ("person_id", id(person)),
            ("role", "actor".into()),
            ("created_at", CREATED.into()),
        ])
    }
}
