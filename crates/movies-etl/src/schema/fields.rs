//! Field extraction from raw source rows.
//!
//! Each parser turns one [`RawValue`] into a typed value or explains what was
//! wrong with it. [`Fields`] attaches the table and column names to failures.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::core::TableName;
use crate::error::{ValidationError, ValidationKind};
use crate::source::{RawRow, RawValue};

type Parsed<T> = std::result::Result<T, ValidationKind>;

/// Offset-aware timestamp layouts, tried in order after RFC 3339.
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];

/// Timestamp layouts without an offset, read as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Typed access to the columns of one source row.
pub struct Fields<'a> {
    table: TableName,
    row: &'a RawRow,
}

impl<'a> Fields<'a> {
    pub fn new(table: TableName, row: &'a RawRow) -> Self {
        Self { table, row }
    }

    /// Extract a field that must be present and non-null.
    pub fn required<T>(
        &self,
        field: &'static str,
        parse: fn(&RawValue) -> Parsed<T>,
    ) -> Result<T, ValidationError> {
        match self.row.get(field) {
            None => Err(self.error(field, ValidationKind::Missing)),
            Some(RawValue::Null) => Err(self.error(field, ValidationKind::Null)),
            Some(value) => parse(value).map_err(|kind| self.error(field, kind)),
        }
    }

    /// Extract a field that may be absent or null.
    pub fn optional<T>(
        &self,
        field: &'static str,
        parse: fn(&RawValue) -> Parsed<T>,
    ) -> Result<Option<T>, ValidationError> {
        match self.row.get(field) {
            None | Some(RawValue::Null) => Ok(None),
            Some(value) => parse(value)
                .map(Some)
                .map_err(|kind| self.error(field, kind)),
        }
    }

    /// True when the row has the column at all, null or not.
    pub fn has(&self, field: &str) -> bool {
        self.row.contains_key(field)
    }

    fn error(&self, field: &'static str, kind: ValidationKind) -> ValidationError {
        ValidationError {
            table: self.table,
            field,
            kind,
        }
    }
}

fn mismatch(expected: &'static str, value: &RawValue) -> ValidationKind {
    ValidationKind::TypeMismatch {
        expected,
        found: value.type_name(),
    }
}

fn invalid(expected: &'static str, value: impl Into<String>) -> ValidationKind {
    ValidationKind::Invalid {
        expected,
        value: value.into(),
    }
}

pub fn text(value: &RawValue) -> Parsed<String> {
    match value {
        RawValue::Text(s) => Ok(s.clone()),
        other => Err(mismatch("text", other)),
    }
}

/// Version 4 UUID from its text form or from 16 raw bytes.
pub fn uuid(value: &RawValue) -> Parsed<Uuid> {
    let parsed = match value {
        RawValue::Text(s) => Uuid::parse_str(s.trim()).map_err(|_| invalid("uuid", s.as_str())),
        RawValue::Blob(bytes) => {
            Uuid::from_slice(bytes).map_err(|_| invalid("uuid", format!("{} bytes", bytes.len())))
        }
        other => Err(mismatch("uuid", other)),
    }?;
    if parsed.get_version_num() != 4 {
        return Err(invalid("uuid v4", parsed.to_string()));
    }
    Ok(parsed)
}

pub fn timestamp(value: &RawValue) -> Parsed<DateTime<Utc>> {
    match value {
        RawValue::Text(s) => {
            parse_timestamp(s.trim()).ok_or_else(|| invalid("timestamp", s.as_str()))
        }
        RawValue::Integer(secs) => DateTime::from_timestamp(*secs, 0)
            .ok_or_else(|| invalid("timestamp", secs.to_string())),
        other => Err(mismatch("timestamp", other)),
    }
}

/// Calendar date; a full timestamp is truncated to its UTC date.
pub fn date(value: &RawValue) -> Parsed<NaiveDate> {
    match value {
        RawValue::Text(s) => {
            let s = s.trim();
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .or_else(|| parse_timestamp(s).map(|ts| ts.date_naive()))
                .ok_or_else(|| invalid("date", s))
        }
        other => Err(mismatch("date", other)),
    }
}

pub fn boolean(value: &RawValue) -> Parsed<bool> {
    match value {
        RawValue::Integer(0) => Ok(false),
        RawValue::Integer(1) => Ok(true),
        RawValue::Integer(n) => Err(invalid("bool", n.to_string())),
        RawValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "t" | "yes" => Ok(true),
            "0" | "false" | "f" | "no" => Ok(false),
            _ => Err(invalid("bool", s.as_str())),
        },
        other => Err(mismatch("bool", other)),
    }
}

pub fn float(value: &RawValue) -> Parsed<f64> {
    match value {
        RawValue::Real(f) => Ok(*f),
        RawValue::Integer(n) => Ok(*n as f64),
        RawValue::Text(s) => s.trim().parse().map_err(|_| invalid("float", s.as_str())),
        other => Err(mismatch("float", other)),
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(s, fmt) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}
