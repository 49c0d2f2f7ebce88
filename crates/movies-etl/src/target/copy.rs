//! PostgreSQL `COPY ... FROM STDIN` text format encoding.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::SecondsFormat;

use crate::core::{Row, SqlValue, TableName};
use crate::error::{EtlError, Result};

/// Characters that turn into control sequences after a backslash.
const SPECIAL_AFTER_BACKSLASH: &str = "bfnrtvx01234567";

/// Encodes rows as COPY text with a configurable delimiter and NULL sentinel.
#[derive(Debug, Clone)]
pub struct CopyEncoder {
    delimiter: char,
    null: String,
}

impl CopyEncoder {
    /// The delimiter and sentinel are assumed valid for the text format.
    pub fn new(delimiter: char, null: impl Into<String>) -> Self {
        Self {
            delimiter,
            null: null.into(),
        }
    }

    /// The `COPY` statement matching this encoder's options.
    pub fn statement(&self, qualified_table: &str, columns: &[&str]) -> String {
        let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT text, DELIMITER '{}', NULL '{}')",
            qualified_table,
            cols.join(", "),
            escape_literal(&self.delimiter.to_string()),
            escape_literal(&self.null)
        )
    }

    /// Encode every row. The column set is taken from the first row and every
    /// other row must match it.
    pub fn encode<'a>(&self, table: TableName, rows: &'a [Row]) -> Result<(Vec<&'a str>, Bytes)> {
        let Some(first) = rows.first() else {
            return Ok((Vec::new(), Bytes::new()));
        };
        let columns: Vec<&str> = first.columns().collect();

        let mut buf = BytesMut::with_capacity(rows.len() * 256);
        for (idx, row) in rows.iter().enumerate() {
            if !row.same_shape(first) {
                return Err(EtlError::load(
                    table,
                    format!("row {} does not match the columns of the first row", idx),
                ));
            }
            self.encode_row(row, &mut buf);
        }

        Ok((columns, buf.freeze()))
    }

    fn encode_row(&self, row: &Row, buf: &mut BytesMut) {
        let mut field = String::new();
        for (i, value) in row.values().enumerate() {
            if i > 0 {
                let mut tmp = [0u8; 4];
                buf.put_slice(self.delimiter.encode_utf8(&mut tmp).as_bytes());
            }
            field.clear();
            self.encode_value(value, &mut field);
            buf.put_slice(field.as_bytes());
        }
        buf.put_u8(b'\n');
    }

    /// Render one value into `out`.
    pub fn encode_value(&self, value: &SqlValue, out: &mut String) {
        let rendered = match value {
            SqlValue::Null => {
                out.push_str(&self.null);
                return;
            }
            SqlValue::Bool(b) => String::from(if *b { "t" } else { "f" }),
            SqlValue::F64(f) => format_float(*f),
            SqlValue::Text(s) => s.clone(),
            SqlValue::Uuid(u) => u.hyphenated().to_string(),
            SqlValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            SqlValue::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        };

        let escaped = self.escape(&rendered);
        if escaped == self.null {
            out.push_str(&self.disguise_sentinel(&escaped));
        } else {
            out.push_str(&escaped);
        }
    }

    /// Backslash-escape a field value.
    fn escape(&self, s: &str) -> String {
        let mut result = String::with_capacity(s.len());
        for c in s.chars() {
            match c {
                '\\' => result.push_str("\\\\"),
                '\t' => result.push_str("\\t"),
                '\n' => result.push_str("\\n"),
                '\r' => result.push_str("\\r"),
                c if c == self.delimiter => {
                    result.push('\\');
                    result.push(c);
                }
                _ => result.push(c),
            }
        }
        result
    }

    /// Re-encode a value whose escaped form equals the NULL sentinel, so the
    /// server reads it back as that text rather than as NULL.
    ///
    /// The sentinel is matched before backslash processing, so escaping any
    /// one character is enough.
    fn disguise_sentinel(&self, s: &str) -> String {
        let mut out = String::with_capacity(s.len() + 4);
        let mut done = false;
        for c in s.chars() {
            if !done && c != '\\' && !SPECIAL_AFTER_BACKSLASH.contains(c) {
                out.push('\\');
                done = true;
            }
            out.push(c);
        }
        if done {
            return out;
        }

        // Every character is special after a backslash: write the first one
        // as an octal byte instead.
        let mut chars = s.chars();
        match chars.next() {
            Some(first) if first.is_ascii() => {
                format!("\\{:03o}{}", first as u32, chars.as_str())
            }
            _ => s.to_string(),
        }
    }
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        f.to_string()
    }
}

/// Quote a PostgreSQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Qualify a table name with schema.
pub fn qualify_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Escape a string for SQL literal use.
fn escape_literal(s: &str) -> String {
    s.replace('\'', "''")
}
