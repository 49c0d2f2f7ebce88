//! Error types for the ETL library.

use thiserror::Error;

use crate::core::TableName;

/// Main error type for ETL operations.
#[derive(Error, Debug)]
pub enum EtlError {
    /// Configuration error (invalid YAML, missing fields, bad pool bounds, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source or target store unreachable at open time.
    #[error("Cannot connect to {store}: {message}")]
    Connection {
        store: &'static str,
        message: String,
    },

    /// A single page read from the source failed.
    #[error("Read failed for table {table}: {message}")]
    Read { table: TableName, message: String },

    /// A source row could not be shaped into a record.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A bulk insert into the target failed.
    #[error("Load failed for table {table}: {message}")]
    Load { table: TableName, message: String },

    /// Installing a foreign key constraint failed.
    #[error("Constraint {constraint} on {table} failed: {message}")]
    Constraint {
        table: TableName,
        constraint: String,
        message: String,
    },

    /// A table pipeline stopped on an unrecoverable error.
    #[error("Pipeline for table {table} failed: {source}")]
    Pipeline {
        table: TableName,
        #[source]
        source: Box<EtlError>,
    },

    /// A spawned task panicked or was cancelled.
    #[error("Task failed: {0}")]
    Task(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EtlError {
    /// Create a Connection error.
    pub fn connection(store: &'static str, message: impl ToString) -> Self {
        EtlError::Connection {
            store,
            message: message.to_string(),
        }
    }

    /// Create a Read error.
    pub fn read(table: TableName, message: impl ToString) -> Self {
        EtlError::Read {
            table,
            message: message.to_string(),
        }
    }

    /// Create a Load error.
    pub fn load(table: TableName, message: impl ToString) -> Self {
        EtlError::Load {
            table,
            message: message.to_string(),
        }
    }

    /// Wrap a table-fatal error for run-level reporting.
    pub fn pipeline(table: TableName, source: EtlError) -> Self {
        EtlError::Pipeline {
            table,
            source: Box::new(source),
        }
    }

    /// Process exit code used by the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            EtlError::Config(_) | EtlError::Yaml(_) => 1,
            EtlError::Connection { .. } => 2,
            EtlError::Read { .. } => 3,
            EtlError::Load { .. } => 4,
            EtlError::Constraint { .. } => 5,
            EtlError::Validation(_) | EtlError::Pipeline { .. } | EtlError::Task(_) => 6,
            EtlError::Io(_) => 7,
            EtlError::Json(_) => 8,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// What was wrong with a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationKind {
    /// Column absent from the source row.
    Missing,
    /// Column present but NULL where a value is required.
    Null,
    /// Value has the wrong primitive type.
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    /// Value has the right type but cannot be parsed.
    Invalid { expected: &'static str, value: String },
}

impl std::fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationKind::Missing => write!(f, "required field is missing"),
            ValidationKind::Null => write!(f, "required field is null"),
            ValidationKind::TypeMismatch { expected, found } => {
                write!(f, "expected {}, found {}", expected, found)
            }
            ValidationKind::Invalid { expected, value } => {
                write!(f, "expected {}, got {:?}", expected, value)
            }
        }
    }
}

/// A source row failed schema shaping.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Validation failed for {table}.{field}: {kind}")]
pub struct ValidationError {
    pub table: TableName,
    pub field: &'static str,
    pub kind: ValidationKind,
}

/// Result type alias for ETL operations.
pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_names_field_and_constraint() {
        let err = ValidationError {
            table: TableName::FilmWork,
            field: "title",
            kind: ValidationKind::Missing,
        };
        let msg = err.to_string();
        assert!(msg.contains("film_work.title"));
        assert!(msg.contains("missing"));
    }

    #[test]
    fn test_pipeline_error_keeps_source_chain() {
        let err = EtlError::pipeline(
            TableName::Genre,
            EtlError::read(TableName::Genre, "disk I/O error"),
        );
        let detailed = err.format_detailed();
        assert!(detailed.contains("Pipeline for table genre failed"));
        assert!(detailed.contains("Caused by:"));
        assert!(detailed.contains("disk I/O error"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(EtlError::Config("x".into()).exit_code(), 1);
        assert_eq!(EtlError::connection("source", "x").exit_code(), 2);
        assert_eq!(EtlError::load(TableName::Person, "x").exit_code(), 4);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(EtlError::from(io).exit_code(), 7);
    }
}
