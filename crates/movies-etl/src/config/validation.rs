//! Configuration validation.

use super::Config;
use crate::error::{EtlError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.source.path.as_os_str().is_empty() {
        return Err(EtlError::Config("source.path is required".into()));
    }

    // Target validation
    if config.target.dsn.trim().is_empty() {
        return Err(EtlError::Config("target.dsn is required".into()));
    }
    if config.target.schema.is_empty() {
        return Err(EtlError::Config("target.schema is required".into()));
    }
    if config.target.min_pool_size == 0 {
        return Err(EtlError::Config(
            "target.min_pool_size must be at least 1".into(),
        ));
    }
    if config.target.min_pool_size > config.target.max_pool_size {
        return Err(EtlError::Config(format!(
            "target.min_pool_size ({}) must not exceed target.max_pool_size ({})",
            config.target.min_pool_size, config.target.max_pool_size
        )));
    }

    // Pipeline validation
    let etl = &config.etl;
    if etl.chunk_size == 0 {
        return Err(EtlError::Config("etl.chunk_size must be at least 1".into()));
    }
    if etl.read_ahead == 0 {
        return Err(EtlError::Config("etl.read_ahead must be at least 1".into()));
    }

    let mut chars = etl.delimiter.chars();
    let delimiter = match (chars.next(), chars.next()) {
        (Some(c), None) => c,
        _ => {
            return Err(EtlError::Config(format!(
                "etl.delimiter must be a single character, got {:?}",
                etl.delimiter
            )))
        }
    };
    if !delimiter.is_ascii() {
        return Err(EtlError::Config(format!(
            "etl.delimiter must be a single-byte character, got {:?}",
            delimiter
        )));
    }
    if matches!(delimiter, '\\' | '\n' | '\r' | '.' | 'a'..='z' | '0'..='9') {
        return Err(EtlError::Config(format!(
            "etl.delimiter cannot be {:?}",
            delimiter
        )));
    }

    if etl.null_value.is_empty() {
        return Err(EtlError::Config("etl.null_value must not be empty".into()));
    }
    if etl.null_value.contains(['\n', '\r']) {
        return Err(EtlError::Config(
            "etl.null_value must not contain a line break".into(),
        ));
    }
    if etl.null_value.contains(delimiter) {
        return Err(EtlError::Config(format!(
            "etl.null_value {:?} must not contain the delimiter {:?}",
            etl.null_value, delimiter
        )));
    }

    Ok(())
}
