//! Core types shared by every stage of the pipeline.
//!
//! - [`table`]: the closed set of tables and their foreign keys
//! - [`value`]: typed column values and rows handed to the writer

pub mod table;
pub mod value;

pub use table::{constraint_name, foreign_key_plan, ForeignKeySpec, OnDelete, TableName};
pub use value::{Row, SqlValue};
