//! Domain error types.
//!
//! `DataError` is fatal and raised while loading a dataset or initializing a
//! view. `SelectionError` is raised by the selection merge and is clamped by
//! the reactive view rather than propagated.

use polars::prelude::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading a table or binding a view to it.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read dataset {0}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("malformed delimited data in {0}: {1}")]
    Csv(PathBuf, PolarsError),
    #[error("table \"{0}\" has no rows")]
    EmptyTable(String),
    #[error("no table named \"{0}\" is loaded")]
    UnknownTable(String),
    #[error("table \"{table}\" has no column \"{column}\"")]
    MissingColumn { table: String, column: String },
    #[error("dataframe query failed: {0}")]
    Polars(#[from] PolarsError),
}

/// Errors raised when a selection does not match the declared controls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("unknown filter dimension \"{0}\"")]
    UnknownDimension(String),
    #[error("\"{value}\" is not an option of dimension \"{dimension}\"")]
    InvalidValue { dimension: String, value: String },
}
