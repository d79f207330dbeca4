use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors that can occur while loading a dataset.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("no csv files found in {0}")]
    NoFiles(PathBuf),

    #[error("no data rows found in {0}")]
    NoRows(PathBuf),

    #[error("{path} has no `{column}` column")]
    MissingColumn { path: PathBuf, column: String },

    #[error("{path} has feature columns {found:?}, expected {expected:?}")]
    HeaderMismatch {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("{path}:{line}: column `{column}` holds non-numeric value `{value}`")]
    ParseValue {
        path: PathBuf,
        line: u64,
        column: String,
        value: String,
    },

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}
