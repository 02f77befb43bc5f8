use std::{io, path::PathBuf};

use thiserror::Error;

/// Fatal conditions raised while turning raw extracts into the sales file.
///
/// Every variant is returned before the output file is touched.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no CSV files found in {}", dir.display())]
    NoInputData { dir: PathBuf },
    #[error("missing required columns: {}", columns.join(", "))]
    MissingColumns { columns: Vec<String> },
    #[error("no rows found for product '{product}'")]
    NoMatchingProduct { product: String },
    #[error("{}:{line}: cannot parse {column} value '{value}': {reason}", file.display())]
    TypeCoercion {
        file: PathBuf,
        line: u64,
        column: &'static str,
        value: String,
        reason: String,
    },
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Startup failures of the chart server while loading the sales file.
#[derive(Debug, Error)]
pub enum DatasetLoadError {
    #[error("dataset file not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("{}: missing required columns: {}", path.display(), columns.join(", "))]
    MissingColumns { path: PathBuf, columns: Vec<String> },
    #[error("{}:{line}: {reason}", path.display())]
    Malformed {
        path: PathBuf,
        line: u64,
        reason: String,
    },
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
