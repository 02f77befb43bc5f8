use std::{
    collections::BTreeSet,
    fs::File,
    io,
    path::Path,
    sync::Arc,
};

use tracing::info;

use crate::{
    error::DatasetLoadError,
    records::{SalesRecord, SALES_COLUMNS},
};

/// The chart server's read-only copy of the pipeline output.
///
/// Cloning shares the underlying rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    records: Arc<[SalesRecord]>,
}

impl Dataset {
    pub fn new(records: Vec<SalesRecord>) -> Self {
        Self {
            records: records.into(),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DatasetLoadError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => DatasetLoadError::NotFound {
                path: path.to_path_buf(),
            },
            _ => DatasetLoadError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;
        let mut rdr = csv::Reader::from_reader(file);

        let malformed = |err: csv::Error| DatasetLoadError::Malformed {
            path: path.to_path_buf(),
            line: err.position().map(|p| p.line()).unwrap_or_default(),
            reason: err.to_string(),
        };

        let trimmed: csv::StringRecord = rdr
            .headers()
            .map_err(malformed)?
            .iter()
            .map(str::trim)
            .collect();
        rdr.set_headers(trimmed.clone());

        let headers: BTreeSet<&str> = trimmed.iter().collect();
        let missing: Vec<String> = SALES_COLUMNS
            .iter()
            .filter(|c| !headers.contains(**c))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(DatasetLoadError::MissingColumns {
                path: path.to_path_buf(),
                columns: missing,
            });
        }

        let records = rdr
            .deserialize::<SalesRecord>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(malformed)?;
        info!(path = %path.display(), rows = records.len(), "dataset loaded");

        Ok(Self::new(records))
    }

    pub fn records(&self) -> &[SalesRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct lower-cased region values, sorted.
    pub fn regions(&self) -> BTreeSet<String> {
        self.records.iter().map(|r| r.region.to_lowercase()).collect()
    }
}
