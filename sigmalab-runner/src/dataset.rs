//! Rebuild a [`DataTable`] from a dataset snapshot.
//!
//! Order of preference:
//! 1. The referenced CSV file (the full upload)
//! 2. The stored preview rows
//! 3. An empty table
//!
//! When a run falls back to a preview that is shorter than the dataset, the
//! truncation is reported as a warning on the result.

use std::fs::File;
use std::path::{Path, PathBuf};

use sigmalab_core::{DataTable, TableError};
use tracing::{debug, warn};

use crate::collaborators::DatasetSnapshot;
use crate::config::DatasetConfig;

/// Where the reconstructed rows came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSource {
    File(PathBuf),
    Preview { rows: usize, total: usize },
    Empty,
}

#[derive(Debug, Clone)]
pub struct Reconstructed {
    pub table: DataTable,
    pub source: TableSource,
    pub warnings: Vec<String>,
}

impl Reconstructed {
    fn empty() -> Self {
        Self {
            table: DataTable::empty(),
            source: TableSource::Empty,
            warnings: Vec::new(),
        }
    }
}

pub fn read_csv_file(path: &Path) -> Result<DataTable, TableError> {
    let file = File::open(path)?;
    DataTable::from_csv_reader(file)
}

/// Reconstruct the table for a run. Never fails: unreadable sources are
/// logged and skipped.
pub fn reconstruct_table(snapshot: Option<&DatasetSnapshot>, config: &DatasetConfig) -> Reconstructed {
    let Some(snapshot) = snapshot else {
        return Reconstructed::empty();
    };

    if config.prefer_file {
        from_file(snapshot)
            .or_else(|| from_preview(snapshot, config))
            .unwrap_or_else(Reconstructed::empty)
    } else {
        from_preview(snapshot, config)
            .or_else(|| from_file(snapshot))
            .unwrap_or_else(Reconstructed::empty)
    }
}

fn from_file(snapshot: &DatasetSnapshot) -> Option<Reconstructed> {
    let path = snapshot.file_reference.as_ref()?;
    match read_csv_file(path) {
        Ok(table) => {
            debug!(dataset = %snapshot.id, path = %path.display(), rows = table.n_rows(), "loaded dataset file");
            Some(Reconstructed {
                table,
                source: TableSource::File(path.clone()),
                warnings: Vec::new(),
            })
        }
        Err(e) => {
            warn!(dataset = %snapshot.id, path = %path.display(), error = %e, "dataset file unreadable, trying preview");
            None
        }
    }
}

fn from_preview(snapshot: &DatasetSnapshot, config: &DatasetConfig) -> Option<Reconstructed> {
    let preview = snapshot.preview_rows.as_deref().filter(|rows| !rows.is_empty())?;
    let take = config
        .max_preview_rows
        .map_or(preview.len(), |cap| cap.min(preview.len()));
    let table = DataTable::from_json_rows(&preview[..take]);
    let rows = table.n_rows();
    let total = snapshot.row_count.max(rows);

    let mut warnings = Vec::new();
    if total > rows {
        warn!(dataset = %snapshot.id, rows, total, "running on preview sample");
        warnings.push(format!(
            "Analysis ran on a preview sample of {rows} of {total} rows"
        ));
    }
    Some(Reconstructed {
        table,
        source: TableSource::Preview { rows, total },
        warnings,
    })
}
