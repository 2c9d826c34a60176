//! CSV file ingestion adapter.
//!
//! Reads a headered CSV with at least `timestamp` and `price` columns, feeds
//! every row through the normalizer and hands the batch to the cleaner.
//! Local I/O failures are terminal; there is no retry.

use super::clean::{clean, CleanReport};
use super::normalize::{normalize_record, RawPoint};
use super::provider::DataError;
use super::schema::Dataset;
use serde_json::{Map, Value};
use std::fs::File;
use std::path::Path;
use tracing::{info, warn};

/// Columns a source file must carry.
pub const REQUIRED_COLUMNS: [&str; 2] = ["timestamp", "price"];

/// Raw rows read from a file, before cleaning.
#[derive(Debug, Default)]
pub struct FileBatch {
    pub points: Vec<RawPoint>,
    pub rows: usize,
    pub dropped: usize,
}

/// Read a CSV file into normalized points.
pub fn read_csv(path: &Path) -> Result<FileBatch, DataError> {
    if !path.is_file() {
        return Err(DataError::source_missing(path));
    }
    let io_err = |reason: String| DataError::Io {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|e| io_err(e.to_string()))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| io_err(format!("read header: {e}")))?
        .clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(DataError::column_missing(path, column));
        }
    }

    let mut batch = FileBatch::default();
    for result in reader.records() {
        batch.rows += 1;
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                if let csv::ErrorKind::Io(io) = e.kind() {
                    return Err(io_err(io.to_string()));
                }
                batch.dropped += 1;
                continue;
            }
        };

        let record: Map<String, Value> = headers
            .iter()
            .zip(row.iter())
            .map(|(h, cell)| (h.to_string(), Value::String(cell.to_string())))
            .collect();
        match normalize_record(&record) {
            Some(point) => batch.points.push(point),
            None => batch.dropped += 1,
        }
    }

    if batch.dropped > 0 {
        warn!(
            path = %path.display(),
            dropped = batch.dropped,
            rows = batch.rows,
            "dropped unusable rows"
        );
    }
    Ok(batch)
}

/// Read and clean a CSV file into a Dataset.
pub fn ingest_csv(path: &Path) -> Result<(Dataset, CleanReport), DataError> {
    let batch = read_csv(path)?;
    let (dataset, report) = clean(&batch.points)?;
    info!(path = %path.display(), rows = batch.rows, points = dataset.len(), "ingested CSV");
    Ok((dataset, report))
}
