//! Structured error types and source provenance for data operations.
//!
//! Per-record problems never surface here: the normalizer drops bad records
//! and the API adapter retries transient failures. Only terminal outcomes
//! become a `DataError`, and every one of them leaves the pipeline's current
//! Dataset and cache snapshot exactly as they were.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// A single failed fetch attempt.
///
/// Attempt errors are retried; only the last one is kept and surfaced inside
/// [`DataError::Fetch`] once the retry budget is spent.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AttemptError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status}")]
    Status { status: u16 },

    #[error("malformed response body: {0}")]
    Body(String),
}

/// Structured error types for data operations.
///
/// These are designed to be displayable in CLI output without extra context.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unexpected response format: {0}")]
    Format(String),

    #[error("fetch failed after {attempts} attempt(s): {last}")]
    Fetch { attempts: u32, last: AttemptError },

    #[error("fetch cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("I/O error reading {path}: {reason}")]
    Io { path: PathBuf, reason: String },
}

impl DataError {
    pub(crate) fn source_missing(path: &std::path::Path) -> Self {
        DataError::NotFound(format!("source file {}", path.display()))
    }

    pub(crate) fn column_missing(path: &std::path::Path, column: &str) -> Self {
        DataError::NotFound(format!("column '{column}' in {}", path.display()))
    }
}

/// Where the current Dataset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    CsvImport,
    Api,
    Cache,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::CsvImport => "csv_import",
            DataSource::Api => "api",
            DataSource::Cache => "cache",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn fetch_error_mentions_last_failure() {
        let err = DataError::Fetch {
            attempts: 3,
            last: AttemptError::Status { status: 503 },
        };
        assert_eq!(err.to_string(), "fetch failed after 3 attempt(s): HTTP 503");
    }

    #[test]
    fn missing_column_names_the_column() {
        let err = DataError::column_missing(Path::new("prices.csv"), "price");
        assert!(matches!(err, DataError::NotFound(_)));
        assert!(err.to_string().contains("'price'"));
    }
}
