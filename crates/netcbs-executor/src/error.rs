//! Error types for network query execution.

use std::fmt;
use std::path::PathBuf;

use arrow_schema::ArrowError;
use netcbs_query::{Context, QueryError};
use polars::prelude::PolarsError;
use thiserror::Error;

/// Which table a schema problem was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRole {
    /// The ego population.
    Sample,
    /// The alter characteristics table.
    Characteristics,
    /// A frame built during execution.
    Intermediate,
}

impl fmt::Display for FrameRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameRole::Sample => write!(f, "sample"),
            FrameRole::Characteristics => write!(f, "characteristics"),
            FrameRole::Intermediate => write!(f, "intermediate"),
        }
    }
}

/// Errors that can occur while validating or executing a network query.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// The query string failed to parse or validate.
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// A required column is missing or has the wrong contents.
    #[error("schema error in {frame} frame, column '{column}': {reason}")]
    Schema {
        /// Frame the column belongs to.
        frame: FrameRole,
        /// The offending column.
        column: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An aggregation function outside the supported set was requested.
    #[error("unsupported aggregation function '{name}'; supported: avg, mean, sum, count, min, max, stddev_samp")]
    UnsupportedAggregationFunction {
        /// The rejected name.
        name: String,
    },

    /// No aggregation function was requested.
    #[error("no aggregation functions requested; supported: avg, mean, sum, count, min, max, stddev_samp")]
    NoAggregationFunctions,

    /// A file format other than `csv` or `parquet` was requested.
    #[error("unsupported file format '{format}'; expected 'csv' or 'parquet'")]
    UnsupportedFileFormat {
        /// The rejected format.
        format: String,
    },

    /// No versioned relationship file exists for a context and year.
    #[error("no {context} network file for year {year} in {}", directory.display())]
    RelationFileNotFound {
        /// Context of the hop.
        context: Context,
        /// Requested data year.
        year: i32,
        /// Directory that was searched.
        directory: PathBuf,
    },

    /// A relationship file could not be read.
    #[error("failed to read relationship file {}: {message}", path.display())]
    RelationRead {
        /// The file being read.
        path: PathBuf,
        /// Underlying error.
        message: String,
    },

    /// A table could not be built or converted.
    #[error("invalid frame: {0}")]
    Frame(String),

    /// A join, filter or aggregation failed inside polars.
    #[error("table operation failed: {0}")]
    Polars(#[from] PolarsError),

    /// An Arrow record batch could not be built.
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// I/O error outside of relation reading.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NetworkError {
    pub(crate) fn schema(
        frame: FrameRole,
        column: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        NetworkError::Schema {
            frame,
            column: column.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn read(path: impl Into<PathBuf>, err: impl fmt::Display) -> Self {
        NetworkError::RelationRead {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Result type for network execution operations.
pub type NetworkResult<T> = std::result::Result<T, NetworkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_schema() {
        let err = NetworkError::schema(FrameRole::Sample, "RINPERSOON", "column is missing");
        assert_eq!(
            err.to_string(),
            "schema error in sample frame, column 'RINPERSOON': column is missing"
        );
    }

    #[test]
    fn test_error_display_not_found() {
        let err = NetworkError::RelationFileNotFound {
            context: Context::Family,
            year: 2021,
            directory: PathBuf::from("data/FAMILIENETWERKTAB"),
        };
        assert_eq!(
            err.to_string(),
            "no Family network file for year 2021 in data/FAMILIENETWERKTAB"
        );
    }

    #[test]
    fn test_error_display_unsupported_function() {
        let err = NetworkError::UnsupportedAggregationFunction {
            name: "median".to_string(),
        };
        assert!(err.to_string().starts_with("unsupported aggregation function 'median'"));
    }

    #[test]
    fn test_error_display_no_functions() {
        let err = NetworkError::NoAggregationFunctions;
        assert!(err.to_string().starts_with("no aggregation functions requested"));
    }

    #[test]
    fn test_error_from_query_error() {
        let err: NetworkError = QueryError::EmptyQuery.into();
        assert!(matches!(err, NetworkError::Query(QueryError::EmptyQuery)));
    }
}
