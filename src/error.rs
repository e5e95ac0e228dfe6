//! Error types for the cyclecast harness

use thiserror::Error;

/// Result type alias for cyclecast operations
pub type Result<T> = std::result::Result<T, CyclecastError>;

/// Main error type for the cyclecast harness
#[derive(Error, Debug)]
pub enum CyclecastError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("No results: run() must complete before save()")]
    NoResults,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<polars::error::PolarsError> for CyclecastError {
    fn from(err: polars::error::PolarsError) -> Self {
        CyclecastError::DataError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for CyclecastError {
    fn from(err: ndarray::ShapeError) -> Self {
        CyclecastError::ComputationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CyclecastError::DataError("bad column".to_string());
        assert_eq!(err.to_string(), "Data error: bad column");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CyclecastError = io_err.into();
        assert!(matches!(err, CyclecastError::IoError(_)));
    }

    #[test]
    fn test_no_results_display() {
        assert!(CyclecastError::NoResults.to_string().contains("run()"));
    }
}
