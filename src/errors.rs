use serde::Serialize;

/// Unified error type for the analytical engines and the agent boundary.
///
/// Data-shaped problems (empty filter results, missing optional columns)
/// are deliberately *not* errors: tools report them inline in their JSON
/// payloads so free-form agent input degrades gracefully.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Model not trained: {0}")]
    ModelNotTrained(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),
}

impl From<csv::Error> for ServiceError {
    fn from(err: csv::Error) -> Self {
        ServiceError::DataError(err.to_string())
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::DataError(err.to_string())
    }
}
