//! Error types for the credit scoring engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, KolosalError>;

/// Main error type for training, persistence and scoring
#[derive(Error, Debug)]
pub enum KolosalError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Preprocessing error: {0}")]
    PreprocessingError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    /// Input columns do not match the schema the model was fitted with
    #[error("Schema mismatch: missing columns [{}], unexpected columns [{}]", missing.join(", "), unexpected.join(", "))]
    SchemaMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("Model artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Model artifact is corrupt: {0}")]
    ArtifactCorrupt(String),

    #[error("Model not fitted")]
    NotFitted,

    #[error("Model already fitted, create a new instance to retrain")]
    AlreadyFitted,

    /// No trial of a hyperparameter search produced a usable score
    #[error("Search space exhausted for {learner}: no valid trial in {n_trials} trials")]
    SearchSpaceExhausted { learner: String, n_trials: usize },

    /// Raised from inside an objective to abandon an unpromising trial
    #[error("Trial pruned at step {step}")]
    TrialPruned { step: usize },

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<polars::error::PolarsError> for KolosalError {
    fn from(err: polars::error::PolarsError) -> Self {
        KolosalError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for KolosalError {
    fn from(err: serde_json::Error) -> Self {
        KolosalError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for KolosalError {
    fn from(err: bincode::Error) -> Self {
        KolosalError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for KolosalError {
    fn from(err: ndarray::ShapeError) -> Self {
        KolosalError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
