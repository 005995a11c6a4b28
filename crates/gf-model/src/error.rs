//! Error types for model training and inference

use gf_features::FeatureError;
use thiserror::Error;

/// Model error types
#[derive(Error, Debug)]
pub enum ModelError {
    /// Saved model directory or file missing
    #[error("Model not found: {path}")]
    ModelNotFound { path: String },

    /// Saved model exists but cannot be used
    #[error("Failed to load model: {reason}")]
    ModelLoadFailed { reason: String },

    /// Invalid input shape
    #[error("Invalid input shape: expected {expected}, got {got}")]
    InvalidInputShape { expected: String, got: String },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Empty dataset where data is required
    #[error("Empty dataset: {0}")]
    EmptyDataset(&'static str),

    /// Loss became NaN or infinite
    #[error("Training diverged at epoch {epoch}: loss {loss}")]
    Diverged { epoch: usize, loss: f32 },

    /// Feature pipeline error
    #[error(transparent)]
    Feature(#[from] FeatureError),

    /// Candle tensor error
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;
