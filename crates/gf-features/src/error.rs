//! Error types for feature processing

use thiserror::Error;

/// Feature processing error types
#[derive(Error, Debug)]
pub enum FeatureError {
    /// Input file not found
    #[error("Input not found: {path}")]
    InputNotFound { path: String },

    /// CSV reader failure
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// Malformed table header
    #[error("Malformed header in {path}: {reason}")]
    MalformedHeader { path: String, reason: String },

    /// Malformed data row
    #[error("Malformed row in {path} at line {line}: {reason}")]
    MalformedRow {
        path: String,
        line: u64,
        reason: String,
    },

    /// Declared family absent from the table
    #[error("Feature family '{family}' not present in table")]
    MissingFamily { family: String },

    /// Sub-indices found do not match the declared channel count
    #[error("Feature family '{family}': schema declares {expected} channels, table has {found:?}")]
    ChannelCountMismatch {
        family: String,
        expected: usize,
        found: Vec<String>,
    },

    /// A channel lacks one of the schema statistics
    #[error("Channel '{channel}' is missing statistic '{statistic}'")]
    MissingStatistic { channel: String, statistic: String },

    /// A channel carries the same statistic more than once
    #[error("Channel '{channel}' has duplicate statistic '{statistic}'")]
    DuplicateStatistic { channel: String, statistic: String },

    /// Schema itself is inconsistent
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Shape disagreement between inputs
    #[error("Shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },

    /// Scaler cannot be fitted
    #[error("Scaler error: {0}")]
    Scaler(String),

    /// Label not known to the encoder
    #[error("Unknown label: '{0}'")]
    UnknownLabel(String),

    /// Class id outside the encoder range
    #[error("Unknown class id: {0}")]
    UnknownClassId(u32),

    /// Feature rows without a label
    #[error("No label for track '{0}'")]
    MissingLabel(String),

    /// Track listed more than once in a label file
    #[error("Duplicate label for track '{0}'")]
    DuplicateTrackId(String),

    /// Stratified split cannot be performed
    #[error("Invalid split: {0}")]
    InvalidSplit(String),

    /// JSON (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for feature operations
pub type FeatureResult<T> = Result<T, FeatureError>;
