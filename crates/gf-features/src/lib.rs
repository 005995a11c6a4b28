//! # GenreForge feature pipeline
//!
//! Turns precomputed audio feature statistics into model-ready tensors:
//! - Feature / label CSV loading with hierarchical column keys
//! - Standardization per tensor `(channel, statistic)` slot
//! - Sorted, persistable genre label coding
//! - Schema-driven `(track, channel, statistic)` tensor building
//! - Stratified train / validation / test splits
//!
//! ## Pipeline
//!
//! ```text
//! X_train.csv ─► FeatureTable ─► ColumnPlan ─► Array3 ─► StandardScaler ─┐
//! y_train.csv ─► LabelTable ──► LabelEncoder ────────────────────► ids ──┴─► DatasetSplits
//! ```

pub mod labels;
pub mod scaler;
pub mod schema;
pub mod split;
pub mod table;
pub mod tensor;

mod error;

pub use error::{FeatureError, FeatureResult};
pub use labels::LabelEncoder;
pub use scaler::StandardScaler;
pub use schema::{ChannelId, FamilyKind, FeatureFamily, FeatureSchema, DEFAULT_STATISTICS};
pub use split::{stratified_split, Dataset, DatasetSplits, SplitConfig, SplitIndices};
pub use table::{ColumnKey, FeatureTable, LabelTable};
pub use tensor::{build_tensor, ColumnPlan};

/// Default input locations
pub mod paths {
    /// Training feature table
    pub const X_TRAIN: &str = "data/X_train.csv";

    /// Training labels
    pub const Y_TRAIN: &str = "data/y_train.csv";

    /// Unlabelled feature table
    pub const X_TEST: &str = "data/X_test.csv";
}

/// Scaled training data ready for splitting
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub dataset: Dataset,
    pub scaler: StandardScaler,
    pub encoder: LabelEncoder,
}

/// Tensorize, scale and encode a labelled table
pub fn prepare_training_data(
    schema: &FeatureSchema,
    features: &FeatureTable,
    labels: &LabelTable,
) -> FeatureResult<PreparedData> {
    // Validate before doing any work on the values
    let plan = ColumnPlan::resolve(schema, features.columns())?;

    let raw_labels = labels.aligned_to(features.track_ids())?;
    let encoder = LabelEncoder::fit(&raw_labels)?;
    let ids = encoder.transform(&raw_labels)?;

    let raw = plan.build(features.values())?;
    let (scaler, tensor) = StandardScaler::fit_transform_tensor(&raw)?;
    log::info!(
        "Prepared tensor {:?} with {} classes",
        tensor.dim(),
        encoder.num_classes()
    );

    Ok(PreparedData {
        dataset: Dataset::new(tensor, ids)?,
        scaler,
        encoder,
    })
}
