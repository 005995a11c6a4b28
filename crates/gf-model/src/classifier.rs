//! Trained classifier: weights plus everything needed to reuse them
//!
//! A model directory holds two files:
//! - `weights.safetensors`: network variables (including batch norm
//!   running statistics)
//! - `model.json`: feature schema, label classes, fitted scaler, network
//!   config and input shape
//!
//! Inference never re-derives the label coding or the scaling; both come
//! from `model.json`.

use std::fs;
use std::path::Path;

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use gf_features::{ColumnPlan, Dataset, FeatureSchema, FeatureTable, LabelEncoder, StandardScaler};
use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::config::{InputShape, ModelConfig};
use crate::error::{ModelError, ModelResult};
use crate::network::{features_to_tensor, GenreCnn};
use crate::trainer::{evaluate, Evaluation};

/// Weights file inside a model directory
pub const WEIGHTS_FILE: &str = "weights.safetensors";

/// Metadata file inside a model directory
pub const METADATA_FILE: &str = "model.json";

/// Current `model.json` layout
pub const FORMAT_VERSION: u32 = 1;

/// Batch size used for inference passes
const INFERENCE_BATCH: usize = 256;

/// Sidecar describing a saved model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub format_version: u32,
    pub input: InputShape,
    pub model: ModelConfig,
    pub schema: FeatureSchema,
    pub classes: LabelEncoder,
    pub scaler: StandardScaler,
}

impl ModelMetadata {
    pub fn new(model: ModelConfig, schema: FeatureSchema, classes: LabelEncoder, scaler: StandardScaler) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            input: InputShape::new(schema.channel_count(), schema.statistic_count()),
            model,
            schema,
            classes,
            scaler,
        }
    }

    fn validate(&self) -> ModelResult<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(ModelError::ModelLoadFailed {
                reason: format!(
                    "unsupported format version {} (expected {})",
                    self.format_version, FORMAT_VERSION
                ),
            });
        }
        self.schema.validate()?;
        let expected = InputShape::new(self.schema.channel_count(), self.schema.statistic_count());
        if self.input != expected {
            return Err(ModelError::ModelLoadFailed {
                reason: format!("input shape {:?} disagrees with schema {:?}", self.input, expected),
            });
        }
        let slots = expected.channels * expected.statistics;
        if self.scaler.n_columns() != slots {
            return Err(ModelError::ModelLoadFailed {
                reason: format!("scaler covers {} slots, schema has {}", self.scaler.n_columns(), slots),
            });
        }
        Ok(())
    }
}

/// One predicted genre
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub class_id: u32,
    pub genre: String,
    pub confidence: f32,
}

/// Network, its variables and its metadata
pub struct GenreClassifier {
    varmap: VarMap,
    network: GenreCnn,
    metadata: ModelMetadata,
    device: Device,
}

impl GenreClassifier {
    /// Freshly initialized classifier
    pub fn new(metadata: ModelMetadata, device: Device) -> ModelResult<Self> {
        metadata.validate()?;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let network = GenreCnn::new(vb, metadata.input, metadata.classes.num_classes(), &metadata.model)?;

        Ok(Self {
            varmap,
            network,
            metadata,
            device,
        })
    }

    pub fn network(&self) -> &GenreCnn {
        &self.network
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Write weights and metadata into `dir`, creating it if needed
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> ModelResult<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        self.varmap.save(dir.join(WEIGHTS_FILE))?;
        fs::write(dir.join(METADATA_FILE), serde_json::to_string_pretty(&self.metadata)?)?;
        log::info!("Saved model to {}", dir.display());
        Ok(())
    }

    /// Rebuild a classifier from a model directory
    pub fn load<P: AsRef<Path>>(dir: P, device: Device) -> ModelResult<Self> {
        let dir = dir.as_ref();
        let metadata_path = dir.join(METADATA_FILE);
        let weights_path = dir.join(WEIGHTS_FILE);
        for path in [&metadata_path, &weights_path] {
            if !path.exists() {
                return Err(ModelError::ModelNotFound {
                    path: path.display().to_string(),
                });
            }
        }

        let metadata: ModelMetadata = serde_json::from_str(&fs::read_to_string(&metadata_path)?)?;
        let mut classifier = Self::new(metadata, device)?;
        classifier
            .varmap
            .load(&weights_path)
            .map_err(|e| ModelError::ModelLoadFailed { reason: e.to_string() })?;

        log::info!(
            "Loaded model from {} ({} classes)",
            dir.display(),
            classifier.metadata.classes.num_classes()
        );
        Ok(classifier)
    }

    /// Loss and accuracy on an already scaled, tensorized dataset
    pub fn evaluate(&self, data: &Dataset) -> ModelResult<Evaluation> {
        evaluate(&self.network, data, INFERENCE_BATCH, &self.device)
    }

    /// Most likely genre per track of a feature tensor
    pub fn predict(&self, features: &Array3<f32>) -> ModelResult<Vec<Prediction>> {
        self.network.check_input(features)?;
        if features.is_empty() {
            return Ok(Vec::new());
        }

        let xs = features_to_tensor(features, &self.device)?;
        let n = features.dim().0;
        let mut out = Vec::with_capacity(n);
        let mut start = 0;
        while start < n {
            let len = INFERENCE_BATCH.min(n - start);
            let probs = self.network.probabilities(&xs.narrow(0, start, len)?)?.to_vec2::<f32>()?;
            for row in probs {
                let (class_id, confidence) = row
                    .iter()
                    .copied()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best });
                out.push(Prediction {
                    class_id: class_id as u32,
                    genre: self.metadata.classes.decode(class_id as u32)?.to_string(),
                    confidence,
                });
            }
            start += len;
        }
        Ok(out)
    }

    /// Tensorize a raw feature table with the stored schema, scale it with
    /// the stored scaler, then predict; results pair each track id with its
    /// prediction. Column order in `table` does not matter.
    pub fn predict_table(&self, table: &FeatureTable) -> ModelResult<Vec<(String, Prediction)>> {
        let plan = ColumnPlan::resolve(&self.metadata.schema, table.columns())?;
        let tensor = self.metadata.scaler.transform_tensor(&plan.build(table.values())?)?;
        let predictions = self.predict(&tensor)?;
        Ok(table.track_ids().iter().cloned().zip(predictions).collect())
    }
}
