//! Run configuration for the `train` command

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gf_features::{paths, FeatureSchema, SplitConfig};
use gf_model::{ModelConfig, TrainingConfig, DEFAULT_MODEL_DIR};
use serde::{Deserialize, Serialize};

/// Everything a training run needs, loadable from JSON
///
/// Missing top-level keys take their defaults, so a file may override
/// only e.g. `training`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Directory holding `X_train.csv` and `y_train.csv`
    pub data_dir: PathBuf,

    /// Output model directory
    pub model_dir: PathBuf,

    /// Custom feature schema (JSON); the FMA layout when absent
    pub schema: Option<PathBuf>,

    pub model: ModelConfig,

    pub training: TrainingConfig,

    pub split: SplitConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        let data_dir = Path::new(paths::X_TRAIN)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("data"));
        Self {
            data_dir,
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            schema: None,
            model: ModelConfig::default(),
            training: TrainingConfig::default(),
            split: SplitConfig::default(),
        }
    }
}

impl RunConfig {
    /// Read a run config from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Invalid run config {}", path.display()))
    }

    /// Apply command line overrides
    pub fn with_overrides(
        mut self,
        data_dir: Option<PathBuf>,
        model_dir: Option<PathBuf>,
        epochs: Option<usize>,
        seed: Option<u64>,
    ) -> Self {
        if let Some(dir) = data_dir {
            self.data_dir = dir;
        }
        if let Some(dir) = model_dir {
            self.model_dir = dir;
        }
        if let Some(epochs) = epochs {
            self.training = self.training.with_epochs(epochs);
        }
        // One seed drives both the split and batch shuffling
        if let Some(seed) = seed {
            self.training = self.training.with_seed(seed);
            self.split.seed = seed;
        }
        self
    }

    pub fn features_path(&self) -> PathBuf {
        self.data_dir.join(file_name(paths::X_TRAIN))
    }

    pub fn labels_path(&self) -> PathBuf {
        self.data_dir.join(file_name(paths::Y_TRAIN))
    }

    /// Schema from `schema` when set, else the FMA default
    pub fn load_schema(&self) -> Result<FeatureSchema> {
        match &self.schema {
            Some(path) => FeatureSchema::from_json_file(path)
                .with_context(|| format!("Failed to load schema {}", path.display())),
            None => Ok(FeatureSchema::fma()),
        }
    }
}

fn file_name(path: &str) -> &str {
    Path::new(path).file_name().and_then(|n| n.to_str()).unwrap_or(path)
}
