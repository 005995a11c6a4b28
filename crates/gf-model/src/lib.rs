//! # GenreForge genre classifier
//!
//! 1-D CNN over `(track, channel, statistic)` feature tensors:
//! - Network definition (`candle-nn`)
//! - Adam training loop with per-epoch validation
//! - Loss / accuracy evaluation
//! - Save / reload with a JSON sidecar carrying schema, classes and scaler
//! - Genre prediction for raw feature tables
//!
//! ## Devices
//!
//! CPU by default. Build with `cuda` or `metal` to let
//! [`default_device`] pick an accelerator when one is present.

pub mod classifier;
pub mod config;
pub mod network;
pub mod trainer;

mod error;

pub use classifier::{GenreClassifier, ModelMetadata, Prediction, FORMAT_VERSION, METADATA_FILE, WEIGHTS_FILE};
pub use config::{InputShape, ModelConfig, TrainingConfig};
pub use error::{ModelError, ModelResult};
pub use network::GenreCnn;
pub use trainer::{evaluate, EpochMetrics, Evaluation, Trainer, TrainingHistory};

use candle_core::Device;

/// Default model directory
pub const DEFAULT_MODEL_DIR: &str = "models/Music_Genre_CNN_on_tensor";

/// First CUDA or Metal device when compiled in and available, else CPU
pub fn default_device() -> Device {
    if candle_core::utils::cuda_is_available() {
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
    }
    if candle_core::utils::metal_is_available() {
        if let Ok(device) = Device::new_metal(0) {
            return device;
        }
    }
    Device::Cpu
}
