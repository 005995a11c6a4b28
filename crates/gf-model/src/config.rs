//! Network and training configuration

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Per-track input shape: `(channels, statistics)`
///
/// Channels are the sequence axis the convolution slides over; statistics
/// are the convolution input channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputShape {
    pub channels: usize,
    pub statistics: usize,
}

impl InputShape {
    pub fn new(channels: usize, statistics: usize) -> Self {
        Self { channels, statistics }
    }
}

/// Network architecture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Convolution filters
    pub conv_filters: usize,

    /// Convolution kernel width (along the channel axis)
    pub kernel_size: usize,

    /// Dense hidden units
    pub hidden_units: usize,

    /// Dropout rate after the hidden layer
    pub dropout: f32,

    /// L2 factor on both dense kernels (`λ·Σw²` added to the loss)
    pub l2: f64,

    /// Batch norm epsilon
    pub batch_norm_eps: f64,

    /// Batch norm running-stat update rate (weight of the new batch)
    pub batch_norm_momentum: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            conv_filters: 128,
            kernel_size: 7,
            hidden_units: 64,
            dropout: 0.3,
            l2: 0.1,
            batch_norm_eps: 1e-3,
            batch_norm_momentum: 0.01,
        }
    }
}

impl ModelConfig {
    /// Small network for smoke runs and tests
    pub fn tiny() -> Self {
        Self {
            conv_filters: 8,
            kernel_size: 3,
            hidden_units: 16,
            dropout: 0.0,
            l2: 0.0,
            // Few steps; running stats must settle quickly
            batch_norm_momentum: 0.1,
            ..Default::default()
        }
    }

    pub fn validate(&self, input: InputShape) -> ModelResult<()> {
        if self.conv_filters == 0 || self.hidden_units == 0 {
            return Err(ModelError::InvalidConfig("layer widths must be non-zero".into()));
        }
        if self.kernel_size == 0 || self.kernel_size > input.channels {
            return Err(ModelError::InvalidConfig(format!(
                "kernel size {} does not fit {} input channels",
                self.kernel_size, input.channels
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ModelError::InvalidConfig(format!("dropout {} outside [0, 1)", self.dropout)));
        }
        if self.l2 < 0.0 {
            return Err(ModelError::InvalidConfig(format!("negative L2 factor {}", self.l2)));
        }
        Ok(())
    }

    /// Sequence length after the unpadded convolution
    pub fn conv_output_len(&self, input: InputShape) -> usize {
        input.channels + 1 - self.kernel_size
    }
}

/// Optimizer and loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Adam learning rate
    pub learning_rate: f64,

    /// Adam epsilon
    pub adam_eps: f64,

    /// Mini-batch size
    pub batch_size: usize,

    /// Passes over the training split
    pub epochs: usize,

    /// Seed for batch shuffling
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-4,
            adam_eps: 1e-7,
            batch_size: 32,
            epochs: 50,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    /// Few epochs with a larger step, for smoke runs
    pub fn quick() -> Self {
        Self {
            learning_rate: 1e-2,
            batch_size: 8,
            epochs: 5,
            ..Default::default()
        }
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.batch_size == 0 {
            return Err(ModelError::InvalidConfig("batch size must be non-zero".into()));
        }
        if self.learning_rate <= 0.0 {
            return Err(ModelError::InvalidConfig(format!(
                "learning rate {} must be positive",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_conv_length() {
        let config = ModelConfig::default();
        let input = InputShape::new(74, 7);
        assert!(config.validate(input).is_ok());
        assert_eq!(config.conv_output_len(input), 68);
    }

    #[test]
    fn test_kernel_larger_than_input() {
        let config = ModelConfig::default();
        assert!(config.validate(InputShape::new(5, 7)).is_err());
    }

    #[test]
    fn test_presets() {
        let quick = TrainingConfig::quick();
        let full = TrainingConfig::default();
        assert!(quick.epochs < full.epochs);
        assert!(quick.learning_rate > full.learning_rate);
        assert!(TrainingConfig { batch_size: 0, ..full }.validate().is_err());
    }
}
