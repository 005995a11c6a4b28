//! 1-D convolutional genre network
//!
//! ```text
//! (batch, 74, 7) ─► transpose ─► Conv1d(7→128, k=7) ─► ReLU ─► BatchNorm
//!                ─► flatten ─► Dense(→64) ─► ReLU ─► Dropout ─► Dense(→K)
//! ```
//!
//! The forward pass returns logits; softmax is applied by the loss during
//! training and by [`GenreCnn::probabilities`] at inference.

use candle_core::{Device, Module, ModuleT, Tensor};
use candle_nn::{
    batch_norm, conv1d, linear, BatchNorm, BatchNormConfig, Conv1d, Conv1dConfig, Dropout, Linear, VarBuilder,
};
use ndarray::Array3;

use crate::config::{InputShape, ModelConfig};
use crate::error::{ModelError, ModelResult};

/// Genre classifier network
#[derive(Debug)]
pub struct GenreCnn {
    conv: Conv1d,
    norm: BatchNorm,
    hidden: Linear,
    dropout: Dropout,
    output: Linear,
    l2: f64,
    input: InputShape,
    num_classes: usize,
    summary: Vec<(String, Vec<usize>, usize)>,
}

impl GenreCnn {
    /// Create the network, registering its variables under `vb`
    pub fn new(vb: VarBuilder, input: InputShape, num_classes: usize, config: &ModelConfig) -> ModelResult<Self> {
        config.validate(input)?;
        if num_classes < 2 {
            return Err(ModelError::InvalidConfig(format!(
                "need at least two classes, got {}",
                num_classes
            )));
        }

        let conv_len = config.conv_output_len(input);
        let flat = config.conv_filters * conv_len;

        let conv = conv1d(
            input.statistics,
            config.conv_filters,
            config.kernel_size,
            Conv1dConfig::default(),
            vb.pp("conv"),
        )?;
        let norm = batch_norm(
            config.conv_filters,
            BatchNormConfig {
                eps: config.batch_norm_eps,
                remove_mean: true,
                affine: true,
                momentum: config.batch_norm_momentum,
            },
            vb.pp("norm"),
        )?;
        let hidden = linear(flat, config.hidden_units, vb.pp("hidden"))?;
        let output = linear(config.hidden_units, num_classes, vb.pp("output"))?;

        let summary = vec![
            (
                "conv1d".to_string(),
                vec![config.conv_filters, conv_len],
                (input.statistics * config.kernel_size + 1) * config.conv_filters,
            ),
            (
                "batch_norm".to_string(),
                vec![config.conv_filters, conv_len],
                4 * config.conv_filters,
            ),
            ("flatten".to_string(), vec![flat], 0),
            (
                "dense".to_string(),
                vec![config.hidden_units],
                (flat + 1) * config.hidden_units,
            ),
            ("dropout".to_string(), vec![config.hidden_units], 0),
            (
                "dense_output".to_string(),
                vec![num_classes],
                (config.hidden_units + 1) * num_classes,
            ),
        ];

        Ok(Self {
            conv,
            norm,
            hidden,
            dropout: Dropout::new(config.dropout),
            output,
            l2: config.l2,
            input,
            num_classes,
            summary,
        })
    }

    pub fn input_shape(&self) -> InputShape {
        self.input
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// `λ·Σw²` over the dense kernels
    pub fn l2_penalty(&self) -> candle_core::Result<Tensor> {
        let sum = self
            .hidden
            .weight()
            .sqr()?
            .sum_all()?
            .add(&self.output.weight().sqr()?.sum_all()?)?;
        sum.affine(self.l2, 0.0)
    }

    /// Class probabilities in inference mode, shape `(batch, classes)`
    pub fn probabilities(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let logits = self.forward_t(xs, false)?;
        candle_nn::ops::softmax_last_dim(&logits)
    }

    /// Check a feature tensor against the network input
    pub fn check_input(&self, features: &Array3<f32>) -> ModelResult<()> {
        let (_, channels, statistics) = features.dim();
        if channels != self.input.channels || statistics != self.input.statistics {
            return Err(ModelError::InvalidInputShape {
                expected: format!("(_, {}, {})", self.input.channels, self.input.statistics),
                got: format!("{:?}", features.dim()),
            });
        }
        Ok(())
    }

    /// Layer table in the usual "layer / output shape / params" form
    pub fn summary(&self) -> String {
        let mut out = format!("{:<14} {:<16} {:>10}\n", "Layer", "Output shape", "Params");
        let mut total = 0;
        for (name, shape, params) in &self.summary {
            out.push_str(&format!("{:<14} {:<16} {:>10}\n", name, format!("{:?}", shape), params));
            total += params;
        }
        out.push_str(&format!("Total params: {}", total));
        out
    }
}

impl ModuleT for GenreCnn {
    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        // (batch, channels, statistics) -> (batch, statistics, channels)
        let xs = xs.transpose(1, 2)?.contiguous()?;
        let xs = self.conv.forward(&xs)?.relu()?;
        let xs = self.norm.forward_t(&xs, train)?;
        let xs = xs.flatten_from(1)?;
        let xs = self.hidden.forward(&xs)?.relu()?;
        let xs = self.dropout.forward_t(&xs, train)?;
        self.output.forward(&xs)
    }
}

/// Copy a feature tensor onto `device`
pub fn features_to_tensor(features: &Array3<f32>, device: &Device) -> ModelResult<Tensor> {
    let shape = features.dim();
    // iter() walks in logical order regardless of memory layout
    let tensor = Tensor::from_iter(features.iter().copied(), device)?.reshape(shape)?;
    Ok(tensor)
}

/// Copy class ids onto `device`
pub fn labels_to_tensor(labels: &[u32], device: &Device) -> ModelResult<Tensor> {
    Ok(Tensor::from_slice(labels, labels.len(), device)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;

    fn build(config: &ModelConfig, classes: usize) -> (VarMap, GenreCnn) {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let net = GenreCnn::new(vb, InputShape::new(74, 7), classes, config).unwrap();
        (varmap, net)
    }

    #[test]
    fn test_output_shape() {
        let (_, net) = build(&ModelConfig::default(), 10);
        let features = Array3::<f32>::from_shape_fn((4, 74, 7), |(b, c, s)| ((b + c + s) % 5) as f32 - 2.0);
        let xs = features_to_tensor(&features, &Device::Cpu).unwrap();

        let logits = net.forward_t(&xs, false).unwrap();
        assert_eq!(logits.dims(), &[4, 10]);

        let train_logits = net.forward_t(&xs, true).unwrap();
        assert_eq!(train_logits.dims(), &[4, 10]);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (_, net) = build(&ModelConfig::tiny(), 3);
        let features = Array3::<f32>::from_shape_fn((2, 74, 7), |(b, c, _)| (b * c) as f32 * 0.01);
        let xs = features_to_tensor(&features, &Device::Cpu).unwrap();

        let probs = net.probabilities(&xs).unwrap().to_vec2::<f32>().unwrap();
        for row in probs {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_parameter_count_matches_summary() {
        let config = ModelConfig::default();
        let (varmap, net) = build(&config, 10);
        let stored: usize = varmap.all_vars().iter().map(|v| v.elem_count()).sum();
        assert!(net.summary().ends_with(&format!("Total params: {}", stored)));
        // 128 * 68 flattened features feed the hidden layer
        assert!(net.summary().contains("[8704]"));
    }

    #[test]
    fn test_l2_penalty() {
        let config = ModelConfig::default();
        let (_, net) = build(&config, 10);
        let penalty = net.l2_penalty().unwrap().to_scalar::<f32>().unwrap();
        let w1 = net.hidden.weight().sqr().unwrap().sum_all().unwrap().to_scalar::<f32>().unwrap();
        let w2 = net.output.weight().sqr().unwrap().sum_all().unwrap().to_scalar::<f32>().unwrap();
        assert!(penalty > 0.0);
        assert!((penalty - 0.1 * (w1 + w2)).abs() < 1e-3 * penalty.max(1.0));
    }

    #[test]
    fn test_rejects_single_class() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        assert!(GenreCnn::new(vb, InputShape::new(74, 7), 1, &ModelConfig::default()).is_err());
    }

    #[test]
    fn test_check_input() {
        let (_, net) = build(&ModelConfig::tiny(), 2);
        assert!(net.check_input(&Array3::zeros((1, 74, 7))).is_ok());
        assert!(net.check_input(&Array3::zeros((1, 70, 7))).is_err());
    }
}
