//! Mini-batch training and evaluation

use candle_core::{DType, Device, ModuleT, Tensor, D};
use candle_nn::{loss, AdamW, Optimizer, ParamsAdamW, VarMap};
use gf_features::Dataset;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::TrainingConfig;
use crate::error::{ModelError, ModelResult};
use crate::network::{features_to_tensor, labels_to_tensor, GenreCnn};

/// Loss and accuracy over a dataset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Mean cross-entropy plus L2 penalty
    pub loss: f32,

    /// Fraction of correctly classified tracks
    pub accuracy: f32,

    /// Tracks evaluated
    pub samples: usize,
}

/// Metrics of one training epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch number
    pub epoch: usize,

    pub loss: f32,
    pub accuracy: f32,
    pub val_loss: Option<f32>,
    pub val_accuracy: Option<f32>,
}

/// Per-epoch training record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    /// Epoch with the highest validation accuracy
    pub fn best_validation(&self) -> Option<&EpochMetrics> {
        self.epochs
            .iter()
            .filter(|e| e.val_accuracy.is_some())
            .max_by(|a, b| a.val_accuracy.partial_cmp(&b.val_accuracy).unwrap_or(std::cmp::Ordering::Equal))
    }
}

/// Number of rows whose arg-max logit equals the target
fn count_correct(logits: &Tensor, targets: &Tensor) -> candle_core::Result<f32> {
    logits
        .argmax(D::Minus1)?
        .eq(targets)?
        .to_dtype(DType::F32)?
        .sum_all()?
        .to_scalar::<f32>()
}

/// Adam-driven trainer for [`GenreCnn`]
pub struct Trainer {
    config: TrainingConfig,
    device: Device,
}

impl Trainer {
    pub fn new(config: TrainingConfig, device: Device) -> ModelResult<Self> {
        config.validate()?;
        Ok(Self { config, device })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train `model` (whose variables live in `varmap`) on `train`
    ///
    /// Batches are reshuffled every epoch. When `validation` is given it is
    /// evaluated after each epoch.
    pub fn fit(
        &self,
        model: &GenreCnn,
        varmap: &VarMap,
        train: &Dataset,
        validation: Option<&Dataset>,
    ) -> ModelResult<TrainingHistory> {
        if train.is_empty() {
            return Err(ModelError::EmptyDataset("training split"));
        }
        model.check_input(&train.features)?;

        let xs = features_to_tensor(&train.features, &self.device)?;
        let ys = labels_to_tensor(&train.labels, &self.device)?;

        let params = ParamsAdamW {
            lr: self.config.learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            eps: self.config.adam_eps,
            weight_decay: 0.0,
        };
        let mut optimizer = AdamW::new(varmap.all_vars(), params)?;

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut order: Vec<u32> = (0..train.len() as u32).collect();
        let mut history = TrainingHistory::default();

        log::info!(
            "Training on {} tracks for {} epochs (batch {}, lr {})",
            train.len(),
            self.config.epochs,
            self.config.batch_size,
            self.config.learning_rate
        );

        for epoch in 1..=self.config.epochs {
            order.shuffle(&mut rng);

            let mut loss_sum = 0.0f64;
            let mut correct = 0.0f64;
            for batch in order.chunks(self.config.batch_size) {
                let idx = Tensor::from_slice(batch, batch.len(), &self.device)?;
                let xb = xs.index_select(&idx, 0)?;
                let yb = ys.index_select(&idx, 0)?;

                let logits = model.forward_t(&xb, true)?;
                let batch_loss = loss::cross_entropy(&logits, &yb)?.add(&model.l2_penalty()?)?;
                optimizer.backward_step(&batch_loss)?;

                loss_sum += batch_loss.to_scalar::<f32>()? as f64 * batch.len() as f64;
                correct += count_correct(&logits, &yb)? as f64;
            }

            let loss = (loss_sum / train.len() as f64) as f32;
            if !loss.is_finite() {
                return Err(ModelError::Diverged { epoch, loss });
            }

            let val = validation
                .map(|v| evaluate(model, v, self.config.batch_size, &self.device))
                .transpose()?;
            let metrics = EpochMetrics {
                epoch,
                loss,
                accuracy: (correct / train.len() as f64) as f32,
                val_loss: val.map(|v| v.loss),
                val_accuracy: val.map(|v| v.accuracy),
            };

            match val {
                Some(v) => log::info!(
                    "Epoch {}/{}: loss {:.4} acc {:.4} | val_loss {:.4} val_acc {:.4}",
                    epoch,
                    self.config.epochs,
                    metrics.loss,
                    metrics.accuracy,
                    v.loss,
                    v.accuracy
                ),
                None => log::info!(
                    "Epoch {}/{}: loss {:.4} acc {:.4}",
                    epoch,
                    self.config.epochs,
                    metrics.loss,
                    metrics.accuracy
                ),
            }
            history.epochs.push(metrics);
        }

        Ok(history)
    }
}

/// Evaluate `model` in inference mode
pub fn evaluate(model: &GenreCnn, data: &Dataset, batch_size: usize, device: &Device) -> ModelResult<Evaluation> {
    if data.is_empty() {
        return Err(ModelError::EmptyDataset("evaluation data"));
    }
    model.check_input(&data.features)?;

    let xs = features_to_tensor(&data.features, device)?;
    let ys = labels_to_tensor(&data.labels, device)?;
    let penalty = model.l2_penalty()?.to_scalar::<f32>()? as f64;

    let n = data.len();
    let step = batch_size.max(1);
    let mut ce_sum = 0.0f64;
    let mut correct = 0.0f64;
    let mut start = 0;
    while start < n {
        let len = step.min(n - start);
        let xb = xs.narrow(0, start, len)?;
        let yb = ys.narrow(0, start, len)?;

        let logits = model.forward_t(&xb, false)?;
        ce_sum += loss::cross_entropy(&logits, &yb)?.to_scalar::<f32>()? as f64 * len as f64;
        correct += count_correct(&logits, &yb)? as f64;
        start += len;
    }

    Ok(Evaluation {
        loss: (ce_sum / n as f64 + penalty) as f32,
        accuracy: (correct / n as f64) as f32,
        samples: n,
    })
}
