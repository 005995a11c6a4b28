//! Stratified train / validation / test partitioning

use ndarray::{Array3, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{FeatureError, FeatureResult};

/// Split fractions and seed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of all tracks held out for testing
    pub test_fraction: f64,

    /// Fraction of the remaining tracks held out for validation
    pub validation_fraction: f64,

    /// RNG seed
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.20,
            validation_fraction: 0.15,
            seed: 42,
        }
    }
}

/// Index sets of a stratified two-way split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Split `0..labels.len()` so each class keeps its share in both parts
///
/// The test part holds `ceil(test_fraction * n)` indices. Each class first
/// gets the floor of its proportional share; leftover slots go to the
/// classes with the largest fractional remainder, lowest class id first.
pub fn stratified_split(labels: &[u32], test_fraction: f64, seed: u64) -> FeatureResult<SplitIndices> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(FeatureError::InvalidSplit(format!(
            "test fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }

    let n = labels.len();
    let n_classes = labels.iter().map(|&l| l as usize + 1).max().unwrap_or(0);
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (i, &label) in labels.iter().enumerate() {
        by_class[label as usize].push(i);
    }
    by_class.retain(|members| !members.is_empty());

    if let Some(min) = by_class.iter().map(Vec::len).min() {
        if min < 2 {
            return Err(FeatureError::InvalidSplit(
                "every class needs at least two members".into(),
            ));
        }
    }

    let n_test = (test_fraction * n as f64).ceil() as usize;
    let n_train = n.saturating_sub(n_test);
    if n_test < by_class.len() || n_train < by_class.len() {
        return Err(FeatureError::InvalidSplit(format!(
            "{} train / {} test tracks cannot cover {} classes",
            n_train,
            n_test,
            by_class.len()
        )));
    }

    let exact: Vec<f64> = by_class
        .iter()
        .map(|members| members.len() as f64 * n_test as f64 / n as f64)
        .collect();
    let mut quota: Vec<usize> = exact.iter().map(|q| q.floor() as usize).collect();

    let mut order: Vec<usize> = (0..by_class.len()).collect();
    order.sort_by(|&a, &b| {
        let fa = exact[a] - quota[a] as f64;
        let fb = exact[b] - quota[b] as f64;
        fb.total_cmp(&fa).then(a.cmp(&b))
    });
    let mut leftover = n_test - quota.iter().sum::<usize>();
    while leftover > 0 {
        let before = leftover;
        for &c in &order {
            if leftover == 0 {
                break;
            }
            // Keep at least one training member per class
            if quota[c] + 1 < by_class[c].len() {
                quota[c] += 1;
                leftover -= 1;
            }
        }
        if leftover == before {
            break;
        }
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n_train);
    let mut test = Vec::with_capacity(n_test);
    for (members, &k) in by_class.iter_mut().zip(quota.iter()) {
        members.shuffle(&mut rng);
        test.extend_from_slice(&members[..k]);
        train.extend_from_slice(&members[k..]);
    }
    train.shuffle(&mut rng);
    test.shuffle(&mut rng);

    Ok(SplitIndices { train, test })
}

/// Feature tensor with aligned class ids
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Shape `(tracks, channels, statistics)`
    pub features: Array3<f32>,

    /// Class id per track
    pub labels: Vec<u32>,
}

impl Dataset {
    pub fn new(features: Array3<f32>, labels: Vec<u32>) -> FeatureResult<Self> {
        if features.len_of(Axis(0)) != labels.len() {
            return Err(FeatureError::ShapeMismatch {
                expected: format!("{} labels", features.len_of(Axis(0))),
                got: format!("{} labels", labels.len()),
            });
        }
        Ok(Self { features, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Rows in the given order
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            features: self.features.select(Axis(0), indices),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    /// Stratified split into `(rest, test)`
    pub fn split(&self, test_fraction: f64, seed: u64) -> FeatureResult<(Self, Self)> {
        let idx = stratified_split(&self.labels, test_fraction, seed)?;
        Ok((self.select(&idx.train), self.select(&idx.test)))
    }
}

/// Train / validation / test partition
#[derive(Debug, Clone)]
pub struct DatasetSplits {
    pub train: Dataset,
    pub validation: Dataset,
    pub test: Dataset,
}

impl DatasetSplits {
    /// Hold out the test part first, then validation from what remains
    pub fn stratified(dataset: &Dataset, config: &SplitConfig) -> FeatureResult<Self> {
        let (rest, test) = dataset.split(config.test_fraction, config.seed)?;
        let (train, validation) = rest.split(config.validation_fraction, config.seed)?;

        log::info!(
            "Split {} tracks: {} train, {} validation, {} test",
            dataset.len(),
            train.len(),
            validation.len(),
            test.len()
        );

        Ok(Self {
            train,
            validation,
            test,
        })
    }
}
