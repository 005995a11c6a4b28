//! Per-column standardization

use ndarray::{Array2, Array3, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{FeatureError, FeatureResult};

/// Columns with a std at or below this are centered but not scaled
pub const MIN_STD: f32 = 1e-10;

/// Fitted column statistics: `(x - mean) / std`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl StandardScaler {
    /// Compute per-column mean and population standard deviation
    pub fn fit(x: &Array2<f32>) -> FeatureResult<Self> {
        let (rows, cols) = x.dim();
        if rows == 0 {
            return Err(FeatureError::Scaler("cannot fit on zero rows".into()));
        }

        let stats: Vec<(f32, f32)> = (0..cols)
            .into_par_iter()
            .map(|j| {
                // f64 accumulation; columns run to thousands of rows
                let column = x.column(j).mapv(f64::from);
                let mean = column.mean().unwrap_or(0.0);
                (mean as f32, column.std(0.0) as f32)
            })
            .collect();

        let constant = stats.iter().filter(|(_, s)| *s <= MIN_STD).count();
        if constant > 0 {
            log::warn!("{} of {} columns are constant and will only be centered", constant, cols);
        }

        let (mean, std) = stats.into_iter().unzip();
        Ok(Self { mean, std })
    }

    /// Standardize columns with the fitted statistics
    pub fn transform(&self, x: &Array2<f32>) -> FeatureResult<Array2<f32>> {
        if x.ncols() != self.mean.len() {
            return Err(FeatureError::ShapeMismatch {
                expected: format!("{} columns", self.mean.len()),
                got: format!("{} columns", x.ncols()),
            });
        }

        let mut out = x.to_owned();
        for (mut column, (&mean, &std)) in out
            .axis_iter_mut(Axis(1))
            .zip(self.mean.iter().zip(self.std.iter()))
        {
            if std > MIN_STD {
                column.mapv_inplace(|v| (v - mean) / std);
            } else {
                column.mapv_inplace(|v| v - mean);
            }
        }
        Ok(out)
    }

    pub fn fit_transform(x: &Array2<f32>) -> FeatureResult<(Self, Array2<f32>)> {
        let scaler = Self::fit(x)?;
        let scaled = scaler.transform(x)?;
        Ok((scaler, scaled))
    }

    /// Fit one column per tensor `(channel, statistic)` slot
    ///
    /// Slots come from a resolved column plan, so the fitted statistics
    /// follow the schema rather than the column order of any file.
    pub fn fit_tensor(x: &Array3<f32>) -> FeatureResult<Self> {
        Self::fit(&slot_matrix(x)?)
    }

    /// Standardize every `(channel, statistic)` slot of a tensor
    pub fn transform_tensor(&self, x: &Array3<f32>) -> FeatureResult<Array3<f32>> {
        let dim = x.dim();
        let scaled = self.transform(&slot_matrix(x)?)?;
        scaled.into_shape_with_order(dim).map_err(|e| FeatureError::ShapeMismatch {
            expected: format!("{:?}", dim),
            got: e.to_string(),
        })
    }

    pub fn fit_transform_tensor(x: &Array3<f32>) -> FeatureResult<(Self, Array3<f32>)> {
        let scaler = Self::fit_tensor(x)?;
        let scaled = scaler.transform_tensor(x)?;
        Ok((scaler, scaled))
    }

    pub fn mean(&self) -> &[f32] {
        &self.mean
    }

    pub fn std(&self) -> &[f32] {
        &self.std
    }

    pub fn n_columns(&self) -> usize {
        self.mean.len()
    }
}

/// `(tracks, channels, statistics)` -> `(tracks, channels * statistics)`
fn slot_matrix(x: &Array3<f32>) -> FeatureResult<Array2<f32>> {
    let (tracks, channels, statistics) = x.dim();
    x.to_shape((tracks, channels * statistics))
        .map(|m| m.into_owned())
        .map_err(|e| FeatureError::ShapeMismatch {
            expected: format!("({}, {})", tracks, channels * statistics),
            got: e.to_string(),
        })
}
