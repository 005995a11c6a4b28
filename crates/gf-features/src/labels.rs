//! Genre label coding
//!
//! Distinct raw labels are sorted and numbered `0..K`. The class list is
//! stored with the trained model so inference maps ids back to the same
//! names instead of re-deriving them from whatever data it sees.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{FeatureError, FeatureResult};

/// Bijection between raw label strings and dense class ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Build from observed labels
    ///
    /// Labels that all parse as integers are ordered numerically, anything
    /// else lexicographically.
    pub fn fit<S: AsRef<str>>(labels: &[S]) -> FeatureResult<Self> {
        let distinct: BTreeSet<&str> = labels.iter().map(|l| l.as_ref()).collect();
        if distinct.is_empty() {
            return Err(FeatureError::ShapeMismatch {
                expected: "at least one label".into(),
                got: "none".into(),
            });
        }

        let mut classes: Vec<String> = distinct.into_iter().map(str::to_string).collect();
        let numeric: Option<Vec<i64>> = classes.iter().map(|c| c.parse::<i64>().ok()).collect();
        if let Some(keys) = numeric {
            let mut paired: Vec<(i64, String)> = keys.into_iter().zip(classes).collect();
            paired.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
            classes = paired.into_iter().map(|(_, c)| c).collect();
        }

        log::debug!("Label classes: {:?}", classes);
        Ok(Self { classes })
    }

    /// Rebuild from a stored class list
    pub fn from_classes(classes: Vec<String>) -> FeatureResult<Self> {
        let distinct: BTreeSet<&String> = classes.iter().collect();
        if classes.is_empty() || distinct.len() != classes.len() {
            return Err(FeatureError::InvalidSchema(format!(
                "class list must be non-empty and unique, got {:?}",
                classes
            )));
        }
        Ok(Self { classes })
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn encode(&self, label: &str) -> FeatureResult<u32> {
        self.classes
            .iter()
            .position(|c| c == label)
            .map(|i| i as u32)
            .ok_or_else(|| FeatureError::UnknownLabel(label.to_string()))
    }

    pub fn decode(&self, id: u32) -> FeatureResult<&str> {
        self.classes
            .get(id as usize)
            .map(String::as_str)
            .ok_or(FeatureError::UnknownClassId(id))
    }

    pub fn transform<S: AsRef<str>>(&self, labels: &[S]) -> FeatureResult<Vec<u32>> {
        labels.iter().map(|l| self.encode(l.as_ref())).collect()
    }

    /// Per-class counts of an encoded label vector
    pub fn class_counts(&self, ids: &[u32]) -> Vec<usize> {
        let mut counts = vec![0; self.num_classes()];
        for &id in ids {
            if let Some(c) = counts.get_mut(id as usize) {
                *c += 1;
            }
        }
        counts
    }
}

impl TryFrom<Vec<String>> for LabelEncoder {
    type Error = FeatureError;

    fn try_from(classes: Vec<String>) -> FeatureResult<Self> {
        Self::from_classes(classes)
    }
}

impl From<LabelEncoder> for Vec<String> {
    fn from(encoder: LabelEncoder) -> Self {
        encoder.classes
    }
}
