//! Feature schema
//!
//! Declares, in a fixed order, which feature families make up the tensor,
//! how many channels each one contributes, and which statistics fill the
//! per-channel slots. The schema order *is* the tensor channel order, so the
//! same schema must be used for training and for every later inference run.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FeatureError, FeatureResult};

/// Statistics computed per channel, in tensor slot order
pub const DEFAULT_STATISTICS: [&str; 7] = ["kurtosis", "max", "mean", "median", "min", "skew", "std"];

/// How a feature family maps onto tensor channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FamilyKind {
    /// One channel; columns carry no sub-index (or a single one)
    Scalar,
    /// `channels` channels addressed by sub-index `01..=channels`
    MultiChannel { channels: usize },
}

impl FamilyKind {
    /// Number of tensor channels this family occupies
    pub fn channel_count(&self) -> usize {
        match self {
            FamilyKind::Scalar => 1,
            FamilyKind::MultiChannel { channels } => *channels,
        }
    }
}

/// A named audio descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFamily {
    /// Family name as it appears in the `feature` header level
    pub name: String,

    /// Channel layout
    #[serde(flatten)]
    pub kind: FamilyKind,
}

impl FeatureFamily {
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FamilyKind::Scalar,
        }
    }

    pub fn multi(name: impl Into<String>, channels: usize) -> Self {
        Self {
            name: name.into(),
            kind: FamilyKind::MultiChannel { channels },
        }
    }
}

/// One tensor channel: a family plus an optional sub-index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelId {
    /// Feature family name
    pub family: String,

    /// Zero-padded sub-index (`None` for scalar families)
    pub number: Option<String>,
}

impl ChannelId {
    /// Display label, e.g. `mfcc_03` or `zcr`
    pub fn label(&self) -> String {
        match &self.number {
            Some(n) => format!("{}_{}", self.family, n),
            None => self.family.clone(),
        }
    }
}

/// Ordered feature schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    /// Families in tensor channel order
    pub families: Vec<FeatureFamily>,

    /// Statistic names in tensor slot order
    pub statistics: Vec<String>,
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::fma()
    }
}

impl FeatureSchema {
    /// The 74-channel layout of the FMA `features.csv` table
    pub fn fma() -> Self {
        Self {
            families: vec![
                FeatureFamily::multi("chroma_cens", 12),
                FeatureFamily::multi("chroma_cqt", 12),
                FeatureFamily::multi("chroma_stft", 12),
                FeatureFamily::multi("mfcc", 20),
                FeatureFamily::scalar("rmse"),
                FeatureFamily::scalar("spectral_bandwidth"),
                FeatureFamily::scalar("spectral_centroid"),
                FeatureFamily::multi("spectral_contrast", 7),
                FeatureFamily::scalar("spectral_rolloff"),
                FeatureFamily::multi("tonnetz", 6),
                FeatureFamily::scalar("zcr"),
            ],
            statistics: DEFAULT_STATISTICS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Load a schema from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> FeatureResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(FeatureError::InputNotFound {
                path: path.display().to_string(),
            });
        }
        let schema: Self = serde_json::from_str(&fs::read_to_string(path)?)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Check internal consistency
    pub fn validate(&self) -> FeatureResult<()> {
        if self.families.is_empty() {
            return Err(FeatureError::InvalidSchema("no feature families".into()));
        }
        if self.statistics.is_empty() {
            return Err(FeatureError::InvalidSchema("no statistics".into()));
        }

        for (i, family) in self.families.iter().enumerate() {
            if self.families[..i].iter().any(|f| f.name == family.name) {
                return Err(FeatureError::InvalidSchema(format!(
                    "family '{}' declared twice",
                    family.name
                )));
            }
            if let FamilyKind::MultiChannel { channels } = family.kind {
                // Sub-indices are two-digit zero-padded
                if channels == 0 || channels > 99 {
                    return Err(FeatureError::InvalidSchema(format!(
                        "family '{}' declares {} channels",
                        family.name, channels
                    )));
                }
            }
        }

        for (i, stat) in self.statistics.iter().enumerate() {
            if self.statistics[..i].contains(stat) {
                return Err(FeatureError::InvalidSchema(format!(
                    "statistic '{}' declared twice",
                    stat
                )));
            }
        }

        Ok(())
    }

    /// Total channel count (tensor axis 1)
    pub fn channel_count(&self) -> usize {
        self.families.iter().map(|f| f.kind.channel_count()).sum()
    }

    /// Statistic count (tensor axis 2)
    pub fn statistic_count(&self) -> usize {
        self.statistics.len()
    }

    /// Channels in tensor order
    pub fn channels(&self) -> Vec<ChannelId> {
        let mut out = Vec::with_capacity(self.channel_count());
        for family in &self.families {
            match family.kind {
                FamilyKind::Scalar => out.push(ChannelId {
                    family: family.name.clone(),
                    number: None,
                }),
                FamilyKind::MultiChannel { channels } => {
                    out.extend((1..=channels).map(|n| ChannelId {
                        family: family.name.clone(),
                        number: Some(format!("{:02}", n)),
                    }));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fma_dimensions() {
        let schema = FeatureSchema::fma();
        assert_eq!(schema.channel_count(), 74);
        assert_eq!(schema.statistic_count(), 7);
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn test_channel_order() {
        let channels = FeatureSchema::fma().channels();
        assert_eq!(channels.len(), 74);
        assert_eq!(channels[0].label(), "chroma_cens_01");
        assert_eq!(channels[11].label(), "chroma_cens_12");
        assert_eq!(channels[36].label(), "mfcc_01");
        assert_eq!(channels[56].label(), "rmse");
        assert_eq!(channels[73].label(), "zcr");
    }

    #[test]
    fn test_duplicate_family_rejected() {
        let schema = FeatureSchema {
            families: vec![FeatureFamily::scalar("zcr"), FeatureFamily::scalar("zcr")],
            statistics: vec!["mean".into()],
        };
        assert!(matches!(schema.validate(), Err(FeatureError::InvalidSchema(_))));
    }

    #[test]
    fn test_json_tagging() {
        let family = FeatureFamily::multi("mfcc", 20);
        let json = serde_json::to_string(&family).unwrap();
        assert_eq!(json, r#"{"name":"mfcc","kind":"multi_channel","channels":20}"#);

        let scalar: FeatureFamily = serde_json::from_str(r#"{"name":"zcr","kind":"scalar"}"#).unwrap();
        assert_eq!(scalar, FeatureFamily::scalar("zcr"));
    }
}
