//! Feature table → `(track, channel, statistic)` tensor
//!
//! Building happens in two steps. [`ColumnPlan::resolve`] walks the schema in
//! declared order and maps every tensor slot to a table column, failing on
//! any disagreement between schema and table. [`ColumnPlan::build`] then
//! only copies values, so a resolved plan always yields a complete tensor.

use std::collections::{BTreeMap, HashMap};

use ndarray::{s, Array2, Array3};

use crate::error::{FeatureError, FeatureResult};
use crate::schema::{ChannelId, FamilyKind, FeatureSchema};
use crate::table::{ColumnKey, FeatureTable};

/// Validated mapping from tensor slots to table columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPlan {
    channels: Vec<ChannelId>,

    /// `slots[channel][statistic]` = table column index
    slots: Vec<Vec<usize>>,

    n_statistics: usize,

    /// Column count of the table the plan was resolved against
    source_columns: usize,
}

/// `"1"` and `"01"` name the same sub-index
fn normalize_number(number: Option<&str>) -> Option<String> {
    number.map(|n| match n.parse::<u32>() {
        Ok(v) => format!("{:02}", v),
        Err(_) => n.to_string(),
    })
}

type StatColumns<'a> = Vec<(&'a str, usize)>;

impl ColumnPlan {
    /// Map each schema channel and statistic to a column of `columns`
    pub fn resolve(schema: &FeatureSchema, columns: &[ColumnKey]) -> FeatureResult<Self> {
        schema.validate()?;

        // family -> sub-index -> (statistic, column)
        let mut grouped: HashMap<&str, BTreeMap<Option<String>, StatColumns<'_>>> = HashMap::new();
        for (idx, key) in columns.iter().enumerate() {
            grouped
                .entry(key.feature.as_str())
                .or_default()
                .entry(normalize_number(key.number.as_deref()))
                .or_default()
                .push((key.statistic.as_str(), idx));
        }

        let mut channels = Vec::with_capacity(schema.channel_count());
        let mut slots = Vec::with_capacity(schema.channel_count());

        for family in &schema.families {
            let groups = grouped.get(family.name.as_str()).ok_or_else(|| FeatureError::MissingFamily {
                family: family.name.clone(),
            })?;
            let found = || {
                groups
                    .keys()
                    .map(|k| k.clone().unwrap_or_else(|| "<none>".into()))
                    .collect::<Vec<_>>()
            };

            match family.kind {
                FamilyKind::Scalar => {
                    let mut only = groups.values();
                    let stats = match (only.next(), only.next()) {
                        (Some(stats), None) => stats,
                        _ => {
                            return Err(FeatureError::ChannelCountMismatch {
                                family: family.name.clone(),
                                expected: 1,
                                found: found(),
                            })
                        }
                    };
                    let channel = ChannelId {
                        family: family.name.clone(),
                        number: None,
                    };
                    slots.push(Self::statistic_slots(schema, &channel, stats)?);
                    channels.push(channel);
                }
                FamilyKind::MultiChannel { channels: count } => {
                    let matches = groups.len() == count
                        && (1..=count).all(|n| groups.contains_key(&Some(format!("{:02}", n))));
                    if !matches {
                        return Err(FeatureError::ChannelCountMismatch {
                            family: family.name.clone(),
                            expected: count,
                            found: found(),
                        });
                    }

                    for n in 1..=count {
                        let number = format!("{:02}", n);
                        let stats = groups.get(&Some(number.clone())).ok_or_else(|| {
                            FeatureError::ChannelCountMismatch {
                                family: family.name.clone(),
                                expected: count,
                                found: found(),
                            }
                        })?;
                        let channel = ChannelId {
                            family: family.name.clone(),
                            number: Some(number),
                        };
                        slots.push(Self::statistic_slots(schema, &channel, stats)?);
                        channels.push(channel);
                    }
                }
            }
        }

        let ignored: Vec<&str> = grouped
            .keys()
            .filter(|f| !schema.families.iter().any(|fam| fam.name == **f))
            .copied()
            .collect();
        if !ignored.is_empty() {
            log::debug!("Ignoring undeclared feature families: {:?}", ignored);
        }
        log::debug!(
            "Resolved column plan: {} channels x {} statistics",
            channels.len(),
            schema.statistic_count()
        );

        Ok(Self {
            channels,
            slots,
            n_statistics: schema.statistic_count(),
            source_columns: columns.len(),
        })
    }

    fn statistic_slots(schema: &FeatureSchema, channel: &ChannelId, stats: &StatColumns<'_>) -> FeatureResult<Vec<usize>> {
        schema
            .statistics
            .iter()
            .map(|wanted| {
                let mut hits = stats.iter().filter(|(name, _)| name == wanted);
                match (hits.next(), hits.next()) {
                    (Some(&(_, col)), None) => Ok(col),
                    (None, _) => Err(FeatureError::MissingStatistic {
                        channel: channel.label(),
                        statistic: wanted.clone(),
                    }),
                    (Some(_), Some(_)) => Err(FeatureError::DuplicateStatistic {
                        channel: channel.label(),
                        statistic: wanted.clone(),
                    }),
                }
            })
            .collect()
    }

    /// Channels in tensor order
    pub fn channels(&self) -> &[ChannelId] {
        &self.channels
    }

    /// Tensor shape for `tracks` rows
    pub fn shape(&self, tracks: usize) -> (usize, usize, usize) {
        (tracks, self.channels.len(), self.n_statistics)
    }

    /// Copy `values` (shape `(tracks, columns)`) into a tensor
    pub fn build(&self, values: &Array2<f32>) -> FeatureResult<Array3<f32>> {
        if values.ncols() != self.source_columns {
            return Err(FeatureError::ShapeMismatch {
                expected: format!("{} columns", self.source_columns),
                got: format!("{} columns", values.ncols()),
            });
        }

        let mut tensor = Array3::<f32>::zeros(self.shape(values.nrows()));
        for (c, stats) in self.slots.iter().enumerate() {
            for (slot, &col) in stats.iter().enumerate() {
                tensor.slice_mut(s![.., c, slot]).assign(&values.column(col));
            }
        }
        Ok(tensor)
    }
}

/// Resolve a plan for `table` and build its tensor
pub fn build_tensor(schema: &FeatureSchema, table: &FeatureTable) -> FeatureResult<Array3<f32>> {
    let plan = ColumnPlan::resolve(schema, table.columns())?;
    let tensor = plan.build(table.values())?;
    log::info!("Built feature tensor {:?}", tensor.dim());
    Ok(tensor)
}
