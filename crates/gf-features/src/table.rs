//! Tabular feature input
//!
//! Feature files carry a three-row header, one row per column-key level:
//!
//! ```text
//! feature,chroma_cens,chroma_cens,...,zcr
//! statistics,kurtosis,kurtosis,...,std
//! number,01,02,...,01
//! track_id,,,...,
//! 2,7.18,5.23,...,0.04
//! ```
//!
//! The first cell of each header row names its level. The optional fourth
//! row (index name, every other cell empty) is skipped.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use ndarray::{Array2, Axis};

use crate::error::{FeatureError, FeatureResult};

/// Number of header rows in a feature file
pub const HEADER_ROWS: usize = 3;

/// Hierarchical column key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnKey {
    /// Feature family name
    pub feature: String,

    /// Statistic name
    pub statistic: String,

    /// Sub-index, absent for scalar features
    pub number: Option<String>,
}

impl ColumnKey {
    pub fn new(feature: &str, statistic: &str, number: Option<&str>) -> Self {
        Self {
            feature: feature.to_string(),
            statistic: statistic.to_string(),
            number: number.map(str::to_string),
        }
    }
}

/// Header level order, resolved from the level names
#[derive(Debug, Clone, Copy)]
struct LevelIndex {
    feature: usize,
    statistic: usize,
    number: usize,
}

impl LevelIndex {
    fn resolve(names: [&str; HEADER_ROWS]) -> Self {
        let find = |wanted: &[&str]| names.iter().position(|n| wanted.contains(&n.to_ascii_lowercase().as_str()));

        match (
            find(&["feature"]),
            find(&["statistics", "statistic"]),
            find(&["number"]),
        ) {
            (Some(feature), Some(statistic), Some(number)) => Self {
                feature,
                statistic,
                number,
            },
            _ => Self {
                feature: 0,
                statistic: 1,
                number: 2,
            },
        }
    }
}

/// Feature values keyed by track id and hierarchical column key
#[derive(Debug, Clone)]
pub struct FeatureTable {
    track_ids: Vec<String>,
    columns: Vec<ColumnKey>,
    values: Array2<f32>,
}

impl FeatureTable {
    /// Assemble a table, checking that the shapes agree
    pub fn new(track_ids: Vec<String>, columns: Vec<ColumnKey>, values: Array2<f32>) -> FeatureResult<Self> {
        let expected = (track_ids.len(), columns.len());
        if values.dim() != expected {
            return Err(FeatureError::ShapeMismatch {
                expected: format!("{:?}", expected),
                got: format!("{:?}", values.dim()),
            });
        }
        Ok(Self {
            track_ids,
            columns,
            values,
        })
    }

    /// Read a feature CSV file
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> FeatureResult<Self> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FeatureError::InputNotFound { path: name.clone() },
            _ => FeatureError::Io(e),
        })?;
        let table = Self::from_reader(file, &name)?;
        log::info!(
            "Loaded {} tracks x {} columns from {}",
            table.n_tracks(),
            table.n_columns(),
            name
        );
        Ok(table)
    }

    /// Read feature CSV data; `source` names the input in errors
    pub fn from_reader<R: Read>(reader: R, source: &str) -> FeatureResult<Self> {
        let csv_err = |e: csv::Error| FeatureError::Csv {
            path: source.to_string(),
            source: e,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        let mut records = reader.records();

        let mut header = Vec::with_capacity(HEADER_ROWS);
        for _ in 0..HEADER_ROWS {
            match records.next() {
                Some(record) => header.push(record.map_err(csv_err)?),
                None => {
                    return Err(FeatureError::MalformedHeader {
                        path: source.to_string(),
                        reason: format!("expected {} header rows", HEADER_ROWS),
                    })
                }
            }
        }

        let width = header[0].len();
        if width < 2 || header.iter().any(|r| r.len() != width) {
            return Err(FeatureError::MalformedHeader {
                path: source.to_string(),
                reason: format!(
                    "header rows have widths {:?}",
                    header.iter().map(|r| r.len()).collect::<Vec<_>>()
                ),
            });
        }

        let levels = LevelIndex::resolve([&header[0][0], &header[1][0], &header[2][0]]);
        let columns: Vec<ColumnKey> = (1..width)
            .map(|j| {
                let number = header[levels.number][j].trim();
                ColumnKey {
                    feature: header[levels.feature][j].trim().to_string(),
                    statistic: header[levels.statistic][j].trim().to_string(),
                    number: (!number.is_empty()).then(|| number.to_string()),
                }
            })
            .collect();

        let mut track_ids = Vec::new();
        let mut flat = Vec::new();
        let mut first_row = true;
        for record in records {
            let record = record.map_err(csv_err)?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            // Index-name row written by pandas: full width, only the first cell set
            let index_row = first_row
                && record.len() == width
                && !record[0].is_empty()
                && record.iter().skip(1).all(str::is_empty);
            first_row = false;
            if index_row {
                continue;
            }

            if record.len() != width {
                return Err(FeatureError::MalformedRow {
                    path: source.to_string(),
                    line,
                    reason: format!("expected {} cells, got {}", width, record.len()),
                });
            }

            track_ids.push(record[0].trim().to_string());
            for (j, cell) in record.iter().enumerate().skip(1) {
                let value = cell.trim().parse::<f32>().map_err(|_| FeatureError::MalformedRow {
                    path: source.to_string(),
                    line,
                    reason: format!("column {}: cannot parse '{}'", j, cell),
                })?;
                flat.push(value);
            }
        }

        let values = Array2::from_shape_vec((track_ids.len(), columns.len()), flat).map_err(|e| {
            FeatureError::ShapeMismatch {
                expected: format!("({}, {})", track_ids.len(), columns.len()),
                got: e.to_string(),
            }
        })?;

        Self::new(track_ids, columns, values)
    }

    pub fn n_tracks(&self) -> usize {
        self.track_ids.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn track_ids(&self) -> &[String] {
        &self.track_ids
    }

    pub fn columns(&self) -> &[ColumnKey] {
        &self.columns
    }

    /// Values, shape `(tracks, columns)`
    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    /// Same keys with replaced values (e.g. after scaling)
    pub fn with_values(&self, values: Array2<f32>) -> FeatureResult<Self> {
        Self::new(self.track_ids.clone(), self.columns.clone(), values)
    }

    /// Subset of rows, in the given order
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            track_ids: rows.iter().map(|&i| self.track_ids[i].clone()).collect(),
            columns: self.columns.clone(),
            values: self.values.select(Axis(0), rows),
        }
    }
}

/// Raw genre labels keyed by track id
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    track_ids: Vec<String>,
    labels: Vec<String>,
}

impl LabelTable {
    pub fn new(track_ids: Vec<String>, labels: Vec<String>) -> FeatureResult<Self> {
        if track_ids.len() != labels.len() {
            return Err(FeatureError::ShapeMismatch {
                expected: format!("{} labels", track_ids.len()),
                got: format!("{} labels", labels.len()),
            });
        }
        let mut seen = HashSet::with_capacity(track_ids.len());
        if let Some(dup) = track_ids.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(FeatureError::DuplicateTrackId(dup.clone()));
        }
        Ok(Self { track_ids, labels })
    }

    /// Read a `track_id,label` CSV file with one header row
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> FeatureResult<Self> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FeatureError::InputNotFound { path: name.clone() },
            _ => FeatureError::Io(e),
        })?;
        let table = Self::from_reader(file, &name)?;
        log::info!("Loaded {} labels from {}", table.len(), name);
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R, source: &str) -> FeatureResult<Self> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);

        let mut track_ids = Vec::new();
        let mut labels = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| FeatureError::Csv {
                path: source.to_string(),
                source: e,
            })?;
            if record.len() < 2 {
                return Err(FeatureError::MalformedRow {
                    path: source.to_string(),
                    line: record.position().map(|p| p.line()).unwrap_or(0),
                    reason: "expected track id and label".into(),
                });
            }
            track_ids.push(record[0].trim().to_string());
            labels.push(record[1].trim().to_string());
        }

        Self::new(track_ids, labels)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Labels reordered to match `track_ids`
    pub fn aligned_to(&self, track_ids: &[String]) -> FeatureResult<Vec<String>> {
        let by_id: HashMap<&str, &str> = self
            .track_ids
            .iter()
            .map(String::as_str)
            .zip(self.labels.iter().map(String::as_str))
            .collect();

        track_ids
            .iter()
            .map(|id| {
                by_id
                    .get(id.as_str())
                    .map(|l| l.to_string())
                    .ok_or_else(|| FeatureError::MissingLabel(id.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PANDAS_CSV: &str = "\
feature,mfcc,mfcc,zcr
statistics,mean,std,mean
number,01,01,01
track_id,,,
2,1.5,0.5,0.1
5,2.5,0.25,0.2
";

    #[test]
    fn test_pandas_header() {
        let table = FeatureTable::from_reader(PANDAS_CSV.as_bytes(), "mem").unwrap();
        assert_eq!(table.n_tracks(), 2);
        assert_eq!(table.n_columns(), 3);
        assert_eq!(table.track_ids(), &["2".to_string(), "5".to_string()]);
        assert_eq!(table.columns()[1], ColumnKey::new("mfcc", "std", Some("01")));
        assert_eq!(table.values()[[1, 0]], 2.5);
    }

    #[test]
    fn test_levels_resolved_by_name() {
        let csv = "\
number,01,
feature,chroma_cens,rmse
statistics,mean,mean
7,0.5,0.75
";
        let table = FeatureTable::from_reader(csv.as_bytes(), "mem").unwrap();
        assert_eq!(table.columns()[0], ColumnKey::new("chroma_cens", "mean", Some("01")));
        assert_eq!(table.columns()[1], ColumnKey::new("rmse", "mean", None));
        assert_eq!(table.n_tracks(), 1);
    }

    #[test]
    fn test_bad_value_reports_line() {
        let csv = "\
feature,zcr
statistics,mean
number,01
1,0.5
2,oops
";
        let err = FeatureTable::from_reader(csv.as_bytes(), "mem").unwrap_err();
        match err {
            FeatureError::MalformedRow { line, .. } => assert_eq!(line, 5),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_truncated_first_row_is_not_skipped() {
        let csv = "\
feature,zcr,zcr
statistics,mean,std
number,01,01
7
8,0.5,0.1
";
        let err = FeatureTable::from_reader(csv.as_bytes(), "mem").unwrap_err();
        match err {
            FeatureError::MalformedRow { line, .. } => assert_eq!(line, 4),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_index_row_only_before_data() {
        let csv = "\
feature,zcr
statistics,mean
number,01
1,0.5
track_id,
";
        assert!(matches!(
            FeatureTable::from_reader(csv.as_bytes(), "mem"),
            Err(FeatureError::MalformedRow { line: 5, .. })
        ));
    }

    #[test]
    fn test_short_header() {
        let csv = "feature,zcr\nstatistics,mean\n";
        assert!(matches!(
            FeatureTable::from_reader(csv.as_bytes(), "mem"),
            Err(FeatureError::MalformedHeader { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            FeatureTable::from_csv_path("/nonexistent/X_train.csv"),
            Err(FeatureError::InputNotFound { .. })
        ));
    }

    #[test]
    fn test_label_alignment() {
        let labels = LabelTable::from_reader("track_id,genre\n5,Rock\n2,Jazz\n".as_bytes(), "mem").unwrap();
        let aligned = labels.aligned_to(&["2".to_string(), "5".to_string()]).unwrap();
        assert_eq!(aligned, vec!["Jazz".to_string(), "Rock".to_string()]);

        assert!(matches!(
            labels.aligned_to(&["9".to_string()]),
            Err(FeatureError::MissingLabel(_))
        ));
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let err = LabelTable::from_reader("track_id,genre\n5,Rock\n2,Jazz\n5,Pop\n".as_bytes(), "mem").unwrap_err();
        assert!(matches!(err, FeatureError::DuplicateTrackId(id) if id == "5"));
    }

    #[test]
    fn test_select_rows() {
        let table = FeatureTable::from_reader(PANDAS_CSV.as_bytes(), "mem").unwrap();
        let sub = table.select_rows(&[1]);
        assert_eq!(sub.track_ids(), &["5".to_string()]);
        assert_eq!(sub.values().dim(), (1, 3));
    }
}
