//! Tensor builder integration tests
//!
//! Exercises the full 74-channel schema through CSV loading, scaling,
//! label coding and tensor construction.

use std::fmt::Write as _;
use std::fs;

use approx::assert_abs_diff_eq;
use gf_features::{
    build_tensor, prepare_training_data, ColumnKey, FamilyKind, FeatureError, FeatureFamily, FeatureSchema,
    FeatureTable, LabelTable,
};
use ndarray::Array2;
use tempfile::TempDir;

const TRACKS: usize = 6;

/// Column keys in FMA file order: grouped by family, then statistic, then number
fn fma_columns(schema: &FeatureSchema) -> Vec<ColumnKey> {
    let mut columns = Vec::new();
    for family in &schema.families {
        for stat in &schema.statistics {
            match family.kind {
                FamilyKind::Scalar => columns.push(ColumnKey::new(&family.name, stat, Some("01"))),
                FamilyKind::MultiChannel { channels } => {
                    for n in 1..=channels {
                        columns.push(ColumnKey::new(&family.name, stat, Some(format!("{:02}", n).as_str())));
                    }
                }
            }
        }
    }
    columns
}

/// Pandas-style CSV with every value set by `value(track, column)`
fn fma_csv(schema: &FeatureSchema, value: impl Fn(usize, usize) -> f32) -> String {
    let columns = fma_columns(schema);
    let mut out = String::new();

    out.push_str("feature");
    for c in &columns {
        write!(out, ",{}", c.feature).unwrap();
    }
    out.push_str("\nstatistics");
    for c in &columns {
        write!(out, ",{}", c.statistic).unwrap();
    }
    out.push_str("\nnumber");
    for c in &columns {
        write!(out, ",{}", c.number.as_deref().unwrap_or("")).unwrap();
    }
    out.push_str("\ntrack_id");
    out.push_str(&",".repeat(columns.len()));
    out.push('\n');

    for t in 0..TRACKS {
        write!(out, "{}", 100 + t).unwrap();
        for j in 0..columns.len() {
            write!(out, ",{}", value(t, j)).unwrap();
        }
        out.push('\n');
    }
    out
}

#[test]
fn test_track_index_fills_every_slot() {
    let schema = FeatureSchema::fma();
    let columns = fma_columns(&schema);
    let values = Array2::from_shape_fn((TRACKS, columns.len()), |(t, _)| t as f32);
    let ids = (0..TRACKS).map(|t| t.to_string()).collect();
    let table = FeatureTable::new(ids, columns, values).unwrap();

    let tensor = build_tensor(&schema, &table).unwrap();
    assert_eq!(tensor.dim(), (TRACKS, 74, 7));
    for ((t, _, _), &v) in tensor.indexed_iter() {
        assert_eq!(v, t as f32);
    }
}

#[test]
fn test_build_is_deterministic() {
    let schema = FeatureSchema::fma();
    let csv = fma_csv(&schema, |t, j| (t * 1000 + j) as f32 * 0.37);
    let table = FeatureTable::from_reader(csv.as_bytes(), "mem").unwrap();

    let a = build_tensor(&schema, &table).unwrap();
    let b = build_tensor(&schema, &table).unwrap();
    let bits = |x: &ndarray::Array3<f32>| x.iter().map(|v| v.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(&a), bits(&b));
}

#[test]
fn test_channel_and_statistic_placement() {
    let schema = FeatureSchema::fma();
    let columns = fma_columns(&schema);
    // Encode the column index so the slot can be checked
    let csv = fma_csv(&schema, |_, j| j as f32);
    let table = FeatureTable::from_reader(csv.as_bytes(), "mem").unwrap();
    let tensor = build_tensor(&schema, &table).unwrap();

    let channels = schema.channels();
    for (c, channel) in channels.iter().enumerate() {
        for (s, stat) in schema.statistics.iter().enumerate() {
            let col = tensor[[0, c, s]] as usize;
            assert_eq!(columns[col].feature, channel.family);
            assert_eq!(&columns[col].statistic, stat);
            if let Some(number) = &channel.number {
                assert_eq!(columns[col].number.as_ref(), Some(number));
            }
        }
    }
}

#[test]
fn test_csv_file_roundtrip_and_preparation() {
    let schema = FeatureSchema::fma();
    let dir = TempDir::new().unwrap();
    let x_path = dir.path().join("X_train.csv");
    let y_path = dir.path().join("y_train.csv");

    fs::write(&x_path, fma_csv(&schema, |t, j| (t as f32) * 2.0 + (j % 5) as f32)).unwrap();
    // Deliberately out of track order
    fs::write(
        &y_path,
        "track_id,genre\n105,Rock\n100,Rock\n101,Jazz\n102,Hip-Hop\n103,Jazz\n104,Hip-Hop\n",
    )
    .unwrap();

    let features = FeatureTable::from_csv_path(&x_path).unwrap();
    let labels = LabelTable::from_csv_path(&y_path).unwrap();
    assert_eq!(features.n_tracks(), TRACKS);
    assert_eq!(features.n_columns(), 74 * 7);

    let prepared = prepare_training_data(&schema, &features, &labels).unwrap();
    assert_eq!(prepared.encoder.classes(), &["Hip-Hop", "Jazz", "Rock"]);
    assert_eq!(prepared.dataset.labels, vec![2, 1, 0, 1, 0, 2]);
    assert_eq!(prepared.dataset.features.dim(), (TRACKS, 74, 7));

    // Standardized: every channel/statistic slot has mean 0 and std 1 over tracks
    let tensor = &prepared.dataset.features;
    for c in 0..74 {
        for s in 0..7 {
            let column: Vec<f32> = (0..TRACKS).map(|t| tensor[[t, c, s]]).collect();
            let mean = column.iter().sum::<f32>() / TRACKS as f32;
            let std = (column.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / TRACKS as f32).sqrt();
            assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-5);
            assert_abs_diff_eq!(std, 1.0, epsilon = 1e-4);
        }
    }
}

#[test]
fn test_truncated_family_fails_fast() {
    let schema = FeatureSchema::fma();
    let columns: Vec<ColumnKey> = fma_columns(&schema)
        .into_iter()
        .filter(|c| !(c.feature == "tonnetz" && c.number.as_deref() == Some("06")))
        .collect();
    let values = Array2::zeros((TRACKS, columns.len()));
    let ids = (0..TRACKS).map(|t| t.to_string()).collect();
    let table = FeatureTable::new(ids, columns, values).unwrap();

    match build_tensor(&schema, &table) {
        Err(FeatureError::ChannelCountMismatch { family, expected, found }) => {
            assert_eq!(family, "tonnetz");
            assert_eq!(expected, 6);
            assert_eq!(found.len(), 5);
        }
        other => panic!("expected channel count mismatch, got {other:?}"),
    }
}

#[test]
fn test_scaler_follows_schema_not_file_order() {
    let schema = FeatureSchema {
        families: vec![FeatureFamily::scalar("a"), FeatureFamily::scalar("b")],
        statistics: vec!["mean".into()],
    };
    let ids: Vec<String> = (0..4).map(|t| t.to_string()).collect();
    let labels = LabelTable::new(ids.clone(), ["x", "y", "x", "y"].map(String::from).to_vec()).unwrap();
    let a = ColumnKey::new("a", "mean", None);
    let b = ColumnKey::new("b", "mean", None);

    let ab = FeatureTable::new(
        ids.clone(),
        vec![a.clone(), b.clone()],
        Array2::from_shape_fn((4, 2), |(t, c)| (t + 1000 * c) as f32),
    )
    .unwrap();
    let ba = FeatureTable::new(
        ids,
        vec![b, a],
        Array2::from_shape_fn((4, 2), |(t, c)| (t + 1000 * (1 - c)) as f32),
    )
    .unwrap();

    let from_ab = prepare_training_data(&schema, &ab, &labels).unwrap();
    let from_ba = prepare_training_data(&schema, &ba, &labels).unwrap();
    assert_eq!(from_ab.scaler, from_ba.scaler);
    assert_abs_diff_eq!(from_ab.scaler.mean()[0], 1.5);
    assert_abs_diff_eq!(from_ab.scaler.mean()[1], 1001.5);

    for prepared in [&from_ab, &from_ba] {
        for channel in 0..2 {
            assert_abs_diff_eq!(prepared.dataset.features[[0, channel, 0]], -1.341_640_7, epsilon = 1e-5);
        }
    }
}
