//! Feature Pipeline Benchmarks
//!
//! Column plan resolution, tensor copying and per-slot scaling on an
//! FMA-sized table.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gf_features::{ColumnKey, ColumnPlan, FeatureSchema, StandardScaler};
use ndarray::{Array2, Array3};

const TRACK_COUNTS: &[usize] = &[256, 1024, 6000];

fn schema_columns(schema: &FeatureSchema) -> Vec<ColumnKey> {
    schema
        .channels()
        .iter()
        .flat_map(|ch| {
            schema
                .statistics
                .iter()
                .map(move |stat| ColumnKey::new(&ch.family, stat, ch.number.as_deref()))
        })
        .collect()
}

fn bench_plan_resolve(c: &mut Criterion) {
    let schema = FeatureSchema::fma();
    let columns = schema_columns(&schema);

    c.bench_function("plan_resolve_fma", |b| {
        b.iter(|| black_box(ColumnPlan::resolve(&schema, &columns)))
    });
}

fn bench_tensor_build(c: &mut Criterion) {
    let schema = FeatureSchema::fma();
    let columns = schema_columns(&schema);
    let plan = ColumnPlan::resolve(&schema, &columns).expect("schema columns resolve");

    let mut group = c.benchmark_group("tensor_build");
    for &tracks in TRACK_COUNTS {
        group.throughput(Throughput::Bytes((tracks * columns.len() * 4) as u64));
        let values = Array2::from_shape_fn((tracks, columns.len()), |(t, j)| (t ^ j) as f32);

        group.bench_with_input(BenchmarkId::new("build", tracks), &tracks, |b, _| {
            b.iter(|| black_box(plan.build(&values)))
        });
    }
    group.finish();
}

fn bench_scaler(c: &mut Criterion) {
    let mut group = c.benchmark_group("standard_scaler");
    for &tracks in TRACK_COUNTS {
        let tensor = Array3::from_shape_fn((tracks, 74, 7), |(t, c, s)| ((t * 31 + c * 7 + s) % 97) as f32);

        group.bench_with_input(BenchmarkId::new("fit_transform_tensor", tracks), &tracks, |b, _| {
            b.iter(|| black_box(StandardScaler::fit_transform_tensor(&tensor)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_plan_resolve, bench_tensor_build, bench_scaler);
criterion_main!(benches);
