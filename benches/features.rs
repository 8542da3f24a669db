//! Feature extraction benchmark: raw samples → epoch-aligned windows.

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use edgepulse_ml::features::{extract_windows, FeatureMatrix, Sample};

fn make_samples(n: i64) -> Vec<Sample> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| Sample::new(start + Duration::seconds(i), (i % 97) as f64 * 0.5))
        .collect()
}

fn bench_extract_windows(c: &mut Criterion) {
    let mut g = c.benchmark_group("extract_windows");
    for n in [3_600, 86_400] {
        let samples = make_samples(n);
        g.bench_with_input(BenchmarkId::from_parameter(n), &samples, |b, s| {
            b.iter(|| extract_windows(black_box(s), 300).unwrap())
        });
    }
    g.finish();
}

fn bench_matrix(c: &mut Criterion) {
    let windows = extract_windows(&make_samples(86_400), 300).unwrap();
    c.bench_function("feature_matrix_288_windows", |b| {
        b.iter(|| FeatureMatrix::from_vectors(black_box(&windows)))
    });
}

criterion_group!(benches, bench_extract_windows, bench_matrix);
criterion_main!(benches);
