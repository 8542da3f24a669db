//! Isolation forest benchmark: fit on a month of windows, score a day.

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use edgepulse_ml::features::{extract_windows, FeatureMatrix, Sample};
use edgepulse_ml::model::{ForestParams, IsolationForest};
use edgepulse_ml::scoring::Scorer;

fn matrix(windows: i64) -> FeatureMatrix {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let samples: Vec<Sample> = (0..windows * 30)
        .map(|i| Sample::new(start + Duration::seconds(i * 10), ((i * 7919) % 1000) as f64 / 10.0))
        .collect();
    FeatureMatrix::from_vectors(&extract_windows(&samples, 300).unwrap())
}

fn bench_fit(c: &mut Criterion) {
    let m = matrix(8_640);
    c.bench_function("forest_fit_8640_windows", |b| {
        b.iter(|| IsolationForest::fit(black_box(&m), ForestParams::default()).unwrap())
    });
}

fn bench_score(c: &mut Criterion) {
    let train = matrix(8_640);
    let day = matrix(288);
    let scorer = Scorer::new(IsolationForest::fit(&train, ForestParams::default()).unwrap());
    c.bench_function("forest_score_288_windows", |b| {
        b.iter(|| scorer.score(black_box(&day)).unwrap())
    });
}

criterion_group!(benches, bench_fit, bench_score);
criterion_main!(benches);
