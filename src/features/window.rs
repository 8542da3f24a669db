//! Windowing: samples → sort → epoch-aligned buckets → one feature vector per non-empty bucket.

use super::stats::{mad, median, population_std};
use super::{FeatureVector, Sample};
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};

/// Widest accepted window: one leap year.
pub const MAX_WINDOW_SECS: u64 = 366 * 24 * 60 * 60;

/// Aggregate `samples` into fixed-width windows of `window_secs` seconds.
///
/// Buckets are anchored at the Unix epoch: a sample at `t` belongs to bucket
/// `floor(t / W)` whose `window_end` is `(floor(t / W) + 1) * W`. Output is in
/// ascending `window_end` order and contains no empty windows. NaN values carry
/// no information and are skipped, so they never count towards a window.
///
/// `window_secs` must be in `1..=MAX_WINDOW_SECS`. A sample whose window end
/// falls outside the representable time range is an error, never dropped.
pub fn extract_windows(samples: &[Sample], window_secs: u64) -> Result<Vec<FeatureVector>> {
    let width_ms = window_width_ms(window_secs)?;
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let mut sorted: Vec<&Sample> = samples.iter().filter(|s| !s.value.is_nan()).collect();
    let skipped = samples.len() - sorted.len();
    if skipped > 0 {
        tracing::debug!(skipped, "ignored NaN samples");
    }
    sorted.sort_by_key(|s| s.ts);

    let mut out = Vec::new();
    let mut bucket: Option<i64> = None;
    let mut values: Vec<f64> = Vec::new();

    for s in sorted {
        let idx = s.ts.timestamp_millis().div_euclid(width_ms);
        if bucket != Some(idx) {
            if let Some(prev) = bucket {
                out.push(summarize(prev, width_ms, &values)?);
            }
            bucket = Some(idx);
            values.clear();
        }
        values.push(s.value);
    }
    if let Some(prev) = bucket {
        out.push(summarize(prev, width_ms, &values)?);
    }
    Ok(out)
}

fn window_width_ms(window_secs: u64) -> Result<i64> {
    if window_secs == 0 || window_secs > MAX_WINDOW_SECS {
        return Err(PipelineError::InvalidInput(format!(
            "window length {window_secs}s outside 1..={MAX_WINDOW_SECS}"
        )));
    }
    i64::try_from(window_secs)
        .ok()
        .and_then(|s| s.checked_mul(1000))
        .ok_or_else(|| PipelineError::InvalidInput(format!("window length {window_secs}s overflows")))
}

/// `values` is non-empty: a bucket is only summarized after a sample landed in it.
fn summarize(bucket: i64, width_ms: i64, values: &[f64]) -> Result<FeatureVector> {
    let window_end = bucket
        .checked_add(1)
        .and_then(|b| b.checked_mul(width_ms))
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .ok_or_else(|| {
            PipelineError::InvalidInput(format!("window after bucket {bucket} ends outside the representable time range"))
        })?;

    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Ok(FeatureVector {
        window_end,
        mean,
        std: population_std(values, mean),
        min,
        max,
        count: n as u64,
        median: median(values),
        mad: mad(values),
        range: max - min,
    })
}
