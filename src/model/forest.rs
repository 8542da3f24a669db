//! Isolation forest over the six model columns.
//!
//! Each tree is grown on a subsample drawn without replacement, splitting on a
//! random non-constant column at a uniform threshold until the point is
//! isolated or `ceil(log2(psi))` is reached. Points that isolate quickly have
//! short average paths and a low normality score.

use crate::error::{PipelineError, Result};
use crate::features::{FeatureColumn, FeatureMatrix, FeatureRow, FeatureSchema};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TREES: usize = 200;
pub const DEFAULT_MAX_SAMPLES: usize = 256;
pub const DEFAULT_SEED: u64 = 42;

/// Offset used by automatic contamination: decision = score_samples + 0.5.
const AUTO_OFFSET: f64 = -0.5;
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    /// Upper bound on the per-tree subsample; the effective size is `min(max_samples, rows)`
    pub max_samples: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: DEFAULT_TREES,
            max_samples: DEFAULT_MAX_SAMPLES,
            seed: DEFAULT_SEED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        column: FeatureColumn,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn grow(rows: &[FeatureRow], columns: &[FeatureColumn], sample_size: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let idx = rand::seq::index::sample(&mut rng, rows.len(), sample_size).into_vec();
        let max_depth = (sample_size.max(2) as f64).log2().ceil() as usize;

        let mut tree = Self { nodes: Vec::new() };
        tree.split(rows, columns, idx, 0, max_depth, &mut rng);
        tree
    }

    fn split(
        &mut self,
        rows: &[FeatureRow],
        columns: &[FeatureColumn],
        idx: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: idx.len() });
        if depth >= max_depth || idx.len() <= 1 {
            return id;
        }

        let candidates: Vec<(FeatureColumn, f64, f64)> = columns
            .iter()
            .filter_map(|&c| {
                let (lo, hi) = idx.iter().map(|&i| rows[i].value(c)).fold(
                    (f64::INFINITY, f64::NEG_INFINITY),
                    |(lo, hi), v| (lo.min(v), hi.max(v)),
                );
                (hi > lo && (hi - lo).is_finite()).then_some((c, lo, hi))
            })
            .collect();
        if candidates.is_empty() {
            return id;
        }

        let (column, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let mut threshold = lo + rng.gen::<f64>() * (hi - lo);
        if threshold >= hi {
            threshold = lo;
        }

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = idx
            .into_iter()
            .partition(|&i| rows[i].value(column) <= threshold);
        let left = self.split(rows, columns, left_idx, depth + 1, max_depth, rng);
        let right = self.split(rows, columns, right_idx, depth + 1, max_depth, rng);
        self.nodes[id] = Node::Split {
            column,
            threshold,
            left,
            right,
        };
        id
    }

    /// Children always come after their parent, so traversal terminates.
    fn is_well_formed(&self) -> bool {
        !self.nodes.is_empty()
            && self.nodes.iter().enumerate().all(|(id, node)| match *node {
                Node::Leaf { .. } => true,
                Node::Split {
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    let len = self.nodes.len();
                    left > id && right > id && left < len && right < len && !threshold.is_nan()
                }
            })
    }

    /// Depth at which `row` lands, adjusted for the unresolved size of its leaf.
    fn path_length(&self, row: &FeatureRow) -> f64 {
        let mut id = 0;
        let mut depth = 0.0;
        while let Some(node) = self.nodes.get(id) {
            match *node {
                Node::Leaf { size } => return depth + average_path_length(size),
                Node::Split {
                    column,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row.value(column) <= threshold { left } else { right };
                    depth += 1.0;
                }
            }
        }
        depth
    }
}

/// Expected path length of an unsuccessful BST search among `n` points.
pub(crate) fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    params: ForestParams,
    schema: FeatureSchema,
    sample_size: usize,
    offset: f64,
    trees: Vec<IsolationTree>,
}

impl IsolationForest {
    /// Fit on a non-empty matrix. Trees are grown in parallel, tree `t` seeded
    /// with `seed + t`, so the result does not depend on the thread count.
    pub fn fit(matrix: &FeatureMatrix, params: ForestParams) -> Result<Self> {
        if matrix.is_empty() {
            return Err(PipelineError::InvalidInput(
                "cannot fit an isolation forest on an empty feature matrix".into(),
            ));
        }
        if params.n_estimators == 0 || params.max_samples == 0 {
            return Err(PipelineError::InvalidInput(
                "n_estimators and max_samples must be positive".into(),
            ));
        }

        let rows = matrix.rows();
        let columns = matrix.schema().columns();
        let sample_size = params.max_samples.min(rows.len());

        let trees: Vec<IsolationTree> = (0..params.n_estimators)
            .into_par_iter()
            .map(|t| IsolationTree::grow(rows, columns, sample_size, params.seed.wrapping_add(t as u64)))
            .collect();

        tracing::debug!(
            trees = trees.len(),
            sample_size,
            rows = rows.len(),
            "isolation forest fitted"
        );

        Ok(Self {
            params,
            schema: matrix.schema().clone(),
            sample_size,
            offset: AUTO_OFFSET,
            trees,
        })
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Columns (and their order) the forest was trained on.
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Structural check for forests read back from storage.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".into());
        }
        if let Some(i) = self.trees.iter().position(|t| !t.is_well_formed()) {
            return Err(format!("tree {i} is malformed"));
        }
        Ok(())
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// `-2^(-E[h(x)] / c(psi))`, in [-1, 0); lower is more abnormal.
    pub fn score_sample(&self, row: &FeatureRow) -> f64 {
        let mean_depth =
            self.trees.iter().map(|t| t.path_length(row)).sum::<f64>() / self.trees.len().max(1) as f64;
        let c = average_path_length(self.sample_size);
        let ratio = if c > 0.0 { mean_depth / c } else { 1.0 };
        -(2f64.powf(-ratio))
    }

    /// Normality per row: positive for inliers, negative for outliers.
    pub fn decision_function(&self, matrix: &FeatureMatrix) -> Vec<f64> {
        matrix
            .rows()
            .iter()
            .map(|row| self.score_sample(row) - self.offset)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureVector;
    use chrono::{TimeZone, Utc};

    fn vectors(means: &[f64]) -> Vec<FeatureVector> {
        means
            .iter()
            .enumerate()
            .map(|(i, &m)| FeatureVector {
                window_end: Utc.timestamp_opt(300 * (i as i64 + 1), 0).unwrap(),
                mean: m,
                std: 1.0,
                min: m - 1.0,
                max: m + 1.0,
                count: 300,
                median: m,
                mad: 0.5,
                range: 2.0,
            })
            .collect()
    }

    #[test]
    fn path_length_constants() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!((average_path_length(256) - 10.244_770_920_119_917).abs() < 1e-9);
    }

    #[test]
    fn empty_matrix_is_rejected() {
        let m = FeatureMatrix::from_vectors(&[]);
        assert!(IsolationForest::fit(&m, ForestParams::default()).is_err());
    }

    #[test]
    fn outlier_scores_lower_than_inliers() {
        let mut means: Vec<f64> = (0..64).map(|i| 10.0 + (i % 5) as f64 * 0.1).collect();
        means.push(500.0);
        let m = FeatureMatrix::from_vectors(&vectors(&means));
        let forest = IsolationForest::fit(&m, ForestParams::default()).unwrap();
        let normality = forest.decision_function(&m);
        let outlier = *normality.last().unwrap();
        let min_inlier = normality[..64].iter().copied().fold(f64::INFINITY, f64::min);
        assert!(outlier < min_inlier, "outlier {outlier} vs inlier {min_inlier}");
        assert!(outlier < 0.0);
    }

    #[test]
    fn same_seed_same_forest() {
        let m = FeatureMatrix::from_vectors(&vectors(&[1.0, 2.0, 3.0, 50.0, 4.0, 5.0]));
        let a = IsolationForest::fit(&m, ForestParams::default()).unwrap();
        let b = IsolationForest::fit(&m, ForestParams::default()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.n_trees(), DEFAULT_TREES);
    }

    #[test]
    fn fitted_forest_is_well_formed() {
        let m = FeatureMatrix::from_vectors(&vectors(&[1.0, 2.0, 3.0, 50.0]));
        let forest = IsolationForest::fit(&m, ForestParams::default()).unwrap();
        assert!(forest.validate().is_ok());

        let mut broken = forest.clone();
        broken.trees[0].nodes = vec![Node::Split {
            column: FeatureColumn::Mean,
            threshold: 1.0,
            left: 0,
            right: 0,
        }];
        assert!(broken.validate().is_err());
    }

    #[test]
    fn single_row_scores_neutral() {
        let m = FeatureMatrix::from_vectors(&vectors(&[1.0]));
        let forest = IsolationForest::fit(&m, ForestParams::default()).unwrap();
        assert_eq!(forest.decision_function(&m), vec![0.0]);
    }

    #[test]
    fn constant_rows_do_not_split() {
        let m = FeatureMatrix::from_vectors(&vectors(&[7.0; 10]));
        let forest = IsolationForest::fit(&m, ForestParams::default()).unwrap();
        let scores = forest.decision_function(&m);
        assert!(scores.iter().all(|s| s.is_finite()));
        assert!(scores.windows(2).all(|p| p[0] == p[1]));
    }
}
