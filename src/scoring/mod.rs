//! Scores feature windows against a trained forest. Higher `anomaly_score`
//! always means more anomalous, whatever the model's own polarity.

use crate::error::Result;
use crate::features::FeatureMatrix;
use crate::model::{IsolationForest, ModelArtifact};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowScore {
    pub window_end: DateTime<Utc>,
    pub anomaly_score: f64,
}

pub struct Scorer {
    forest: IsolationForest,
}

impl Scorer {
    pub fn new(forest: IsolationForest) -> Self {
        Self { forest }
    }

    pub fn from_artifact(artifact: ModelArtifact) -> Self {
        Self::new(artifact.forest)
    }

    /// One score per matrix row, same order. Fails with `ScoringInputMismatch`
    /// if the matrix columns differ from the ones the forest was trained on.
    pub fn score(&self, matrix: &FeatureMatrix) -> Result<Vec<WindowScore>> {
        self.forest.schema().ensure_matches(matrix.schema())?;

        let normality = self.forest.decision_function(matrix);
        Ok(matrix
            .rows()
            .iter()
            .zip(normality)
            .map(|(row, n)| WindowScore {
                window_end: row.window_end,
                anomaly_score: -n,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureVector;
    use crate::model::ForestParams;
    use chrono::TimeZone;

    fn vectors(means: &[f64]) -> Vec<FeatureVector> {
        means
            .iter()
            .enumerate()
            .map(|(i, &m)| FeatureVector {
                window_end: Utc.timestamp_opt(300 * (i as i64 + 1), 0).unwrap(),
                mean: m,
                std: 0.2,
                min: m,
                max: m,
                count: 60,
                median: m,
                mad: 0.0,
                range: 0.0,
            })
            .collect()
    }

    #[test]
    fn scores_flip_sign_of_normality() {
        let m = FeatureMatrix::from_vectors(&vectors(&[1.0, 1.1, 0.9, 1.0, 40.0]));
        let forest = IsolationForest::fit(&m, ForestParams::default()).unwrap();
        let normality = forest.decision_function(&m);
        let scores = Scorer::new(forest).score(&m).unwrap();

        assert_eq!(scores.len(), 5);
        for (s, n) in scores.iter().zip(&normality) {
            assert_eq!(s.anomaly_score, -n);
        }
        let top = scores
            .iter()
            .max_by(|a, b| a.anomaly_score.total_cmp(&b.anomaly_score))
            .unwrap();
        assert_eq!(top.window_end, Utc.timestamp_opt(1500, 0).unwrap());
    }

    #[test]
    fn order_and_window_ends_follow_input() {
        let train = FeatureMatrix::from_vectors(&vectors(&[1.0, 2.0, 3.0]));
        let forest = IsolationForest::fit(&train, ForestParams::default()).unwrap();
        let fresh = FeatureMatrix::from_vectors(&vectors(&[3.0, 2.0, 1.0, 9.0]));
        let scores = Scorer::new(forest).score(&fresh).unwrap();
        let ends: Vec<i64> = scores.iter().map(|s| s.window_end.timestamp()).collect();
        assert_eq!(ends, vec![300, 600, 900, 1200]);
        assert!(scores.iter().all(|s| s.anomaly_score.is_finite()));
    }

    #[test]
    fn empty_matrix_scores_nothing() {
        let train = FeatureMatrix::from_vectors(&vectors(&[1.0, 2.0]));
        let forest = IsolationForest::fit(&train, ForestParams::default()).unwrap();
        let scores = Scorer::new(forest).score(&FeatureMatrix::from_vectors(&[])).unwrap();
        assert!(scores.is_empty());
    }
}
