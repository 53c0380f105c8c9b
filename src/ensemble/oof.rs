//! Out-of-fold meta-feature generation
//!
//! Every training row gets one probability per base learner, produced by a
//! fold-local model that was fitted without that row.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{KolosalError, Result};
use crate::training::{roc_auc, CVSplit, CrossValidator, LearnerConfig, LearnerKind};

/// Meta-feature matrix with the fold provenance of every row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFeatures {
    /// One column per base learner, in learner order
    pub matrix: Array2<f64>,
    /// Learner kind of each column
    pub kinds: Vec<LearnerKind>,
    /// Fold that held out each row
    pub row_fold: Vec<usize>,
    /// The partition used to produce the matrix
    pub splits: Vec<CVSplit>,
}

impl MetaFeatures {
    pub fn n_rows(&self) -> usize {
        self.matrix.nrows()
    }

    /// ROC-AUC of each meta-feature column against the labels
    pub fn column_auc(&self, y: &Array1<f64>) -> Result<Vec<(LearnerKind, f64)>> {
        self.kinds
            .iter()
            .zip(self.matrix.axis_iter(Axis(1)))
            .map(|(&kind, column)| Ok((kind, roc_auc(y, &column.to_owned())?)))
            .collect()
    }
}

/// Produces out-of-fold predictions from tuned learner configurations
#[derive(Debug, Clone)]
pub struct OutOfFoldGenerator {
    n_folds: usize,
    seed: u64,
}

impl Default for OutOfFoldGenerator {
    fn default() -> Self {
        Self::new(5, 42)
    }
}

impl OutOfFoldGenerator {
    pub fn new(n_folds: usize, seed: u64) -> Self {
        Self { n_folds, seed }
    }

    /// Build the meta-feature matrix for `learners` on `(x, y)`.
    ///
    /// A fresh learner is built from each configuration for every fold and
    /// dropped once it has scored its held-out rows.
    pub fn generate(&self, learners: &[LearnerConfig], x: &Array2<f64>, y: &Array1<f64>) -> Result<MetaFeatures> {
        if learners.is_empty() {
            return Err(KolosalError::ValidationError("No base learners to stack".to_string()));
        }
        if x.nrows() != y.len() {
            return Err(KolosalError::ShapeError {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", y.len()),
            });
        }

        let n = x.nrows();
        let splits = CrossValidator::stratified(self.n_folds, self.seed).split(n, Some(y))?;
        let mut matrix = Array2::<f64>::zeros((n, learners.len()));
        let mut writes = Array2::<u8>::zeros((n, learners.len()));
        let mut row_fold = vec![usize::MAX; n];

        info!(folds = splits.len(), learners = learners.len(), rows = n, "Generating out-of-fold meta-features");

        for split in &splits {
            let x_train = x.select(Axis(0), &split.train_indices);
            let y_train = y.select(Axis(0), &split.train_indices);
            let x_held = x.select(Axis(0), &split.test_indices);

            for (col, config) in learners.iter().enumerate() {
                let model = config.build().fit(config, &x_train, &y_train)?;
                let proba = model.predict_proba(&x_held)?;
                for (&row, &p) in split.test_indices.iter().zip(proba.iter()) {
                    matrix[[row, col]] = p;
                    writes[[row, col]] += 1;
                }
                debug!(fold = split.fold_idx, learner = %config.kind(), rows = split.test_indices.len(), "Fold predictions written");
            }

            for &row in &split.test_indices {
                row_fold[row] = split.fold_idx;
            }
        }

        if let Some(((row, col), count)) = writes.indexed_iter().find(|(_, &c)| c != 1) {
            return Err(KolosalError::TrainingError(format!(
                "Meta-feature ({}, {}) written {} times, expected once",
                row, col, count
            )));
        }

        Ok(MetaFeatures {
            matrix,
            kinds: learners.iter().map(LearnerConfig::kind).collect(),
            row_fold,
            splits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::{FittedLearner, KnnConfig};
    use std::collections::HashSet;

    fn blobs(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            let shift = if i % 4 == 0 { 1.5 } else { 0.0 };
            shift + ((i * 13 + j * 7) % 17) as f64 / 17.0
        });
        let y = Array1::from_iter((0..n).map(|i| if i % 4 == 0 { 1.0 } else { 0.0 }));
        (x, y)
    }

    fn knn() -> LearnerConfig {
        LearnerConfig::Knn(KnnConfig::default())
    }

    #[test]
    fn test_held_out_folds_cover_rows_once() {
        let (x, y) = blobs(80);
        let meta = OutOfFoldGenerator::default().generate(&[knn()], &x, &y).unwrap();

        let mut seen = HashSet::new();
        for split in &meta.splits {
            for &row in &split.test_indices {
                assert!(seen.insert(row), "row {row} held out twice");
            }
        }
        assert_eq!(seen.len(), 80);
        assert!(meta.row_fold.iter().all(|&f| f < 5));
    }

    #[test]
    fn test_writing_model_excluded_the_row() {
        let (x, y) = blobs(60);
        let meta = OutOfFoldGenerator::new(3, 7).generate(&[knn()], &x, &y).unwrap();

        for (row, &fold) in meta.row_fold.iter().enumerate() {
            let split = &meta.splits[fold];
            assert!(split.test_indices.contains(&row));
            assert!(!split.train_indices.contains(&row));
        }
    }

    #[test]
    fn test_matches_refitting_the_fold_model() {
        let (x, y) = blobs(60);
        let meta = OutOfFoldGenerator::new(3, 42).generate(&[knn()], &x, &y).unwrap();

        let split = &meta.splits[1];
        let model = FittedLearner::fit(
            &knn(),
            &x.select(Axis(0), &split.train_indices),
            &y.select(Axis(0), &split.train_indices),
        )
        .unwrap();
        let proba = model.predict_proba(&x.select(Axis(0), &split.test_indices)).unwrap();
        for (&row, &p) in split.test_indices.iter().zip(proba.iter()) {
            assert_eq!(meta.matrix[[row, 0]], p);
        }
    }

    #[test]
    fn test_one_column_per_learner() {
        let (x, y) = blobs(40);
        let configs = vec![knn(), LearnerConfig::default_for(LearnerKind::GradientBoosting)];
        let meta = OutOfFoldGenerator::new(2, 42).generate(&configs, &x, &y).unwrap();
        assert_eq!(meta.matrix.dim(), (40, 2));
        assert_eq!(meta.kinds, vec![LearnerKind::Knn, LearnerKind::GradientBoosting]);
        assert!(meta.matrix.iter().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(meta.column_auc(&y).unwrap().len(), 2);
    }

    #[test]
    fn test_empty_learner_list_rejected() {
        let (x, y) = blobs(20);
        assert!(OutOfFoldGenerator::default().generate(&[], &x, &y).is_err());
    }
}
