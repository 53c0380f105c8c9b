//! Gradient boosting classifier
//!
//! Binomial deviance boosting over regression trees: start from the training
//! log-odds, fit each tree to the residuals `y - p` on a row subsample, and
//! set leaf values with a single Newton step `sum(y - p) / sum(p (1 - p))`.

use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::decision_tree::RegressionTree;
use crate::error::{KolosalError, Result};

/// Row count above which residual updates run in parallel
const PARALLEL_ROWS: usize = 10_000;

/// Gradient Boosting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples to split an internal node
    pub min_samples_split: usize,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Fraction of rows drawn (without replacement) for each tree
    pub subsample: f64,
    /// Random seed
    pub random_state: Option<u64>,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
            subsample: 1.0,
            random_state: Some(42),
        }
    }
}

impl GradientBoostingConfig {
    fn validate(&self) -> Result<()> {
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(KolosalError::InvalidParameter {
                name: "subsample".to_string(),
                value: self.subsample.to_string(),
                reason: "must be in (0, 1]".to_string(),
            });
        }
        if !(self.learning_rate > 0.0) {
            return Err(KolosalError::InvalidParameter {
                name: "learning_rate".to_string(),
                value: self.learning_rate.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Gradient Boosting binary classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    config: GradientBoostingConfig,
    trees: Vec<RegressionTree>,
    initial_log_odds: f64,
    n_features: usize,
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            initial_log_odds: 0.0,
            n_features: 0,
        }
    }

    pub fn config(&self) -> &GradientBoostingConfig {
        &self.config
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Fit binary classification
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        self.config.validate()?;
        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(KolosalError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(KolosalError::TrainingError("Cannot fit GradientBoosting on zero rows".to_string()));
        }

        // Initial log odds, clamped so single-class data stays finite
        let p = y.mean().unwrap_or(0.5).clamp(1e-6, 1.0 - 1e-6);
        self.initial_log_odds = (p / (1.0 - p)).ln();
        self.n_features = x.ncols();
        self.trees.clear();

        let mut log_odds = Array1::from_elem(n_samples, self.initial_log_odds);
        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };
        let sample_size = ((n_samples as f64) * self.config.subsample).round().max(1.0) as usize;

        for _ in 0..self.config.n_estimators {
            let probs = log_odds.mapv(sigmoid);
            let residuals: Array1<f64> = y - &probs;
            let hessians: Array1<f64> = probs.mapv(|p| p * (1.0 - p));

            let sample_indices = self.subsample_indices(n_samples, sample_size, &mut rng);

            let mut tree = RegressionTree::new()
                .with_max_depth(self.config.max_depth)
                .with_min_samples_split(self.config.min_samples_split)
                .with_min_samples_leaf(self.config.min_samples_leaf);
            tree.fit_rows(x, &residuals, Some(&hessians), &sample_indices)?;

            // Every row moves, not only the sampled ones
            let lr = self.config.learning_rate;
            if n_samples > PARALLEL_ROWS {
                let steps: Vec<f64> = (0..n_samples)
                    .into_par_iter()
                    .map(|i| tree.predict_row(x.row(i)))
                    .collect::<Result<_>>()?;
                for (lo, step) in log_odds.iter_mut().zip(steps) {
                    *lo += lr * step;
                }
            } else {
                for (i, lo) in log_odds.iter_mut().enumerate() {
                    *lo += lr * tree.predict_row(x.row(i))?;
                }
            }

            self.trees.push(tree);
        }

        Ok(self)
    }

    fn subsample_indices(&self, n: usize, sample_size: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..n).collect();
        if sample_size < n {
            indices.shuffle(rng);
            indices.truncate(sample_size);
            indices.sort_unstable();
        }
        indices
    }

    /// Raw log-odds scores
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() && self.n_features == 0 {
            return Err(KolosalError::NotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(KolosalError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let lr = self.config.learning_rate;
        let scores: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let row = x.row(i);
                self.trees.iter().try_fold(self.initial_log_odds, |acc, tree| {
                    Ok(acc + lr * tree.predict_row(row)?)
                })
            })
            .collect::<Result<_>>()?;

        Ok(Array1::from_vec(scores))
    }

    /// Positive-class probability
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision_function(x)?.mapv(sigmoid))
    }
}
