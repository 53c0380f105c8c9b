//! Extra Trees (Extremely Randomized Trees) classifier
//!
//! Unlike Random Forest which searches for the best split among a random subset
//! of features, Extra Trees picks both the feature AND the threshold at random.
//! Leaves store the fraction of positive labels, so the forest average is a
//! probability rather than a vote count.

use crate::error::{KolosalError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// An extremely randomized tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
enum ExtraTreeNode {
    Leaf { positive_rate: f64 },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<ExtraTreeNode>,
        right: Box<ExtraTreeNode>,
    },
}

impl ExtraTreeNode {
    fn predict_sample(&self, sample: ArrayView1<f64>) -> f64 {
        match self {
            ExtraTreeNode::Leaf { positive_rate } => *positive_rate,
            ExtraTreeNode::Split { feature, threshold, left, right } => {
                if sample[*feature] <= *threshold {
                    left.predict_sample(sample)
                } else {
                    right.predict_sample(sample)
                }
            }
        }
    }
}

/// Growth limits shared by every tree of the forest
#[derive(Debug, Clone, Copy)]
struct GrowthLimits {
    max_features: usize,
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
}

/// Extra Trees binary classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraTreesClassifier {
    trees: Vec<ExtraTreeNode>,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Draw a bootstrap sample per tree instead of using every row
    pub bootstrap: bool,
    pub random_state: Option<u64>,
    n_features: usize,
    pub is_fitted: bool,
}

impl Default for ExtraTreesClassifier {
    fn default() -> Self {
        Self::new(100)
    }
}

impl ExtraTreesClassifier {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators: n_estimators.max(1),
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            bootstrap: false,
            random_state: None,
            n_features: 0,
            is_fitted: false,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, n: usize) -> Self {
        self.min_samples_split = n.max(2);
        self
    }

    pub fn with_min_samples_leaf(mut self, n: usize) -> Self {
        self.min_samples_leaf = n.max(1);
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Features considered per split: `ceil(sqrt(n_features))`
    fn compute_max_features(n_features: usize) -> usize {
        ((n_features as f64).sqrt().ceil() as usize).max(1)
    }

    /// Build a single extra tree with random splits
    fn build_tree(
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        limits: GrowthLimits,
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> ExtraTreeNode {
        let n = indices.len();
        let positives = indices.iter().filter(|&&i| y[i] > 0.5).count();
        let leaf = ExtraTreeNode::Leaf { positive_rate: positives as f64 / n.max(1) as f64 };

        // Pure nodes and exhausted budgets stop here
        if n < limits.min_samples_split
            || positives == 0
            || positives == n
            || limits.max_depth.map_or(false, |d| depth >= d)
        {
            return leaf;
        }

        let feature_indices = Self::random_features(x.ncols(), limits.max_features, rng);

        // Best random split across selected features
        let mut best: Option<(usize, f64, f64)> = None;

        for &f in &feature_indices {
            let (fmin, fmax) = indices.iter().fold((f64::MAX, f64::MIN), |(lo, hi), &i| {
                let v = x[[i, f]];
                (lo.min(v), hi.max(v))
            });
            if fmax - fmin < 1e-15 {
                continue;
            }

            let threshold = rng.gen_range(fmin..fmax);

            let mut n_left = 0usize;
            let mut pos_left = 0usize;
            for &i in indices {
                if x[[i, f]] <= threshold {
                    n_left += 1;
                    if y[i] > 0.5 {
                        pos_left += 1;
                    }
                }
            }
            let n_right = n - n_left;
            if n_left < limits.min_samples_leaf || n_right < limits.min_samples_leaf {
                continue;
            }

            let score = weighted_gini(n_left, pos_left, n_right, positives - pos_left);
            if best.map_or(true, |(_, _, s)| score < s) {
                best = Some((f, threshold, score));
            }
        }

        let Some((feature, threshold, _)) = best else {
            return leaf;
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
            indices.iter().partition(|&&i| x[[i, feature]] <= threshold);

        let left = Self::build_tree(x, y, &left_idx, limits, depth + 1, rng);
        let right = Self::build_tree(x, y, &right_idx, limits, depth + 1, rng);

        ExtraTreeNode::Split {
            feature,
            threshold,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn random_features(n_features: usize, max_features: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
        let mut features: Vec<usize> = (0..n_features).collect();
        if max_features >= n_features {
            return features;
        }
        // Fisher-Yates partial shuffle
        for i in 0..max_features {
            let j = rng.gen_range(i..n_features);
            features.swap(i, j);
        }
        features.truncate(max_features);
        features
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(KolosalError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(KolosalError::TrainingError("Cannot fit ExtraTrees on zero rows".to_string()));
        }

        self.n_features = x.ncols();
        let limits = GrowthLimits {
            max_features: Self::compute_max_features(self.n_features),
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
        };
        let base_seed = self.random_state.unwrap_or(42);
        let bootstrap = self.bootstrap;

        self.trees = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));
                let indices: Vec<usize> = if bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };
                Self::build_tree(x, y, &indices, limits, 0, &mut rng)
            })
            .collect();

        self.is_fitted = true;
        Ok(self)
    }

    /// Positive-class probability: the mean of the leaf positive rates
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_fitted {
            return Err(KolosalError::NotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(KolosalError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let n_trees = self.trees.len() as f64;
        let proba: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let row = x.row(i);
                self.trees.iter().map(|t| t.predict_sample(row)).sum::<f64>() / n_trees
            })
            .collect();

        Ok(Array1::from_vec(proba))
    }
}

/// Size-weighted Gini impurity of a binary split
fn weighted_gini(n_left: usize, pos_left: usize, n_right: usize, pos_right: usize) -> f64 {
    let gini = |n: usize, pos: usize| {
        if n == 0 {
            return 0.0;
        }
        let p = pos as f64 / n as f64;
        2.0 * p * (1.0 - p)
    };
    let n = (n_left + n_right) as f64;
    (n_left as f64 * gini(n_left, pos_left) + n_right as f64 * gini(n_right, pos_right)) / n
}
