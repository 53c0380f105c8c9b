//! Regression tree used as the weak learner of gradient boosting
//!
//! Splits are chosen by exhaustive sorted scans minimizing squared error.
//! When per-sample hessians are supplied, leaf values take a Newton step
//! (`sum(gradient) / sum(hessian)`) instead of the plain mean.

use crate::error::{KolosalError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Row count above which candidate features are scanned in parallel
const PARALLEL_SPLIT_ROWS: usize = 2048;

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf {
        value: f64,
        n_samples: usize,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

impl TreeNode {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                    node = if row[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

/// Regression tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    n_features: usize,
}

impl Default for RegressionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RegressionTree {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            n_features: 0,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    /// Fit on the rows of `x` listed in `indices`.
    ///
    /// `targets` and `hessians` are indexed like the rows of `x`.
    pub fn fit_rows(
        &mut self,
        x: &Array2<f64>,
        targets: &Array1<f64>,
        hessians: Option<&Array1<f64>>,
        indices: &[usize],
    ) -> Result<&mut Self> {
        if targets.len() != x.nrows() || hessians.map_or(false, |h| h.len() != x.nrows()) {
            return Err(KolosalError::ShapeError {
                expected: format!("{} targets", x.nrows()),
                actual: format!("{} targets", targets.len()),
            });
        }
        if indices.is_empty() {
            return Err(KolosalError::TrainingError("Cannot fit a tree on zero rows".to_string()));
        }

        self.n_features = x.ncols();
        let mut rows = indices.to_vec();
        self.root = Some(self.build(x, targets, hessians, &mut rows, 0));
        Ok(self)
    }

    /// Fit on every row of `x`
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let indices: Vec<usize> = (0..x.nrows()).collect();
        self.fit_rows(x, y, None, &indices)
    }

    fn leaf_value(targets: &Array1<f64>, hessians: Option<&Array1<f64>>, rows: &[usize]) -> f64 {
        let sum: f64 = rows.iter().map(|&i| targets[i]).sum();
        match hessians {
            Some(h) => {
                let denom: f64 = rows.iter().map(|&i| h[i]).sum();
                if denom.abs() < 1e-150 { 0.0 } else { sum / denom }
            }
            None => sum / rows.len() as f64,
        }
    }

    fn build(
        &self,
        x: &Array2<f64>,
        targets: &Array1<f64>,
        hessians: Option<&Array1<f64>>,
        rows: &mut [usize],
        depth: usize,
    ) -> TreeNode {
        let n = rows.len();
        let leaf = |rows: &[usize]| TreeNode::Leaf {
            value: Self::leaf_value(targets, hessians, rows),
            n_samples: rows.len(),
        };

        if n < self.min_samples_split
            || n < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
        {
            return leaf(rows);
        }

        let split = match self.best_split(x, targets, rows) {
            Some(s) => s,
            None => return leaf(rows),
        };

        // Partition in place: rows going left first
        let mut boundary = 0;
        for i in 0..n {
            if x[[rows[i], split.feature_idx]] <= split.threshold {
                rows.swap(i, boundary);
                boundary += 1;
            }
        }
        let (left_rows, right_rows) = rows.split_at_mut(boundary);

        let left = self.build(x, targets, hessians, left_rows, depth + 1);
        let right = self.build(x, targets, hessians, right_rows, depth + 1);

        TreeNode::Split {
            feature_idx: split.feature_idx,
            threshold: split.threshold,
            left: Box::new(left),
            right: Box::new(right),
            n_samples: n,
        }
    }

    fn best_split(&self, x: &Array2<f64>, targets: &Array1<f64>, rows: &[usize]) -> Option<SplitCandidate> {
        let total: f64 = rows.iter().map(|&i| targets[i]).sum();
        let scan = |f: usize| self.scan_feature(x, targets, rows, f, total);

        let candidates: Vec<SplitCandidate> = if rows.len() >= PARALLEL_SPLIT_ROWS {
            (0..self.n_features).into_par_iter().filter_map(scan).collect()
        } else {
            (0..self.n_features).filter_map(scan).collect()
        };

        // Ties resolve to the lowest feature index so results do not depend on scheduling
        candidates
            .into_iter()
            .fold(None, |best: Option<SplitCandidate>, c| match best {
                Some(b) if b.gain >= c.gain => Some(b),
                _ => Some(c),
            })
    }

    /// Best threshold on one feature by a prefix-sum scan over sorted values.
    ///
    /// The gain is the reduction in squared error, `sL²/nL + sR²/nR - s²/n`.
    fn scan_feature(
        &self,
        x: &Array2<f64>,
        targets: &Array1<f64>,
        rows: &[usize],
        feature_idx: usize,
        total: f64,
    ) -> Option<SplitCandidate> {
        let n = rows.len();
        let mut pairs: Vec<(f64, f64)> = rows.iter().map(|&i| (x[[i, feature_idx]], targets[i])).collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        if pairs[0].0 == pairs[n - 1].0 {
            return None;
        }

        let parent = total * total / n as f64;
        let min_leaf = self.min_samples_leaf;
        let mut left_sum = 0.0;
        let mut best: Option<SplitCandidate> = None;

        for i in 0..n - 1 {
            left_sum += pairs[i].1;
            let n_left = i + 1;
            if pairs[i].0 == pairs[i + 1].0 || n_left < min_leaf || n - n_left < min_leaf {
                continue;
            }
            let right_sum = total - left_sum;
            let gain = left_sum * left_sum / n_left as f64
                + right_sum * right_sum / (n - n_left) as f64
                - parent;
            if gain > 1e-12 && best.map_or(true, |b| gain > b.gain) {
                best = Some(SplitCandidate {
                    feature_idx,
                    threshold: (pairs[i].0 + pairs[i + 1].0) / 2.0,
                    gain,
                });
            }
        }

        best
    }

    /// Predict a single row
    pub fn predict_row(&self, row: ArrayView1<f64>) -> Result<f64> {
        match &self.root {
            Some(root) => Ok(root.predict_row(row)),
            None => Err(KolosalError::NotFitted),
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(KolosalError::NotFitted)?;
        Ok(x.rows().into_iter().map(|row| root.predict_row(row)).collect())
    }

    pub fn get_depth(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::depth)
    }
}
