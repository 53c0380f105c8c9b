//! K-Nearest Neighbors classifier
//!
//! Brute-force neighbor search with a bounded max-heap per query row, queries
//! parallelized over rows with rayon.

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::{KolosalError, Result};

/// Minkowski distance restricted to the two powers the search explores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// p = 1
    Manhattan,
    /// p = 2
    Euclidean,
}

impl DistanceMetric {
    /// Metric for a Minkowski power
    pub fn from_power(p: i64) -> Result<Self> {
        match p {
            1 => Ok(Self::Manhattan),
            2 => Ok(Self::Euclidean),
            other => Err(KolosalError::InvalidParameter {
                name: "p".to_string(),
                value: other.to_string(),
                reason: "Minkowski power must be 1 or 2".to_string(),
            }),
        }
    }

    pub fn power(&self) -> i64 {
        match self {
            Self::Manhattan => 1,
            Self::Euclidean => 2,
        }
    }

    fn distance(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self {
            Self::Manhattan => a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum(),
            Self::Euclidean => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| {
                    let d = x - y;
                    d * d
                })
                .sum::<f64>()
                .sqrt(),
        }
    }
}

impl Default for DistanceMetric {
    fn default() -> Self {
        Self::Euclidean
    }
}

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightScheme {
    /// All neighbors have equal weight
    Uniform,
    /// Closer neighbors have more weight (inverse distance)
    Distance,
}

impl Default for WeightScheme {
    fn default() -> Self {
        Self::Uniform
    }
}

/// KNN configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnConfig {
    pub n_neighbors: usize,
    pub metric: DistanceMetric,
    pub weights: WeightScheme,
}

impl Default for KnnConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            metric: DistanceMetric::Euclidean,
            weights: WeightScheme::Uniform,
        }
    }
}

/// K-Nearest Neighbors binary classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnClassifier {
    config: KnnConfig,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<f64>>,
}

impl KnnClassifier {
    pub fn new(config: KnnConfig) -> Self {
        Self {
            config,
            x_train: None,
            y_train: None,
        }
    }

    pub fn config(&self) -> &KnnConfig {
        &self.config
    }

    /// Fit the classifier (stores training data)
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        if x.nrows() != y.len() {
            return Err(KolosalError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if self.config.n_neighbors == 0 {
            return Err(KolosalError::InvalidParameter {
                name: "n_neighbors".to_string(),
                value: "0".to_string(),
                reason: "at least one neighbor is required".to_string(),
            });
        }
        if x.nrows() == 0 {
            return Err(KolosalError::TrainingError("Cannot fit KNN on zero rows".to_string()));
        }
        self.x_train = Some(x.to_owned());
        self.y_train = Some(y.to_owned());
        Ok(self)
    }

    /// Positive-class probability (parallelized over query rows)
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (x_train, y_train) = match (&self.x_train, &self.y_train) {
            (Some(x), Some(y)) => (x, y),
            _ => return Err(KolosalError::NotFitted),
        };
        if x.ncols() != x_train.ncols() {
            return Err(KolosalError::ShapeError {
                expected: format!("{} features", x_train.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }

        let k = self.config.n_neighbors.min(x_train.nrows());
        let metric = self.config.metric;
        let weights = self.config.weights;

        let proba: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let neighbors = find_k_nearest(x.row(i), x_train, y_train, k, metric);
                positive_share(&neighbors, weights)
            })
            .collect();

        Ok(Array1::from_vec(proba))
    }
}

/// Max-heap entry keeping the k smallest distances; ties broken by training row index
#[derive(PartialEq)]
struct Neighbor {
    dist: f64,
    row: usize,
    label: f64,
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist.total_cmp(&other.dist).then(self.row.cmp(&other.row))
    }
}

/// Find k nearest neighbors using a max-heap, O(n log k)
fn find_k_nearest(
    point: ArrayView1<f64>,
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    k: usize,
    metric: DistanceMetric,
) -> Vec<(f64, f64)> {
    let mut heap = BinaryHeap::with_capacity(k + 1);

    for (row, train_row) in x_train.rows().into_iter().enumerate() {
        let candidate = Neighbor {
            dist: metric.distance(point, train_row),
            row,
            label: y_train[row],
        };
        if heap.len() < k {
            heap.push(candidate);
        } else if heap.peek().map_or(false, |top| candidate < *top) {
            heap.pop();
            heap.push(candidate);
        }
    }

    heap.into_iter().map(|n| (n.dist, n.label)).collect()
}

/// Weighted share of positive neighbors.
///
/// With inverse-distance weights, neighbors at distance zero take all the
/// weight when any are present.
fn positive_share(neighbors: &[(f64, f64)], weights: WeightScheme) -> f64 {
    let exact: Vec<f64> = neighbors.iter().filter(|(d, _)| *d == 0.0).map(|(_, l)| *l).collect();

    let (pos, total) = match weights {
        WeightScheme::Uniform => (
            neighbors.iter().filter(|(_, l)| *l > 0.5).count() as f64,
            neighbors.len() as f64,
        ),
        WeightScheme::Distance if !exact.is_empty() => (
            exact.iter().filter(|&&l| l > 0.5).count() as f64,
            exact.len() as f64,
        ),
        WeightScheme::Distance => neighbors.iter().fold((0.0, 0.0), |(pos, total), &(d, l)| {
            let w = 1.0 / d;
            (if l > 0.5 { pos + w } else { pos }, total + w)
        }),
    };

    if total > 0.0 { pos / total } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn classifier_with_k(k: usize) -> KnnClassifier {
        KnnClassifier::new(KnnConfig {
            n_neighbors: k,
            ..Default::default()
        })
    }

    fn create_classification_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec((20, 2), vec![
            // Class 0 (low values)
            1.0, 1.0, 1.5, 1.5, 2.0, 2.0, 2.5, 2.5, 1.0, 2.0,
            1.5, 2.5, 2.0, 1.5, 2.5, 1.0, 1.2, 1.8, 1.8, 1.2,
            // Class 1 (high values)
            8.0, 8.0, 8.5, 8.5, 9.0, 9.0, 9.5, 9.5, 8.0, 9.0,
            8.5, 9.5, 9.0, 8.5, 9.5, 8.0, 8.2, 8.8, 8.8, 8.2,
        ]).unwrap();

        let y = Array1::from_iter((0..20).map(|i| if i < 10 { 0.0 } else { 1.0 }));
        (x, y)
    }

    #[test]
    fn test_knn_classifier() {
        let (x, y) = create_classification_data();
        let mut knn = classifier_with_k(3);
        knn.fit(&x, &y).unwrap();

        let proba = knn.predict_proba(&x).unwrap();
        for (p, t) in proba.iter().zip(y.iter()) {
            assert_eq!(*p > 0.5, *t > 0.5);
        }
    }

    #[test]
    fn test_uniform_share() {
        let x = array![[0.0], [1.0], [2.0], [10.0]];
        let y = array![1.0, 0.0, 0.0, 1.0];
        let mut knn = classifier_with_k(3);
        knn.fit(&x, &y).unwrap();
        let proba = knn.predict_proba(&array![[1.0]]).unwrap();
        assert!((proba[0] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_distance_weights_with_exact_match() {
        let x = array![[0.0], [1.0], [3.0]];
        let y = array![1.0, 0.0, 0.0];
        let mut knn = KnnClassifier::new(KnnConfig {
            n_neighbors: 3,
            weights: WeightScheme::Distance,
            metric: DistanceMetric::Manhattan,
        });
        knn.fit(&x, &y).unwrap();
        // exact match dominates
        assert_eq!(knn.predict_proba(&array![[0.0]]).unwrap()[0], 1.0);
        // distances 2, 1, 1 from the query at 2.0: weights 0.5, 1, 1
        let p = knn.predict_proba(&array![[2.0]]).unwrap()[0];
        assert!((p - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_metric_from_power() {
        assert_eq!(DistanceMetric::from_power(1).unwrap(), DistanceMetric::Manhattan);
        assert_eq!(DistanceMetric::from_power(2).unwrap().power(), 2);
        assert!(DistanceMetric::from_power(3).is_err());
        let a = array![0.0, 0.0];
        let b = array![3.0, 4.0];
        assert!((DistanceMetric::Euclidean.distance(a.view(), b.view()) - 5.0).abs() < 1e-12);
        assert!((DistanceMetric::Manhattan.distance(a.view(), b.view()) - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_k_larger_than_training_set() {
        let x = array![[0.0], [1.0]];
        let y = array![0.0, 1.0];
        let mut knn = classifier_with_k(15);
        knn.fit(&x, &y).unwrap();
        assert!((knn.predict_proba(&array![[0.4]]).unwrap()[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_predict_before_fit() {
        let knn = classifier_with_k(3);
        assert!(matches!(knn.predict_proba(&array![[0.0]]), Err(KolosalError::NotFitted)));
    }
}
