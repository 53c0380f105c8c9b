//! Binary classification metrics

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{KolosalError, Result};

/// Area under the ROC curve, computed from ranks (ties get their mean rank).
///
/// Fails when `y_true` contains a single class, where the curve is undefined.
pub fn roc_auc(y_true: &Array1<f64>, y_score: &Array1<f64>) -> Result<f64> {
    if y_true.len() != y_score.len() {
        return Err(KolosalError::ShapeError {
            expected: format!("{} scores", y_true.len()),
            actual: format!("{} scores", y_score.len()),
        });
    }

    let n_pos = y_true.iter().filter(|&&v| v > 0.5).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(KolosalError::ValidationError(
            "ROC AUC is undefined when only one class is present".to_string(),
        ));
    }
    if y_score.iter().any(|s| !s.is_finite()) {
        return Err(KolosalError::ValidationError("Scores contain non-finite values".to_string()));
    }

    let mut order: Vec<usize> = (0..y_score.len()).collect();
    order.sort_by(|&a, &b| y_score[a].total_cmp(&y_score[b]));

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && y_score[order[j + 1]] == y_score[order[i]] {
            j += 1;
        }
        // 1-based ranks i+1..=j+1 share their average
        let avg_rank = (i + j + 2) as f64 / 2.0;
        rank_sum_pos += order[i..=j].iter().filter(|&&k| y_true[k] > 0.5).count() as f64 * avg_rank;
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Ok((rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// Metrics for a probabilistic binary classifier at a fixed threshold
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub auc_roc: Option<f64>,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub log_loss: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
    pub n_samples: usize,
}

impl ClassificationMetrics {
    /// Compute metrics; a record is predicted positive when `proba > threshold`
    pub fn compute(y_true: &Array1<f64>, proba: &Array1<f64>, threshold: f64) -> Result<Self> {
        if y_true.len() != proba.len() {
            return Err(KolosalError::ShapeError {
                expected: format!("{} probabilities", y_true.len()),
                actual: format!("{} probabilities", proba.len()),
            });
        }

        let mut m = Self {
            auc_roc: roc_auc(y_true, proba).ok(),
            n_samples: y_true.len(),
            ..Self::default()
        };

        let eps = 1e-15;
        let mut loss = 0.0;
        for (&t, &p) in y_true.iter().zip(proba.iter()) {
            let actual = t > 0.5;
            let predicted = p > threshold;
            match (actual, predicted) {
                (true, true) => m.true_positives += 1,
                (false, true) => m.false_positives += 1,
                (false, false) => m.true_negatives += 1,
                (true, false) => m.false_negatives += 1,
            }
            let p = p.clamp(eps, 1.0 - eps);
            loss -= if actual { p.ln() } else { (1.0 - p).ln() };
        }

        let n = m.n_samples.max(1) as f64;
        m.log_loss = loss / n;
        m.accuracy = (m.true_positives + m.true_negatives) as f64 / n;

        let tp = m.true_positives as f64;
        m.precision = ratio(tp, tp + m.false_positives as f64);
        m.recall = ratio(tp, tp + m.false_negatives as f64);
        m.f1_score = ratio(2.0 * m.precision * m.recall, m.precision + m.recall);

        Ok(m)
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}
