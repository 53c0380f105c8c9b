//! L2-regularized logistic regression, used as the stacking meta learner

use crate::error::{KolosalError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Logistic regression for binary classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Fitted coefficients
    pub coefficients: Option<Array1<f64>>,
    /// Fitted intercept
    pub intercept: Option<f64>,
    /// Inverse regularization strength; the penalty is `||w||² / (2 C n)` on the mean loss
    pub c: f64,
    /// Maximum iterations
    pub max_iter: usize,
    /// Convergence tolerance on the gradient norm
    pub tol: f64,
    /// Learning rate
    pub learning_rate: f64,
    /// Whether the last fit stopped on tolerance rather than the iteration cap
    pub converged: bool,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: None,
            c: 1.0,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 1.0,
            converged: false,
        }
    }

    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
        z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
    }

    /// Fit the model using batch gradient descent; the intercept is not penalized
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(KolosalError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(KolosalError::TrainingError("Cannot fit LogisticRegression on zero rows".to_string()));
        }
        if !(self.c > 0.0) {
            return Err(KolosalError::InvalidParameter {
                name: "C".to_string(),
                value: self.c.to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let mut weights = Array1::zeros(x.ncols());
        let mut bias = 0.0;
        let alpha = 1.0 / (self.c * n_samples as f64);
        let lr = self.learning_rate;
        self.converged = false;

        for _ in 0..self.max_iter {
            let linear = x.dot(&weights) + bias;
            let errors = Self::sigmoid(&linear) - y;

            let dw = x.t().dot(&errors) / n_samples as f64 + alpha * &weights;
            let db = errors.mean().unwrap_or(0.0);

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < self.tol {
                self.converged = true;
                break;
            }

            weights = weights - lr * dw;
            bias -= lr * db;
        }

        if !self.converged {
            tracing::debug!(max_iter = self.max_iter, "Logistic regression hit the iteration cap");
        }

        self.coefficients = Some(weights);
        self.intercept = Some(bias);
        Ok(self)
    }

    /// Positive-class probability
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(KolosalError::NotFitted)?;
        if x.ncols() != coefficients.len() {
            return Err(KolosalError::ShapeError {
                expected: format!("{} features", coefficients.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        let linear = x.dot(coefficients) + self.intercept.unwrap_or(0.0);
        Ok(Self::sigmoid(&linear))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_logistic_regression_separates() {
        let x = array![
            [0.1, 0.2],
            [0.2, 0.1],
            [0.3, 0.2],
            [0.8, 0.9],
            [0.9, 0.7],
            [0.7, 0.8],
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();

        let proba = model.predict_proba(&x).unwrap();
        for (p, t) in proba.iter().zip(y.iter()) {
            assert_eq!(*p > 0.5, *t > 0.5, "p = {}", p);
        }
        let w = model.coefficients.as_ref().unwrap();
        assert!(w.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn test_regularization_shrinks_weights() {
        let x = array![[0.0], [0.2], [0.8], [1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut loose = LogisticRegression::new().with_c(100.0);
        let mut tight = LogisticRegression::new().with_c(0.01);
        loose.fit(&x, &y).unwrap();
        tight.fit(&x, &y).unwrap();
        let wl = loose.coefficients.as_ref().unwrap()[0];
        let wt = tight.coefficients.as_ref().unwrap()[0];
        assert!(wl > wt && wt > 0.0);
    }

    #[test]
    fn test_predict_before_fit() {
        let model = LogisticRegression::new();
        assert!(matches!(model.predict_proba(&array![[0.5]]), Err(KolosalError::NotFitted)));
    }

    #[test]
    fn test_non_positive_c_rejected() {
        let mut model = LogisticRegression::new().with_c(0.0);
        assert!(model.fit(&array![[0.5]], &array![1.0]).is_err());
    }
}
