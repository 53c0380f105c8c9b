//! Outlier and scale transforms fitted on training rows only
//!
//! Only continuous columns (more than `continuous_threshold` distinct values
//! in the training partition) are transformed; the rest pass through. The
//! fitted state is plain data so it can be bundled into the model artifact
//! and replayed unchanged at serving time.

use crate::error::{KolosalError, Result};
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Distinct-value count above which a column counts as continuous
pub const DEFAULT_CONTINUOUS_THRESHOLD: usize = 10;

/// Maximum number of quantile landmarks for the quantile transform
const MAX_QUANTILES: usize = 1000;

/// Output of the quantile transform is clipped to the normal quantiles of these bounds
const QUANTILE_CLIP: f64 = 1e-7;

/// Type of transformation to fit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TransformKind {
    /// Yeo-Johnson power transform followed by standardization
    Power,
    /// Empirical quantiles mapped to a standard normal
    Quantile,
    /// Zero mean, unit variance
    Standard,
    /// Winsorize to `[Q1 - k IQR, Q3 + k IQR]`, then standardize
    OutlierClip { k: f64 },
}

impl Default for TransformKind {
    fn default() -> Self {
        TransformKind::Power
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformKind::Power => f.write_str("power"),
            TransformKind::Quantile => f.write_str("quantile"),
            TransformKind::Standard => f.write_str("standard"),
            TransformKind::OutlierClip { k } => write!(f, "outlier(k={})", k),
        }
    }
}

impl FromStr for TransformKind {
    type Err = KolosalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "power" | "yeo-johnson" | "yeo_johnson" => Ok(TransformKind::Power),
            "quantile" => Ok(TransformKind::Quantile),
            "standard" | "standardize" => Ok(TransformKind::Standard),
            "outlier" | "outlier_clip" | "clip" => Ok(TransformKind::OutlierClip { k: 3.0 }),
            other => Err(KolosalError::ConfigError(format!(
                "Unknown transform '{}', expected power, quantile, standard or outlier",
                other
            ))),
        }
    }
}

/// Fitted statistics for one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum ColumnTransform {
    Power { lambda: f64, mean: f64, std: f64 },
    Quantile { quantiles: Vec<f64>, references: Vec<f64> },
    Standard { mean: f64, std: f64 },
    OutlierClip { lower: f64, upper: f64, mean: f64, std: f64 },
}

impl ColumnTransform {
    fn fit(values: &[f64], kind: TransformKind) -> Result<Self> {
        let fitted = match kind {
            TransformKind::Standard => {
                let (mean, std) = mean_std(values);
                ColumnTransform::Standard { mean, std }
            }
            TransformKind::Power => {
                let lambda = estimate_yeojohnson_lambda(values);
                let transformed: Vec<f64> = values.iter().map(|&x| yeojohnson(x, lambda)).collect();
                let (mean, std) = mean_std(&transformed);
                ColumnTransform::Power { lambda, mean, std }
            }
            TransformKind::Quantile => {
                let mut sorted = values.to_vec();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let n_quantiles = sorted.len().min(MAX_QUANTILES).max(2);
                let references: Vec<f64> = (0..n_quantiles)
                    .map(|i| i as f64 / (n_quantiles - 1) as f64)
                    .collect();
                let quantiles = references.iter().map(|&r| percentile(&sorted, r)).collect();
                ColumnTransform::Quantile { quantiles, references }
            }
            TransformKind::OutlierClip { k } => {
                if !(k >= 0.0) {
                    return Err(KolosalError::InvalidParameter {
                        name: "k".to_string(),
                        value: k.to_string(),
                        reason: "IQR multiplier must be non-negative".to_string(),
                    });
                }
                let mut sorted = values.to_vec();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let q1 = percentile(&sorted, 0.25);
                let q3 = percentile(&sorted, 0.75);
                let iqr = q3 - q1;
                let (lower, upper) = (q1 - k * iqr, q3 + k * iqr);
                let clipped: Vec<f64> = values.iter().map(|v| v.clamp(lower, upper)).collect();
                let (mean, std) = mean_std(&clipped);
                ColumnTransform::OutlierClip { lower, upper, mean, std }
            }
        };
        Ok(fitted)
    }

    fn apply(&self, x: f64) -> f64 {
        match self {
            ColumnTransform::Standard { mean, std } => (x - mean) / std,
            ColumnTransform::Power { lambda, mean, std } => (yeojohnson(x, *lambda) - mean) / std,
            ColumnTransform::OutlierClip { lower, upper, mean, std } => (x.clamp(*lower, *upper) - mean) / std,
            ColumnTransform::Quantile { quantiles, references } => {
                // Average of the rightmost and leftmost interpolation, so tied
                // landmarks map to the middle of their reference span
                let rank = 0.5 * (interp_right(x, quantiles, references) + interp_left(x, quantiles, references));
                normal_ppf(rank.clamp(QUANTILE_CLIP, 1.0 - QUANTILE_CLIP))
            }
        }
    }
}

/// A fitted transform over the feature columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTransform {
    kind: TransformKind,
    columns: Vec<String>,
    continuous_threshold: usize,
    /// Indices of transformed columns, ascending
    selected: Vec<usize>,
    /// Fitted statistics, parallel to `selected`
    params: Vec<ColumnTransform>,
}

impl FeatureTransform {
    /// Fit on training rows with the default continuous-column threshold
    pub fn fit(x_train: &Array2<f64>, columns: &[String], kind: TransformKind) -> Result<Self> {
        Self::fit_with_threshold(x_train, columns, kind, DEFAULT_CONTINUOUS_THRESHOLD)
    }

    /// Fit on training rows; columns with more than `continuous_threshold`
    /// distinct values are transformed
    pub fn fit_with_threshold(
        x_train: &Array2<f64>,
        columns: &[String],
        kind: TransformKind,
        continuous_threshold: usize,
    ) -> Result<Self> {
        if x_train.ncols() != columns.len() {
            return Err(KolosalError::ShapeError {
                expected: format!("{} columns", columns.len()),
                actual: format!("{} columns", x_train.ncols()),
            });
        }
        if x_train.nrows() == 0 {
            return Err(KolosalError::PreprocessingError("Cannot fit a transform on zero rows".to_string()));
        }
        if x_train.iter().any(|v| !v.is_finite()) {
            return Err(KolosalError::PreprocessingError(
                "Training data contains non-finite values".to_string(),
            ));
        }

        let mut selected = Vec::new();
        let mut params = Vec::new();
        for (idx, column) in x_train.axis_iter(Axis(1)).enumerate() {
            if count_distinct(column) > continuous_threshold {
                let values = column.to_vec();
                params.push(ColumnTransform::fit(&values, kind)?);
                selected.push(idx);
            }
        }

        tracing::info!(
            transform = %kind,
            transformed = selected.len(),
            passthrough = columns.len() - selected.len(),
            "Fitted feature transform"
        );

        Ok(Self {
            kind,
            columns: columns.to_vec(),
            continuous_threshold,
            selected,
            params,
        })
    }

    /// Apply the fitted statistics; never refits
    pub fn apply(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.columns.len() {
            return Err(KolosalError::ShapeError {
                expected: format!("{} columns", self.columns.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }

        let mut out = x.to_owned();
        for (&idx, param) in self.selected.iter().zip(&self.params) {
            out.column_mut(idx).mapv_inplace(|v| param.apply(v));
        }
        Ok(out)
    }

    pub fn kind(&self) -> TransformKind {
        self.kind
    }

    /// Feature columns the transform was fitted on, in order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn continuous_threshold(&self) -> usize {
        self.continuous_threshold
    }

    /// Names of the columns that are transformed
    pub fn transformed_columns(&self) -> Vec<&str> {
        self.selected.iter().map(|&i| self.columns[i].as_str()).collect()
    }
}

fn count_distinct(column: ArrayView1<f64>) -> usize {
    let mut values = column.to_vec();
    values.sort_by(|a, b| a.total_cmp(b));
    values.dedup();
    values.len()
}

/// Population mean and standard deviation; a zero spread yields scale 1
fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    (mean, if std > 1e-12 && std.is_finite() { std } else { 1.0 })
}

/// Linear-interpolation percentile of sorted data, `q` in [0, 1]
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Interpolate `x` on `(xp, fp)`, resolving ties in `xp` to their last entry
fn interp_right(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let j = xp.partition_point(|&q| q <= x);
    if j == 0 {
        return fp[0];
    }
    if j == xp.len() {
        return fp[fp.len() - 1];
    }
    let i = j - 1;
    fp[i] + (fp[j] - fp[i]) * (x - xp[i]) / (xp[j] - xp[i])
}

/// Interpolate `x` on `(xp, fp)`, resolving ties in `xp` to their first entry
fn interp_left(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let k = xp.partition_point(|&q| q < x);
    if k == xp.len() {
        return fp[fp.len() - 1];
    }
    if k == 0 || xp[k] == x {
        return fp[k];
    }
    let i = k - 1;
    fp[i] + (fp[k] - fp[i]) * (x - xp[i]) / (xp[k] - xp[i])
}

/// Yeo-Johnson transform for a single value
fn yeojohnson(x: f64, lambda: f64) -> f64 {
    if x >= 0.0 {
        if lambda.abs() < 1e-10 {
            x.ln_1p()
        } else {
            ((x + 1.0).powf(lambda) - 1.0) / lambda
        }
    } else if (lambda - 2.0).abs() < 1e-10 {
        -(-x).ln_1p()
    } else {
        -(((1.0 - x).powf(2.0 - lambda) - 1.0) / (2.0 - lambda))
    }
}

/// Yeo-Johnson log-likelihood
fn yeojohnson_log_likelihood(values: &[f64], lambda: f64) -> f64 {
    let n = values.len() as f64;
    let transformed: Vec<f64> = values.iter().map(|&x| yeojohnson(x, lambda)).collect();
    let mean = transformed.iter().sum::<f64>() / n;
    let variance = transformed.iter().map(|&t| (t - mean).powi(2)).sum::<f64>() / n;

    if !(variance > 0.0) || !variance.is_finite() {
        return f64::NEG_INFINITY;
    }

    let log_jacobian: f64 = values.iter().map(|&x| x.abs().ln_1p().copysign(x)).sum();
    -n / 2.0 * variance.ln() + (lambda - 1.0) * log_jacobian
}

/// Maximum-likelihood lambda: a 0.1 grid over [-2, 2], refined in 0.01 steps around the best point
fn estimate_yeojohnson_lambda(values: &[f64]) -> f64 {
    let best_on = |grid: &mut dyn Iterator<Item = f64>, start: f64| {
        grid.fold((start, f64::NEG_INFINITY), |(best, best_ll), lambda| {
            let ll = yeojohnson_log_likelihood(values, lambda);
            if ll > best_ll { (lambda, ll) } else { (best, best_ll) }
        })
    };

    let (coarse, _) = best_on(&mut (-20..=20).map(|i| i as f64 * 0.1), 1.0);
    let (fine, _) = best_on(&mut (-10..=10).map(|i| coarse + i as f64 * 0.01), coarse);
    fine
}

/// Inverse standard normal CDF (Acklam's rational approximation)
fn normal_ppf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969_683_028_665_376e1, 2.209_460_984_245_205e2, -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2, -3.066_479_806_614_716e1, 2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1, 1.615_858_368_580_409e2, -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1, -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3, -3.223_964_580_411_365e-1, -2.400_758_277_161_838,
        -2.549_732_539_343_734, 4.374_664_141_464_968, 2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3, 3.224_671_290_700_398e-1, 2.445_134_137_142_996, 3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.024_25;

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p > 1.0 - P_LOW {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    } else {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    }
}
