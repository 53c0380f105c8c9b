//! Base learner kinds, their configurations and search spaces
//!
//! `LearnerConfig` is the factory for fold-local models: every call to
//! [`LearnerConfig::build`] yields a fresh unfit [`Learner`], and only
//! [`Learner::fit`] produces a [`FittedLearner`] that can score rows.

use crate::error::{KolosalError, Result};
use crate::optimizer::{SearchSpace, TrialParams};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::extra_trees::ExtraTreesClassifier;
use super::gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
use super::knn::{DistanceMetric, KnnClassifier, KnnConfig, WeightScheme};

/// Base learner family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearnerKind {
    ExtraTrees,
    Knn,
    GradientBoosting,
}

impl LearnerKind {
    pub const ALL: [LearnerKind; 3] = [LearnerKind::ExtraTrees, LearnerKind::Knn, LearnerKind::GradientBoosting];

    /// Short identifier used in configs and logs
    pub fn id(&self) -> &'static str {
        match self {
            LearnerKind::ExtraTrees => "extra_trees",
            LearnerKind::Knn => "knn",
            LearnerKind::GradientBoosting => "gradient_boosting",
        }
    }

    /// Model name reported to clients
    pub fn model_name(&self) -> &'static str {
        match self {
            LearnerKind::ExtraTrees => "ExtraTreesClassifier",
            LearnerKind::Knn => "KNeighborsClassifier",
            LearnerKind::GradientBoosting => "GradientBoostingClassifier",
        }
    }
}

impl fmt::Display for LearnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for LearnerKind {
    type Err = KolosalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "extra_trees" | "extratrees" | "et" => Ok(LearnerKind::ExtraTrees),
            "knn" => Ok(LearnerKind::Knn),
            "gradient_boosting" | "gradientboosting" | "gb" => Ok(LearnerKind::GradientBoosting),
            other => Err(KolosalError::ConfigError(format!("Unknown learner kind: {}", other))),
        }
    }
}

/// Extra Trees hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraTreesConfig {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub bootstrap: bool,
    pub random_state: u64,
}

impl Default for ExtraTreesConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            bootstrap: false,
            random_state: 42,
        }
    }
}

/// Configuration of one base learner, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LearnerConfig {
    ExtraTrees(ExtraTreesConfig),
    Knn(KnnConfig),
    GradientBoosting(GradientBoostingConfig),
}

fn int_param(params: &TrialParams, name: &str) -> Result<i64> {
    params.get(name).and_then(|v| v.as_int()).ok_or_else(|| missing(name))
}

fn usize_param(params: &TrialParams, name: &str) -> Result<usize> {
    let v = int_param(params, name)?;
    usize::try_from(v).map_err(|_| KolosalError::InvalidParameter {
        name: name.to_string(),
        value: v.to_string(),
        reason: "must be non-negative".to_string(),
    })
}

fn missing(name: &str) -> KolosalError {
    KolosalError::InvalidParameter {
        name: name.to_string(),
        value: "<missing>".to_string(),
        reason: "parameter absent or of the wrong type".to_string(),
    }
}

impl LearnerConfig {
    /// Library defaults for a kind, used when a search yields no valid trial
    pub fn default_for(kind: LearnerKind) -> Self {
        match kind {
            LearnerKind::ExtraTrees => LearnerConfig::ExtraTrees(ExtraTreesConfig::default()),
            LearnerKind::Knn => LearnerConfig::Knn(KnnConfig::default()),
            LearnerKind::GradientBoosting => LearnerConfig::GradientBoosting(GradientBoostingConfig::default()),
        }
    }

    pub fn kind(&self) -> LearnerKind {
        match self {
            LearnerConfig::ExtraTrees(_) => LearnerKind::ExtraTrees,
            LearnerConfig::Knn(_) => LearnerKind::Knn,
            LearnerConfig::GradientBoosting(_) => LearnerKind::GradientBoosting,
        }
    }

    /// The fixed hyperparameter space searched for a kind
    pub fn search_space(kind: LearnerKind) -> SearchSpace {
        match kind {
            LearnerKind::ExtraTrees => SearchSpace::new()
                .int("n_estimators", 50, 300)
                .int("max_depth", 5, 30)
                .int("min_samples_split", 2, 10)
                .int("min_samples_leaf", 1, 5)
                .boolean("bootstrap"),
            LearnerKind::Knn => SearchSpace::new()
                .int("n_neighbors", 3, 15)
                .categorical("weights", vec!["uniform", "distance"])
                .int("p", 1, 2),
            LearnerKind::GradientBoosting => SearchSpace::new()
                .int("n_estimators", 50, 300)
                .int("max_depth", 3, 15)
                .log_float("learning_rate", 0.01, 0.3)
                .float("subsample", 0.5, 1.0)
                .int("min_samples_split", 2, 20)
                .int("min_samples_leaf", 1, 10),
        }
    }

    /// Build a configuration from sampled trial parameters
    pub fn from_params(kind: LearnerKind, params: &TrialParams, seed: u64) -> Result<Self> {
        let config = match kind {
            LearnerKind::ExtraTrees => LearnerConfig::ExtraTrees(ExtraTreesConfig {
                n_estimators: usize_param(params, "n_estimators")?,
                max_depth: Some(usize_param(params, "max_depth")?),
                min_samples_split: usize_param(params, "min_samples_split")?,
                min_samples_leaf: usize_param(params, "min_samples_leaf")?,
                bootstrap: params.get("bootstrap").and_then(|v| v.as_bool()).ok_or_else(|| missing("bootstrap"))?,
                random_state: seed,
            }),
            LearnerKind::Knn => {
                let weights = match params.get("weights").and_then(|v| v.as_string()) {
                    Some("uniform") => WeightScheme::Uniform,
                    Some("distance") => WeightScheme::Distance,
                    Some(other) => {
                        return Err(KolosalError::InvalidParameter {
                            name: "weights".to_string(),
                            value: other.to_string(),
                            reason: "expected uniform or distance".to_string(),
                        })
                    }
                    None => return Err(missing("weights")),
                };
                LearnerConfig::Knn(KnnConfig {
                    n_neighbors: usize_param(params, "n_neighbors")?,
                    weights,
                    metric: DistanceMetric::from_power(int_param(params, "p")?)?,
                })
            }
            LearnerKind::GradientBoosting => LearnerConfig::GradientBoosting(GradientBoostingConfig {
                n_estimators: usize_param(params, "n_estimators")?,
                max_depth: usize_param(params, "max_depth")?,
                learning_rate: params.get("learning_rate").and_then(|v| v.as_float()).ok_or_else(|| missing("learning_rate"))?,
                subsample: params.get("subsample").and_then(|v| v.as_float()).ok_or_else(|| missing("subsample"))?,
                min_samples_split: usize_param(params, "min_samples_split")?,
                min_samples_leaf: usize_param(params, "min_samples_leaf")?,
                random_state: Some(seed),
            }),
        };
        Ok(config)
    }

    /// Hyperparameters as a flat JSON object
    pub fn params_json(&self) -> serde_json::Value {
        let value = match self {
            LearnerConfig::ExtraTrees(c) => serde_json::to_value(c),
            LearnerConfig::Knn(c) => serde_json::to_value(c),
            LearnerConfig::GradientBoosting(c) => serde_json::to_value(c),
        };
        value.unwrap_or(serde_json::Value::Null)
    }

    /// Fresh unfit learner for this configuration
    pub fn build(&self) -> Learner {
        match self {
            LearnerConfig::ExtraTrees(c) => {
                let mut model = ExtraTreesClassifier::new(c.n_estimators)
                    .with_min_samples_split(c.min_samples_split)
                    .with_min_samples_leaf(c.min_samples_leaf)
                    .with_bootstrap(c.bootstrap)
                    .with_random_state(c.random_state);
                if let Some(depth) = c.max_depth {
                    model = model.with_max_depth(depth);
                }
                Learner::ExtraTrees(model)
            }
            LearnerConfig::Knn(c) => Learner::Knn(KnnClassifier::new(c.clone())),
            LearnerConfig::GradientBoosting(c) => {
                Learner::GradientBoosting(GradientBoostingClassifier::new(c.clone()))
            }
        }
    }
}

/// An unfit base learner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Learner {
    ExtraTrees(ExtraTreesClassifier),
    Knn(KnnClassifier),
    GradientBoosting(GradientBoostingClassifier),
}

impl Learner {
    /// Fit on `(x, y)`, consuming the unfit learner
    pub fn fit(self, config: &LearnerConfig, x: &Array2<f64>, y: &Array1<f64>) -> Result<FittedLearner> {
        let model = match self {
            Learner::ExtraTrees(mut m) => {
                m.fit(x, y)?;
                Learner::ExtraTrees(m)
            }
            Learner::Knn(mut m) => {
                m.fit(x, y)?;
                Learner::Knn(m)
            }
            Learner::GradientBoosting(mut m) => {
                m.fit(x, y)?;
                Learner::GradientBoosting(m)
            }
        };
        Ok(FittedLearner {
            config: config.clone(),
            model,
        })
    }
}

/// A fitted base learner together with the configuration it was built from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedLearner {
    config: LearnerConfig,
    model: Learner,
}

impl FittedLearner {
    /// Build and fit in one step
    pub fn fit(config: &LearnerConfig, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        config.build().fit(config, x, y)
    }

    pub fn kind(&self) -> LearnerKind {
        self.config.kind()
    }

    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    /// Positive-class probability per row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match &self.model {
            Learner::ExtraTrees(m) => m.predict_proba(x),
            Learner::Knn(m) => m.predict_proba(x),
            Learner::GradientBoosting(m) => m.predict_proba(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::ParameterValue;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_every_sample_builds_a_config() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        for kind in LearnerKind::ALL {
            let space = LearnerConfig::search_space(kind);
            for _ in 0..20 {
                let params = space.sample(&mut rng);
                let config = LearnerConfig::from_params(kind, &params, 42).unwrap();
                assert_eq!(config.kind(), kind);
            }
        }
    }

    #[test]
    fn test_gradient_boosting_params_are_copied() {
        let params: TrialParams = [
            ("n_estimators", ParameterValue::Int(120)),
            ("max_depth", ParameterValue::Int(4)),
            ("learning_rate", ParameterValue::Float(0.05)),
            ("subsample", ParameterValue::Float(0.7)),
            ("min_samples_split", ParameterValue::Int(6)),
            ("min_samples_leaf", ParameterValue::Int(3)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let config = LearnerConfig::from_params(LearnerKind::GradientBoosting, &params, 7).unwrap();
        match config {
            LearnerConfig::GradientBoosting(c) => {
                assert_eq!(c.n_estimators, 120);
                assert_eq!(c.max_depth, 4);
                assert_eq!(c.subsample, 0.7);
                assert_eq!(c.random_state, Some(7));
            }
            other => panic!("unexpected config {:?}", other),
        }
    }

    #[test]
    fn test_missing_param_is_rejected() {
        let params = TrialParams::new();
        assert!(matches!(
            LearnerConfig::from_params(LearnerKind::Knn, &params, 0),
            Err(KolosalError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_build_fit_predict() {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| (i * (j + 1)) as f64 / 10.0);
        let y = Array1::from_iter((0..40).map(|i| if i >= 20 { 1.0 } else { 0.0 }));
        for kind in LearnerKind::ALL {
            let fitted = FittedLearner::fit(&LearnerConfig::default_for(kind), &x, &y).unwrap();
            let proba = fitted.predict_proba(&x).unwrap();
            assert_eq!(proba.len(), 40);
            assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)), "{kind}");
            assert_eq!(fitted.kind(), kind);
        }
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("knn".parse::<LearnerKind>().unwrap(), LearnerKind::Knn);
        assert_eq!("GB".parse::<LearnerKind>().unwrap(), LearnerKind::GradientBoosting);
        assert!("svm".parse::<LearnerKind>().is_err());
        assert_eq!(serde_json::to_string(&LearnerKind::ExtraTrees).unwrap(), "\"extra_trees\"");
    }
}
