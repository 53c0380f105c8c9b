//! Two-layer stacked ensemble
//!
//! Base learners are tuned and refitted on the full training set, their
//! out-of-fold probabilities become the meta-features, and a logistic
//! regression over those features yields the final probability.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

use super::oof::OutOfFoldGenerator;
use crate::error::{KolosalError, Result};
use crate::optimizer::{OptimizationConfig, PrunerConfig, TrialState};
use crate::training::{
    CVResults, FittedLearner, HyperparameterSearch, LearnerConfig, LearnerKind, LogisticRegression, SearchOutcome,
};

/// Lifecycle of a [`StackedEnsemble`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnsembleState {
    Unfit,
    /// Base learners fitted, meta learner pending
    BaseFit,
    Ready,
}

/// Configuration for stacking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackingConfig {
    /// Base learner families, one meta-feature column each
    pub learners: Vec<LearnerKind>,
    /// Folds for both the search and the meta-features
    pub cv_folds: usize,
    /// Trials per learner
    pub n_trials: usize,
    /// Completed trials before median pruning starts
    pub pruner_startup_trials: usize,
    pub seed: u64,
    /// Inverse regularization strength of the meta learner
    pub meta_c: f64,
    pub meta_max_iter: usize,
}

impl Default for StackingConfig {
    fn default() -> Self {
        Self {
            learners: LearnerKind::ALL.to_vec(),
            cv_folds: 5,
            n_trials: 20,
            pruner_startup_trials: 5,
            seed: 42,
            meta_c: 1.0,
            meta_max_iter: 1000,
        }
    }
}

impl StackingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_learners(mut self, learners: Vec<LearnerKind>) -> Self {
        self.learners = learners;
        self
    }

    pub fn with_cv_folds(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    pub fn with_n_trials(mut self, n: usize) -> Self {
        self.n_trials = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn search(&self) -> HyperparameterSearch {
        let optimization = OptimizationConfig::new()
            .with_n_trials(self.n_trials)
            .with_random_state(self.seed)
            .with_pruner(PrunerConfig::Median {
                n_startup_trials: self.pruner_startup_trials,
                n_warmup_steps: 0,
            });
        HyperparameterSearch::new(self.n_trials, self.cv_folds, self.seed).with_optimization(optimization)
    }

    fn validate(&self) -> Result<()> {
        if self.learners.is_empty() {
            return Err(KolosalError::ConfigError("At least one base learner is required".to_string()));
        }
        let mut seen = self.learners.clone();
        seen.sort_by_key(|k| k.id());
        seen.dedup();
        if seen.len() != self.learners.len() {
            return Err(KolosalError::ConfigError("Base learners must be distinct".to_string()));
        }
        if self.cv_folds < 2 {
            return Err(KolosalError::ConfigError("cv_folds must be at least 2".to_string()));
        }
        if !(self.meta_c > 0.0) {
            return Err(KolosalError::ConfigError("meta_c must be positive".to_string()));
        }
        Ok(())
    }
}

/// Per-learner summary of a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerReport {
    pub kind: LearnerKind,
    pub config: LearnerConfig,
    /// Mean cross-validated AUC of the winning trial
    pub cv_auc: Option<f64>,
    /// Per-fold AUCs of the winning trial
    pub cv_scores: Option<CVResults>,
    /// True when the search fell back to defaults
    pub exhausted: bool,
    /// AUC of this learner's out-of-fold column
    pub oof_auc: f64,
    pub trials_completed: usize,
    pub trials_pruned: usize,
    pub trials_failed: usize,
}

/// Outcome of [`StackedEnsemble::fit`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleReport {
    pub learners: Vec<LearnerReport>,
    /// Full search history per learner
    pub searches: Vec<SearchOutcome>,
    pub meta_coefficients: Vec<f64>,
    pub meta_intercept: f64,
    /// AUC of the meta learner on the out-of-fold matrix
    pub stacked_oof_auc: f64,
    pub duration_secs: f64,
}

/// Stacked ensemble of tuned base learners with a logistic meta learner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackedEnsemble {
    config: StackingConfig,
    state: EnsembleState,
    n_features: usize,
    base_learners: Vec<FittedLearner>,
    meta_learner: Option<LogisticRegression>,
    #[serde(skip)]
    report: Option<EnsembleReport>,
}

impl StackedEnsemble {
    pub fn new(config: StackingConfig) -> Self {
        Self {
            config,
            state: EnsembleState::Unfit,
            n_features: 0,
            base_learners: Vec::new(),
            meta_learner: None,
            report: None,
        }
    }

    pub fn state(&self) -> EnsembleState {
        self.state
    }

    pub fn config(&self) -> &StackingConfig {
        &self.config
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn base_learners(&self) -> &[FittedLearner] {
        &self.base_learners
    }

    pub fn meta_learner(&self) -> Option<&LogisticRegression> {
        self.meta_learner.as_ref()
    }

    /// Report of the fit that produced this instance; absent after deserialization
    pub fn report(&self) -> Option<&EnsembleReport> {
        self.report.as_ref()
    }

    /// Tune, fit and stack. Allowed once per instance.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&EnsembleReport> {
        if self.state != EnsembleState::Unfit {
            return Err(KolosalError::AlreadyFitted);
        }
        self.config.validate()?;
        if x.nrows() != y.len() {
            return Err(KolosalError::ShapeError {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", y.len()),
            });
        }

        let start = Instant::now();
        info!(rows = x.nrows(), features = x.ncols(), learners = self.config.learners.len(), "Fitting stacked ensemble");

        // Base layer: search each family, then refit the winner on all rows
        let search = self.config.search();
        let mut searches = Vec::with_capacity(self.config.learners.len());
        let mut base_learners = Vec::with_capacity(self.config.learners.len());
        for &kind in &self.config.learners {
            let outcome = search.run(kind, x, y)?;
            if let Some(err) = outcome.exhaustion_error() {
                warn!(learner = %kind, error = %err, "Using default configuration");
            }
            base_learners.push(outcome.fit_final(x, y)?);
            searches.push(outcome);
        }
        self.base_learners = base_learners;
        self.n_features = x.ncols();
        self.state = EnsembleState::BaseFit;

        // Meta layer
        let configs: Vec<LearnerConfig> = searches.iter().map(|s| s.best_config.clone()).collect();
        let meta_features = OutOfFoldGenerator::new(self.config.cv_folds, self.config.seed).generate(&configs, x, y)?;
        let column_auc = meta_features.column_auc(y)?;

        let mut meta = LogisticRegression::new()
            .with_c(self.config.meta_c)
            .with_max_iter(self.config.meta_max_iter);
        meta.fit(&meta_features.matrix, y)?;
        let stacked_oof_auc = crate::training::roc_auc(y, &meta.predict_proba(&meta_features.matrix)?)?;

        let report = EnsembleReport {
            learners: searches
                .iter()
                .zip(&column_auc)
                .map(|(s, &(_, oof_auc))| LearnerReport {
                    kind: s.kind,
                    config: s.best_config.clone(),
                    cv_auc: s.best_cv_auc,
                    cv_scores: s
                        .study
                        .best_trial()
                        .map(|t| CVResults::from_scores(t.metrics.values().copied().collect())),
                    exhausted: s.exhausted,
                    oof_auc,
                    trials_completed: s.study.n_trials_in(TrialState::Complete),
                    trials_pruned: s.study.n_trials_in(TrialState::Pruned),
                    trials_failed: s.study.n_trials_in(TrialState::Failed),
                })
                .collect(),
            searches,
            meta_coefficients: meta.coefficients.as_ref().map(|c| c.to_vec()).unwrap_or_default(),
            meta_intercept: meta.intercept.unwrap_or(0.0),
            stacked_oof_auc,
            duration_secs: start.elapsed().as_secs_f64(),
        };

        info!(
            stacked_oof_auc,
            converged = meta.converged,
            elapsed_secs = report.duration_secs,
            "Stacked ensemble ready"
        );

        self.meta_learner = Some(meta);
        self.state = EnsembleState::Ready;
        Ok(&*self.report.insert(report))
    }

    /// Meta-feature row per record: each base learner's positive-class probability
    pub fn meta_features(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.state == EnsembleState::Unfit {
            return Err(KolosalError::NotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(KolosalError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        let mut matrix = Array2::zeros((x.nrows(), self.base_learners.len()));
        for (col, learner) in self.base_learners.iter().enumerate() {
            matrix.column_mut(col).assign(&learner.predict_proba(x)?);
        }
        Ok(matrix)
    }

    /// Positive-class probability per row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.state != EnsembleState::Ready {
            return Err(KolosalError::NotFitted);
        }
        let meta = self.meta_learner.as_ref().ok_or(KolosalError::NotFitted)?;
        meta.predict_proba(&self.meta_features(x)?)
    }

    /// Structural consistency of a loaded ensemble
    pub fn check_integrity(&self) -> Result<()> {
        let problem = if self.state != EnsembleState::Ready {
            Some(format!("ensemble state is {:?}", self.state))
        } else if self.base_learners.is_empty() {
            Some("no base learners".to_string())
        } else if self.meta_learner.as_ref().and_then(|m| m.coefficients.as_ref()).map(|c| c.len())
            != Some(self.base_learners.len())
        {
            Some("meta learner width does not match base learners".to_string())
        } else {
            None
        };
        match problem {
            Some(msg) => Err(KolosalError::ValidationError(msg)),
            None => Ok(()),
        }
    }
}
