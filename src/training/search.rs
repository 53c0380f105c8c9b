//! Per-learner hyperparameter search scored by cross-validated ROC-AUC

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::cross_validation::{CVSplit, CrossValidator};
use super::learner::{FittedLearner, LearnerConfig, LearnerKind};
use super::metrics::roc_auc;
use crate::error::{KolosalError, Result};
use crate::optimizer::{HyperOptX, OptimizationConfig, OptimizeDirection, Study, TrialState};

/// Searches one learner family at a time
#[derive(Debug, Clone)]
pub struct HyperparameterSearch {
    optimization: OptimizationConfig,
    cv_folds: usize,
    seed: u64,
}

impl Default for HyperparameterSearch {
    fn default() -> Self {
        Self::new(20, 5, 42)
    }
}

impl HyperparameterSearch {
    pub fn new(n_trials: usize, cv_folds: usize, seed: u64) -> Self {
        Self {
            optimization: OptimizationConfig::new()
                .with_n_trials(n_trials)
                .with_direction(OptimizeDirection::Maximize)
                .with_random_state(seed),
            cv_folds,
            seed,
        }
    }

    /// Replace the optimizer settings; the direction is always forced to maximize
    pub fn with_optimization(mut self, config: OptimizationConfig) -> Self {
        self.optimization = config.with_direction(OptimizeDirection::Maximize);
        self
    }

    pub fn n_trials(&self) -> usize {
        self.optimization.n_trials
    }

    /// Run the trial budget for `kind` on `(x, y)` and pick the best configuration.
    ///
    /// Folds are evaluated one after another so the running mean AUC can be
    /// reported after each fold for pruning; the learners themselves use all
    /// cores inside each fit.
    pub fn run(&self, kind: LearnerKind, x: &Array2<f64>, y: &Array1<f64>) -> Result<SearchOutcome> {
        let start = Instant::now();
        let splits = CrossValidator::stratified(self.cv_folds, self.seed).split(x.nrows(), Some(y))?;
        let seed = self.seed;

        info!(learner = %kind, n_trials = self.n_trials(), folds = splits.len(), "Starting hyperparameter search");

        let mut optimizer = HyperOptX::new(self.optimization.clone(), LearnerConfig::search_space(kind));
        optimizer.optimize(|trial| {
            let config = LearnerConfig::from_params(kind, trial.params(), seed)?;
            let mut scores = Vec::with_capacity(splits.len());
            for split in &splits {
                let auc = evaluate_fold(&config, x, y, split)?;
                trial.set_metric(format!("fold_{}_auc", split.fold_idx), auc);
                scores.push(auc);
                let running = scores.iter().sum::<f64>() / scores.len() as f64;
                trial.report(split.fold_idx, running)?;
            }
            let mean = scores.iter().sum::<f64>() / scores.len() as f64;
            debug!(learner = %kind, trial = trial.id(), auc = mean, "Trial scored");
            Ok(mean)
        })?;
        let study = optimizer.into_study();

        let best = study
            .best_trial()
            .and_then(|t| t.value.map(|v| (t.params.clone(), v)));

        let (best_config, best_cv_auc, exhausted) = match best {
            Some((params, auc)) => (LearnerConfig::from_params(kind, &params, seed)?, Some(auc), false),
            None => {
                let err = KolosalError::SearchSpaceExhausted {
                    learner: kind.to_string(),
                    n_trials: study.trials.len(),
                };
                warn!(learner = %kind, error = %err, "Falling back to default configuration");
                (LearnerConfig::default_for(kind), None, true)
            }
        };

        info!(
            learner = %kind,
            best_auc = best_cv_auc.unwrap_or(f64::NAN),
            completed = study.n_trials_in(TrialState::Complete),
            pruned = study.n_trials_in(TrialState::Pruned),
            failed = study.n_trials_in(TrialState::Failed),
            elapsed_secs = start.elapsed().as_secs_f64(),
            "Hyperparameter search finished"
        );

        Ok(SearchOutcome {
            kind,
            best_config,
            best_cv_auc,
            exhausted,
            study,
        })
    }
}

/// Fit on the fold's training rows and score its held-out rows
fn evaluate_fold(config: &LearnerConfig, x: &Array2<f64>, y: &Array1<f64>, split: &CVSplit) -> Result<f64> {
    let x_train = x.select(Axis(0), &split.train_indices);
    let y_train = y.select(Axis(0), &split.train_indices);
    let x_test = x.select(Axis(0), &split.test_indices);
    let y_test = y.select(Axis(0), &split.test_indices);

    let model = FittedLearner::fit(config, &x_train, &y_train)?;
    let proba = model.predict_proba(&x_test)?;
    roc_auc(&y_test, &proba)
}

/// Result of searching one learner family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub kind: LearnerKind,
    /// Winning configuration, or the defaults when the search was exhausted
    pub best_config: LearnerConfig,
    /// Mean cross-validated AUC of the winning trial
    pub best_cv_auc: Option<f64>,
    /// True when no trial completed and the defaults were used
    pub exhausted: bool,
    pub study: Study,
}

impl SearchOutcome {
    /// The exhaustion error when the search degraded to defaults
    pub fn exhaustion_error(&self) -> Option<KolosalError> {
        self.exhausted.then(|| KolosalError::SearchSpaceExhausted {
            learner: self.kind.to_string(),
            n_trials: self.study.trials.len(),
        })
    }

    /// Fit the winning configuration on the full training set
    pub fn fit_final(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<FittedLearner> {
        FittedLearner::fit(&self.best_config, x, y)
    }
}
