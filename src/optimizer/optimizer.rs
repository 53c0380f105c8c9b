//! HyperOptX - sequential hyperparameter optimizer with pruning

use super::{
    config::{OptimizationConfig, OptimizeDirection},
    pruners::{create_pruner, Pruner, TrialHistory},
    samplers::{create_sampler, Sampler},
    search_space::{SearchSpace, TrialParams},
};
use crate::error::{KolosalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, warn};

/// Final state of a trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialState {
    Complete,
    Pruned,
    Failed,
}

/// Result of a single trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: usize,
    pub params: TrialParams,
    /// Objective value; `None` unless the trial completed
    pub value: Option<f64>,
    pub state: TrialState,
    /// Intermediate values reported per step
    pub intermediate_values: BTreeMap<usize, f64>,
    /// Extra named values recorded by the objective
    pub metrics: BTreeMap<String, f64>,
    pub duration_secs: f64,
    /// Failure message for failed trials
    pub error: Option<String>,
}

/// Study containing all trials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Study {
    pub trials: Vec<TrialResult>,
    pub best_trial_idx: Option<usize>,
    pub total_duration_secs: f64,
    pub direction: OptimizeDirection,
}

impl Study {
    pub fn new(direction: OptimizeDirection) -> Self {
        Self {
            trials: Vec::new(),
            best_trial_idx: None,
            total_duration_secs: 0.0,
            direction,
        }
    }

    /// Best completed trial
    pub fn best_trial(&self) -> Option<&TrialResult> {
        self.best_trial_idx.map(|idx| &self.trials[idx])
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best_trial().and_then(|t| t.value)
    }

    pub fn best_params(&self) -> Option<&TrialParams> {
        self.best_trial().map(|t| &t.params)
    }

    pub fn n_trials_in(&self, state: TrialState) -> usize {
        self.trials.iter().filter(|t| t.state == state).count()
    }

    /// Add a trial result; only completed trials with a finite value can become best
    pub fn add_trial(&mut self, result: TrialResult) {
        let idx = self.trials.len();

        if let (TrialState::Complete, Some(value)) = (result.state, result.value) {
            let is_better = value.is_finite()
                && self.best_value().map_or(true, |best| self.direction.is_better(value, best));
            if is_better {
                self.best_trial_idx = Some(idx);
            }
        }

        self.trials.push(result);
    }

    /// Save study to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load study from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Handle given to the objective for one trial.
///
/// Reporting an intermediate value may end the trial: `report` returns
/// `KolosalError::TrialPruned` when the pruner rejects it, and the objective
/// is expected to propagate that error with `?`.
pub struct Trial<'a> {
    trial_id: usize,
    params: &'a TrialParams,
    pruner: &'a dyn Pruner,
    history: &'a TrialHistory,
    intermediate_values: BTreeMap<usize, f64>,
    metrics: BTreeMap<String, f64>,
}

impl<'a> Trial<'a> {
    pub fn id(&self) -> usize {
        self.trial_id
    }

    pub fn params(&self) -> &TrialParams {
        self.params
    }

    /// Report an intermediate value for `step`
    pub fn report(&mut self, step: usize, value: f64) -> Result<()> {
        self.intermediate_values.insert(step, value);
        if self.pruner.should_prune(self.trial_id, step, value, self.history) {
            return Err(KolosalError::TrialPruned { step });
        }
        Ok(())
    }

    /// Attach a named value to the trial record
    pub fn set_metric(&mut self, name: impl Into<String>, value: f64) {
        self.metrics.insert(name.into(), value);
    }
}

/// Main hyperparameter optimizer
pub struct HyperOptX {
    config: OptimizationConfig,
    search_space: SearchSpace,
    sampler: Box<dyn Sampler>,
    pruner: Box<dyn Pruner>,
    study: Study,
}

impl HyperOptX {
    pub fn new(config: OptimizationConfig, search_space: SearchSpace) -> Self {
        let sampler = create_sampler(config.sampler.clone(), config.random_state, config.n_startup_trials);
        let pruner = create_pruner(
            config.pruner.clone(),
            config.direction == OptimizeDirection::Minimize,
        );
        let study = Study::new(config.direction);

        Self {
            config,
            search_space,
            sampler,
            pruner,
            study,
        }
    }

    /// Run the trial budget sequentially.
    ///
    /// Each trial's parameters depend on the outcomes of all earlier trials.
    /// Objective errors other than pruning mark the trial failed and the
    /// search continues.
    pub fn optimize<F>(&mut self, mut objective: F) -> Result<&Study>
    where
        F: FnMut(&mut Trial<'_>) -> Result<f64>,
    {
        self.search_space.validate()?;

        let start = Instant::now();
        let direction = self.config.direction;
        let mut completed: Vec<(TrialParams, f64)> = Vec::new();
        let mut history = TrialHistory::new();

        for trial_id in 0..self.config.n_trials {
            let trial_start = Instant::now();
            let params = self.sampler.sample(&self.search_space, &completed);

            let mut trial = Trial {
                trial_id,
                params: &params,
                pruner: self.pruner.as_ref(),
                history: &history,
                intermediate_values: BTreeMap::new(),
                metrics: BTreeMap::new(),
            };
            let outcome = objective(&mut trial);
            let Trial { intermediate_values, metrics, .. } = trial;

            let (state, value, error) = match outcome {
                Ok(v) if v.is_finite() => (TrialState::Complete, Some(v), None),
                Ok(v) => (TrialState::Failed, None, Some(format!("objective returned {}", v))),
                Err(KolosalError::TrialPruned { step }) => {
                    debug!(trial_id, step, "Trial pruned");
                    (TrialState::Pruned, None, None)
                }
                Err(e) => {
                    warn!(trial_id, error = %e, "Trial failed");
                    (TrialState::Failed, None, Some(e.to_string()))
                }
            };

            if let Some(v) = value {
                completed.push((params.clone(), direction.to_loss(v)));
                history.record_trial(trial_id, &intermediate_values);
                debug!(trial_id, value = v, ?params, "Trial complete");
            }

            self.study.add_trial(TrialResult {
                trial_id,
                params,
                value,
                state,
                intermediate_values,
                metrics,
                duration_secs: trial_start.elapsed().as_secs_f64(),
                error,
            });
        }

        self.study.total_duration_secs = start.elapsed().as_secs_f64();
        Ok(&self.study)
    }

    pub fn study(&self) -> &Study {
        &self.study
    }

    pub fn into_study(self) -> Study {
        self.study
    }
}
