//! Pruners for early stopping of trials

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pruner trait for deciding when to stop unpromising trials early
pub trait Pruner: Send + Sync {
    /// Decide whether to prune a trial at the current step, given the
    /// intermediate values of previously completed trials
    fn should_prune(&self, trial_id: usize, step: usize, value: f64, history: &TrialHistory) -> bool;
}

/// Intermediate values of completed trials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrialHistory {
    /// trial_id -> (step -> value)
    values: BTreeMap<usize, BTreeMap<usize, f64>>,
}

impl TrialHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every intermediate value of a finished trial
    pub fn record_trial(&mut self, trial_id: usize, values: &BTreeMap<usize, f64>) {
        self.values.insert(trial_id, values.clone());
    }

    /// Get all values at a specific step across trials
    pub fn get_step_values(&self, step: usize) -> Vec<f64> {
        self.values
            .values()
            .filter_map(|trial| trial.get(&step).copied())
            .collect()
    }

    pub fn n_trials(&self) -> usize {
        self.values.len()
    }
}

/// Median pruner: prunes a trial whose intermediate value is worse than the
/// median of completed trials at the same step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedianPruner {
    /// Completed trials required before any pruning happens
    n_startup_trials: usize,
    /// Steps below this are never pruned
    n_warmup_steps: usize,
    minimize: bool,
}

impl MedianPruner {
    pub fn new(minimize: bool) -> Self {
        Self {
            n_startup_trials: 5,
            n_warmup_steps: 0,
            minimize,
        }
    }

    pub fn with_n_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    pub fn with_n_warmup_steps(mut self, n: usize) -> Self {
        self.n_warmup_steps = n;
        self
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

impl Pruner for MedianPruner {
    fn should_prune(&self, _trial_id: usize, step: usize, value: f64, history: &TrialHistory) -> bool {
        if history.n_trials() < self.n_startup_trials || step < self.n_warmup_steps {
            return false;
        }
        if value.is_nan() {
            return true;
        }

        let mut values = history.get_step_values(step);
        match median(&mut values) {
            Some(m) if self.minimize => value > m,
            Some(m) => value < m,
            None => false,
        }
    }
}

/// No pruning - always continue
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoPruner;

impl Pruner for NoPruner {
    fn should_prune(&self, _trial_id: usize, _step: usize, _value: f64, _history: &TrialHistory) -> bool {
        false
    }
}

/// Pruner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PrunerConfig {
    Median {
        n_startup_trials: usize,
        n_warmup_steps: usize,
    },
    None,
}

impl Default for PrunerConfig {
    fn default() -> Self {
        PrunerConfig::Median {
            n_startup_trials: 5,
            n_warmup_steps: 0,
        }
    }
}

/// Create a pruner from configuration
pub fn create_pruner(config: PrunerConfig, minimize: bool) -> Box<dyn Pruner> {
    match config {
        PrunerConfig::Median { n_startup_trials, n_warmup_steps } => Box::new(
            MedianPruner::new(minimize)
                .with_n_startup_trials(n_startup_trials)
                .with_n_warmup_steps(n_warmup_steps),
        ),
        PrunerConfig::None => Box::new(NoPruner),
    }
}
