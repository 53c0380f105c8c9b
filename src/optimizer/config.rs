//! Optimization configuration

use super::{PrunerConfig, SamplerType};
use serde::{Deserialize, Serialize};

/// Direction of optimization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizeDirection {
    Minimize,
    Maximize,
}

impl OptimizeDirection {
    /// Map an objective value to a loss where lower is better
    pub fn to_loss(self, value: f64) -> f64 {
        match self {
            OptimizeDirection::Minimize => value,
            OptimizeDirection::Maximize => -value,
        }
    }

    /// Whether `a` is strictly better than `b`
    pub fn is_better(self, a: f64, b: f64) -> bool {
        self.to_loss(a) < self.to_loss(b)
    }
}

/// Configuration for hyperparameter optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationConfig {
    /// Number of trials to run
    pub n_trials: usize,
    /// Optimization direction
    pub direction: OptimizeDirection,
    /// Sampler type
    pub sampler: SamplerType,
    /// Completed trials sampled at random before TPE takes over
    pub n_startup_trials: usize,
    /// Random seed
    pub random_state: Option<u64>,
    /// Pruning strategy
    pub pruner: PrunerConfig,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            n_trials: 20,
            direction: OptimizeDirection::Maximize,
            sampler: SamplerType::TPE,
            n_startup_trials: 10,
            random_state: Some(42),
            pruner: PrunerConfig::default(),
        }
    }
}

impl OptimizationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_trials(mut self, n: usize) -> Self {
        self.n_trials = n;
        self
    }

    pub fn with_direction(mut self, direction: OptimizeDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_sampler(mut self, sampler: SamplerType) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn with_pruner(mut self, pruner: PrunerConfig) -> Self {
        self.pruner = pruner;
        self
    }
}
