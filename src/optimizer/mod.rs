//! Hyperparameter optimization module (HyperOptX)
//!
//! Sequential model-based search:
//! - Tree-structured Parzen Estimator (TPE) and random samplers
//! - Median pruning on intermediate values of completed trials
//! - JSON-serializable study of every trial

mod config;
mod optimizer;
pub mod pruners;
mod samplers;
mod search_space;

pub use config::{OptimizationConfig, OptimizeDirection};
pub use optimizer::{HyperOptX, Study, Trial, TrialResult, TrialState};
pub use pruners::{create_pruner, MedianPruner, NoPruner, Pruner, PrunerConfig, TrialHistory};
pub use samplers::{create_sampler, RandomSampler, Sampler, SamplerType, TPESampler};
pub use search_space::{Parameter, ParameterType, ParameterValue, SearchSpace, TrialParams};
