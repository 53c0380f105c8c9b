//! Training pipeline configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::data::{FeatureSchema, ID_COLUMN, TARGET_COLUMN};
use crate::ensemble::StackingConfig;
use crate::error::{KolosalError, Result};
use crate::preprocessing::{TransformKind, DEFAULT_CONTINUOUS_THRESHOLD};
use crate::training::LearnerKind;

/// Configuration for a training run; every field has a default so partial
/// JSON files are accepted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Name of the binary label column
    pub target_column: String,

    /// Fraction of rows held out for the final evaluation
    pub test_fraction: f64,

    /// Seed for the split, the folds and every learner
    pub seed: u64,

    /// Folds for the search and the out-of-fold meta-features
    pub cv_folds: usize,

    /// Search trials per base learner
    pub n_trials: usize,

    /// Completed trials before median pruning starts
    pub pruner_startup_trials: usize,

    pub transform: TransformKind,

    /// Base learners to stack, in meta-feature column order
    pub learners: Vec<LearnerKind>,

    /// Columns with more distinct values than this are transformed
    pub continuous_threshold: usize,

    pub meta_max_iter: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_column: TARGET_COLUMN.to_string(),
            test_fraction: 0.2,
            seed: 42,
            cv_folds: 5,
            n_trials: 20,
            pruner_startup_trials: 5,
            transform: TransformKind::Power,
            learners: LearnerKind::ALL.to_vec(),
            continuous_threshold: DEFAULT_CONTINUOUS_THRESHOLD,
            meta_max_iter: 1000,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            KolosalError::ConfigError(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_test_fraction(mut self, fraction: f64) -> Self {
        self.test_fraction = fraction;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
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

    pub fn with_transform(mut self, kind: TransformKind) -> Self {
        self.transform = kind;
        self
    }

    pub fn with_learners(mut self, learners: Vec<LearnerKind>) -> Self {
        self.learners = learners;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_fraction >= 0.0 && self.test_fraction < 1.0) {
            return Err(KolosalError::ConfigError(format!(
                "test_fraction must be in [0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.cv_folds < 2 {
            return Err(KolosalError::ConfigError(format!(
                "cv_folds must be at least 2, got {}",
                self.cv_folds
            )));
        }
        if self.learners.is_empty() {
            return Err(KolosalError::ConfigError("No base learners configured".to_string()));
        }
        if self.target_column.is_empty() {
            return Err(KolosalError::ConfigError("target_column is empty".to_string()));
        }
        Ok(())
    }

    /// Credit feature schema with this run's label column
    pub fn schema(&self) -> FeatureSchema {
        FeatureSchema::new(FeatureSchema::credit_default().features, ID_COLUMN, self.target_column.clone())
    }

    pub fn stacking(&self) -> StackingConfig {
        StackingConfig {
            learners: self.learners.clone(),
            cv_folds: self.cv_folds,
            n_trials: self.n_trials,
            pruner_startup_trials: self.pruner_startup_trials,
            seed: self.seed,
            meta_c: 1.0,
            meta_max_iter: self.meta_max_iter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.test_fraction, 0.2);
        assert_eq!(config.seed, 42);
        assert_eq!(config.cv_folds, 5);
        assert_eq!(config.n_trials, 20);
        assert_eq!(config.learners.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.json");
        std::fs::write(&path, r#"{"n_trials": 3, "learners": ["knn"], "transform": "Quantile"}"#).unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.n_trials, 3);
        assert_eq!(config.learners, vec![LearnerKind::Knn]);
        assert_eq!(config.transform, TransformKind::Quantile);
        assert_eq!(config.cv_folds, 5);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(PipelineConfig::new().with_cv_folds(1).validate().is_err());
        assert!(PipelineConfig::new().with_test_fraction(1.0).validate().is_err());
        assert!(PipelineConfig::new().with_learners(Vec::new()).validate().is_err());
    }

    #[test]
    fn test_stacking_config_follows_pipeline() {
        let stacking = PipelineConfig::new().with_n_trials(7).with_seed(3).stacking();
        assert_eq!(stacking.n_trials, 7);
        assert_eq!(stacking.seed, 3);
        assert_eq!(stacking.pruner_startup_trials, 5);
    }
}
