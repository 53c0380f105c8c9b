//! Kolosal Credit - stacked-ensemble credit default scoring
//!
//! This crate provides:
//! - CSV loading, cleaning and the credit feature schema
//! - Outlier/scale transforms fitted on training data only
//! - Base learners (Extra Trees, KNN, gradient boosting) and a logistic meta learner
//! - TPE hyperparameter search with median pruning
//! - Out-of-fold stacking and a versioned model artifact
//! - A scoring facade, REST server and CLI
//!
//! # Modules
//!
//! ## Training
//! - [`data`] - CSV source, cleaning and schema
//! - [`preprocessing`] - Power, quantile, standard and outlier-clip transforms
//! - [`training`] - Learners, cross-validation, metrics and per-learner search
//! - [`optimizer`] - Search spaces, samplers, pruners and the study loop
//! - [`ensemble`] - Out-of-fold meta-features and the stacked ensemble
//! - [`pipeline`] - End-to-end training run
//!
//! ## Serving
//! - [`export`] - Artifact persistence
//! - [`inference`] - Scoring facade
//! - [`server`] - HTTP server with REST API
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Training
pub mod data;
pub mod preprocessing;
pub mod training;
pub mod optimizer;
pub mod ensemble;
pub mod pipeline;

// Serving
pub mod export;
pub mod inference;

// Services
pub mod server;
pub mod cli;

pub use error::{KolosalError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{KolosalError, Result};

    // Data
    pub use crate::data::{CreditDataLoader, Dataset, FeatureSchema};

    // Preprocessing
    pub use crate::preprocessing::{FeatureTransform, TransformKind};

    // Training
    pub use crate::training::{
        ClassificationMetrics, FittedLearner, HyperparameterSearch, LearnerConfig, LearnerKind,
    };

    // Optimization
    pub use crate::optimizer::{HyperOptX, OptimizationConfig, SearchSpace, Study};

    // Ensemble
    pub use crate::ensemble::{EnsembleState, OutOfFoldGenerator, StackedEnsemble, StackingConfig};

    // Pipeline and serving
    pub use crate::export::EnsembleArtifact;
    pub use crate::inference::{CreditScorer, CustomerRecord, RiskTier, ScoredRecord};
    pub use crate::pipeline::{PipelineConfig, TrainingPipeline};
}
