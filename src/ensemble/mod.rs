//! Stacked ensemble
//!
//! - [`oof`] builds the out-of-fold meta-feature matrix
//! - [`stacking`] tunes the base learners and fits the logistic meta learner

pub mod oof;
pub mod stacking;

pub use oof::{MetaFeatures, OutOfFoldGenerator};
pub use stacking::{EnsembleReport, EnsembleState, LearnerReport, StackedEnsemble, StackingConfig};
