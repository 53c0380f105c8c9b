//! Online scoring
//!
//! [`CreditScorer`] wraps a loaded artifact and replays the training-time
//! feature order, transform and ensemble for every request.

pub mod scorer;

pub use scorer::{
    BaseLearnerInfo, CreditScorer, CustomerRecord, ModelInfo, RiskTier, ScoredRecord, DECISION_THRESHOLD,
};
