//! Model persistence
//!
//! A trained ensemble is stored as a single versioned, checksummed file
//! holding the feature schema, the fitted transform, every learner and a
//! training summary.

pub mod artifact;

pub use artifact::{ArtifactMetadata, BaseLearnerSummary, EnsembleArtifact, ARTIFACT_MAGIC, FORMAT_VERSION};
