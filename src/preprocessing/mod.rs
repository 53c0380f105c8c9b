//! Feature preprocessing
//!
//! The transform is fitted once on the training partition and then applied
//! unchanged to every other split and to serving traffic.

pub mod transform;

pub use transform::{FeatureTransform, TransformKind, DEFAULT_CONTINUOUS_THRESHOLD};
