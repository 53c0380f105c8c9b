//! Feature schema of the credit default dataset

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{KolosalError, Result};

/// Name of the binary label column
pub const TARGET_COLUMN: &str = "default.payment.next.month";

/// Record identifier, echoed in responses but never used as a feature
pub const ID_COLUMN: &str = "ID";

/// Ordered feature columns plus the identifier and label column names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub features: Vec<String>,
    pub id_column: String,
    pub target_column: String,
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::credit_default()
    }
}

impl FeatureSchema {
    pub fn new(features: Vec<String>, id_column: impl Into<String>, target_column: impl Into<String>) -> Self {
        Self {
            features,
            id_column: id_column.into(),
            target_column: target_column.into(),
        }
    }

    /// The 24 account features used by the scoring model
    pub fn credit_default() -> Self {
        let mut features = vec!["LIMIT_BAL".to_string(), "AGE".to_string()];
        features.extend((1..=6).map(|i| format!("BILL_AMT{}", i)));
        features.extend((1..=6).map(|i| format!("PAY_AMT{}", i)));
        features.extend((1..=6).map(|i| format!("PAY_{}", i)));
        features.extend(
            ["EDUCATION", "MARRIAGE", "SEX", "AGE_GROUP"]
                .iter()
                .map(|s| s.to_string()),
        );
        Self::new(features, ID_COLUMN, TARGET_COLUMN)
    }

    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|f| f == name)
    }

    /// Compare a set of input columns against the feature list.
    ///
    /// The identifier column is always allowed. Any missing or unexpected
    /// column yields [`KolosalError::SchemaMismatch`].
    pub fn check_columns<'a, I>(&self, columns: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let given: BTreeSet<&str> = columns
            .into_iter()
            .filter(|c| *c != self.id_column)
            .collect();
        let expected: BTreeSet<&str> = self.features.iter().map(String::as_str).collect();

        let missing: Vec<String> = self
            .features
            .iter()
            .filter(|f| !given.contains(f.as_str()))
            .cloned()
            .collect();
        let unexpected: Vec<String> = given
            .iter()
            .filter(|c| !expected.contains(*c))
            .map(|c| c.to_string())
            .collect();

        if missing.is_empty() && unexpected.is_empty() {
            Ok(())
        } else {
            Err(KolosalError::SchemaMismatch { missing, unexpected })
        }
    }
}
