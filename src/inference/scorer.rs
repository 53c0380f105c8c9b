//! Scoring facade over a persisted ensemble

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::data::{FeatureSchema, ID_COLUMN, TARGET_COLUMN};
use crate::error::{KolosalError, Result};
use crate::export::EnsembleArtifact;
use crate::training::ClassificationMetrics;

/// Probability above which a record is classified as a default
pub const DECISION_THRESHOLD: f64 = 0.5;

/// One customer as submitted for scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRecord {
    #[serde(rename = "ID")]
    pub id: i64,
    /// Feature name to value; must match the model schema exactly
    #[serde(flatten)]
    pub features: BTreeMap<String, f64>,
}

impl CustomerRecord {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            features: BTreeMap::new(),
        }
    }

    pub fn with_feature(mut self, name: impl Into<String>, value: f64) -> Self {
        self.features.insert(name.into(), value);
        self
    }
}

/// Coarse risk band of a default probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
}

impl RiskTier {
    /// `[0, 0.2)` Low, `[0.2, 0.4)` Medium, `[0.4, 0.6)` High, otherwise Very High
    pub fn from_probability(p: f64) -> Self {
        if p < 0.2 {
            RiskTier::Low
        } else if p < 0.4 {
            RiskTier::Medium
        } else if p < 0.6 {
            RiskTier::High
        } else {
            RiskTier::VeryHigh
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "Low",
            RiskTier::Medium => "Medium",
            RiskTier::High => "High",
            RiskTier::VeryHigh => "Very High",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scoring response for one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    #[serde(rename = "ID")]
    pub id: i64,
    /// Rounded to 4 decimals
    pub default_probability: f64,
    pub default_prediction: u8,
    pub default_label: String,
    pub risk_level: RiskTier,
}

impl ScoredRecord {
    /// Prediction, label and tier use the raw probability; only the
    /// reported probability is rounded
    pub fn from_probability(id: i64, p: f64) -> Self {
        let default = p > DECISION_THRESHOLD;
        Self {
            id,
            default_probability: (p * 10_000.0).round() / 10_000.0,
            default_prediction: u8::from(default),
            default_label: if default { "Default" } else { "No Default" }.to_string(),
            risk_level: RiskTier::from_probability(p),
        }
    }
}

/// A base learner as described to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseLearnerInfo {
    pub name: String,
    pub kind: String,
    pub params: serde_json::Value,
    pub cv_auc: Option<f64>,
}

/// Model description served by `/model_info` and printed by the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_name: String,
    pub model_type: String,
    pub base_learners: Vec<BaseLearnerInfo>,
    pub meta_model: String,
    /// Input fields per record, including the identifier
    pub n_features: usize,
    pub input_features: Vec<String>,
    pub target: String,
    pub classes: Vec<u8>,
    pub threshold: f64,
    pub transform: String,
    pub transformed_columns: Vec<String>,
    pub format_version: u32,
    pub created_at: String,
    pub n_train_rows: usize,
    pub holdout_metrics: Option<ClassificationMetrics>,
}

/// Immutable scorer built from one artifact
#[derive(Debug, Clone)]
pub struct CreditScorer {
    artifact: EnsembleArtifact,
    schema: FeatureSchema,
}

impl CreditScorer {
    /// Load and verify an artifact from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_artifact(EnsembleArtifact::load(path)?)
    }

    pub fn from_artifact(artifact: EnsembleArtifact) -> Result<Self> {
        artifact.validate()?;
        let schema = FeatureSchema::new(artifact.feature_columns.clone(), ID_COLUMN, TARGET_COLUMN);
        Ok(Self { artifact, schema })
    }

    pub fn artifact(&self) -> &EnsembleArtifact {
        &self.artifact
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.schema.features
    }

    /// Score records, preserving input order
    pub fn predict(&self, records: &[CustomerRecord]) -> Result<Vec<ScoredRecord>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let x = self.to_matrix(records)?;
        let proba = self.predict_matrix(&x)?;
        debug!(records = records.len(), "Scored batch");

        Ok(records
            .iter()
            .zip(proba.iter())
            .map(|(record, &p)| ScoredRecord::from_probability(record.id, p))
            .collect())
    }

    pub fn predict_one(&self, record: &CustomerRecord) -> Result<ScoredRecord> {
        self.predict(std::slice::from_ref(record))?
            .pop()
            .ok_or_else(|| KolosalError::ValidationError("No prediction produced".to_string()))
    }

    /// Raw default probabilities for rows already in schema order
    pub fn predict_matrix(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let transformed = self.artifact.transform.apply(x)?;
        self.artifact.ensemble.predict_proba(&transformed)
    }

    /// Arrange records into a matrix in schema order; any column mismatch is an error
    fn to_matrix(&self, records: &[CustomerRecord]) -> Result<Array2<f64>> {
        let columns = self.feature_columns();
        let mut x = Array2::zeros((records.len(), columns.len()));
        for (i, record) in records.iter().enumerate() {
            self.schema.check_columns(record.features.keys().map(String::as_str))?;
            for (j, name) in columns.iter().enumerate() {
                let value = record.features.get(name).copied().unwrap_or(f64::NAN);
                if !value.is_finite() {
                    return Err(KolosalError::ValidationError(format!(
                        "Record {} has a non-finite value for {}",
                        record.id, name
                    )));
                }
                x[[i, j]] = value;
            }
        }
        Ok(x)
    }

    pub fn model_info(&self) -> ModelInfo {
        let meta = &self.artifact.metadata;
        let base_learners = self
            .artifact
            .ensemble
            .base_learners()
            .iter()
            .map(|learner| {
                let kind = learner.kind();
                BaseLearnerInfo {
                    name: kind.model_name().to_string(),
                    kind: kind.to_string(),
                    params: learner.config().params_json(),
                    cv_auc: meta.base_learners.iter().find(|b| b.kind == kind).and_then(|b| b.cv_auc),
                }
            })
            .collect();

        let mut input_features = vec![ID_COLUMN.to_string()];
        input_features.extend(self.feature_columns().iter().cloned());

        ModelInfo {
            model_name: meta.model_name.clone(),
            model_type: "StackedEnsemble".to_string(),
            base_learners,
            meta_model: meta.meta_model.clone(),
            n_features: input_features.len(),
            input_features,
            target: TARGET_COLUMN.to_string(),
            classes: vec![0, 1],
            threshold: DECISION_THRESHOLD,
            transform: meta.transform.to_string(),
            transformed_columns: meta.transformed_columns.clone(),
            format_version: self.artifact.format_version,
            created_at: self.artifact.created_at.to_rfc3339(),
            n_train_rows: meta.n_train_rows,
            holdout_metrics: meta.holdout.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_tier_boundaries() {
        let cases = [
            (0.0, RiskTier::Low),
            (0.1999, RiskTier::Low),
            (0.2, RiskTier::Medium),
            (0.3999, RiskTier::Medium),
            (0.4, RiskTier::High),
            (0.5999, RiskTier::High),
            (0.6, RiskTier::VeryHigh),
            (1.0, RiskTier::VeryHigh),
        ];
        for (p, tier) in cases {
            assert_eq!(RiskTier::from_probability(p), tier, "p = {p}");
        }
    }

    #[test]
    fn test_scored_record_threshold() {
        let below = ScoredRecord::from_probability(1, 0.5);
        assert_eq!(below.default_prediction, 0);
        assert_eq!(below.default_label, "No Default");

        let above = ScoredRecord::from_probability(2, 0.73456);
        assert_eq!(above.default_probability, 0.7346);
        assert_eq!(above.default_prediction, 1);
        assert_eq!(above.default_label, "Default");
        assert_eq!(above.risk_level, RiskTier::VeryHigh);

        let just_above = ScoredRecord::from_probability(3, 0.50004);
        assert_eq!(just_above.default_probability, 0.5);
        assert_eq!(just_above.default_prediction, 1);
        assert_eq!(just_above.default_label, "Default");

        let just_below_medium = ScoredRecord::from_probability(4, 0.19996);
        assert_eq!(just_below_medium.default_probability, 0.2);
        assert_eq!(just_below_medium.risk_level, RiskTier::Low);
    }

    #[test]
    fn test_record_json_shape() {
        let record: CustomerRecord =
            serde_json::from_str(r#"{"ID": 7, "AGE": 31.0, "LIMIT_BAL": 50000}"#).unwrap();
        assert_eq!(record.id, 7);
        assert_eq!(record.features.len(), 2);
        assert_eq!(record.features["LIMIT_BAL"], 50000.0);

        let scored = serde_json::to_value(ScoredRecord::from_probability(7, 0.65)).unwrap();
        assert_eq!(scored["ID"], 7);
        assert_eq!(scored["risk_level"], "Very High");
    }
}
