//! Persisted ensemble artifact
//!
//! Layout on disk:
//!
//! ```text
//! [0..8)    magic  b"KCSTACK\0"
//! [8..12)   format version, u32 little-endian
//! [12..44)  SHA-256 of the payload
//! [44..)    bincode payload (EnsembleArtifact)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::ensemble::StackedEnsemble;
use crate::error::{KolosalError, Result};
use crate::preprocessing::{FeatureTransform, TransformKind};
use crate::training::{ClassificationMetrics, LearnerKind};

pub const ARTIFACT_MAGIC: &[u8; 8] = b"KCSTACK\0";
pub const FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = 8 + 4 + 32;

/// Chosen configuration and scores of one base learner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseLearnerSummary {
    pub kind: LearnerKind,
    /// Hyperparameters as a JSON object string
    pub params: String,
    pub cv_auc: Option<f64>,
    pub oof_auc: f64,
    /// Search fell back to defaults
    pub exhausted: bool,
}

/// Training summary stored with the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub model_name: String,
    pub base_learners: Vec<BaseLearnerSummary>,
    pub meta_model: String,
    pub transform: TransformKind,
    pub transformed_columns: Vec<String>,
    pub n_train_rows: usize,
    pub n_test_rows: usize,
    pub train_positive_rate: f64,
    pub stacked_oof_auc: f64,
    /// Metrics on the hold-out split, when one was evaluated
    pub holdout: Option<ClassificationMetrics>,
    pub seed: u64,
    pub training_secs: f64,
}

/// Everything needed to score a record exactly as at training time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleArtifact {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    /// Feature order expected by the transform and every learner
    pub feature_columns: Vec<String>,
    pub transform: FeatureTransform,
    pub ensemble: StackedEnsemble,
    pub metadata: ArtifactMetadata,
}

impl EnsembleArtifact {
    /// Bundle a fitted transform and ensemble; both must agree on the feature order
    pub fn new(
        feature_columns: Vec<String>,
        transform: FeatureTransform,
        ensemble: StackedEnsemble,
        metadata: ArtifactMetadata,
    ) -> Result<Self> {
        let artifact = Self {
            format_version: FORMAT_VERSION,
            created_at: Utc::now(),
            feature_columns,
            transform,
            ensemble,
            metadata,
        };
        artifact
            .validate()
            .map_err(|e| KolosalError::ValidationError(format!("Inconsistent artifact: {}", e)))?;
        Ok(artifact)
    }

    /// Internal consistency check; failures are reported as `ArtifactCorrupt`
    pub fn validate(&self) -> Result<()> {
        let corrupt = |msg: String| Err(KolosalError::ArtifactCorrupt(msg));

        if self.format_version != FORMAT_VERSION {
            return corrupt(format!("unsupported format version {}", self.format_version));
        }
        if self.feature_columns.is_empty() {
            return corrupt("empty feature schema".to_string());
        }
        if self.transform.columns() != self.feature_columns.as_slice() {
            return corrupt("transform feature order differs from artifact schema".to_string());
        }
        if self.ensemble.n_features() != self.feature_columns.len() {
            return corrupt(format!(
                "ensemble expects {} features, schema has {}",
                self.ensemble.n_features(),
                self.feature_columns.len()
            ));
        }
        self.ensemble
            .check_integrity()
            .map_err(|e| KolosalError::ArtifactCorrupt(e.to_string()))
    }

    /// Encode header and payload
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;
        let digest = Sha256::digest(&payload);

        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(ARTIFACT_MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&digest);
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Decode and verify header, checksum and contents
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(KolosalError::ArtifactCorrupt(format!(
                "file is {} bytes, shorter than the {}-byte header",
                bytes.len(),
                HEADER_LEN
            )));
        }
        let (magic, rest) = bytes.split_at(8);
        let (version, rest) = rest.split_at(4);
        let (checksum, payload) = rest.split_at(32);

        if magic != ARTIFACT_MAGIC {
            return Err(KolosalError::ArtifactCorrupt("bad magic bytes".to_string()));
        }
        let version = u32::from_le_bytes([version[0], version[1], version[2], version[3]]);
        if version != FORMAT_VERSION {
            return Err(KolosalError::ArtifactCorrupt(format!(
                "unsupported format version {} (expected {})",
                version, FORMAT_VERSION
            )));
        }
        if Sha256::digest(payload).as_slice() != checksum {
            return Err(KolosalError::ArtifactCorrupt("payload checksum mismatch".to_string()));
        }

        let artifact: Self = bincode::deserialize(payload)
            .map_err(|e| KolosalError::ArtifactCorrupt(format!("undecodable payload: {}", e)))?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// Write atomically: the bytes go to a sibling temp file that is renamed into place
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let bytes = self.to_bytes()?;
        let tmp = temp_path(path);
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            writer.write_all(&bytes)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        info!(path = %path.display(), bytes = bytes.len(), "Saved ensemble artifact");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => KolosalError::ArtifactNotFound(path.display().to_string()),
            _ => KolosalError::IoError(e),
        })?;
        let artifact = Self::from_bytes(&bytes)?;
        info!(
            path = %path.display(),
            created_at = %artifact.created_at,
            features = artifact.feature_columns.len(),
            "Loaded ensemble artifact"
        );
        Ok(artifact)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
