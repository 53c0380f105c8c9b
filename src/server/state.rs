//! Application state shared across handlers

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info};

use super::error::ServerError;
use super::ServerConfig;
use crate::inference::CreditScorer;

/// Built once at startup and never mutated; the scorer is shared without locks
pub struct AppState {
    pub config: ServerConfig,
    pub scorer: Option<Arc<CreditScorer>>,
    /// Why the scorer is absent
    pub load_error: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Load the model named by the config; a failure leaves the state unready
    pub fn load(config: ServerConfig) -> Self {
        match CreditScorer::load(&config.model_path) {
            Ok(scorer) => {
                info!(path = %config.model_path.display(), "Model loaded");
                Self::with_scorer(config, scorer)
            }
            Err(e) => {
                error!(path = %config.model_path.display(), error = %e, "Model failed to load, serving unready");
                Self::unready(config, e.to_string())
            }
        }
    }

    pub fn with_scorer(config: ServerConfig, scorer: CreditScorer) -> Self {
        Self {
            config,
            scorer: Some(Arc::new(scorer)),
            load_error: None,
            started_at: Utc::now(),
        }
    }

    pub fn unready(config: ServerConfig, reason: impl Into<String>) -> Self {
        Self {
            config,
            scorer: None,
            load_error: Some(reason.into()),
            started_at: Utc::now(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.scorer.is_some()
    }

    /// The loaded scorer, or a 503
    pub fn scorer(&self) -> Result<Arc<CreditScorer>, ServerError> {
        self.scorer.clone().ok_or_else(|| {
            ServerError::ModelUnavailable(
                self.load_error
                    .clone()
                    .unwrap_or_else(|| "model not loaded".to_string()),
            )
        })
    }
}
