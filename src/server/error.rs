//! Error types for the server

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::error::KolosalError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// No model is loaded
    #[error("Model not available: {0}")]
    ModelUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<KolosalError> for ServerError {
    fn from(err: KolosalError) -> Self {
        match err {
            KolosalError::SchemaMismatch { .. }
            | KolosalError::ValidationError(_)
            | KolosalError::ShapeError { .. }
            | KolosalError::InvalidParameter { .. } => ServerError::BadRequest(err.to_string()),
            KolosalError::NotFitted
            | KolosalError::ArtifactNotFound(_)
            | KolosalError::ArtifactCorrupt(_) => ServerError::ModelUnavailable(err.to_string()),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::BadRequest(msg) => {
                tracing::warn!(detail = %msg, "Rejected request");
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            ServerError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ServerError::ModelUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            ServerError::Internal(msg) => {
                tracing::error!(detail = %msg, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "An internal error occurred".to_string())
            }
        };

        let body = Json(json!({
            "error": true,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let schema = ServerError::from(KolosalError::SchemaMismatch {
            missing: vec!["AGE".to_string()],
            unexpected: Vec::new(),
        });
        assert_eq!(schema.into_response().status(), StatusCode::BAD_REQUEST);

        let missing = ServerError::from(KolosalError::NotFitted);
        assert_eq!(missing.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);

        let internal = ServerError::from(KolosalError::TrainingError("x".to_string()));
        assert_eq!(internal.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
