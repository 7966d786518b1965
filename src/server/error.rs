use super::schemas::ErrorBody;
use crate::photoshoot::{GenerationError, OrchestratorError};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("{0}")]
    Internal(String),
}

fn generation_status(error: &GenerationError) -> StatusCode {
    match error {
        GenerationError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        GenerationError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        GenerationError::UpstreamRejected(_) => StatusCode::BAD_GATEWAY,
        GenerationError::NoImageProduced { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        GenerationError::PersistenceFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Generation(e) => generation_status(e),
            ApiError::Orchestrator(e) => match e {
                OrchestratorError::RunInProgress
                | OrchestratorError::RegenerationInProgress(_)
                | OrchestratorError::Cancelled { .. } => StatusCode::CONFLICT,
                OrchestratorError::NoSource
                | OrchestratorError::InvalidPoseCount(_)
                | OrchestratorError::InvalidPoseIndex(_) => StatusCode::BAD_REQUEST,
                OrchestratorError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                OrchestratorError::PoseFailed { source, .. } => generation_status(source),
            },
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        let error = match self {
            ApiError::BadRequest(msg) | ApiError::PayloadTooLarge(msg) => msg.clone(),
            ApiError::NotFound(_) => "Not found".to_string(),
            ApiError::Generation(_) => "Failed to generate image".to_string(),
            ApiError::Orchestrator(OrchestratorError::PoseFailed { .. }) => {
                "Failed to generate image".to_string()
            }
            ApiError::Orchestrator(e) => e.to_string(),
            ApiError::Internal(_) => "Internal server error".to_string(),
        };

        let details = match self {
            ApiError::BadRequest(_) | ApiError::PayloadTooLarge(_) => None,
            ApiError::Orchestrator(OrchestratorError::PoseFailed { source, .. }) => {
                Some(source.to_string())
            }
            ApiError::Orchestrator(_) => None,
            other => Some(other.to_string()),
        };

        let pose_index = match self {
            ApiError::Generation(GenerationError::NoImageProduced { pose_index, .. }) => {
                Some(*pose_index)
            }
            ApiError::Orchestrator(e) => e.pose_index(),
            _ => None,
        };

        ErrorBody {
            error,
            details,
            pose_index,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(%status, "{}", self);
        } else {
            tracing::debug!(%status, "{}", self);
        }
        (status, Json(self.body())).into_response()
    }
}
