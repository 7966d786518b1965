use crate::photoshoot::media_type_from_extension;
use crate::server::error::ApiError;
use crate::server::state::AppState;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

/// Serve a generated image from the output directory
pub async fn serve_artifact(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
) -> Result<Response, ApiError> {
    let name = checked_file_name(&file)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid file name: {}", file)))?;

    let path = state.files_dir().join(name);
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ApiError::NotFound(name.to_string())
        } else {
            ApiError::Internal(format!("Failed to read {}: {}", path.display(), e))
        }
    })?;

    let content_type = name
        .rsplit_once('.')
        .and_then(|(_, ext)| media_type_from_extension(ext))
        .unwrap_or("application/octet-stream");

    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

/// A bare file name inside the output directory, nothing that could escape it
fn checked_file_name(name: &str) -> Option<&str> {
    let escapes = name.contains("..") || name.contains('/') || name.contains('\\');
    if name.is_empty() || name.starts_with('.') || escapes {
        None
    } else {
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::photoshoot::{
        GeneratedArtifact, GenerationError, GenerationRequest, GenerationService,
        PhotoshootOrchestrator,
    };
    use async_trait::async_trait;
    use axum::http::StatusCode;

    struct Unused;

    #[async_trait]
    impl GenerationService for Unused {
        async fn generate(
            &self,
            _: GenerationRequest<'_>,
        ) -> Result<GeneratedArtifact, GenerationError> {
            Err(GenerationError::UpstreamUnavailable("offline".into()))
        }

        fn name(&self) -> &str {
            "unused"
        }
    }

    fn state(dir: &std::path::Path) -> Arc<AppState> {
        let service: Arc<dyn GenerationService> = Arc::new(Unused);
        Arc::new(AppState::new(
            PhotoshootOrchestrator::new(service.clone()),
            service,
            dir,
            10,
        ))
    }

    #[test]
    fn test_checked_file_name() {
        assert_eq!(checked_file_name("saree-1.png"), Some("saree-1.png"));
        assert_eq!(checked_file_name("../secret"), None);
        assert_eq!(checked_file_name("a/b.png"), None);
        assert_eq!(checked_file_name("a\\b.png"), None);
        assert_eq!(checked_file_name(".env"), None);
        assert_eq!(checked_file_name(""), None);
    }

    #[tokio::test]
    async fn test_serves_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("saree-1.webp"), b"webp").unwrap();

        let response = serve_artifact(State(state(dir.path())), Path("saree-1.webp".into()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/webp");
    }

    #[tokio::test]
    async fn test_missing_and_invalid_names() {
        let dir = tempfile::tempdir().unwrap();

        let missing = serve_artifact(State(state(dir.path())), Path("saree-2.png".into()))
            .await
            .unwrap_err();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let escaping = serve_artifact(State(state(dir.path())), Path("..".into()))
            .await
            .unwrap_err();
        assert_eq!(escaping.status(), StatusCode::BAD_REQUEST);
    }
}
