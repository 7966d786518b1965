use super::UploadForm;
use crate::photoshoot::{CancelToken, GeneratedArtifact, RunSnapshot};
use crate::server::error::ApiError;
use crate::server::schemas::{CancelResponse, RegenerateRequest, RunRequest};
use crate::server::state::AppState;
use axum::Json;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use std::sync::Arc;

/// Replace the session source; all previous results are dropped
pub async fn upload_source(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<RunSnapshot>, ApiError> {
    let mut form = UploadForm::read(multipart).await?;
    let source = form.take_image()?;

    state.orchestrator().new_source(source)?;
    Ok(Json(state.orchestrator().snapshot()))
}

/// Begin a run and drive it in the background
pub async fn start_run(
    State(state): State<Arc<AppState>>,
    body: Option<Json<RunRequest>>,
) -> Result<(StatusCode, Json<RunSnapshot>), ApiError> {
    let total = body
        .and_then(|Json(request)| request.total)
        .unwrap_or(state.default_poses());

    let (pending, cancel) = state.admit_run(total)?;
    tracing::info!(total = pending.total(), seed = %pending.seed(), "Run accepted");

    tokio::spawn(async move {
        if let Err(e) = pending.drive(cancel).await {
            tracing::warn!("Background run stopped: {}", e);
        }
    });

    Ok((StatusCode::ACCEPTED, Json(state.orchestrator().snapshot())))
}

/// Regenerate one pose and wait for the result
pub async fn regenerate_pose(
    State(state): State<Arc<AppState>>,
    Path(index): Path<u32>,
    body: Option<Json<RegenerateRequest>>,
) -> Result<Json<GeneratedArtifact>, ApiError> {
    let extra = body.and_then(|Json(request)| request.extra_instruction);

    let pending = state.admit_regeneration(index, extra)?;
    tracing::info!(pose = pending.pose_index(), "Regeneration accepted");
    let artifact = pending.drive(CancelToken::new()).await?;

    Ok(Json(artifact))
}

pub async fn cancel_run(State(state): State<Arc<AppState>>) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.cancel_active(),
    })
}

pub async fn current_state(State(state): State<Arc<AppState>>) -> Json<RunSnapshot> {
    Json(state.orchestrator().snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::photoshoot::{
        GenerationError, GenerationRequest, GenerationService, ImageRef, PhotoshootOrchestrator,
        RunPhase, UploadedSource,
    };
    use async_trait::async_trait;
    use std::time::Duration;

    /// Succeeds for every pose except the ones listed
    struct FlakyService {
        failing: Vec<u32>,
    }

    #[async_trait]
    impl GenerationService for FlakyService {
        async fn generate(
            &self,
            request: GenerationRequest<'_>,
        ) -> Result<GeneratedArtifact, GenerationError> {
            if self.failing.contains(&request.pose_index) {
                return Err(GenerationError::NoImageProduced {
                    pose_index: request.pose_index,
                    analysis: "text only".into(),
                });
            }
            Ok(GeneratedArtifact::new(
                request.pose_index,
                ImageRef::Remote(format!("https://img.test/{}.png", request.pose_index)),
                "",
            ))
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn state(failing: Vec<u32>) -> Arc<AppState> {
        let service: Arc<dyn GenerationService> = Arc::new(FlakyService { failing });
        Arc::new(AppState::new(
            PhotoshootOrchestrator::new(service.clone()),
            service,
            "unused",
            3,
        ))
    }

    async fn wait_until_finished(state: &AppState) -> RunSnapshot {
        let mut updates = state.orchestrator().subscribe();
        let snapshot = tokio::time::timeout(
            Duration::from_secs(5),
            updates.wait_for(|s| !state_busy(s) && s.phase.is_finished()),
        )
        .await
        .expect("run finished in time")
        .expect("orchestrator alive")
        .clone();
        snapshot
    }

    fn state_busy(snapshot: &RunSnapshot) -> bool {
        snapshot.phase.is_running() || snapshot.regenerating.is_some()
    }

    #[tokio::test]
    async fn test_run_without_source_is_bad_request() {
        let state = state(vec![]);
        let err = start_run(State(state), None).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_background_run_uses_default_total() {
        let state = state(vec![]);
        state
            .orchestrator()
            .new_source(UploadedSource::new(b"saree".to_vec(), "image/png"))
            .unwrap();

        let (status, _) = start_run(State(state.clone()), None).await.unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);

        let finished = wait_until_finished(&state).await;
        assert_eq!(finished.phase, RunPhase::Completed { total: 3 });
        assert_eq!(finished.pose_indices(), vec![1, 2, 3]);

        let Json(current) = current_state(State(state)).await;
        assert_eq!(current, finished);
    }

    #[tokio::test]
    async fn test_regeneration_failure_is_scoped_to_pose() {
        let state = state(vec![2]);
        state
            .orchestrator()
            .new_source(UploadedSource::new(b"saree".to_vec(), "image/png"))
            .unwrap();

        start_run(State(state.clone()), Some(Json(RunRequest { total: Some(3) })))
            .await
            .unwrap();
        let finished = wait_until_finished(&state).await;
        assert_eq!(finished.phase, RunPhase::Failed { pose_index: 2, total: 3 });

        let err = regenerate_pose(State(state.clone()), Path(2), None)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(state.orchestrator().snapshot().pose_indices(), vec![1]);

        let Json(artifact) = regenerate_pose(
            State(state.clone()),
            Path(3),
            Some(Json(RegenerateRequest {
                extra_instruction: Some("closer framing".into()),
            })),
        )
        .await
        .unwrap();
        assert_eq!(artifact.pose_index, 3);
        assert_eq!(state.orchestrator().snapshot().pose_indices(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_cancel_with_nothing_running() {
        let state = state(vec![]);
        let Json(response) = cancel_run(State(state)).await;
        assert!(!response.cancelled);
    }
}
