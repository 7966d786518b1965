use super::UploadForm;
use crate::photoshoot::{GenerationRequest, SessionSeed};
use crate::server::error::ApiError;
use crate::server::schemas::GenerateResponse;
use crate::server::state::AppState;
use axum::Json;
use axum::extract::{Multipart, State};
use chrono::Utc;
use std::sync::Arc;

/// One generation call for one pose, outside of any session
pub async fn generate_image(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<GenerateResponse>, ApiError> {
    let mut form = UploadForm::read(multipart).await?;
    let source = form.take_image()?;

    let pose_index = parse_pose_index(form.field("photoIndex"));
    let seed = form
        .field("sessionSeed")
        .map(SessionSeed::new)
        .unwrap_or_else(|| SessionSeed::new(Utc::now().timestamp_millis().to_string()));
    let custom_prompt = form.field("customPrompt");

    tracing::info!(pose = pose_index, seed = %seed, custom = custom_prompt.is_some(), "Generate request");

    let request = GenerationRequest::new(&source, pose_index, &seed)
        .with_extra_instruction(custom_prompt);
    let artifact = state.service().generate(request).await?;

    Ok(Json(GenerateResponse::from_artifact(&artifact)))
}

/// Missing, unparsable or zero indices fall back to the first pose
fn parse_pose_index(value: Option<&str>) -> u32 {
    value
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|index| *index > 0)
        .unwrap_or(1)
}
