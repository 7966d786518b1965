use super::error::ApiError;
use super::state::AppState;
use crate::photoshoot::{UploadedSource, media_type_from_extension};
use axum::Router;
use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::routing::{get, post};
use files::serve_artifact;
use generate::generate_image;
use session::{cancel_run, current_state, regenerate_pose, start_run, upload_source};
use std::collections::HashMap;
use std::sync::Arc;

mod files;
mod generate;
mod session;

pub fn api_routes(public_prefix: &str) -> Router<Arc<AppState>> {
    let files_route = format!("{}/{{file}}", public_prefix.trim_end_matches('/'));

    Router::new()
        .route("/api/generate", post(generate_image))
        .route("/api/session", post(upload_source))
        .route("/api/run", post(start_run))
        .route("/api/poses/{index}/regenerate", post(regenerate_pose))
        .route("/api/cancel", post(cancel_run))
        .route("/api/state", get(current_state))
        .route(&files_route, get(serve_artifact))
}

/// Multipart upload: the `image` file plus plain text fields
#[derive(Debug, Default)]
pub(crate) struct UploadForm {
    image: Option<UploadedSource>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    pub(crate) async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error("Invalid multipart body", e))?
        {
            let name = field.name().unwrap_or_default().to_string();

            if name == "image" {
                let file_name = field.file_name().map(str::to_string);
                let media_type = upload_media_type(field.content_type(), file_name.as_deref());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error("Failed to read image", e))?;

                let mut source = UploadedSource::new(bytes.to_vec(), media_type);
                if let Some(file_name) = file_name {
                    source = source.with_file_name(file_name);
                }
                form.image = Some(source);
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(&format!("Invalid field {}", name), e))?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    /// The uploaded image; empty uploads count as missing
    pub(crate) fn take_image(&mut self) -> Result<UploadedSource, ApiError> {
        self.image
            .take()
            .filter(|image| !image.is_empty())
            .ok_or_else(|| ApiError::BadRequest("No image provided".to_string()))
    }

    /// A text field, trimmed, `None` when absent or blank
    pub(crate) fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Body-limit failures stay 413; anything else is a malformed request
fn multipart_error(context: &str, error: MultipartError) -> ApiError {
    let message = format!("{}: {}", context, error.body_text());
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(message)
    } else {
        ApiError::BadRequest(message)
    }
}

/// Declared content type, else guessed from the file name
fn upload_media_type(content_type: Option<&str>, file_name: Option<&str>) -> String {
    content_type
        .filter(|ct| !ct.is_empty() && *ct != "application/octet-stream")
        .map(str::to_string)
        .or_else(|| {
            file_name
                .and_then(|name| name.rsplit_once('.'))
                .and_then(|(_, ext)| media_type_from_extension(ext))
                .map(str::to_string)
        })
        .unwrap_or_else(|| "application/octet-stream".to_string())
}
