// Gemini adapter - generates one pose through the hosted multimodal image model

use super::poses::PoseTable;
use super::prompt::build_instruction;
use super::response::{self, GenerateContentResponse, ModelImage, ModelOutput};
use super::service::{GenerationError, GenerationRequest, GenerationService};
use super::store::ArtifactStore;
use super::types::{GeneratedArtifact, ImageRef};
use crate::config::{ConfigError, GeminiConfig, StudioConfig};
use crate::photoshoot::store::DirectoryStore;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Longest slice of an error body kept in error messages
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Production adapter: one `generateContent` call per pose
pub struct GeminiAdapter {
    config: GeminiConfig,
    api_key: String,
    client: reqwest::Client,
    poses: Arc<PoseTable>,
    store: Arc<dyn ArtifactStore>,
}

impl GeminiAdapter {
    pub fn new(
        config: GeminiConfig,
        api_key: impl Into<String>,
        poses: Arc<PoseTable>,
        store: Arc<dyn ArtifactStore>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            config,
            api_key: api_key.into(),
            client,
            poses,
            store,
        })
    }

    /// Adapter writing into the configured output directory
    pub fn from_studio_config(config: &StudioConfig) -> Result<Self, ConfigError> {
        let store = DirectoryStore::new(
            config.storage.output_dir.clone(),
            config.storage.public_prefix.clone(),
        );

        Self::new(
            config.gemini.clone(),
            config.api_key()?,
            Arc::new(config.poses.clone()),
            Arc::new(store),
        )
        .map_err(|e| ConfigError::Invalid(format!("Failed to build HTTP client: {}", e)))
    }

    pub fn poses(&self) -> &PoseTable {
        &self.poses
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }

    fn build_request(&self, request: &GenerationRequest<'_>) -> GenerateContentRequest {
        let pose = self.poses.resolve(request.pose_index);
        let instruction = build_instruction(
            pose,
            request.pose_index,
            self.poses.len(),
            request.seed,
            request.extra_instruction,
        );

        GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user".to_string(),
                parts: vec![
                    RequestPart::Text { text: instruction },
                    RequestPart::Inline {
                        inline_data: RequestInlineData {
                            mime_type: request.source.media_type().to_string(),
                            data: STANDARD.encode(request.source.bytes()),
                        },
                    },
                ],
            }],
            generation_config: RequestGenerationConfig {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                top_k: self.config.top_k,
                candidate_count: 1,
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
            },
        }
    }
}

#[async_trait]
impl GenerationService for GeminiAdapter {
    async fn generate(
        &self,
        request: GenerationRequest<'_>,
    ) -> Result<GeneratedArtifact, GenerationError> {
        if request.source.is_empty() {
            return Err(GenerationError::InvalidInput("No image provided".to_string()));
        }

        let body = self.build_request(&request);

        tracing::info!(
            pose = request.pose_index,
            seed = %request.seed,
            model = %self.config.model,
            "Requesting generated pose"
        );

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::UpstreamUnavailable(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(pose = request.pose_index, %status, "Model call failed");
            return Err(classify_status(status, &text));
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                GenerationError::UpstreamRejected(format!("Malformed response: {}", e))
            } else {
                GenerationError::UpstreamUnavailable(format!("Failed to read response: {}", e))
            }
        })?;

        let output = response::interpret(parsed)?;
        materialize(self.store.as_ref(), request.pose_index, output).await
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

/// Turn interpreted model output into an artifact, persisting inline images
pub(crate) async fn materialize(
    store: &dyn ArtifactStore,
    pose_index: u32,
    output: ModelOutput,
) -> Result<GeneratedArtifact, GenerationError> {
    match output.image {
        Some(ModelImage::Inline { bytes, media_type }) => {
            let stored = store
                .persist(&bytes, &media_type)
                .await
                .map_err(|e| GenerationError::PersistenceFailed(e.to_string()))?;

            let data_url = format!("data:{};base64,{}", media_type, STANDARD.encode(&bytes));

            tracing::info!(pose = pose_index, file = %stored.file_name, "Pose generated");
            Ok(
                GeneratedArtifact::new(pose_index, ImageRef::Embedded(data_url), output.analysis)
                    .with_stored(stored),
            )
        }
        Some(ModelImage::Linked(url)) => {
            tracing::info!(pose = pose_index, %url, "Pose generated as linked image");
            Ok(GeneratedArtifact::new(
                pose_index,
                ImageRef::Remote(url),
                output.analysis,
            ))
        }
        None => Err(GenerationError::NoImageProduced {
            pose_index,
            analysis: output.analysis,
        }),
    }
}

/// Map a non-success HTTP status to the error taxonomy
fn classify_status(status: StatusCode, body: &str) -> GenerationError {
    let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    let message = if body.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, body)
    };

    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        GenerationError::UpstreamUnavailable(message)
    } else {
        GenerationError::UpstreamRejected(message)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
    generation_config: RequestGenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    role: String,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: RequestInlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestGenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    candidate_count: u32,
    response_modalities: Vec<String>,
}
