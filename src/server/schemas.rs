use crate::photoshoot::GeneratedArtifact;
use serde::{Deserialize, Serialize};

/// Analysis reported when the model sent an image without commentary
pub const DEFAULT_ANALYSIS: &str = "Saree analyzed successfully";

/// Body of a single-call generation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub success: bool,
    pub analysis: String,
    pub image_url: Option<String>,
    pub local_path: Option<String>,
    pub download_url: Option<String>,
    pub has_image: bool,
}

impl GenerateResponse {
    pub fn from_artifact(artifact: &GeneratedArtifact) -> Self {
        let analysis = if artifact.analysis.is_empty() {
            DEFAULT_ANALYSIS.to_string()
        } else {
            artifact.analysis.clone()
        };
        let download = artifact.download_url().map(str::to_string);

        Self {
            success: true,
            analysis,
            image_url: Some(artifact.image.url().to_string()),
            local_path: download.clone(),
            download_url: download,
            has_image: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    #[serde(default)]
    pub total: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateRequest {
    #[serde(default)]
    pub extra_instruction: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Set when the failure concerns a single pose
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pose_index: Option<u32>,
}
