// Response interpretation - turns the model's heterogeneous parts into one image and one analysis

use super::service::GenerationError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

/// Media type assumed when an inline image does not declare one
pub const DEFAULT_IMAGE_MEDIA_TYPE: &str = "image/png";

static IMAGE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)https?://[^\s)]+\.(png|jpg|jpeg|webp)").expect("image URL pattern is valid")
});

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<WirePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, alias = "inline_data")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default, alias = "mime_type")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

/// One response part, classified
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Image { bytes: Vec<u8>, media_type: String },
    Text { content: String },
    /// Anything else the model sends (function calls, thought signatures, ...)
    Other,
}

impl Part {
    /// Classify a wire part; inline data wins over text when both are present
    pub fn from_wire(part: WirePart) -> Result<Self, GenerationError> {
        if let Some(inline) = part.inline_data {
            let bytes = STANDARD.decode(inline.data.trim()).map_err(|e| {
                GenerationError::UpstreamRejected(format!("Invalid inline image data: {}", e))
            })?;
            let media_type = inline
                .mime_type
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_IMAGE_MEDIA_TYPE.to_string());
            return Ok(Part::Image { bytes, media_type });
        }

        match part.text {
            Some(content) => Ok(Part::Text { content }),
            None => Ok(Part::Other),
        }
    }
}

/// Image found in a response
#[derive(Debug, Clone, PartialEq)]
pub enum ModelImage {
    Inline { bytes: Vec<u8>, media_type: String },
    /// URL pulled out of the commentary text
    Linked(String),
}

/// Everything usable in one response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelOutput {
    pub analysis: String,
    pub image: Option<ModelImage>,
}

/// Interpret a full response body
///
/// Only the first candidate is examined. No candidates at all is an
/// upstream rejection; a candidate without an image is not an error here.
pub fn interpret(response: GenerateContentResponse) -> Result<ModelOutput, GenerationError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .map(|r| format!("Request blocked by model: {}", r))
            .unwrap_or_else(|| "No response generated from model".to_string());
        return Err(GenerationError::UpstreamRejected(reason));
    };

    let parts = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .map(Part::from_wire)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(scan_parts(parts))
}

/// Concatenate text in order, keep the first inline image, fall back to an image URL in the text
pub fn scan_parts(parts: Vec<Part>) -> ModelOutput {
    let mut output = ModelOutput::default();

    for part in parts {
        match part {
            Part::Image { bytes, media_type } => {
                if output.image.is_none() {
                    output.image = Some(ModelImage::Inline { bytes, media_type });
                }
            }
            Part::Text { content } => output.analysis.push_str(&content),
            Part::Other => {}
        }
    }

    if output.image.is_none() {
        output.image = find_image_url(&output.analysis).map(ModelImage::Linked);
    }

    output
}

/// First `http(s)` URL in `text` that ends in an image extension
pub fn find_image_url(text: &str) -> Option<String> {
    IMAGE_URL.find(text).map(|m| m.as_str().to_string())
}
