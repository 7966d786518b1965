// Generation service contract - one call, one pose, one artifact or one error

use super::types::{GeneratedArtifact, SessionSeed, UploadedSource};
use async_trait::async_trait;

/// Inputs of a single generation call
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub source: &'a UploadedSource,
    /// 1-based; resolved against the adapter's pose table modulo its length
    pub pose_index: u32,
    pub seed: &'a SessionSeed,
    pub extra_instruction: Option<&'a str>,
}

impl<'a> GenerationRequest<'a> {
    pub fn new(source: &'a UploadedSource, pose_index: u32, seed: &'a SessionSeed) -> Self {
        Self {
            source,
            pose_index,
            seed,
            extra_instruction: None,
        }
    }

    pub fn with_extra_instruction(mut self, extra: Option<&'a str>) -> Self {
        self.extra_instruction = extra;
        self
    }
}

/// Produces one generated image per call
///
/// Implementations are stateless between calls and never retry internally;
/// retry policy belongs to the caller.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(
        &self,
        request: GenerationRequest<'_>,
    ) -> Result<GeneratedArtifact, GenerationError>;

    /// Short name for logs
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream rejected request: {0}")]
    UpstreamRejected(String),

    #[error("Model returned no image for pose {pose_index}")]
    NoImageProduced { pose_index: u32, analysis: String },

    #[error("Failed to persist generated image: {0}")]
    PersistenceFailed(String),
}

impl GenerationError {
    /// Whether trying the same call again may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GenerationError::UpstreamUnavailable(_) | GenerationError::NoImageProduced { .. }
        )
    }
}
