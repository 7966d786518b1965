// Photoshoot system - sequential per-pose generation against a hosted image model

pub mod gemini;
pub mod orchestrator;
pub mod poses;
pub mod prompt;
pub mod response;
pub mod service;
pub mod store;
pub mod types;

pub use gemini::GeminiAdapter;
pub use orchestrator::{
    CancelToken, OrchestratorError, PendingRegeneration, PendingRun, PhotoshootOrchestrator,
};
pub use poses::{PoseDescription, PoseTable};
pub use service::{GenerationError, GenerationRequest, GenerationService};
pub use store::{ArtifactStore, DirectoryStore, StoreError};
pub use types::*;

/// Largest number of poses a single run may request
pub const MAX_POSES: u32 = 10;
