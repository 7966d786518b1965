// Core types for the photoshoot system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Media type for an image file extension, `None` when it is not an image we accept
pub fn media_type_from_extension(ext: &str) -> Option<&'static str> {
    match ext.to_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

/// File extension used when persisting an image of the given media type
///
/// Takes the subtype (`image/webp` -> `webp`), cut at `+` or `;`. Anything
/// unusable falls back to `png`.
pub fn extension_for_media_type(media_type: &str) -> &str {
    media_type
        .split('/')
        .nth(1)
        .and_then(|subtype| subtype.split(|c: char| c == '+' || c == ';').next())
        .map(str::trim)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("png")
}

/// The garment photo a run is generated from
///
/// Cheap to clone; the bytes are shared.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedSource {
    bytes: Arc<[u8]>,
    media_type: String,
    file_name: Option<String>,
}

impl UploadedSource {
    pub fn new(bytes: impl Into<Vec<u8>>, media_type: impl Into<String>) -> Self {
        Self {
            bytes: Arc::from(bytes.into()),
            media_type: media_type.into(),
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// Read a source image from disk, detecting the media type from the extension
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;

        let media_type = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(media_type_from_extension)
            .unwrap_or("application/octet-stream");

        let mut source = Self::new(bytes, media_type);
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            source = source.with_file_name(name);
        }
        Ok(source)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    pub fn info(&self) -> SourceInfo {
        SourceInfo {
            media_type: self.media_type.clone(),
            size_bytes: self.bytes.len(),
            file_name: self.file_name.clone(),
        }
    }
}

/// Observable description of the current source, without the bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub media_type: String,
    pub size_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// Identity anchor shared by every call made for one uploaded source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionSeed(String);

impl SessionSeed {
    /// Mint a fresh seed: `session-{unix_millis}-{9 random chars}`
    pub fn mint() -> Self {
        let entropy = Uuid::new_v4().simple().to_string();
        Self(format!(
            "session-{}-{}",
            Utc::now().timestamp_millis(),
            &entropy[..9]
        ))
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the generated image can be viewed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "url", rename_all = "lowercase")]
pub enum ImageRef {
    /// `data:` URL carrying the image bytes
    Embedded(String),
    /// Image URL the model mentioned in its commentary
    Remote(String),
}

impl ImageRef {
    pub fn url(&self) -> &str {
        match self {
            ImageRef::Embedded(url) | ImageRef::Remote(url) => url,
        }
    }
}

/// A generated image written to the artifact directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredArtifact {
    pub file_name: String,
    pub path: PathBuf,
    pub public_url: String,
}

/// One successful pose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedArtifact {
    pub id: Uuid,
    pub pose_index: u32,
    pub produced_at: DateTime<Utc>,
    pub image: ImageRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored: Option<StoredArtifact>,
    /// Commentary the model returned alongside the image
    #[serde(default)]
    pub analysis: String,
}

impl GeneratedArtifact {
    pub fn new(pose_index: u32, image: ImageRef, analysis: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            pose_index,
            produced_at: Utc::now(),
            image,
            stored: None,
            analysis: analysis.into(),
        }
    }

    pub fn with_stored(mut self, stored: StoredArtifact) -> Self {
        self.stored = Some(stored);
        self
    }

    /// Public URL of the persisted file, if the image was persisted
    pub fn download_url(&self) -> Option<&str> {
        self.stored.as_ref().map(|s| s.public_url.as_str())
    }
}

/// Where a run stands
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RunPhase {
    #[default]
    Idle,
    Running { cursor: u32, total: u32 },
    Completed { total: u32 },
    Failed { pose_index: u32, total: u32 },
    Cancelled { completed: u32, total: u32 },
}

impl RunPhase {
    pub fn is_running(&self) -> bool {
        matches!(self, RunPhase::Running { .. })
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            RunPhase::Completed { .. } | RunPhase::Failed { .. } | RunPhase::Cancelled { .. }
        )
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Idle => write!(f, "idle"),
            RunPhase::Running { cursor, total } => write!(f, "running ({}/{})", cursor, total),
            RunPhase::Completed { total } => write!(f, "completed ({} poses)", total),
            RunPhase::Failed { pose_index, total } => {
                write!(f, "failed at pose {} of {}", pose_index, total)
            }
            RunPhase::Cancelled { completed, total } => {
                write!(f, "cancelled after {} of {}", completed, total)
            }
        }
    }
}

/// Last error, tagged with what it affected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ScopedError {
    /// A full run stopped at this pose
    Run { pose_index: u32, message: String },
    /// A single-pose regeneration failed; the rest of the gallery is intact
    Pose { pose_index: u32, message: String },
}

impl ScopedError {
    pub fn pose_index(&self) -> u32 {
        match self {
            ScopedError::Run { pose_index, .. } | ScopedError::Pose { pose_index, .. } => {
                *pose_index
            }
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ScopedError::Run { message, .. } | ScopedError::Pose { message, .. } => message,
        }
    }
}

/// Results gathered for the current source, at most one artifact per pose
#[derive(Debug, Clone, Default)]
pub struct RunState {
    artifacts: BTreeMap<u32, GeneratedArtifact>,
    cursor: u32,
    total: u32,
    phase: RunPhase,
}

impl RunState {
    /// Back to an empty gallery in the idle phase
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Empty gallery, cursor at zero, running towards `total`
    pub fn begin(&mut self, total: u32) {
        self.artifacts.clear();
        self.cursor = 0;
        self.total = total;
        self.phase = RunPhase::Running { cursor: 0, total };
    }

    /// Insert the artifact for its pose, returning the one it superseded
    pub fn record(&mut self, artifact: GeneratedArtifact) -> Option<GeneratedArtifact> {
        self.artifacts.insert(artifact.pose_index, artifact)
    }

    /// Mark `pose_index` as attempted and successful
    pub fn advance(&mut self, pose_index: u32) {
        self.cursor = pose_index;
        if let RunPhase::Running { total, .. } = self.phase {
            self.phase = RunPhase::Running {
                cursor: pose_index,
                total,
            };
        }
    }

    pub fn set_phase(&mut self, phase: RunPhase) {
        self.phase = phase;
    }

    pub fn phase(&self) -> &RunPhase {
        &self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase.is_running()
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// Artifacts in pose order
    pub fn artifacts(&self) -> impl Iterator<Item = &GeneratedArtifact> {
        self.artifacts.values()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// Point-in-time view published to observers after every change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub source: Option<SourceInfo>,
    pub seed: Option<SessionSeed>,
    pub phase: RunPhase,
    pub cursor: u32,
    pub total: u32,
    pub artifacts: Vec<GeneratedArtifact>,
    pub regenerating: Option<u32>,
    pub last_error: Option<ScopedError>,
}

impl RunSnapshot {
    pub fn pose_indices(&self) -> Vec<u32> {
        self.artifacts.iter().map(|a| a.pose_index).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_detection() {
        assert_eq!(media_type_from_extension("JPG"), Some("image/jpeg"));
        assert_eq!(media_type_from_extension("webp"), Some("image/webp"));
        assert_eq!(media_type_from_extension("pdf"), None);
    }

    #[test]
    fn test_extension_for_media_type() {
        assert_eq!(extension_for_media_type("image/png"), "png");
        assert_eq!(extension_for_media_type("image/jpeg"), "jpeg");
        assert_eq!(extension_for_media_type("image/svg+xml"), "svg");
        assert_eq!(extension_for_media_type("image/webp; q=1"), "webp");
        assert_eq!(extension_for_media_type("garbage"), "png");
        assert_eq!(extension_for_media_type("image/../../x"), "png");
    }

    #[test]
    fn test_minted_seeds_differ() {
        let a = SessionSeed::mint();
        let b = SessionSeed::mint();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("session-"));
    }

    #[test]
    fn test_run_state_keeps_one_artifact_per_pose() {
        let mut state = RunState::default();
        state.begin(3);
        assert!(state.is_empty());

        let first = GeneratedArtifact::new(2, ImageRef::Remote("https://x/a.png".into()), "");
        let second = GeneratedArtifact::new(2, ImageRef::Remote("https://x/b.png".into()), "");
        let first_id = first.id;

        assert!(state.record(first).is_none());
        let replaced = state.record(second).expect("previous artifact returned");
        assert_eq!(replaced.id, first_id);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_run_state_orders_by_pose() {
        let mut state = RunState::default();
        for pose in [3, 1, 2] {
            state.record(GeneratedArtifact::new(pose, ImageRef::Remote(String::new()), ""));
        }
        let order: Vec<u32> = state.artifacts().map(|a| a.pose_index).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_phase_serialization() {
        let json = serde_json::to_value(RunPhase::Failed { pose_index: 3, total: 5 }).unwrap();
        assert_eq!(json["phase"], "failed");
        assert_eq!(json["poseIndex"], 3);
    }
}
