// Studio configuration - JSON file plus environment overrides

use crate::photoshoot::{MAX_POSES, PoseTable, media_type_from_extension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name searched in the current directory, then the home directory
pub const CONFIG_FILE_NAME: &str = ".sareeviz.json";

/// Environment variables consulted, in order, for the model API key
pub const API_KEY_VARS: [&str; 2] = ["GOOGLE_GEMINI_API_KEY", "GEMINI_API_KEY"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudioConfig {
    #[serde(default)]
    pub gemini: GeminiConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    /// Poses per run when the caller does not say
    #[serde(default = "default_pose_count")]
    pub default_poses: u32,

    #[serde(default)]
    pub poses: PoseTable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Usually supplied through the environment instead
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_top_k")]
    pub top_k: u32,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// URL prefix the output directory is served under
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_max_upload")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchConfig {
    /// Directories where new saree photos are dropped
    #[serde(default = "default_inbox_dirs")]
    pub inbox_dirs: Vec<PathBuf>,

    /// Glob patterns to ignore
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    #[serde(default)]
    pub watch_hidden: bool,
}

fn default_pose_count() -> u32 {
    MAX_POSES
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_model() -> String {
    "gemini-3-pro-image-preview".to_string()
}

fn default_temperature() -> f32 {
    0.02
}

fn default_top_p() -> f32 {
    0.7
}

fn default_top_k() -> u32 {
    10
}

fn default_request_timeout() -> u64 {
    300
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("public/generated")
}

fn default_public_prefix() -> String {
    "/generated".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_max_upload() -> usize {
    10 * 1024 * 1024
}

fn default_inbox_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("inbox")]
}

fn default_ignore_patterns() -> Vec<String> {
    vec![
        "**/.git/**".to_string(),
        "**/generated/**".to_string(),
        "**/*.tmp".to_string(),
        "**/*.part".to_string(),
    ]
}

fn default_debounce() -> u64 {
    500
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            public_prefix: default_public_prefix(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            inbox_dirs: default_inbox_dirs(),
            ignore_patterns: default_ignore_patterns(),
            debounce_ms: default_debounce(),
            watch_hidden: false,
        }
    }
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            gemini: GeminiConfig::default(),
            storage: StorageConfig::default(),
            server: ServerConfig::default(),
            watch: WatchConfig::default(),
            default_poses: default_pose_count(),
            poses: PoseTable::default(),
        }
    }
}

impl WatchConfig {
    /// Hidden entries and ignore-pattern matches are skipped
    pub fn should_ignore(&self, path: &Path) -> bool {
        if !self.watch_hidden {
            let hidden = path.components().any(|component| {
                component
                    .as_os_str()
                    .to_str()
                    .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
            });
            if hidden {
                return true;
            }
        }

        let path_str = path.to_string_lossy();
        self.ignore_patterns
            .iter()
            .any(|pattern| glob_match::glob_match(pattern, &path_str))
    }

    /// Media type of a file worth shooting, `None` for everything else
    pub fn image_media_type(&self, path: &Path) -> Option<&'static str> {
        if self.should_ignore(path) {
            return None;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(media_type_from_extension)
    }
}

impl StudioConfig {
    /// Locate a config file: current directory first, then home
    pub fn find() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }

        dirs::home_dir()
            .map(|home| home.join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    }

    /// Read a config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        let config: StudioConfig = serde_json::from_str(&contents)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `explicit`, or a discovered file, or defaults; then apply the environment
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit.map(Path::to_path_buf).or_else(Self::find) {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading config");
                Self::from_file(&path)?
            }
            None => {
                tracing::info!("No {} found, using default config", CONFIG_FILE_NAME);
                Self::default()
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Fill in values from environment lookups; file values for the API key win
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.gemini.api_key.is_none() {
            self.gemini.api_key = API_KEY_VARS
                .iter()
                .filter_map(|var| lookup(var))
                .find(|key| !key.trim().is_empty());
        }

        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_POSES).contains(&self.default_poses) {
            return Err(ConfigError::Invalid(format!(
                "defaultPoses must be between 1 and {}, got {}",
                MAX_POSES, self.default_poses
            )));
        }
        if self.gemini.model.trim().is_empty() {
            return Err(ConfigError::Invalid("gemini.model must not be empty".into()));
        }
        if !self.storage.public_prefix.is_empty() && !self.storage.public_prefix.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "storage.publicPrefix must start with '/', got {}",
                self.storage.public_prefix
            )));
        }
        Ok(())
    }

    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.gemini.api_key.as_deref().ok_or(ConfigError::MissingApiKey)
    }

    /// Write an example config (without secrets)
    pub fn write_example(path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let mut example = Self::default();
        example.gemini.api_key = None;
        let json = serde_json::to_string_pretty(&example)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path.as_ref(), json)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No API key: set GOOGLE_GEMINI_API_KEY or gemini.apiKey")]
    MissingApiKey,
}
