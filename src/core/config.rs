//! Configuration for the story pipeline.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::errors::{ConfigError, ConfigResult};

/// Environment variable for the Ollama endpoint.
pub const OLLAMA_URL_ENV: &str = "TALEFORGE_OLLAMA_URL";
/// Environment variable for the chat model name.
pub const MODEL_ENV: &str = "TALEFORGE_MODEL";
/// Environment variable for the image API base URL.
pub const IMAGE_URL_ENV: &str = "TALEFORGE_IMAGE_URL";
/// Environment variable for the image API key.
pub const IMAGE_API_KEY_ENV: &str = "TALEFORGE_IMAGE_API_KEY";
/// Environment variable selecting the speech backend (`command` or `http`).
pub const AUDIO_MODE_ENV: &str = "TALEFORGE_AUDIO_MODE";
/// Environment variable for the speech API base URL.
pub const AUDIO_URL_ENV: &str = "TALEFORGE_AUDIO_URL";
/// Environment variable for the speech API key.
pub const AUDIO_API_KEY_ENV: &str = "TALEFORGE_AUDIO_API_KEY";
/// Environment variable for the audio artifact directory.
pub const AUDIO_DIR_ENV: &str = "TALEFORGE_AUDIO_DIR";
/// Environment variable for the HTTP port.
pub const PORT_ENV: &str = "TALEFORGE_PORT";

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StoryConfig {
    /// Conversation context bounds.
    pub conversation: ConversationConfig,
    /// Text backend settings.
    pub text: TextConfig,
    /// Image backend settings.
    pub image: ImageConfig,
    /// Speech backend settings.
    pub audio: AudioConfig,
    /// PDF layout settings.
    pub export: ExportConfig,
    /// HTTP server settings.
    pub server: ServerConfig,
}

impl StoryConfig {
    /// Create a new config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `TALEFORGE_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup.
    #[must_use]
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(OLLAMA_URL_ENV) {
            self.text.base_url = url;
        }
        if let Some(model) = lookup(MODEL_ENV) {
            self.text.model = model;
        }
        if let Some(url) = lookup(IMAGE_URL_ENV) {
            self.image.base_url = url;
        }
        if let Some(key) = lookup(IMAGE_API_KEY_ENV) {
            self.image.api_key = Some(key);
        }
        if let Some(mode) = lookup(AUDIO_MODE_ENV) {
            match mode.trim().to_ascii_lowercase().as_str() {
                "http" => self.audio.mode = AudioMode::Http,
                "command" => self.audio.mode = AudioMode::Command,
                other => tracing::warn!("Ignoring unknown {AUDIO_MODE_ENV} value: {other}"),
            }
        }
        if let Some(url) = lookup(AUDIO_URL_ENV) {
            self.audio.base_url = url;
        }
        if let Some(key) = lookup(AUDIO_API_KEY_ENV) {
            self.audio.api_key = Some(key);
        }
        if let Some(dir) = lookup(AUDIO_DIR_ENV) {
            self.audio.output_dir = PathBuf::from(dir);
        }
        if let Some(port) = lookup(PORT_ENV).and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        self
    }

    /// Set the chat model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.text.model = model.into();
        self
    }

    /// Set the audio artifact directory.
    #[must_use]
    pub fn with_audio_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.audio.output_dir = dir.into();
        self
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.conversation.max_sessions == 0 {
            return Err(ConfigError::Invalid(
                "conversation.max_sessions must be > 0".to_string(),
            ));
        }

        if self.conversation.max_turns_per_session < 2 {
            return Err(ConfigError::Invalid(
                "conversation.max_turns_per_session must be >= 2".to_string(),
            ));
        }

        if self.text.model.trim().is_empty() {
            return Err(ConfigError::Invalid("text.model must not be empty".to_string()));
        }

        if self.text.request_timeout.is_zero() || self.text.idle_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "text timeouts must be > 0".to_string(),
            ));
        }

        if self.image.timeout.is_zero() || self.audio.timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "image and audio timeouts must be > 0".to_string(),
            ));
        }

        if self.image.cache_enabled && self.image.cache_max_entries == 0 {
            return Err(ConfigError::Invalid(
                "image.cache_max_entries must be > 0 when the cache is enabled".to_string(),
            ));
        }

        if self.export.font_size <= 0 || self.export.leading <= 0 {
            return Err(ConfigError::Invalid(
                "export.font_size and export.leading must be > 0".to_string(),
            ));
        }

        if self.export.top >= self.export.page_height || self.export.bottom <= 0 {
            return Err(ConfigError::Invalid(
                "export.top must be inside the page and export.bottom > 0".to_string(),
            ));
        }

        if self.export.top - self.export.bottom < self.export.leading {
            return Err(ConfigError::Invalid(
                "export page area cannot hold a single line".to_string(),
            ));
        }

        Url::parse(&self.text.base_url)?;
        if self.image.enabled {
            Url::parse(&self.image.base_url)?;
        }
        if self.audio.enabled && self.audio.mode == AudioMode::Http {
            Url::parse(&self.audio.base_url)?;
        }

        Ok(())
    }
}

/// Conversation context bounds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Number of sessions kept in memory (least recently used evicted).
    pub max_sessions: usize,
    /// Stored turns per session before the oldest exchanges are dropped.
    pub max_turns_per_session: usize,
    /// Most recent turns sent to the backend (0 = all stored turns).
    pub context_window_turns: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1024,
            max_turns_per_session: 200,
            context_window_turns: 40,
        }
    }
}

/// Text backend settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TextConfig {
    /// Ollama base URL.
    pub base_url: String,
    /// Chat model name.
    pub model: String,
    /// How long the backend keeps the model loaded.
    pub keep_alive: String,
    /// Connection timeout.
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
    /// Deadline for the backend to start answering.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    /// Maximum silence between two fragments.
    #[serde(with = "duration_serde")]
    pub idle_timeout: Duration,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            keep_alive: "5m".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Image backend settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Whether cover images are generated at all.
    pub enabled: bool,
    /// OpenAI-compatible API base URL.
    pub base_url: String,
    /// Bearer token.
    pub api_key: Option<String>,
    /// Image model name.
    pub model: String,
    /// Requested size, e.g. `1024x1024`.
    pub size: String,
    /// Request timeout.
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
    /// Whether results are cached by prompt hash.
    pub cache_enabled: bool,
    /// Cache TTL in seconds.
    pub cache_ttl_seconds: u64,
    /// Maximum cached prompts.
    pub cache_max_entries: usize,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            model: "dall-e-3".to_string(),
            size: "1024x1024".to_string(),
            timeout: Duration::from_secs(120),
            cache_enabled: true,
            cache_ttl_seconds: 3600,
            cache_max_entries: 256,
        }
    }
}

/// Which speech backend to use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioMode {
    /// Run a local TTS program.
    #[default]
    Command,
    /// Call an OpenAI-compatible speech endpoint.
    Http,
}

/// Speech backend settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Whether narration is generated at all.
    pub enabled: bool,
    /// Backend selection.
    pub mode: AudioMode,
    /// Directory receiving audio artifacts.
    pub output_dir: PathBuf,
    /// File name prefix for artifacts.
    pub file_prefix: String,
    /// Local TTS program (command mode).
    pub program: String,
    /// Program arguments; `{output}` is replaced by the artifact path and the
    /// text is written to standard input.
    pub args: Vec<String>,
    /// OpenAI-compatible API base URL (http mode).
    pub base_url: String,
    /// Bearer token (http mode).
    pub api_key: Option<String>,
    /// Speech model (http mode).
    pub model: String,
    /// Voice name (http mode).
    pub voice: String,
    /// Output format requested from the endpoint (http mode).
    pub response_format: String,
    /// Synthesis timeout.
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
}

impl AudioConfig {
    /// File extension of artifacts produced by the selected backend.
    #[must_use]
    pub fn file_extension(&self) -> &str {
        match self.mode {
            AudioMode::Command => "wav",
            AudioMode::Http => self.response_format.as_str(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: AudioMode::Command,
            output_dir: PathBuf::from("static/audio"),
            file_prefix: "story".to_string(),
            program: "espeak-ng".to_string(),
            args: vec!["-w".to_string(), "{output}".to_string(), "--stdin".to_string()],
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            response_format: "mp3".to_string(),
            timeout: Duration::from_secs(300),
        }
    }
}

/// PDF layout settings, in points.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Page width.
    pub page_width: i64,
    /// Page height.
    pub page_height: i64,
    /// Left margin of the text cursor.
    pub left: i64,
    /// Baseline of the first line on each page.
    pub top: i64,
    /// Lowest allowed baseline.
    pub bottom: i64,
    /// Font size.
    pub font_size: i64,
    /// Distance between baselines.
    pub leading: i64,
    /// Suggested download file name.
    pub file_name: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        // US Letter, Helvetica 12.
        Self {
            page_width: 612,
            page_height: 792,
            left: 40,
            top: 750,
            bottom: 40,
            font_size: 12,
            leading: 14,
            file_name: "generated_story.pdf".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
