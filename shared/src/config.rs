use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub generation: GenerationConfig,
    pub audio: AudioConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Environment variable the initial API key is read from.
    pub key_env: String,
    pub speech_model: String,
    pub video_model: String,
    pub transcription_model: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub poll_interval_seconds: u64,
    pub max_poll_attempts: u32,
    pub resolution: String,
    /// Mention a failed voiceover in the final status instead of only logging it.
    pub report_speech_failures: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub settle_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub credential_poll_ms: u64,
    pub video_player: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            key_env: "GEMINI_API_KEY".to_string(),
            speech_model: "gemini-2.5-flash-preview-tts".to_string(),
            video_model: "veo-3.1-fast-generate-preview".to_string(),
            transcription_model: "gemini-2.5-flash".to_string(),
            timeout_seconds: 120,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 5,
            max_poll_attempts: 120, // 10 minutes at the default interval
            resolution: "720p".to_string(),
            report_speech_failures: false,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None, // Use default device
            settle_ms: 500,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            credential_poll_ms: 1000,
            video_player: "mpv".to_string(),
        }
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("scene-composer").join("config.toml"))
    }

    /// Loads the user config, falling back to defaults when no file exists.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config {:?}", path))?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
