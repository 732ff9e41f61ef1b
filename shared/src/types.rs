use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::history::Patch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AspectRatio {
    #[default]
    Wide,
    Tall,
}

impl AspectRatio {
    pub fn as_ratio(&self) -> &'static str {
        match self {
            AspectRatio::Wide => "16:9",
            AspectRatio::Tall => "9:16",
        }
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wide" | "16:9" | "landscape" => Ok(AspectRatio::Wide),
            "tall" | "9:16" | "portrait" => Ok(AspectRatio::Tall),
            other => Err(format!("unknown aspect ratio '{}', expected wide or tall", other)),
        }
    }
}

/// Prebuilt voices offered by the speech service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Voice {
    Zephyr,
    Puck,
    Charon,
    #[default]
    Kore,
    Fenrir,
}

impl Voice {
    pub const ALL: [Voice; 5] = [Voice::Zephyr, Voice::Puck, Voice::Charon, Voice::Kore, Voice::Fenrir];

    pub fn name(&self) -> &'static str {
        match self {
            Voice::Zephyr => "Zephyr",
            Voice::Puck => "Puck",
            Voice::Charon => "Charon",
            Voice::Kore => "Kore",
            Voice::Fenrir => "Fenrir",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Voice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Voice::ALL
            .iter()
            .copied()
            .find(|voice| voice.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown voice '{}'", s.trim()))
    }
}

/// Reference image attached to a video request. Payload and media type travel together.
#[derive(Clone, PartialEq)]
pub struct ReferenceImage {
    pub data: Arc<[u8]>,
    pub mime_type: String,
}

impl ReferenceImage {
    /// Detects the media type from the leading bytes of the payload.
    pub fn from_bytes(data: Vec<u8>) -> anyhow::Result<Self> {
        let format = image::guess_format(&data)
            .map_err(|e| anyhow::anyhow!("Unrecognised image data: {}", e))?;

        Ok(Self {
            data: data.into(),
            mime_type: format.to_mime_type().to_string(),
        })
    }
}

impl fmt::Debug for ReferenceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceImage")
            .field("bytes", &self.data.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// Background track mixed in at playback. Payload and display name travel together.
#[derive(Clone, PartialEq)]
pub struct BackgroundMusic {
    pub data: Arc<[u8]>,
    pub name: String,
}

impl fmt::Debug for BackgroundMusic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundMusic")
            .field("bytes", &self.data.len())
            .field("name", &self.name)
            .finish()
    }
}

/// The undoable scene configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub prompt: String,
    pub dialogue: String,
    pub aspect_ratio: AspectRatio,
    pub image: Option<ReferenceImage>,
    pub voice: Voice,
    pub music: Option<BackgroundMusic>,
    volume: f32,
}

pub const DEFAULT_MUSIC_VOLUME: f32 = 0.5;

impl Default for Document {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            dialogue: String::new(),
            aspect_ratio: AspectRatio::default(),
            image: None,
            voice: Voice::default(),
            music: None,
            volume: DEFAULT_MUSIC_VOLUME,
        }
    }
}

impl Document {
    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn has_visual_input(&self) -> bool {
        !self.prompt.trim().is_empty() || self.image.is_some()
    }
}

/// Typed single-field edits of a [`Document`].
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentField {
    Prompt(String),
    Dialogue(String),
    AspectRatio(AspectRatio),
    Image(Option<ReferenceImage>),
    Voice(Voice),
    Music(Option<BackgroundMusic>),
    Volume(f32),
}

pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        return 0.0;
    }
    volume.clamp(0.0, 1.0)
}

impl Patch for Document {
    type Field = DocumentField;

    fn with_field(&self, field: DocumentField) -> Self {
        let mut next = self.clone();
        match field {
            DocumentField::Prompt(prompt) => next.prompt = prompt,
            DocumentField::Dialogue(dialogue) => next.dialogue = dialogue,
            DocumentField::AspectRatio(ratio) => next.aspect_ratio = ratio,
            DocumentField::Image(image) => next.image = image,
            DocumentField::Voice(voice) => next.voice = voice,
            DocumentField::Music(music) => next.music = music,
            DocumentField::Volume(volume) => next.volume = clamp_volume(volume),
        }
        next
    }
}

/// A locally playable handle to generated media.
#[derive(Clone, PartialEq)]
pub struct MediaArtifact {
    pub data: Arc<[u8]>,
    pub mime_type: String,
}

impl MediaArtifact {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// File extension matching the media type, used when handing media to external players.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "audio/wav" | "audio/x-wav" => "wav",
            "video/webm" => "webm",
            "video/quicktime" => "mov",
            _ if self.mime_type.starts_with("video/") => "mp4",
            _ => "bin",
        }
    }
}

impl fmt::Debug for MediaArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaArtifact")
            .field("bytes", &self.data.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// Output of the most recent generation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Artifacts {
    pub audio: Option<MediaArtifact>,
    pub video: Option<MediaArtifact>,
    pub revision: u64,
}
