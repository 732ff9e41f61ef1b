use thiserror::Error;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("Please provide a video prompt or a reference image.")]
    MissingVisualInput,

    #[error("No API key selected. Connect a key before generating.")]
    MissingCredential,

    #[error("A scene is already being generated")]
    AlreadyGenerating,

    #[error("Microphone unavailable: {0}")]
    Microphone(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Speech synthesis failed: {0}")]
    Speech(String),

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("Could not decode service payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Video generation failed: {0}")]
    OperationFailed(String),

    #[error("Video generation finished without a video")]
    NoVideoLocator,

    #[error("Video generation did not finish after {attempts} status checks")]
    PollTimeout { attempts: u32 },

    #[error("Playback failed: {0}")]
    Playback(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SceneError {
    /// The single status line shown for a terminal failure.
    pub fn status_line(&self) -> String {
        match self {
            SceneError::MissingVisualInput => self.to_string(),
            other => format!("Error: {}", other),
        }
    }
}
