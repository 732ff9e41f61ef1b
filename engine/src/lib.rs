pub mod credentials;
pub mod dictation;
pub mod error;
pub mod gemini;
pub mod pipeline;
pub mod playback;
pub mod services;
pub mod studio;

#[cfg(test)]
mod testing;

pub use credentials::{watch_credentials, ApiKey, CredentialProvider, KeyStore};
pub use dictation::{transcribe_into_dialogue, DictationSession, RecordingBuffer};
pub use error::SceneError;
pub use gemini::GeminiClient;
pub use pipeline::{PipelineHost, PipelineSettings, SceneOutcome, ScenePipeline, Voiceover};
pub use playback::{PlaybackCoordinator, PlaybackSurface, Track};
pub use services::SceneServices;
pub use studio::Studio;
