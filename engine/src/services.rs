//! Remote collaborators the pipeline and the dictation flow talk to.
//!
//! Each service is a trait so runs can be driven against the Gemini REST
//! client in production and against scripted fakes in tests.

use async_trait::async_trait;
use shared::{AspectRatio, ReferenceImage, Voice};
use std::sync::Arc;

use crate::error::SceneError;

/// Speech comes back as mono 16-bit PCM. This rate applies when the reply does not advertise one.
pub const SPEECH_SAMPLE_RATE: u32 = 24_000;
pub const SPEECH_CHANNELS: u16 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: Voice,
}

/// Inline audio as returned by the speech service, still base64 encoded.
#[derive(Debug, Clone)]
pub struct SpeechPayload {
    pub data: String,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoRequest {
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    pub image: Option<ReferenceImage>,
    pub number_of_videos: u32,
    pub resolution: String,
}

/// Handle to a long-running video generation job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoOperation {
    pub name: String,
    pub done: bool,
    pub video_uri: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub audio_base64: String,
    pub mime_type: String,
    pub instruction: String,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechPayload, SceneError>;
}

#[async_trait]
pub trait VideoGenerator: Send + Sync {
    async fn submit(&self, request: &VideoRequest) -> Result<VideoOperation, SceneError>;

    async fn refresh(&self, operation: &VideoOperation) -> Result<VideoOperation, SceneError>;
}

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>, SceneError>;
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, request: &TranscriptionRequest) -> Result<String, SceneError>;
}

/// The services one generation run uses, all bound to the same credential.
#[derive(Clone)]
pub struct SceneServices {
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub video: Arc<dyn VideoGenerator>,
    pub fetcher: Arc<dyn MediaFetcher>,
}

impl SceneServices {
    pub fn from_client<C>(client: Arc<C>) -> Self
    where
        C: SpeechSynthesizer + VideoGenerator + MediaFetcher + 'static,
    {
        Self {
            speech: client.clone(),
            video: client.clone(),
            fetcher: client,
        }
    }
}
