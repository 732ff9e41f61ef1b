//! Scripted fakes for the remote services and a host that records what the pipeline did.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::Mutex;
use shared::{Artifacts, Document, MediaArtifact, ReferenceImage};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::SceneError;
use crate::pipeline::PipelineHost;
use crate::services::{
    MediaFetcher, SceneServices, SpeechPayload, SpeechRequest, SpeechSynthesizer,
    TranscriptionRequest, Transcriber, VideoGenerator, VideoOperation, VideoRequest,
};

pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Holds a fake call open: `entered` fires once the call is in flight, `release` lets it finish.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

impl Gate {
    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

pub fn png_image() -> ReferenceImage {
    let png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    ReferenceImage::from_bytes(png).unwrap()
}

#[derive(Default)]
struct FakeState {
    speech_pcm: Vec<u8>,
    speech_mime_type: Option<String>,
    speech_gate: Option<Arc<Gate>>,
    speech_error: Option<String>,
    submit_error: Option<String>,
    operation_error: Option<String>,
    omit_uri: bool,
    polls: VecDeque<bool>,
    speech_requests: Vec<SpeechRequest>,
    video_requests: Vec<VideoRequest>,
    refreshes: usize,
    fetches: usize,
    fetch_elapsed: Option<Duration>,
    calls: Vec<String>,
    log: Option<EventLog>,
}

#[derive(Clone)]
pub struct FakeServices {
    state: Arc<Mutex<FakeState>>,
    created: Instant,
}

impl FakeServices {
    pub fn new() -> Self {
        let state = FakeState {
            speech_pcm: vec![0, 0],
            speech_mime_type: Some("audio/L16;codec=pcm;rate=24000".to_string()),
            ..FakeState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            created: Instant::now(),
        }
    }

    pub fn services(&self) -> SceneServices {
        SceneServices::from_client(Arc::new(self.clone()))
    }

    pub fn attach_log(&self, log: EventLog) {
        self.state.lock().log = Some(log);
    }

    pub fn set_speech_pcm(&self, pcm: Vec<u8>) {
        self.state.lock().speech_pcm = pcm;
    }

    pub fn set_speech_mime_type(&self, mime_type: &str) {
        self.state.lock().speech_mime_type = Some(mime_type.to_string());
    }

    /// Makes the next speech calls wait on the returned gate.
    pub fn gate_speech(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.state.lock().speech_gate = Some(gate.clone());
        gate
    }

    pub fn fail_speech(&self, message: &str) {
        self.state.lock().speech_error = Some(message.to_string());
    }

    pub fn fail_submit(&self, message: &str) {
        self.state.lock().submit_error = Some(message.to_string());
    }

    pub fn fail_operation(&self, message: &str) {
        self.state.lock().operation_error = Some(message.to_string());
    }

    pub fn omit_video_uri(&self) {
        self.state.lock().omit_uri = true;
    }

    /// `done` flags returned by successive refreshes. The submit itself reports
    /// done only when the script is empty.
    pub fn script_polls(&self, polls: Vec<bool>) {
        self.state.lock().polls = polls.into();
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn speech_requests(&self) -> Vec<SpeechRequest> {
        self.state.lock().speech_requests.clone()
    }

    pub fn video_requests(&self) -> Vec<VideoRequest> {
        self.state.lock().video_requests.clone()
    }

    pub fn refresh_count(&self) -> usize {
        self.state.lock().refreshes
    }

    pub fn fetch_count(&self) -> usize {
        self.state.lock().fetches
    }

    pub fn fetch_elapsed(&self) -> Option<Duration> {
        self.state.lock().fetch_elapsed
    }

    fn record(state: &mut FakeState, call: &str) {
        state.calls.push(call.to_string());
        if let Some(log) = &state.log {
            log.lock().push(call.to_string());
        }
    }

    fn operation(state: &FakeState, done: bool) -> VideoOperation {
        VideoOperation {
            name: "operations/fake".to_string(),
            done,
            video_uri: if done && !state.omit_uri {
                Some("https://media.example/video.mp4".to_string())
            } else {
                None
            },
            error: if done { state.operation_error.clone() } else { None },
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeServices {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechPayload, SceneError> {
        let gate = {
            let mut state = self.state.lock();
            Self::record(&mut state, "speech");
            state.speech_requests.push(request.clone());
            state.speech_gate.clone()
        };
        if let Some(gate) = gate {
            gate.pass().await;
        }

        let state = self.state.lock();
        if let Some(message) = &state.speech_error {
            return Err(SceneError::Speech(message.clone()));
        }
        Ok(SpeechPayload {
            data: STANDARD.encode(&state.speech_pcm),
            mime_type: state.speech_mime_type.clone(),
        })
    }
}

#[async_trait]
impl VideoGenerator for FakeServices {
    async fn submit(&self, request: &VideoRequest) -> Result<VideoOperation, SceneError> {
        let mut state = self.state.lock();
        Self::record(&mut state, "submit");
        state.video_requests.push(request.clone());
        if let Some(message) = &state.submit_error {
            return Err(SceneError::Service {
                status: 503,
                message: message.clone(),
            });
        }
        let done = state.polls.is_empty();
        Ok(Self::operation(&state, done))
    }

    async fn refresh(&self, _operation: &VideoOperation) -> Result<VideoOperation, SceneError> {
        let mut state = self.state.lock();
        Self::record(&mut state, "refresh");
        state.refreshes += 1;
        let done = state.polls.pop_front().unwrap_or(false);
        Ok(Self::operation(&state, done))
    }
}

#[async_trait]
impl MediaFetcher for FakeServices {
    async fn fetch(&self, _uri: &str) -> Result<Vec<u8>, SceneError> {
        let mut state = self.state.lock();
        Self::record(&mut state, "fetch");
        state.fetches += 1;
        state.fetch_elapsed = Some(self.created.elapsed());
        Ok(vec![0, 0, 0, 0x18, b'f', b't', b'y', b'p'])
    }
}

/// Transcriber that answers with a fixed text, optionally failing.
pub struct FakeTranscriber {
    pub reply: Result<String, String>,
    pub requests: Mutex<Vec<TranscriptionRequest>>,
    gate: Option<Arc<Gate>>,
}

impl FakeTranscriber {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            requests: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            requests: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Replies only after the returned gate is released.
    pub fn gated(mut self) -> (Self, Arc<Gate>) {
        let gate = Arc::new(Gate::default());
        self.gate = Some(gate.clone());
        (self, gate)
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, request: &TranscriptionRequest) -> Result<String, SceneError> {
        self.requests.lock().push(request.clone());
        match &self.gate {
            Some(gate) => gate.pass().await,
            None => tokio::task::yield_now().await,
        }
        self.reply.clone().map_err(|message| SceneError::Service {
            status: 500,
            message,
        })
    }
}

/// Host that keeps a single document and logs every pipeline callback.
pub struct RecordingHost {
    document: Mutex<Document>,
    artifacts: Mutex<Artifacts>,
    statuses: Mutex<Vec<String>>,
    log: EventLog,
}

impl RecordingHost {
    pub fn new(document: Document) -> Self {
        Self {
            document: Mutex::new(document),
            artifacts: Mutex::new(Artifacts::default()),
            statuses: Mutex::new(Vec::new()),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn log(&self) -> EventLog {
        self.log.clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().clone()
    }

    pub fn status(&self) -> String {
        self.statuses.lock().last().cloned().unwrap_or_default()
    }

    pub fn artifacts(&self) -> Artifacts {
        self.artifacts.lock().clone()
    }
}

impl PipelineHost for RecordingHost {
    fn document(&self) -> Document {
        self.document.lock().clone()
    }

    fn set_status(&self, status: String) {
        self.statuses.lock().push(status);
    }

    fn clear_artifacts(&self) {
        self.log.lock().push("clear".to_string());
        let mut artifacts = self.artifacts.lock();
        artifacts.audio = None;
        artifacts.video = None;
    }

    fn publish_audio(&self, artifact: MediaArtifact) {
        self.log.lock().push("audio".to_string());
        self.artifacts.lock().audio = Some(artifact);
    }

    fn publish_video(&self, artifact: MediaArtifact) {
        self.log.lock().push("video".to_string());
        self.artifacts.lock().video = Some(artifact);
    }
}
