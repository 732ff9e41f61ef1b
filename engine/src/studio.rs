use log::{debug, info, warn};
use parking_lot::Mutex;
use shared::{Artifacts, Document, DocumentField, History, HistoryCommand, MediaArtifact};
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::SceneError;
use crate::pipeline::{PipelineHost, SceneOutcome, ScenePipeline};

struct StudioState {
    history: History<Document>,
    artifacts: Artifacts,
    generating: bool,
    has_key: bool,
}

/// Single source of truth for the scene being composed.
///
/// Cheap to clone; every clone sees the same document, history and artifacts.
/// Locks are only held for the duration of a method call, never across an await.
#[derive(Clone)]
pub struct Studio {
    state: Arc<Mutex<StudioState>>,
    status: Arc<watch::Sender<String>>,
}

impl Default for Studio {
    fn default() -> Self {
        Self::new(Document::default())
    }
}

impl Studio {
    pub fn new(document: Document) -> Self {
        let (status, _) = watch::channel(String::new());
        Self {
            state: Arc::new(Mutex::new(StudioState {
                history: History::new(document),
                artifacts: Artifacts::default(),
                generating: false,
                has_key: false,
            })),
            status: Arc::new(status),
        }
    }

    pub fn document(&self) -> Document {
        self.state.lock().history.present().clone()
    }

    pub fn dispatch(&self, command: HistoryCommand<Document>) {
        self.state.lock().history.dispatch(command);
    }

    pub fn replace(&self, document: Document) {
        self.dispatch(HistoryCommand::Set(document));
    }

    pub fn update_field(&self, field: DocumentField) {
        self.dispatch(HistoryCommand::UpdateField(field));
    }

    /// Builds a field edit from the present document and records it under one lock.
    pub fn edit<F>(&self, build: F)
    where
        F: FnOnce(&Document) -> DocumentField,
    {
        let mut state = self.state.lock();
        let field = build(state.history.present());
        state.history.update_field(field);
    }

    pub fn undo(&self) {
        self.dispatch(HistoryCommand::Undo);
    }

    pub fn redo(&self) {
        self.dispatch(HistoryCommand::Redo);
    }

    pub fn can_undo(&self) -> bool {
        self.state.lock().history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.state.lock().history.can_redo()
    }

    pub fn artifacts(&self) -> Artifacts {
        self.state.lock().artifacts.clone()
    }

    pub fn status(&self) -> String {
        self.status.borrow().clone()
    }

    pub fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        debug!("Status: {}", status);
        self.status.send_replace(status);
    }

    pub fn subscribe_status(&self) -> watch::Receiver<String> {
        self.status.subscribe()
    }

    pub fn has_key(&self) -> bool {
        self.state.lock().has_key
    }

    pub fn set_has_key(&self, has_key: bool) {
        self.state.lock().has_key = has_key;
    }

    pub fn is_generating(&self) -> bool {
        self.state.lock().generating
    }

    /// Runs the pipeline against this studio. Only one run may be active at a time.
    pub async fn generate(&self, pipeline: &ScenePipeline) -> Result<SceneOutcome, SceneError> {
        let _guard = self.begin_generation()?;
        pipeline.run(self).await
    }

    fn begin_generation(&self) -> Result<GenerationGuard<'_>, SceneError> {
        let mut state = self.state.lock();
        if !state.has_key {
            drop(state);
            let err = SceneError::MissingCredential;
            self.set_status(err.status_line());
            return Err(err);
        }
        if state.generating {
            warn!("Generation requested while another run is active");
            return Err(SceneError::AlreadyGenerating);
        }
        state.generating = true;
        Ok(GenerationGuard { studio: self })
    }
}

struct GenerationGuard<'a> {
    studio: &'a Studio,
}

impl Drop for GenerationGuard<'_> {
    fn drop(&mut self) {
        self.studio.state.lock().generating = false;
    }
}

impl PipelineHost for Studio {
    fn document(&self) -> Document {
        Studio::document(self)
    }

    fn set_status(&self, status: String) {
        Studio::set_status(self, status);
    }

    fn clear_artifacts(&self) {
        let mut state = self.state.lock();
        state.artifacts.audio = None;
        state.artifacts.video = None;
        state.artifacts.revision += 1;
    }

    fn publish_audio(&self, artifact: MediaArtifact) {
        info!("Audio artifact ready ({})", artifact.mime_type);
        let mut state = self.state.lock();
        state.artifacts.audio = Some(artifact);
        state.artifacts.revision += 1;
    }

    fn publish_video(&self, artifact: MediaArtifact) {
        info!("Video artifact ready ({})", artifact.mime_type);
        let mut state = self.state.lock();
        state.artifacts.video = Some(artifact);
        state.artifacts.revision += 1;
    }
}
