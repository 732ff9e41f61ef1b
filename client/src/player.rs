use log::{debug, warn};
use rodio::{Decoder, OutputStreamHandle, Sink};
use scene_engine::{PlaybackSurface, SceneError};
use shared::MediaArtifact;
use std::io::Cursor;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use uuid::Uuid;

/// In-memory audio played through the default output device.
pub struct AudioTrack {
    handle: OutputStreamHandle,
    data: Arc<[u8]>,
    sink: Option<Sink>,
    volume: f32,
}

impl AudioTrack {
    pub fn new(handle: OutputStreamHandle, data: Arc<[u8]>) -> Self {
        Self {
            handle,
            data,
            sink: None,
            volume: 1.0,
        }
    }
}

impl PlaybackSurface for AudioTrack {
    fn rewind(&mut self) -> Result<(), SceneError> {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }

        let source = Decoder::new(Cursor::new(self.data.clone()))
            .map_err(|e| SceneError::Playback(e.to_string()))?;
        let sink = Sink::try_new(&self.handle).map_err(|e| SceneError::Playback(e.to_string()))?;
        sink.pause();
        sink.set_volume(self.volume);
        sink.append(source);
        self.sink = Some(sink);
        Ok(())
    }

    fn start(&mut self) -> Result<(), SceneError> {
        match &self.sink {
            Some(sink) => {
                sink.play();
                Ok(())
            }
            None => Err(SceneError::Playback("audio track was not rewound".to_string())),
        }
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        if let Some(sink) = &self.sink {
            sink.set_volume(volume);
        }
    }
}

/// Video handed to an external player. Rewinding restarts the player from the top.
pub struct ExternalVideo {
    player: String,
    path: PathBuf,
    child: Option<Child>,
}

impl ExternalVideo {
    pub fn new(player: &str, artifact: &MediaArtifact) -> Result<Self, SceneError> {
        let path = std::env::temp_dir().join(format!("scene-{}.{}", Uuid::new_v4(), artifact.extension()));
        std::fs::write(&path, &artifact.data)?;
        debug!("Wrote video to {:?}", path);

        Ok(Self {
            player: player.to_string(),
            path,
            child: None,
        })
    }

    fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                debug!("Video player already exited: {}", e);
            }
            let _ = child.wait();
        }
    }
}

impl PlaybackSurface for ExternalVideo {
    fn rewind(&mut self) -> Result<(), SceneError> {
        self.kill();
        Ok(())
    }

    fn start(&mut self) -> Result<(), SceneError> {
        let child = Command::new(&self.player)
            .arg(&self.path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SceneError::Playback(format!("could not start '{}': {}", self.player, e)))?;
        self.child = Some(child);
        Ok(())
    }

    fn set_volume(&mut self, _volume: f32) {}
}

impl Drop for ExternalVideo {
    fn drop(&mut self) {
        self.kill();
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove {:?}: {}", self.path, e);
        }
    }
}
