use log::{debug, info};
use shared::clamp_volume;

use crate::error::SceneError;

/// A media element that can be rewound and started independently.
pub trait PlaybackSurface {
    fn rewind(&mut self) -> Result<(), SceneError>;

    fn start(&mut self) -> Result<(), SceneError>;

    fn set_volume(&mut self, volume: f32);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    Video,
    Narration,
    Music,
}

impl Track {
    pub const ALL: [Track; 3] = [Track::Video, Track::Narration, Track::Music];
}

/// Starts the video, the narration and the background music together.
#[derive(Default)]
pub struct PlaybackCoordinator {
    video: Option<Box<dyn PlaybackSurface>>,
    narration: Option<Box<dyn PlaybackSurface>>,
    music: Option<Box<dyn PlaybackSurface>>,
}

impl PlaybackCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, track: Track) -> &mut Option<Box<dyn PlaybackSurface>> {
        match track {
            Track::Video => &mut self.video,
            Track::Narration => &mut self.narration,
            Track::Music => &mut self.music,
        }
    }

    pub fn load(&mut self, track: Track, surface: Box<dyn PlaybackSurface>) {
        debug!("Loaded {:?} track", track);
        *self.slot(track) = Some(surface);
    }

    pub fn unload(&mut self, track: Track) {
        *self.slot(track) = None;
    }

    pub fn is_loaded(&self, track: Track) -> bool {
        match track {
            Track::Video => self.video.is_some(),
            Track::Narration => self.narration.is_some(),
            Track::Music => self.music.is_some(),
        }
    }

    pub fn active_tracks(&self) -> Vec<Track> {
        Track::ALL
            .into_iter()
            .filter(|track| self.is_loaded(*track))
            .collect()
    }

    /// Rewinds every loaded surface, applies `music_volume` to the music track only, then starts them all.
    ///
    /// Returns how many surfaces were started.
    pub fn play_all(&mut self, music_volume: f32) -> Result<usize, SceneError> {
        let tracks = self.active_tracks();
        if tracks.is_empty() {
            return Ok(0);
        }

        for track in &tracks {
            if let Some(surface) = self.slot(*track) {
                surface.rewind()?;
            }
        }
        if let Some(music) = &mut self.music {
            music.set_volume(clamp_volume(music_volume));
        }
        for track in &tracks {
            if let Some(surface) = self.slot(*track) {
                surface.start()?;
            }
        }

        info!("Playing {:?}", tracks);
        Ok(tracks.len())
    }
}
