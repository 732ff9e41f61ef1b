use anyhow::{anyhow, bail, Context, Result};
use log::{info, warn};
use rodio::{OutputStream, OutputStreamHandle};
use scene_engine::{
    transcribe_into_dialogue, watch_credentials, ApiKey, CredentialProvider, GeminiClient, KeyStore,
    PipelineSettings, PlaybackCoordinator, SceneError, SceneServices, ScenePipeline, Studio, Track,
};
use shared::{AspectRatio, BackgroundMusic, Config, DocumentField, ReferenceImage, Voice};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use crate::audio::{Microphone, Recording};
use crate::player::{AudioTrack, ExternalVideo};

const HELP: &str = "\
Commands:
  prompt <text>          set the video prompt
  dialogue <text>        set the voiceover dialogue
  voice <name>           choose a voice (see 'voices')
  aspect <wide|tall>     choose 16:9 or 9:16
  image <path>|none      attach or remove a reference image
  music <path>|none      attach or remove background music
  volume <0.0-1.0>       background music volume
  undo / redo            step through edit history
  show                   print the current scene
  generate               generate voiceover and video
  record / stop          dictate into the dialogue
  play                   play video, voiceover and music together
  key <api-key>          select the API key to use
  voices                 list available voices
  devices                list microphones
  help                   show this help
  quit                   exit";

#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Prompt(String),
    Dialogue(String),
    Voice(Voice),
    Aspect(AspectRatio),
    Image(Option<PathBuf>),
    Music(Option<PathBuf>),
    Volume(f32),
    Undo,
    Redo,
    Show,
    Generate,
    Record,
    Stop,
    Play,
    Key(String),
    Voices,
    Devices,
    Help,
    Quit,
}

/// Parses one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<ReplCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        // Empty text is a valid edit: it clears the field.
        "prompt" => ReplCommand::Prompt(rest.to_string()),
        "dialogue" => ReplCommand::Dialogue(rest.to_string()),
        "voice" => ReplCommand::Voice(rest.parse().map_err(|e: String| anyhow!(e))?),
        "aspect" => ReplCommand::Aspect(rest.parse().map_err(|e: String| anyhow!(e))?),
        "image" => ReplCommand::Image(optional_path(rest, "image")?),
        "music" => ReplCommand::Music(optional_path(rest, "music")?),
        "volume" => {
            let volume: f32 = rest
                .parse()
                .with_context(|| format!("'{}' is not a volume between 0 and 1", rest))?;
            ReplCommand::Volume(volume)
        }
        "undo" => ReplCommand::Undo,
        "redo" => ReplCommand::Redo,
        "show" => ReplCommand::Show,
        "generate" | "gen" => ReplCommand::Generate,
        "record" | "rec" => ReplCommand::Record,
        "stop" => ReplCommand::Stop,
        "play" => ReplCommand::Play,
        "key" => {
            if rest.is_empty() {
                bail!("usage: key <api-key>");
            }
            ReplCommand::Key(rest.to_string())
        }
        "voices" => ReplCommand::Voices,
        "devices" => ReplCommand::Devices,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        other => bail!("unknown command '{}', type 'help' for a list", other),
    };

    Ok(Some(command))
}

fn optional_path(rest: &str, what: &str) -> Result<Option<PathBuf>> {
    match rest {
        "" => bail!("usage: {} <path>|none", what),
        "none" | "clear" => Ok(None),
        path => Ok(Some(PathBuf::from(path))),
    }
}

fn load_image(path: &Path) -> Result<ReferenceImage> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    ReferenceImage::from_bytes(data)
}

fn load_music(path: &Path) -> Result<BackgroundMusic> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(BackgroundMusic {
        data: data.into(),
        name,
    })
}

async fn print_statuses(mut statuses: watch::Receiver<String>) {
    while statuses.changed().await.is_ok() {
        let status = statuses.borrow_and_update().clone();
        if !status.is_empty() {
            println!("» {}", status);
        }
    }
}

/// Interactive scene editor on stdin/stdout.
pub struct Repl {
    config: Config,
    studio: Studio,
    keys: Arc<KeyStore>,
    settings: PipelineSettings,
    recording: Option<Recording>,
    playback: PlaybackCoordinator,
    loaded_revision: Option<u64>,
    output: Option<(OutputStream, OutputStreamHandle)>,
}

impl Repl {
    pub fn new(config: Config, keys: Arc<KeyStore>) -> Self {
        let studio = Studio::default();
        studio.set_has_key(keys.has_key());

        Self {
            settings: PipelineSettings::from_config(&config.generation),
            config,
            studio,
            keys,
            recording: None,
            playback: PlaybackCoordinator::new(),
            loaded_revision: None,
            output: None,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        tokio::spawn(print_statuses(self.studio.subscribe_status()));
        tokio::spawn(watch_credentials(
            self.keys.clone(),
            self.studio.clone(),
            Duration::from_millis(self.config.ui.credential_poll_ms),
        ));

        println!("Scene composer. Type 'help' for commands.");
        if !self.keys.has_key() {
            println!("No API key found in ${}. Use 'key <api-key>' to select one.", self.config.api.key_env);
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let command = match parse_command(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    println!("{}", e);
                    continue;
                }
            };

            if command == ReplCommand::Quit {
                break;
            }
            if let Err(e) = self.handle(command) {
                println!("Error: {:#}", e);
            }
        }

        info!("Leaving studio");
        Ok(())
    }

    fn handle(&mut self, command: ReplCommand) -> Result<()> {
        match command {
            ReplCommand::Prompt(text) => self.studio.update_field(DocumentField::Prompt(text)),
            ReplCommand::Dialogue(text) => self.studio.update_field(DocumentField::Dialogue(text)),
            ReplCommand::Voice(voice) => self.studio.update_field(DocumentField::Voice(voice)),
            ReplCommand::Aspect(ratio) => self.studio.update_field(DocumentField::AspectRatio(ratio)),
            ReplCommand::Image(path) => {
                let image = path.as_deref().map(load_image).transpose()?;
                self.studio.update_field(DocumentField::Image(image));
            }
            ReplCommand::Music(path) => {
                let music = path.as_deref().map(load_music).transpose()?;
                self.studio.update_field(DocumentField::Music(music));
            }
            ReplCommand::Volume(volume) => self.studio.update_field(DocumentField::Volume(volume)),
            ReplCommand::Undo => {
                if !self.studio.can_undo() {
                    println!("Nothing to undo.");
                }
                self.studio.undo();
            }
            ReplCommand::Redo => {
                if !self.studio.can_redo() {
                    println!("Nothing to redo.");
                }
                self.studio.redo();
            }
            ReplCommand::Show => self.show(),
            ReplCommand::Generate => self.generate()?,
            ReplCommand::Record => self.record(),
            ReplCommand::Stop => self.stop()?,
            ReplCommand::Play => self.play()?,
            ReplCommand::Key(key) => {
                let key = ApiKey::new(key).ok_or_else(|| anyhow!("API key is blank"))?;
                self.keys.select_key(key);
                self.studio.set_has_key(true);
                println!("API key selected.");
            }
            ReplCommand::Voices => {
                for voice in Voice::ALL {
                    println!("  {}", voice);
                }
            }
            ReplCommand::Devices => {
                for name in Microphone::list_input_devices()? {
                    println!("  {}", name);
                }
            }
            ReplCommand::Help => println!("{}", HELP),
            ReplCommand::Quit => {}
        }
        Ok(())
    }

    fn show(&self) {
        let doc = self.studio.document();
        let artifacts = self.studio.artifacts();

        println!("prompt:   {}", doc.prompt);
        println!("dialogue: {}", doc.dialogue);
        println!("voice:    {}", doc.voice);
        println!("aspect:   {}", doc.aspect_ratio.as_ratio());
        match &doc.image {
            Some(image) => println!("image:    {} ({} bytes)", image.mime_type, image.data.len()),
            None => println!("image:    none"),
        }
        match &doc.music {
            Some(music) => println!("music:    {} at volume {:.2}", music.name, doc.volume()),
            None => println!("music:    none"),
        }
        println!(
            "history:  undo {} / redo {}",
            if self.studio.can_undo() { "yes" } else { "no" },
            if self.studio.can_redo() { "yes" } else { "no" }
        );
        println!(
            "output:   voiceover {} / video {}",
            if artifacts.audio.is_some() { "ready" } else { "none" },
            if artifacts.video.is_some() { "ready" } else { "none" }
        );
        if self.studio.is_generating() {
            println!("          generation in progress");
        }
        if self.recording.is_some() {
            println!("          recording");
        }
    }

    fn client(&self) -> Result<GeminiClient, SceneError> {
        let key = self.keys.current().ok_or(SceneError::MissingCredential)?;
        GeminiClient::new(&self.config.api, key)
    }

    fn generate(&mut self) -> Result<()> {
        let client = match self.client() {
            Ok(client) => client,
            Err(e) => {
                self.studio.set_status(e.status_line());
                return Ok(());
            }
        };
        if self.studio.is_generating() {
            println!("A scene is already being generated.");
            return Ok(());
        }

        let pipeline = ScenePipeline::new(SceneServices::from_client(Arc::new(client)), self.settings.clone());
        let studio = self.studio.clone();
        tokio::spawn(async move {
            if let Err(e) = studio.generate(&pipeline).await {
                warn!("Generation ended with an error: {}", e);
            }
        });
        Ok(())
    }

    fn record(&mut self) {
        if self.recording.is_some() {
            println!("Already recording. Type 'stop' to finish.");
            return;
        }

        match Microphone::open(&self.config.audio).and_then(|mic| mic.start()) {
            Ok(recording) => {
                info!("Recording session {}", recording.id());
                self.recording = Some(recording);
                self.studio.set_status("Recording... type 'stop' to transcribe.");
            }
            Err(e) => {
                warn!("Could not start recording: {}", e);
                self.studio.set_status(e.status_line());
            }
        }
    }

    fn stop(&mut self) -> Result<()> {
        let Some(recording) = self.recording.take() else {
            println!("Not recording.");
            return Ok(());
        };
        let session = recording.stop();

        let client = match self.client() {
            Ok(client) => client,
            Err(e) => {
                self.studio.set_status(e.status_line());
                return Ok(());
            }
        };

        let studio = self.studio.clone();
        let settle = Duration::from_millis(self.config.audio.settle_ms);
        tokio::spawn(async move {
            let buffer = session.finish(settle).await;
            if let Err(e) = transcribe_into_dialogue(&studio, &client, buffer).await {
                warn!("Dictation failed: {}", e);
            }
        });
        Ok(())
    }

    fn output_handle(&mut self) -> Result<OutputStreamHandle, SceneError> {
        if let Some((_, handle)) = &self.output {
            return Ok(handle.clone());
        }
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| SceneError::Playback(e.to_string()))?;
        self.output = Some((stream, handle.clone()));
        Ok(handle)
    }

    /// Reloads surfaces whose media changed since the last play, then starts everything together.
    fn play(&mut self) -> Result<()> {
        let handle = self.output_handle()?;
        let artifacts = self.studio.artifacts();

        if self.loaded_revision != Some(artifacts.revision) {
            match &artifacts.video {
                Some(video) => self.playback.load(
                    Track::Video,
                    Box::new(ExternalVideo::new(&self.config.ui.video_player, video)?),
                ),
                None => self.playback.unload(Track::Video),
            }
            match &artifacts.audio {
                Some(audio) => self
                    .playback
                    .load(Track::Narration, Box::new(AudioTrack::new(handle.clone(), audio.data.clone()))),
                None => self.playback.unload(Track::Narration),
            }
            self.loaded_revision = Some(artifacts.revision);
        }

        let doc = self.studio.document();
        match &doc.music {
            Some(music) => self
                .playback
                .load(Track::Music, Box::new(AudioTrack::new(handle, music.data.clone()))),
            None => self.playback.unload(Track::Music),
        }

        if self.playback.play_all(doc.volume())? == 0 {
            println!("Nothing to play yet.");
        }
        Ok(())
    }
}
