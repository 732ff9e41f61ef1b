//! Scene generation: optional voiceover first, then the long-running video job.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, error, info, warn};
use shared::{encode_wav, Document, GenerationConfig, MediaArtifact, Voice};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::SceneError;
use crate::services::{
    SceneServices, SpeechRequest, VideoRequest, SPEECH_CHANNELS, SPEECH_SAMPLE_RATE,
};

pub const DEFAULT_IMAGE_PROMPT: &str = "Animate this image";
pub const STATUS_VOICEOVER: &str = "Generating voiceover...";
pub const STATUS_SUBMITTING: &str = "Sending request to Veo...";
pub const STATUS_THINKING: &str = "Veo is thinking...";
pub const STATUS_DOWNLOADING: &str = "Downloading video...";
pub const STATUS_COMPLETE: &str = "Scene generation complete!";

/// What the pipeline needs from whoever owns the document and the artifacts.
pub trait PipelineHost: Send + Sync {
    /// The live document, read at the moment of use.
    fn document(&self) -> Document;

    fn set_status(&self, status: String);

    fn clear_artifacts(&self);

    fn publish_audio(&self, artifact: MediaArtifact);

    fn publish_video(&self, artifact: MediaArtifact);
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub resolution: String,
    pub report_speech_failures: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&GenerationConfig::default())
    }
}

impl PipelineSettings {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
            max_poll_attempts: config.max_poll_attempts,
            resolution: config.resolution.clone(),
            report_speech_failures: config.report_speech_failures,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Voiceover {
    Skipped,
    Ready,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneOutcome {
    pub voiceover: Voiceover,
    pub poll_attempts: u32,
}

impl SceneOutcome {
    fn status_line(&self, report_speech_failures: bool) -> String {
        match &self.voiceover {
            Voiceover::Failed(reason) if report_speech_failures => {
                format!("{} The voiceover could not be generated: {}", STATUS_COMPLETE, reason)
            }
            _ => STATUS_COMPLETE.to_string(),
        }
    }
}

pub struct ScenePipeline {
    services: SceneServices,
    settings: PipelineSettings,
}

impl ScenePipeline {
    pub fn new(services: SceneServices, settings: PipelineSettings) -> Self {
        Self { services, settings }
    }

    /// Runs one generation. Failures end up as the host's status line as well as the returned error.
    pub async fn run(&self, host: &dyn PipelineHost) -> Result<SceneOutcome, SceneError> {
        let run_id = Uuid::new_v4();
        match self.execute(host, run_id).await {
            Ok(outcome) => {
                info!("Run {} finished: {:?}", run_id, outcome);
                host.set_status(outcome.status_line(self.settings.report_speech_failures));
                Ok(outcome)
            }
            Err(e) => {
                error!("Run {} failed: {}", run_id, e);
                host.set_status(e.status_line());
                Err(e)
            }
        }
    }

    async fn execute(&self, host: &dyn PipelineHost, run_id: Uuid) -> Result<SceneOutcome, SceneError> {
        if !host.document().has_visual_input() {
            return Err(SceneError::MissingVisualInput);
        }

        info!("Starting run {}", run_id);
        host.clear_artifacts();

        let voiceover = self.voiceover_stage(host).await;
        let poll_attempts = self.video_stage(host).await?;

        Ok(SceneOutcome {
            voiceover,
            poll_attempts,
        })
    }

    async fn voiceover_stage(&self, host: &dyn PipelineHost) -> Voiceover {
        let document = host.document();
        if document.dialogue.trim().is_empty() {
            debug!("No dialogue, skipping voiceover");
            return Voiceover::Skipped;
        }

        host.set_status(STATUS_VOICEOVER.to_string());
        match self.synthesize(&document.dialogue, document.voice).await {
            Ok(artifact) => {
                info!("Voiceover ready ({} bytes)", artifact.len());
                host.publish_audio(artifact);
                Voiceover::Ready
            }
            // Voiceover problems never block the video.
            Err(e) => {
                warn!("Voiceover failed, continuing with video: {}", e);
                Voiceover::Failed(e.to_string())
            }
        }
    }

    async fn synthesize(&self, text: &str, voice: Voice) -> Result<MediaArtifact, SceneError> {
        let request = SpeechRequest {
            text: text.to_string(),
            voice,
        };
        let payload = self.services.speech.synthesize(&request).await?;
        let pcm = STANDARD.decode(payload.data.as_bytes())?;
        if pcm.is_empty() {
            return Err(SceneError::Speech("service returned no audio".to_string()));
        }

        let sample_rate = speech_sample_rate(payload.mime_type.as_deref());
        let wav = encode_wav(&pcm, sample_rate, SPEECH_CHANNELS);
        Ok(MediaArtifact::new(wav, "audio/wav"))
    }

    async fn video_stage(&self, host: &dyn PipelineHost) -> Result<u32, SceneError> {
        let request = video_request(&host.document(), &self.settings)?;
        debug!(
            "Video request: prompt={:?} aspect={} image={}",
            request.prompt,
            request.aspect_ratio.as_ratio(),
            request.image.is_some()
        );

        host.set_status(STATUS_SUBMITTING.to_string());
        let mut operation = self.services.video.submit(&request).await?;
        info!("Submitted video operation {}", operation.name);

        let started = Instant::now();
        let mut attempts = 0;
        while !operation.done {
            if attempts >= self.settings.max_poll_attempts {
                return Err(SceneError::PollTimeout { attempts });
            }
            host.set_status(format!(
                "{} ({}s elapsed)",
                STATUS_THINKING,
                started.elapsed().as_secs()
            ));
            tokio::time::sleep(self.settings.poll_interval).await;
            operation = self.services.video.refresh(&operation).await?;
            attempts += 1;
            debug!("Operation {} poll #{}: done={}", operation.name, attempts, operation.done);
        }

        if let Some(message) = operation.error {
            return Err(SceneError::OperationFailed(message));
        }
        let uri = operation.video_uri.ok_or(SceneError::NoVideoLocator)?;

        host.set_status(STATUS_DOWNLOADING.to_string());
        let bytes = self.services.fetcher.fetch(&uri).await?;
        info!("Downloaded video ({} bytes)", bytes.len());
        host.publish_video(MediaArtifact::new(bytes, "video/mp4"));

        Ok(attempts)
    }
}

/// Sample rate advertised by a raw PCM media type such as `audio/L16;codec=pcm;rate=24000`.
///
/// Falls back to the fixed speech profile when the type carries no usable rate.
pub fn speech_sample_rate(mime_type: Option<&str>) -> u32 {
    mime_type
        .into_iter()
        .flat_map(|mime| mime.split(';'))
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.trim().parse::<u32>().ok())
        .filter(|rate| *rate > 0)
        .unwrap_or(SPEECH_SAMPLE_RATE)
}

/// Builds the video request from the document, substituting the image prompt when only an image is given.
pub fn video_request(document: &Document, settings: &PipelineSettings) -> Result<VideoRequest, SceneError> {
    if !document.has_visual_input() {
        return Err(SceneError::MissingVisualInput);
    }

    let prompt = if document.prompt.trim().is_empty() {
        DEFAULT_IMAGE_PROMPT.to_string()
    } else {
        document.prompt.clone()
    };

    Ok(VideoRequest {
        prompt,
        aspect_ratio: document.aspect_ratio,
        image: document.image.clone(),
        number_of_videos: 1,
        resolution: settings.resolution.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{png_image, FakeServices, RecordingHost};
    use shared::{AspectRatio, DocumentField, Patch};

    fn pipeline(fakes: &FakeServices) -> ScenePipeline {
        ScenePipeline::new(fakes.services(), PipelineSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn missing_prompt_and_image_makes_no_calls() {
        let fakes = FakeServices::new();
        let host = RecordingHost::new(Document::default());

        let result = pipeline(&fakes).run(&host).await;

        assert!(matches!(result, Err(SceneError::MissingVisualInput)));
        assert!(fakes.calls().is_empty());
        assert_eq!(
            host.status(),
            "Please provide a video prompt or a reference image."
        );
        assert!(!host.events().contains(&"clear".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn dialogue_alone_does_not_satisfy_the_precondition() {
        let fakes = FakeServices::new();
        let doc = Document::default().with_field(DocumentField::Dialogue("Hello world".into()));
        let host = RecordingHost::new(doc);

        let result = pipeline(&fakes).run(&host).await;

        assert!(matches!(result, Err(SceneError::MissingVisualInput)));
        assert!(fakes.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn image_with_dialogue_publishes_audio_before_submitting_video() {
        let fakes = FakeServices::new();
        fakes.set_speech_pcm(vec![1, 0, 2, 0]);
        fakes.script_polls(vec![]);
        let doc = Document::default()
            .with_field(DocumentField::Dialogue("Hello world".into()))
            .with_field(DocumentField::Voice(Voice::Kore))
            .with_field(DocumentField::Image(Some(png_image())));
        let host = RecordingHost::new(doc);
        fakes.attach_log(host.log());

        let outcome = pipeline(&fakes).run(&host).await.unwrap();

        assert_eq!(outcome.voiceover, Voiceover::Ready);
        let speech = fakes.speech_requests();
        assert_eq!(speech.len(), 1);
        assert_eq!(speech[0].text, "Hello world");
        assert_eq!(speech[0].voice, Voice::Kore);

        let video = fakes.video_requests();
        assert_eq!(video[0].prompt, "Animate this image");
        assert_eq!(video[0].number_of_videos, 1);
        assert_eq!(video[0].resolution, "720p");
        assert_eq!(video[0].image.as_ref().unwrap().mime_type, "image/png");

        let events = host.events();
        let audio_at = events.iter().position(|e| e == "audio").unwrap();
        let submit_at = events.iter().position(|e| e == "submit").unwrap();
        let clear_at = events.iter().position(|e| e == "clear").unwrap();
        assert!(clear_at < audio_at);
        assert!(audio_at < submit_at);

        let audio = host.artifacts().audio.unwrap();
        assert_eq!(audio.mime_type, "audio/wav");
        assert_eq!(audio.len(), 44 + 4);
        assert_eq!(&audio.data[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(audio.data[24..28].try_into().unwrap()), 24_000);
    }

    #[tokio::test(start_paused = true)]
    async fn two_pending_polls_wait_twice_before_fetching() {
        let fakes = FakeServices::new();
        fakes.script_polls(vec![false, true]);
        let doc = Document::default()
            .with_field(DocumentField::Prompt("a paper boat in the rain".into()))
            .with_field(DocumentField::AspectRatio(AspectRatio::Tall));
        let host = RecordingHost::new(doc);

        let started = Instant::now();
        let outcome = pipeline(&fakes).run(&host).await.unwrap();

        assert_eq!(outcome.poll_attempts, 2);
        assert_eq!(outcome.voiceover, Voiceover::Skipped);
        assert_eq!(fakes.refresh_count(), 2);
        let fetched_at = fakes.fetch_elapsed().unwrap();
        assert!(fetched_at >= Duration::from_secs(10));
        assert!(fetched_at < Duration::from_secs(11));
        assert!(started.elapsed() < Duration::from_secs(11));

        let thinking = host
            .statuses()
            .iter()
            .filter(|s| s.starts_with(STATUS_THINKING))
            .count();
        assert_eq!(thinking, 2);
        assert_eq!(host.status(), STATUS_COMPLETE);

        let request = &fakes.video_requests()[0];
        assert_eq!(request.prompt, "a paper boat in the rain");
        assert_eq!(request.aspect_ratio, AspectRatio::Tall);
        assert!(request.image.is_none());
        assert_eq!(host.artifacts().video.unwrap().mime_type, "video/mp4");
    }

    #[tokio::test(start_paused = true)]
    async fn completion_without_locator_keeps_audio_and_reports_error() {
        let fakes = FakeServices::new();
        fakes.set_speech_pcm(vec![0; 16]);
        fakes.script_polls(vec![true]);
        fakes.omit_video_uri();
        let doc = Document::default()
            .with_field(DocumentField::Prompt("city lights".into()))
            .with_field(DocumentField::Dialogue("Good evening".into()));
        let host = RecordingHost::new(doc);

        let result = pipeline(&fakes).run(&host).await;

        assert!(matches!(result, Err(SceneError::NoVideoLocator)));
        assert!(host.status().starts_with("Error: "));
        assert!(host.artifacts().audio.is_some());
        assert!(host.artifacts().video.is_none());
        assert_eq!(fakes.fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn speech_failure_does_not_block_video() {
        let fakes = FakeServices::new();
        fakes.fail_speech("quota exceeded");
        fakes.script_polls(vec![]);
        let doc = Document::default()
            .with_field(DocumentField::Prompt("a quiet forest".into()))
            .with_field(DocumentField::Dialogue("Listen".into()));
        let host = RecordingHost::new(doc);

        let outcome = pipeline(&fakes).run(&host).await.unwrap();

        assert!(matches!(outcome.voiceover, Voiceover::Failed(_)));
        assert!(host.artifacts().audio.is_none());
        assert!(host.artifacts().video.is_some());
        assert_eq!(host.status(), STATUS_COMPLETE);
    }

    #[tokio::test(start_paused = true)]
    async fn speech_failure_can_be_reported() {
        let fakes = FakeServices::new();
        fakes.fail_speech("quota exceeded");
        fakes.script_polls(vec![]);
        let doc = Document::default()
            .with_field(DocumentField::Prompt("a quiet forest".into()))
            .with_field(DocumentField::Dialogue("Listen".into()));
        let host = RecordingHost::new(doc);
        let settings = PipelineSettings {
            report_speech_failures: true,
            ..PipelineSettings::default()
        };

        ScenePipeline::new(fakes.services(), settings)
            .run(&host)
            .await
            .unwrap();

        assert!(host.status().starts_with(STATUS_COMPLETE));
        assert!(host.status().contains("quota exceeded"));
    }

    #[tokio::test(start_paused = true)]
    async fn polling_gives_up_after_the_attempt_limit() {
        let fakes = FakeServices::new();
        fakes.script_polls(vec![false; 10]);
        let doc = Document::default().with_field(DocumentField::Prompt("endless".into()));
        let host = RecordingHost::new(doc);
        let settings = PipelineSettings {
            max_poll_attempts: 3,
            ..PipelineSettings::default()
        };

        let result = ScenePipeline::new(fakes.services(), settings).run(&host).await;

        assert!(matches!(result, Err(SceneError::PollTimeout { attempts: 3 })));
        assert_eq!(fakes.refresh_count(), 3);
        assert_eq!(fakes.fetch_count(), 0);
        assert!(host.status().starts_with("Error: "));
    }

    #[tokio::test(start_paused = true)]
    async fn service_reported_failure_aborts_the_run() {
        let fakes = FakeServices::new();
        fakes.script_polls(vec![true]);
        fakes.fail_operation("prompt rejected by safety filters");
        let doc = Document::default().with_field(DocumentField::Prompt("x".into()));
        let host = RecordingHost::new(doc);

        let result = pipeline(&fakes).run(&host).await;

        assert!(matches!(result, Err(SceneError::OperationFailed(_))));
        assert_eq!(
            host.status(),
            "Error: Video generation failed: prompt rejected by safety filters"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn a_new_run_clears_previous_artifacts_first() {
        let fakes = FakeServices::new();
        fakes.script_polls(vec![]);
        let doc = Document::default().with_field(DocumentField::Prompt("first".into()));
        let host = RecordingHost::new(doc);
        host.publish_audio(MediaArtifact::new(vec![9; 4], "audio/wav"));

        fakes.fail_submit("backend unavailable");
        let result = pipeline(&fakes).run(&host).await;

        assert!(result.is_err());
        assert!(host.artifacts().audio.is_none());
        assert!(host.artifacts().video.is_none());
    }

    #[test]
    fn prompt_wins_over_default_image_prompt() {
        let doc = Document::default()
            .with_field(DocumentField::Prompt("  slow pan  ".into()))
            .with_field(DocumentField::Image(Some(png_image())));
        let request = video_request(&doc, &PipelineSettings::default()).unwrap();
        assert_eq!(request.prompt, "  slow pan  ");
    }

    #[tokio::test(start_paused = true)]
    async fn dialogue_is_spoken_as_typed() {
        let fakes = FakeServices::new();
        fakes.script_polls(vec![]);
        let doc = Document::default()
            .with_field(DocumentField::Prompt("rain on glass".into()))
            .with_field(DocumentField::Dialogue("  Wait... listen. ".into()));
        let host = RecordingHost::new(doc);

        pipeline(&fakes).run(&host).await.unwrap();

        assert_eq!(fakes.speech_requests()[0].text, "  Wait... listen. ");
        assert_eq!(fakes.video_requests()[0].prompt, "rain on glass");
    }

    #[tokio::test(start_paused = true)]
    async fn whitespace_dialogue_skips_the_voiceover() {
        let fakes = FakeServices::new();
        fakes.script_polls(vec![]);
        let doc = Document::default()
            .with_field(DocumentField::Prompt("rain on glass".into()))
            .with_field(DocumentField::Dialogue(" \n ".into()));
        let host = RecordingHost::new(doc);

        let outcome = pipeline(&fakes).run(&host).await.unwrap();

        assert_eq!(outcome.voiceover, Voiceover::Skipped);
        assert!(fakes.speech_requests().is_empty());
    }

    #[test]
    fn reads_the_rate_from_the_speech_media_type() {
        assert_eq!(speech_sample_rate(Some("audio/L16;codec=pcm;rate=24000")), 24_000);
        assert_eq!(speech_sample_rate(Some("audio/L16; rate=16000")), 16_000);
        assert_eq!(speech_sample_rate(Some("audio/L16;codec=pcm")), SPEECH_SAMPLE_RATE);
        assert_eq!(speech_sample_rate(Some("audio/L16;rate=0")), SPEECH_SAMPLE_RATE);
        assert_eq!(speech_sample_rate(None), SPEECH_SAMPLE_RATE);
    }

    #[tokio::test(start_paused = true)]
    async fn voiceover_header_follows_the_advertised_rate() {
        let fakes = FakeServices::new();
        fakes.script_polls(vec![]);
        fakes.set_speech_mime_type("audio/L16;codec=pcm;rate=16000");
        let doc = Document::default()
            .with_field(DocumentField::Prompt("tide".into()))
            .with_field(DocumentField::Dialogue("Hello".into()));
        let host = RecordingHost::new(doc);

        pipeline(&fakes).run(&host).await.unwrap();

        let audio = host.artifacts().audio.unwrap();
        assert_eq!(u32::from_le_bytes(audio.data[24..28].try_into().unwrap()), 16_000);
    }
}
