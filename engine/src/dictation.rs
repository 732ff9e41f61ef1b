//! Dictation: microphone fragments in, transcript appended to the dialogue out.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, info, warn};
use shared::{encode_wav, DocumentField};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::SceneError;
use crate::services::{Transcriber, TranscriptionRequest};
use crate::studio::Studio;

pub const TRANSCRIPTION_INSTRUCTION: &str = "Transcribe this audio exactly as spoken.";

/// Captured 16-bit PCM fragments, in arrival order.
#[derive(Debug, Clone)]
pub struct RecordingBuffer {
    fragments: Vec<Vec<u8>>,
    sample_rate: u32,
    channels: u16,
}

impl RecordingBuffer {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            fragments: Vec::new(),
            sample_rate,
            channels,
        }
    }

    pub fn push(&mut self, fragment: Vec<u8>) {
        if !fragment.is_empty() {
            self.fragments.push(fragment);
        }
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    pub fn byte_len(&self) -> usize {
        self.fragments.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.byte_len() == 0
    }

    pub fn duration(&self) -> Duration {
        let bytes_per_second = self.sample_rate as u64 * self.channels as u64 * 2;
        if bytes_per_second == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.byte_len() as u64 * 1000 / bytes_per_second)
    }

    /// Concatenates every fragment into one playable clip.
    pub fn into_clip(self) -> Vec<u8> {
        let pcm = self.fragments.concat();
        encode_wav(&pcm, self.sample_rate, self.channels)
    }
}

/// One recording, from microphone start until the buffer is handed to transcription.
pub struct DictationSession {
    id: Uuid,
    fragments: mpsc::UnboundedReceiver<Vec<u8>>,
    buffer: RecordingBuffer,
}

impl DictationSession {
    pub fn new(sample_rate: u32, channels: u16) -> (Self, mpsc::UnboundedSender<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Self {
            id: Uuid::new_v4(),
            fragments: rx,
            buffer: RecordingBuffer::new(sample_rate, channels),
        };
        info!("Dictation session {} started ({} Hz, {} ch)", session.id, sample_rate, channels);
        (session, tx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn drain(&mut self) {
        while let Ok(fragment) = self.fragments.try_recv() {
            self.buffer.push(fragment);
        }
    }

    /// Waits `settle` for trailing fragments, then returns everything captured.
    pub async fn finish(mut self, settle: Duration) -> RecordingBuffer {
        tokio::time::sleep(settle).await;
        self.drain();
        debug!(
            "Dictation session {} captured {} fragments ({:?})",
            self.id,
            self.buffer.fragment_count(),
            self.buffer.duration()
        );
        self.buffer
    }
}

/// Appends `addition` to `existing` with a single space, or uses it verbatim when there is nothing yet.
///
/// The existing text is kept exactly as typed.
pub fn join_transcript(existing: &str, addition: &str) -> String {
    if existing.is_empty() {
        addition.to_string()
    } else {
        format!("{} {}", existing, addition)
    }
}

/// Transcribes the buffer and appends the text to whatever the dialogue is when the reply arrives.
pub async fn transcribe_into_dialogue(
    studio: &Studio,
    transcriber: &dyn Transcriber,
    buffer: RecordingBuffer,
) -> Result<Option<String>, SceneError> {
    if buffer.is_empty() {
        warn!("Nothing recorded, skipping transcription");
        studio.set_status("No audio was captured.");
        return Ok(None);
    }

    studio.set_status("Transcribing...");
    let request = TranscriptionRequest {
        audio_base64: STANDARD.encode(buffer.into_clip()),
        mime_type: "audio/wav".to_string(),
        instruction: TRANSCRIPTION_INSTRUCTION.to_string(),
    };

    let text = match transcriber.transcribe(&request).await {
        Ok(text) => text,
        Err(e) => {
            let err = match e {
                SceneError::Transcription(_) => e,
                other => SceneError::Transcription(other.to_string()),
            };
            studio.set_status(err.status_line());
            return Err(err);
        }
    };

    let text = text.trim();
    if text.is_empty() {
        studio.set_status("No speech detected.");
        return Ok(None);
    }

    studio.edit(|doc| DocumentField::Dialogue(join_transcript(&doc.dialogue, text)));
    info!("Appended {} characters of dictation", text.len());
    studio.set_status("Transcription added to dialogue.");
    Ok(Some(text.to_string()))
}
