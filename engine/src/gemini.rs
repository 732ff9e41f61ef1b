//! REST client for the Generative Language API: speech, video, download and transcription.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::debug;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use shared::ApiConfig;
use std::time::Duration;

use crate::credentials::ApiKey;
use crate::error::SceneError;
use crate::services::{
    MediaFetcher, SpeechPayload, SpeechRequest, SpeechSynthesizer, TranscriptionRequest,
    Transcriber, VideoGenerator, VideoOperation, VideoRequest,
};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Client for the Generative Language API.
///
/// Video job calls and transcription are bounded by `timeout_seconds`. Speech
/// synthesis and media downloads run without a request timeout.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    key: ApiKey,
    timeout: Duration,
    speech_model: String,
    video_model: String,
    transcription_model: String,
}

impl GeminiClient {
    pub fn new(config: &ApiConfig, key: ApiKey) -> Result<Self, SceneError> {
        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            key,
            timeout: Duration::from_secs(config.timeout_seconds),
            speech_model: config.speech_model.clone(),
            video_model: config.video_model.clone(),
            transcription_model: config.transcription_model.clone(),
        })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, model.trim(), method)
    }

    fn post(&self, url: &str, body: &Value) -> RequestBuilder {
        debug!("POST {}", url);
        self.http
            .post(url)
            .header(API_KEY_HEADER, self.key.expose())
            .json(body)
    }

    fn get(&self, url: &str) -> RequestBuilder {
        debug!("GET {}", url);
        self.http.get(url).header(API_KEY_HEADER, self.key.expose())
    }

    fn speech_call(&self, request: &SpeechRequest) -> RequestBuilder {
        let url = self.model_url(&self.speech_model, "generateContent");
        self.post(&url, &speech_body(request))
    }

    fn submit_call(&self, request: &VideoRequest) -> RequestBuilder {
        let url = self.model_url(&self.video_model, "predictLongRunning");
        self.post(&url, &video_body(request)).timeout(self.timeout)
    }

    fn refresh_call(&self, operation: &VideoOperation) -> RequestBuilder {
        let url = format!("{}/v1beta/{}", self.base_url, operation.name);
        self.get(&url).timeout(self.timeout)
    }

    fn fetch_call(&self, uri: &str) -> RequestBuilder {
        self.get(uri)
    }

    fn transcription_call(&self, request: &TranscriptionRequest) -> RequestBuilder {
        let url = self.model_url(&self.transcription_model, "generateContent");
        self.post(&url, &transcription_body(request)).timeout(self.timeout)
    }
}

async fn send(call: RequestBuilder) -> Result<reqwest::Response, SceneError> {
    check_status(call.send().await?).await
}

async fn send_json<T: DeserializeOwned>(call: RequestBuilder) -> Result<T, SceneError> {
    Ok(send(call).await?.json().await?)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SceneError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .ok()
        .and_then(|envelope| envelope.error)
        .and_then(|error| error.message)
        .unwrap_or(body);

    Err(SceneError::Service {
        status: status.as_u16(),
        message,
    })
}

pub fn speech_body(request: &SpeechRequest) -> Value {
    json!({
        "contents": [{ "parts": [{ "text": request.text }] }],
        "generationConfig": {
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": {
                    "prebuiltVoiceConfig": { "voiceName": request.voice.name() }
                }
            }
        }
    })
}

pub fn video_body(request: &VideoRequest) -> Value {
    let mut instance = json!({ "prompt": request.prompt });
    if let Some(image) = &request.image {
        instance["image"] = json!({
            "bytesBase64Encoded": STANDARD.encode(&image.data),
            "mimeType": image.mime_type,
        });
    }

    json!({
        "instances": [instance],
        "parameters": {
            "aspectRatio": request.aspect_ratio.as_ratio(),
            "resolution": request.resolution,
            "sampleCount": request.number_of_videos,
        }
    })
}

pub fn transcription_body(request: &TranscriptionRequest) -> Value {
    json!({
        "contents": [{
            "parts": [
                { "inlineData": { "mimeType": request.mime_type, "data": request.audio_base64 } },
                { "text": request.instruction }
            ]
        }]
    })
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<ApiStatus>,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: Option<String>,
    data: String,
}

impl GenerateContentResponse {
    fn parts(self) -> impl Iterator<Item = Part> {
        self.candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts)
            .unwrap_or_default()
            .into_iter()
    }

    fn into_audio(self) -> Option<SpeechPayload> {
        self.parts()
            .find_map(|part| part.inline_data)
            .map(|inline| SpeechPayload {
                data: inline.data,
                mime_type: inline.mime_type,
            })
    }

    fn into_text(self) -> String {
        self.parts().filter_map(|part| part.text).collect::<Vec<_>>().join("")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<ApiStatus>,
    #[serde(default)]
    response: Option<VideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoResponse {
    #[serde(default)]
    generate_video_response: Option<GeneratedVideos>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedVideos {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    #[serde(default)]
    video: Option<VideoFile>,
}

#[derive(Debug, Deserialize)]
struct VideoFile {
    #[serde(default)]
    uri: Option<String>,
}

impl From<OperationResponse> for VideoOperation {
    fn from(op: OperationResponse) -> Self {
        let error = op.error.map(|status| match (status.code, status.message) {
            (Some(code), Some(message)) => format!("{} (code {})", message, code),
            (None, Some(message)) => message,
            (Some(code), None) => format!("operation failed with code {}", code),
            (None, None) => "operation failed".to_string(),
        });
        let video_uri = op
            .response
            .and_then(|response| response.generate_video_response)
            .and_then(|videos| videos.generated_samples.into_iter().next())
            .and_then(|sample| sample.video)
            .and_then(|video| video.uri);

        VideoOperation {
            name: op.name,
            done: op.done,
            video_uri,
            error,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiClient {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechPayload, SceneError> {
        let response: GenerateContentResponse = send_json(self.speech_call(request)).await?;
        response
            .into_audio()
            .ok_or_else(|| SceneError::Speech("response contained no audio".to_string()))
    }
}

#[async_trait]
impl VideoGenerator for GeminiClient {
    async fn submit(&self, request: &VideoRequest) -> Result<VideoOperation, SceneError> {
        let operation: OperationResponse = send_json(self.submit_call(request)).await?;
        Ok(operation.into())
    }

    async fn refresh(&self, operation: &VideoOperation) -> Result<VideoOperation, SceneError> {
        let operation: OperationResponse = send_json(self.refresh_call(operation)).await?;
        Ok(operation.into())
    }
}

#[async_trait]
impl MediaFetcher for GeminiClient {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>, SceneError> {
        let bytes = send(self.fetch_call(uri)).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Transcriber for GeminiClient {
    async fn transcribe(&self, request: &TranscriptionRequest) -> Result<String, SceneError> {
        let response: GenerateContentResponse = send_json(self.transcription_call(request)).await?;
        Ok(response.into_text())
    }
}
