use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use log::{error, info, trace, warn};
use scene_engine::{DictationSession, SceneError};
use shared::AudioConfig;
use tokio::sync::mpsc;
use uuid::Uuid;

/// The input device dictation records from.
pub struct Microphone {
    device: Device,
}

impl Microphone {
    pub fn open(config: &AudioConfig) -> Result<Self, SceneError> {
        let host = cpal::default_host();

        let device = match &config.device {
            Some(device_name) => host
                .input_devices()
                .map_err(|e| SceneError::Microphone(e.to_string()))?
                .find(|d| d.name().map(|n| n == *device_name).unwrap_or(false))
                .ok_or_else(|| SceneError::Microphone(format!("device '{}' not found", device_name)))?,
            None => host
                .default_input_device()
                .ok_or_else(|| SceneError::Microphone("no default input device".to_string()))?,
        };

        info!("Using audio device: {}", device.name().unwrap_or_else(|_| "Unknown".to_string()));
        Ok(Self { device })
    }

    /// Starts capturing. Fragments flow into the returned recording until it is stopped.
    pub fn start(&self) -> Result<Recording, SceneError> {
        let supported = self
            .device
            .default_input_config()
            .map_err(|e| SceneError::Microphone(e.to_string()))?;
        let config: StreamConfig = supported.config();
        info!("Audio config: {:?}", config);

        let (session, tx) = DictationSession::new(config.sample_rate.0, config.channels);
        let stream = match supported.sample_format() {
            SampleFormat::I8 => self.build_stream::<i8>(&config, tx),
            SampleFormat::I16 => self.build_stream::<i16>(&config, tx),
            SampleFormat::I32 => self.build_stream::<i32>(&config, tx),
            SampleFormat::I64 => self.build_stream::<i64>(&config, tx),
            SampleFormat::U8 => self.build_stream::<u8>(&config, tx),
            SampleFormat::U16 => self.build_stream::<u16>(&config, tx),
            SampleFormat::U32 => self.build_stream::<u32>(&config, tx),
            SampleFormat::U64 => self.build_stream::<u64>(&config, tx),
            SampleFormat::F32 => self.build_stream::<f32>(&config, tx),
            SampleFormat::F64 => self.build_stream::<f64>(&config, tx),
            other => {
                return Err(SceneError::Microphone(format!("unsupported sample format {:?}", other)));
            }
        }
        .map_err(|e| SceneError::Microphone(e.to_string()))?;

        stream.play().map_err(|e| SceneError::Microphone(e.to_string()))?;
        Ok(Recording { stream, session })
    }

    fn build_stream<T>(&self, config: &StreamConfig, tx: mpsc::UnboundedSender<Vec<u8>>) -> Result<cpal::Stream>
    where
        T: cpal::Sample + cpal::SizedSample + Send + 'static,
        i16: cpal::FromSample<T>,
    {
        let stream = self.device.build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                trace!("Captured {} audio samples", data.len());

                let mut fragment = Vec::with_capacity(data.len() * 2);
                for &sample in data {
                    let sample: i16 = cpal::Sample::to_sample(sample);
                    fragment.extend_from_slice(&sample.to_le_bytes());
                }

                if tx.send(fragment).is_err() {
                    warn!("Dictation session closed, dropping audio fragment");
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
            },
            None,
        )?;

        Ok(stream)
    }

    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let mut names = Vec::new();
        for device in host.input_devices().context("Failed to enumerate input devices")? {
            names.push(device.name()?);
        }
        Ok(names)
    }
}

/// A live capture. Dropping it stops the microphone.
pub struct Recording {
    stream: cpal::Stream,
    session: DictationSession,
}

impl Recording {
    pub fn id(&self) -> Uuid {
        self.session.id()
    }

    /// Stops the microphone and hands back the session so its trailing fragments can settle.
    pub fn stop(self) -> DictationSession {
        if let Err(e) = self.stream.pause() {
            warn!("Failed to pause input stream: {}", e);
        }
        info!("Recording {} stopped", self.session.id());
        self.session
    }
}
