//! Microphone audio capture using cpal.
//!
//! Captures mono audio at the device's native sample rate. Resampling to the
//! segmenter's rate happens downstream.

use crate::config::AudioConfig;
use crate::engine::batch::AudioSource;
use crate::error::{Result, VoiceError};
use crate::pipeline::messages::AudioChunk;
use async_trait::async_trait;
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Audio capture from the system microphone.
///
/// The device is opened on each `run` so a replugged microphone is picked up
/// on the next start.
pub struct CpalCapture {
    /// Input device name (None = system default).
    device_name: Option<String>,
}

impl CpalCapture {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            device_name: config.input_device.clone(),
        }
    }

    fn open_device(&self) -> Result<cpal::Device> {
        let host = cpal::default_host();
        if let Some(ref name) = self.device_name {
            host.input_devices()
                .map_err(|e| VoiceError::Audio(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .is_some_and(|desc| desc.name() == name)
                })
                .ok_or_else(|| VoiceError::Audio(format!("input device '{name}' not found")))
        } else {
            host.default_input_device()
                .ok_or_else(|| VoiceError::Audio("no default input device".into()))
        }
    }

    /// Build the stream and hold it until cancelled. Runs on a blocking
    /// thread because the stream handle may not leave the thread it was
    /// created on.
    fn capture_blocking(
        &self,
        tx: mpsc::Sender<AudioChunk>,
        cancel: CancellationToken,
        runtime: tokio::runtime::Handle,
    ) -> Result<()> {
        let device = self.open_device()?;
        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());

        let default_config = device
            .default_input_config()
            .map_err(|e| VoiceError::Audio(format!("no default input config: {e}")))?;
        let stream_config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: default_config.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };
        let native_rate = stream_config.sample_rate;
        let native_channels = stream_config.channels;

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let samples = if native_channels > 1 {
                        to_mono(data, native_channels)
                    } else {
                        data.to_vec()
                    };
                    let chunk = AudioChunk {
                        samples,
                        sample_rate: native_rate,
                        captured_at: Instant::now(),
                    };
                    // Never block the audio thread.
                    if tx.try_send(chunk).is_err() {
                        debug!("audio channel full, dropping chunk");
                    }
                },
                move |err| {
                    error!("audio input stream error: {err}");
                },
                None,
            )
            .map_err(|e| VoiceError::Audio(format!("failed to build input stream: {e}")))?;

        stream
            .play()
            .map_err(|e| VoiceError::Audio(format!("failed to start input stream: {e}")))?;

        info!("audio capture started on {device_name}: {native_rate}Hz, {native_channels} channels");

        runtime.block_on(cancel.cancelled());

        drop(stream);
        info!("audio capture stopped");
        Ok(())
    }
}

#[async_trait]
impl AudioSource for CpalCapture {
    fn is_available(&self) -> bool {
        self.open_device().is_ok()
    }

    async fn run(&self, tx: mpsc::Sender<AudioChunk>, cancel: CancellationToken) -> Result<()> {
        let capture = Self {
            device_name: self.device_name.clone(),
        };
        let runtime = tokio::runtime::Handle::current();
        tokio::task::spawn_blocking(move || capture.capture_blocking(tx, cancel, runtime))
            .await
            .map_err(|e| VoiceError::Audio(format!("capture thread failed: {e}")))?
    }
}

/// List available input devices.
///
/// # Errors
///
/// Returns an error if devices cannot be enumerated.
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| VoiceError::Audio(format!("cannot enumerate devices: {e}")))?;

    let mut names = Vec::new();
    for device in devices {
        if let Ok(desc) = device.description() {
            names.push(desc.name().to_owned());
        }
    }
    Ok(names)
}

/// Convert interleaved multi-channel audio to mono by averaging channels.
fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}
