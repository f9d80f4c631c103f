//! Offline transcription through an external program.
//!
//! Each utterance is written to a 16-bit mono WAV file and the configured
//! command is run with `{wav}` replaced by its path. Trimmed stdout is the
//! transcript.

use crate::config::OfflineConfig;
use crate::engine::batch::{Transcriber, Transcript};
use crate::error::{Result, VoiceError};
use crate::pipeline::messages::SpeechSegment;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Placeholder substituted with the WAV path in command arguments.
pub const WAV_PLACEHOLDER: &str = "{wav}";

static NEXT_FILE: AtomicU64 = AtomicU64::new(0);

/// [`Transcriber`] that shells out to a speech-to-text program.
pub struct CommandTranscriber {
    program: String,
    args: Vec<String>,
    confidence: f32,
    scratch_dir: PathBuf,
}

impl CommandTranscriber {
    /// # Errors
    ///
    /// Returns [`VoiceError::Config`] if no command is configured.
    pub fn new(config: &OfflineConfig) -> Result<Self> {
        let (program, args) = config
            .command
            .split_first()
            .ok_or_else(|| VoiceError::Config("offline.command is empty".into()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            confidence: config.assumed_confidence.clamp(0.0, 1.0),
            scratch_dir: std::env::temp_dir(),
        })
    }

    /// Write utterance files somewhere other than the system temp dir.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    fn expand_args(&self, wav: &Path) -> Vec<String> {
        let wav = wav.to_string_lossy();
        self.args
            .iter()
            .map(|a| a.replace(WAV_PLACEHOLDER, &wav))
            .collect()
    }

    async fn run_command(&self, wav: &Path) -> Result<String> {
        let output = tokio::process::Command::new(&self.program)
            .args(self.expand_args(wav))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                VoiceError::Transcription(format!("failed to execute {}: {e}", self.program))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoiceError::Transcription(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }
}

#[async_trait]
impl Transcriber for CommandTranscriber {
    async fn transcribe(&self, segment: &SpeechSegment) -> Result<Transcript> {
        let started = Instant::now();
        let wav = self.scratch_dir.join(format!(
            "warcry-{}-{}.wav",
            std::process::id(),
            NEXT_FILE.fetch_add(1, Ordering::Relaxed)
        ));
        write_wav(&wav, &segment.samples, segment.sample_rate)?;

        let result = self.run_command(&wav).await;
        if let Err(e) = std::fs::remove_file(&wav) {
            debug!("could not remove {}: {e}", wav.display());
        }
        let text = result?;

        info!(
            "transcribed {}ms utterance in {}ms: \"{text}\"",
            segment.duration_ms(),
            started.elapsed().as_millis()
        );
        Ok(Transcript {
            text,
            confidence: self.confidence,
        })
    }
}

/// Save samples as a 16-bit mono WAV file.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| VoiceError::Transcription(format!("cannot create WAV: {e}")))?;

    for &s in samples {
        let sample_i16 = (s * 32767.0).clamp(-32768.0, 32767.0) as i16;
        writer
            .write_sample(sample_i16)
            .map_err(|e| VoiceError::Transcription(format!("WAV write error: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| VoiceError::Transcription(format!("WAV finalize error: {e}")))?;

    Ok(())
}
