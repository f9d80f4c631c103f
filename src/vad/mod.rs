//! Voice activity segmentation using RMS energy.
//!
//! Chunks whose RMS exceeds the threshold are speech. An utterance ends once
//! energy stays below the threshold for the silence timeout; utterances with
//! less voiced audio than the minimum are discarded without transcription.
//! Input captured at another rate is resampled to the target rate first.

use crate::config::VadConfig;
use crate::pipeline::messages::{AudioChunk, SpeechSegment};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Utterance segmenter for the offline engine.
pub struct VoiceActivitySegmenter {
    /// Accumulated samples for the current utterance.
    speech_buffer: Vec<f32>,
    /// Whether we are currently inside an utterance.
    in_speech: bool,
    /// Consecutive sub-threshold samples since the last speech chunk.
    silence_samples: usize,
    /// Sub-threshold samples that end an utterance.
    silence_limit: usize,
    /// Above-threshold samples in the current utterance.
    voiced_samples: usize,
    /// Minimum voiced samples for an utterance to be kept.
    min_speech_samples: usize,
    /// When the current utterance started.
    speech_start: Option<Instant>,
    target_rate: u32,
    threshold: f32,
    /// Raised while feedback speech is playing.
    suppress: Option<Arc<AtomicBool>>,
}

impl VoiceActivitySegmenter {
    pub fn new(config: &VadConfig) -> Self {
        let target_rate = config.target_sample_rate.max(1);
        let silence_limit = ms_to_samples(target_rate, config.silence_timeout_ms).max(1);
        let min_speech_samples = ms_to_samples(target_rate, config.min_speech_ms);

        info!(
            "VAD initialized: threshold={}, silence={}ms, min_speech={}ms, rate={}Hz",
            config.threshold, config.silence_timeout_ms, config.min_speech_ms, target_rate
        );

        Self {
            speech_buffer: Vec::new(),
            in_speech: false,
            silence_samples: 0,
            silence_limit,
            voiced_samples: 0,
            min_speech_samples,
            speech_start: None,
            target_rate,
            threshold: config.threshold,
            suppress: None,
        }
    }

    /// Ignore input while `flag` is set.
    pub fn with_suppression(mut self, flag: Arc<AtomicBool>) -> Self {
        self.suppress = Some(flag);
        self
    }

    /// Feed one chunk; returns a segment when an utterance completes.
    pub fn process_chunk(&mut self, chunk: &AudioChunk) -> Option<SpeechSegment> {
        if self
            .suppress
            .as_ref()
            .is_some_and(|s| s.load(Ordering::Relaxed))
        {
            if self.in_speech {
                debug!("capture suppressed; dropping partial utterance");
            }
            self.reset();
            return None;
        }

        let samples = resample_linear(&chunk.samples, chunk.sample_rate, self.target_rate);
        let is_speech = compute_rms_energy(&samples) > self.threshold;

        if is_speech {
            if !self.in_speech {
                self.in_speech = true;
                self.speech_start = Some(chunk.captured_at);
                self.speech_buffer.clear();
                self.voiced_samples = 0;
            }
            self.silence_samples = 0;
            self.voiced_samples += samples.len();
            self.speech_buffer.extend_from_slice(&samples);
            return None;
        }

        if !self.in_speech {
            return None;
        }

        // Trailing silence stays in the buffer within the tolerance window.
        self.silence_samples += samples.len();
        self.speech_buffer.extend_from_slice(&samples);
        if self.silence_samples < self.silence_limit {
            return None;
        }

        let voiced = self.voiced_samples;
        let started_at = self.speech_start.unwrap_or(chunk.captured_at);
        let samples = std::mem::take(&mut self.speech_buffer);
        self.reset();

        if voiced < self.min_speech_samples {
            debug!(
                "discarding {}ms utterance (below minimum)",
                voiced as u64 * 1000 / u64::from(self.target_rate)
            );
            return None;
        }

        Some(SpeechSegment {
            samples,
            sample_rate: self.target_rate,
            started_at,
        })
    }

    /// Whether an utterance is in progress.
    #[must_use]
    pub fn in_speech(&self) -> bool {
        self.in_speech
    }

    /// Reset the segmenter state.
    pub fn reset(&mut self) {
        self.speech_buffer.clear();
        self.in_speech = false;
        self.silence_samples = 0;
        self.voiced_samples = 0;
        self.speech_start = None;
    }
}

fn ms_to_samples(sample_rate: u32, ms: u32) -> usize {
    (u64::from(sample_rate) * u64::from(ms) / 1000) as usize
}

/// Compute RMS energy of audio samples.
#[must_use]
pub fn compute_rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Linear-interpolation resampler from `src_rate` to `dst_rate`.
///
/// Adequate for speech: its energy sits well below the Nyquist limit of
/// 16kHz audio.
#[must_use]
pub fn resample_linear(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() || src_rate == 0 || dst_rate == 0 {
        return samples.to_vec();
    }

    let ratio = f64::from(src_rate) / f64::from(dst_rate);
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            f64::from(samples[idx]) * (1.0 - frac) + f64::from(samples[idx + 1]) * frac
        } else {
            f64::from(samples[idx.min(samples.len() - 1)])
        };

        output.push(sample as f32);
    }

    output
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    const RATE: u32 = 16_000;
    /// 32ms at 16kHz.
    const CHUNK: usize = 512;

    fn chunk(amplitude: f32, len: usize, rate: u32) -> AudioChunk {
        AudioChunk {
            samples: vec![amplitude; len],
            sample_rate: rate,
            captured_at: Instant::now(),
        }
    }

    fn feed(vad: &mut VoiceActivitySegmenter, amplitude: f32, chunks: usize) -> Vec<SpeechSegment> {
        (0..chunks)
            .filter_map(|_| vad.process_chunk(&chunk(amplitude, CHUNK, RATE)))
            .collect()
    }

    #[test]
    fn rms_of_constant_signal() {
        assert!((compute_rms_energy(&[0.5; 100]) - 0.5).abs() < 1e-6);
        assert!(compute_rms_energy(&[]).abs() < f32::EPSILON);
    }

    #[test]
    fn utterance_ends_after_silence_timeout() {
        let mut vad = VoiceActivitySegmenter::new(&VadConfig::default());
        // ~320ms of speech.
        assert!(feed(&mut vad, 0.2, 10).is_empty());
        assert!(vad.in_speech());

        // 800ms = 12800 samples = 25 chunks; the 25th closes the utterance.
        assert!(feed(&mut vad, 0.0, 24).is_empty());
        let segments = feed(&mut vad, 0.0, 1);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].sample_rate, RATE);
        assert_eq!(segments[0].samples.len(), 35 * CHUNK);
        assert!(!vad.in_speech());
    }

    #[test]
    fn short_blip_is_discarded() {
        let mut vad = VoiceActivitySegmenter::new(&VadConfig::default());
        // 96ms of speech, below the 200ms minimum.
        feed(&mut vad, 0.2, 3);
        assert!(feed(&mut vad, 0.0, 30).is_empty());
        assert!(!vad.in_speech());
    }

    #[test]
    fn speech_resumed_within_timeout_continues_utterance() {
        let mut vad = VoiceActivitySegmenter::new(&VadConfig::default());
        feed(&mut vad, 0.2, 10);
        feed(&mut vad, 0.0, 10);
        feed(&mut vad, 0.2, 10);
        let segments = feed(&mut vad, 0.0, 25);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].samples.len(), 55 * CHUNK);
    }

    #[test]
    fn resamples_48k_capture_to_target() {
        let mut vad = VoiceActivitySegmenter::new(&VadConfig::default());
        for _ in 0..10 {
            assert!(vad.process_chunk(&chunk(0.2, CHUNK * 3, 48_000)).is_none());
        }
        let mut segment = None;
        for _ in 0..30 {
            if let Some(s) = vad.process_chunk(&chunk(0.0, CHUNK * 3, 48_000)) {
                segment = Some(s);
                break;
            }
        }
        let segment = segment.unwrap();
        assert_eq!(segment.sample_rate, RATE);
        assert_eq!(segment.samples.len() % CHUNK, 0);
    }

    #[test]
    fn suppression_drops_partial_utterance() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut vad =
            VoiceActivitySegmenter::new(&VadConfig::default()).with_suppression(flag.clone());
        feed(&mut vad, 0.2, 10);
        flag.store(true, Ordering::Relaxed);
        assert!(feed(&mut vad, 0.2, 5).is_empty());
        assert!(!vad.in_speech());
        flag.store(false, Ordering::Relaxed);
        assert!(feed(&mut vad, 0.0, 40).is_empty());
    }

    #[test]
    fn resample_halves_length() {
        let out = resample_linear(&[0.0, 1.0, 0.0, 1.0], 32_000, 16_000);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|s| s.abs() < f32::EPSILON));
        assert_eq!(resample_linear(&[0.1, 0.2], 16_000, 16_000), vec![0.1, 0.2]);
    }
}
