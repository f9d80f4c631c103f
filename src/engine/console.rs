//! Typed transcripts from standard input.
//!
//! Each non-empty line is one final transcript. A leading number in
//! `0.0..=1.0` sets the confidence, e.g. `0.55 attack`; without it the
//! confidence is `1.0`. End of input is reported as a fatal capture error.

use crate::engine::streaming::{RecognizerSignal, StreamingRecognizer};
use crate::engine::{EngineError, RecognitionErrorCode, RecognitionSettings};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

/// Split an optional leading confidence from a typed line.
#[must_use]
pub fn parse_typed_line(line: &str) -> Option<(String, f32)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if let Some((head, rest)) = line.split_once(char::is_whitespace)
        && let Ok(confidence) = head.parse::<f32>()
        && (0.0..=1.0).contains(&confidence)
        && !rest.trim().is_empty()
    {
        return Some((rest.trim().to_owned(), confidence));
    }
    Some((line.to_owned(), 1.0))
}

/// Recogniser reading transcripts from stdin.
pub struct ConsoleRecognizer {
    lines: Arc<Mutex<Lines<BufReader<Stdin>>>>,
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ConsoleRecognizer {
    pub fn new() -> Self {
        Self {
            lines: Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines())),
            reader: std::sync::Mutex::new(None),
        }
    }

    fn replace_reader(&self, next: Option<JoinHandle<()>>) {
        if let Ok(mut slot) = self.reader.lock()
            && let Some(previous) = std::mem::replace(&mut *slot, next)
        {
            previous.abort();
        }
    }
}

impl Default for ConsoleRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamingRecognizer for ConsoleRecognizer {
    fn is_available(&self) -> bool {
        true
    }

    async fn begin(
        &self,
        _settings: &RecognitionSettings,
        signals: mpsc::UnboundedSender<RecognizerSignal>,
    ) -> std::result::Result<(), EngineError> {
        let lines = Arc::clone(&self.lines);
        let handle = tokio::spawn(async move {
            let mut lines = lines.lock().await;
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Some((text, confidence)) = parse_typed_line(&line) {
                            let signal = RecognizerSignal::Transcript {
                                text,
                                confidence,
                                is_final: true,
                            };
                            if signals.send(signal).is_err() {
                                return;
                            }
                        }
                    }
                    Ok(None) => {
                        let _ = signals.send(RecognizerSignal::Error {
                            code: RecognitionErrorCode::AudioCapture,
                            message: "console input closed".into(),
                        });
                        return;
                    }
                    Err(e) => {
                        let _ = signals.send(RecognizerSignal::Error {
                            code: RecognitionErrorCode::Aborted,
                            message: format!("console read failed: {e}"),
                        });
                        return;
                    }
                }
            }
        });
        self.replace_reader(Some(handle));
        Ok(())
    }

    async fn end(&self) {
        self.replace_reader(None);
    }
}
