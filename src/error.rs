//! Error types for the warcry voice pipeline.

/// Top-level error type for voice command interpretation.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// The recognition capability is missing on this platform.
    #[error("recognition engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Microphone or recognition access was refused.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No engine is registered under the requested identifier.
    #[error("unknown engine: {0}")]
    UnknownEngine(String),

    /// Offline transcription failure.
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Audio device or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Key-value persistence error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, VoiceError>;
