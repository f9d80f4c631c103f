//! Warcry: voice command interpretation for a wave-based defense game.
//!
//! Speech transcripts become discrete game commands:
//! Recognition engine → Pattern matcher → Confirmation → Sequencer → Game
//!
//! # Architecture
//!
//! - **Engines**: streaming recognisers or offline capture → VAD → transcription,
//!   selected at runtime through an [`engine::EngineRegistry`]
//! - **Matcher**: learned phrases, compound sequences, keywords, paraphrases
//! - **Confirmation**: yes/no protocol for uncertain single commands
//! - **Sequencer**: time-spaced dispatch of multi-command utterances
//! - **Learning**: per-user phrases promoted after repeated confirmed use
//! - **Dispatcher**: one task owning all of the above, publishing
//!   [`RuntimeEvent`]s

pub mod audio;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod learning;
pub mod matcher;
pub mod pipeline;
pub mod runtime;
pub mod vad;
pub mod warcry_dirs;

pub use command::GameCommand;
pub use config::VoiceConfig;
pub use error::{Result, VoiceError};
pub use pipeline::dispatcher::{DispatcherHandle, DispatcherStatus, VoiceDispatcher};
pub use runtime::RuntimeEvent;
