//! Transcript interpretation and the dispatcher that drives it.

pub mod confirmation;
pub mod dispatcher;
pub mod history;
pub mod messages;
pub mod sequencer;
pub mod voice;
