//! Microphone capture via cpal.

pub mod capture;
