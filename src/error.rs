//! Error taxonomy
//!
//! Configuration problems are fatal before the event loop starts; everything
//! discovered afterwards is logged and contained.

use thiserror::Error;

/// Startup configuration errors. These abort the process with usage guidance
/// before any GPIO line is requested.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("GPIO line {0} is already in use")]
    LineInUse(u32),

    #[error("rotary pair cannot use the same line ({0}) twice")]
    IdenticalPair(u32),

    #[error("malformed descriptor '{descriptor}': {reason}")]
    BadDescriptor { descriptor: String, reason: String },

    #[error("{field} out of range: {value} (allowed {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("{0}")]
    Missing(&'static str),
}

impl ConfigError {
    pub fn bad(descriptor: &str, reason: impl Into<String>) -> Self {
        Self::BadDescriptor {
            descriptor: descriptor.to_string(),
            reason: reason.into(),
        }
    }
}

/// Runtime adapter errors. Logged at the router; the control update that
/// triggered them is retained so the next user action can retry.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("mixer element '{0}' not found")]
    ElementNotFound(String),

    #[error("mixer unavailable: {0}")]
    Mixer(#[from] alsa::Error),

    #[error("MIDI send failed: {0}")]
    MidiSend(#[from] midir::SendError),

    #[error("MIDI queue full, message dropped")]
    QueueFull,

    #[error("bad OSC url '{0}'")]
    BadUrl(String),

    #[error("OSC encoding failed: {0}")]
    OscEncode(#[from] rosc::OscError),

    #[error("network send failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("no handle acquired for '{0}'")]
    NoHandle(String),
}
