//! Output target adapters
//!
//! The router talks to targets through these narrow port traits; one
//! implementation per adapter lives in the submodules. All calls are
//! synchronous and bounded — nothing here blocks mid-update. The MIDI
//! port only enqueues; actual transmission happens on the pump task.

pub mod console;
pub mod midi;
pub mod mixer;
pub mod osc;

use crate::control::MixerHandle;
use crate::error::TargetError;

/// Absolute-source adapter: an ALSA-style mixer whose elements can change
/// underneath us (other apps, alsamixer, a slave daemon).
pub trait MixerPort {
    /// Resolve an element name to an owned handle.
    fn acquire(&mut self, element: &str) -> Result<MixerHandle, TargetError>;
    /// Read the live playback volume in whole dB.
    fn read_db(&self, handle: &MixerHandle) -> Result<i32, TargetError>;
    /// Set the playback volume in whole dB.
    fn write_db(&self, handle: &MixerHandle, db: i32) -> Result<(), TargetError>;
    /// Engage or release the playback mute switch.
    fn set_mute(&self, handle: &MixerHandle, mute: bool) -> Result<(), TargetError>;
}

/// Buffering MIDI transport: enqueue only, drained by the pump task.
pub trait MidiPort {
    fn send_cc(&self, channel: u8, cc: u8, value: u8) -> Result<(), TargetError>;
}

/// Fire-and-forget network control messages.
pub trait OscPort {
    fn send(&self, url: &str, path: &str, value: i32) -> Result<(), TargetError>;
}

/// Synchronous, unbuffered line output.
pub trait ConsolePort {
    fn emit(&self, line: u32, value: i32);
}
