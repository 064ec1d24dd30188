//! knobd - GPIO rotary encoders and switches as control inputs
//!
//! Turns edge events on a Linux GPIO character device into debounced,
//! direction-correct control changes and routes them to an ALSA mixer, a
//! MIDI CC output, OSC network receivers, or the console. Network slave
//! mode drives local mixer controls from a broadcasting master instead of
//! from GPIO lines.

pub mod cli;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod gpio;
pub mod router;
pub mod targets;
