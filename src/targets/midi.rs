//! MIDI control-change output
//!
//! The engine loop must never block on MIDI I/O, so delivery is split: the
//! router enqueues 3-byte CC messages into a mutex-guarded bounded queue,
//! and a periodic pump task drains it into the midir connection. The mutex
//! is held only for the enqueue/dequeue itself, never across I/O. A full
//! queue drops the message — delivery is best effort.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use midir::{MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::MidiPort;
use crate::error::TargetError;

pub const MSG_SIZE: usize = 3;
const QUEUE_CAPACITY: usize = 256;
const PUMP_INTERVAL: Duration = Duration::from_millis(10);
const CLIENT_NAME: &str = "knobd";

/// Status byte 0xB0 plus channel; data bytes masked to 7 bit.
pub fn cc_message(channel: u8, cc: u8, value: u8) -> [u8; MSG_SIZE] {
    [0xB0 | (channel & 0x0F), cc & 0x7F, value & 0x7F]
}

/// Bounded message queue between the engine loop and the pump task.
pub struct MidiQueue {
    messages: Mutex<VecDeque<[u8; MSG_SIZE]>>,
}

impl MidiQueue {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(VecDeque::with_capacity(QUEUE_CAPACITY)),
        }
    }

    pub fn enqueue(&self, msg: [u8; MSG_SIZE]) -> Result<(), TargetError> {
        let mut messages = self.messages.lock();
        if messages.len() >= QUEUE_CAPACITY {
            return Err(TargetError::QueueFull);
        }
        messages.push_back(msg);
        Ok(())
    }

    /// Take everything currently queued.
    pub fn drain(&self) -> Vec<[u8; MSG_SIZE]> {
        let mut messages = self.messages.lock();
        messages.drain(..).collect()
    }
}

impl Default for MidiQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Router-facing port: encodes and enqueues.
pub struct MidiOut {
    queue: Arc<MidiQueue>,
}

impl MidiOut {
    pub fn new(queue: Arc<MidiQueue>) -> Self {
        Self { queue }
    }
}

impl MidiPort for MidiOut {
    fn send_cc(&self, channel: u8, cc: u8, value: u8) -> Result<(), TargetError> {
        self.queue.enqueue(cc_message(channel, cc, value))
    }
}

/// Open the output connection. With a port hint, connect to the first port
/// whose name contains it; without one, create a virtual output port other
/// clients can connect to (Linux only), like the original JACK client did.
pub fn connect(port_hint: Option<&str>) -> Result<MidiOutputConnection> {
    let midi_out = MidiOutput::new(CLIENT_NAME)?;
    match port_hint {
        Some(hint) => {
            let ports = midi_out.ports();
            let port = ports
                .iter()
                .find(|p| {
                    midi_out
                        .port_name(p)
                        .map(|name| name.contains(hint))
                        .unwrap_or(false)
                })
                .ok_or_else(|| anyhow!("no MIDI output port matching '{hint}'"))?;
            let name = midi_out.port_name(port).unwrap_or_default();
            let conn = midi_out
                .connect(port, "midi_out")
                .map_err(|e| anyhow!("connecting MIDI output: {e}"))?;
            info!(port = %name, "MIDI output connected");
            Ok(conn)
        }
        None => {
            #[cfg(unix)]
            {
                use midir::os::unix::VirtualOutput;
                let conn = midi_out
                    .create_virtual("midi_out")
                    .map_err(|e| anyhow!("creating virtual MIDI port: {e}"))?;
                info!("virtual MIDI output port '{CLIENT_NAME}:midi_out' created");
                Ok(conn)
            }
            #[cfg(not(unix))]
            {
                Err(anyhow!("a MIDI port name is required on this platform"))
            }
        }
    }
}

/// Drain the queue into the connection every few milliseconds until
/// shutdown, then flush whatever is left.
pub async fn pump(
    mut conn: MidiOutputConnection,
    queue: Arc<MidiQueue>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(PUMP_INTERVAL);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                for msg in queue.drain() {
                    if let Err(e) = conn.send(&msg) {
                        warn!(error = %e, "MIDI send failed, message lost");
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    for msg in queue.drain() {
        if let Err(e) = conn.send(&msg) {
            warn!(error = %e, "MIDI send failed during shutdown");
        }
    }
    debug!("MIDI pump stopped");
    conn.close();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cc_message_layout() {
        assert_eq!(cc_message(0, 7, 100), [0xB0, 7, 100]);
        assert_eq!(cc_message(15, 127, 127), [0xBF, 127, 127]);
        // Out-of-range inputs are masked, never panicked on.
        assert_eq!(cc_message(16, 128, 255), [0xB0, 0, 0x7F]);
    }

    #[test]
    fn queue_is_fifo_and_bounded() {
        let q = MidiQueue::new();
        for i in 0..QUEUE_CAPACITY {
            q.enqueue(cc_message(0, 7, (i % 128) as u8)).unwrap();
        }
        assert!(matches!(
            q.enqueue(cc_message(0, 7, 0)),
            Err(TargetError::QueueFull)
        ));
        let drained = q.drain();
        assert_eq!(drained.len(), QUEUE_CAPACITY);
        assert_eq!(drained[0], cc_message(0, 7, 0));
        assert_eq!(drained[1], cc_message(0, 7, 1));
        // Drained space is reusable.
        q.enqueue(cc_message(0, 7, 1)).unwrap();
        assert_eq!(q.drain().len(), 1);
    }
}
