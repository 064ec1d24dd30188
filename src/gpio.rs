//! GPIO input handling: line registration, debounce, quadrature decode
//!
//! The [`Dispatcher`] owns the registration table and all per-line decoder
//! state. Raw edges go in, debounced logical events come out; everything in
//! between is strictly sequential, so no locking exists on this path. The
//! hardware side that produces raw edges lives in [`chip`].

pub mod chip;
pub mod debounce;
pub mod quadrature;

use std::collections::HashMap;
use std::time::Duration;

use tracing::warn;

use crate::control::{Control, ControlKind, VIRTUAL_LINE_BASE};
use crate::error::ConfigError;
use debounce::Debouncer;
use quadrature::Decoder;

/// Rotary contacts bounce on the millisecond scale; the quadrature machine
/// needs all four edges of a detent, so the window stays short.
pub const DEFAULT_ROTARY_DEBOUNCE: Duration = Duration::from_millis(2);
/// Push buttons bounce much longer than encoder contacts.
pub const DEFAULT_SWITCH_DEBOUNCE: Duration = Duration::from_millis(50);

/// Edge polarity as reported by the GPIO character device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

/// A timestamped edge on one line, before any filtering.
#[derive(Debug, Clone, Copy)]
pub struct RawEdge {
    pub line: u32,
    pub edge: Edge,
    /// Monotonic kernel timestamp of the edge.
    pub at: Duration,
}

/// A debounced, decoded input event as delivered to the control layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// One rotary detent. `line` is the line the completing edge arrived on,
    /// which may be either pin of the pair.
    Step { line: u32, delta: i32 },
    /// A switch changed state, polarity already applied.
    Level { line: u32, pressed: bool },
}

#[derive(Debug)]
enum Role {
    RotaryPrimary,
    RotaryAux { primary: u32 },
    Switch { active_low: bool },
}

#[derive(Debug)]
struct LineState {
    role: Role,
    debounce: Debouncer,
}

/// Registration table plus decoder state for every line this process watches.
#[derive(Debug, Default)]
pub struct Dispatcher {
    lines: HashMap<u32, LineState>,
    /// Quadrature state per rotary pair, keyed by the primary line.
    decoders: HashMap<u32, Decoder>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rotary pair. Both lines share one debounce window and one
    /// quadrature decoder; only the primary line carries the decoder.
    pub fn register_rotary(
        &mut self,
        primary: u32,
        aux: u32,
        window: Duration,
    ) -> Result<(), ConfigError> {
        if primary == aux {
            return Err(ConfigError::IdenticalPair(primary));
        }
        if self.lines.contains_key(&primary) {
            return Err(ConfigError::LineInUse(primary));
        }
        if self.lines.contains_key(&aux) {
            return Err(ConfigError::LineInUse(aux));
        }
        self.lines.insert(
            primary,
            LineState {
                role: Role::RotaryPrimary,
                debounce: Debouncer::new(window),
            },
        );
        self.lines.insert(
            aux,
            LineState {
                role: Role::RotaryAux { primary },
                debounce: Debouncer::new(window),
            },
        );
        self.decoders.insert(primary, Decoder::new());
        Ok(())
    }

    /// Register a switch line. With `active_low` (pulled-up wiring, the
    /// common case) a falling edge means "pressed".
    pub fn register_switch(
        &mut self,
        line: u32,
        window: Duration,
        active_low: bool,
    ) -> Result<(), ConfigError> {
        if self.lines.contains_key(&line) {
            return Err(ConfigError::LineInUse(line));
        }
        self.lines.insert(
            line,
            LineState {
                role: Role::Switch { active_low },
                debounce: Debouncer::new(window),
            },
        );
        Ok(())
    }

    /// All registered line offsets, sorted, for the hardware request.
    pub fn lines(&self) -> Vec<u32> {
        let mut v: Vec<u32> = self.lines.keys().copied().collect();
        v.sort_unstable();
        v
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Register the GPIO side of every physical control. Network-driven
    /// controls (virtual lines) have no GPIO side and are skipped.
    pub fn register_controls(&mut self, controls: &[Control]) -> Result<(), ConfigError> {
        for control in controls {
            if control.line >= VIRTUAL_LINE_BASE {
                continue;
            }
            match control.kind {
                ControlKind::Rotary => {
                    let aux = control
                        .aux
                        .ok_or(ConfigError::Missing("rotary control without secondary line"))?;
                    self.register_rotary(control.line, aux, DEFAULT_ROTARY_DEBOUNCE)?;
                }
                ControlKind::Switch => {
                    self.register_switch(control.line, DEFAULT_SWITCH_DEBOUNCE, true)?;
                }
            }
        }
        Ok(())
    }

    /// Run one raw edge through debounce and decode.
    ///
    /// Returns at most one logical event; rejected bounces and partial
    /// quadrature transitions return `None`.
    pub fn handle_edge(&mut self, raw: RawEdge) -> Option<InputEvent> {
        let Some(state) = self.lines.get_mut(&raw.line) else {
            warn!(line = raw.line, "edge on unregistered line, dropped");
            return None;
        };
        if !state.debounce.accept(raw.at) {
            return None;
        }
        let high = raw.edge == Edge::Rising;
        match state.role {
            Role::Switch { active_low } => {
                let pressed = (raw.edge == Edge::Falling) == active_low;
                Some(InputEvent::Level {
                    line: raw.line,
                    pressed,
                })
            }
            Role::RotaryPrimary => self
                .decoders
                .get_mut(&raw.line)
                .and_then(|d| d.primary_edge(high))
                .map(|delta| InputEvent::Step {
                    line: raw.line,
                    delta,
                }),
            Role::RotaryAux { primary } => self
                .decoders
                .get_mut(&primary)
                .and_then(|d| d.aux_edge(high))
                .map(|delta| InputEvent::Step {
                    line: raw.line,
                    delta,
                }),
        }
    }
}
