//! Update engine: resolves input events to controls and computes new values
//!
//! The engine owns every [`Control`]. All mutation flows through
//! [`Engine::apply`], called from a single loop, so control state needs no
//! locking: GPIO events and network slave events enter through the same
//! channel and the same entry point.

use std::collections::HashMap;

use tracing::warn;

use crate::control::{Binding, Control, ControlKind};
use crate::gpio::InputEvent;

/// What the router should deliver for an updated control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The control's current value.
    Absolute(i32),
    /// A one-shot relative quantity (master broadcast only).
    Relative(i32),
}

/// An applied update, ready for routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Update {
    pub index: usize,
    pub outcome: Outcome,
}

pub struct Engine {
    controls: Vec<Control>,
    /// Every pin of a control maps here, so an edge completing on the
    /// auxiliary line of a rotary pair still finds its owner.
    by_line: HashMap<u32, usize>,
}

impl Engine {
    pub fn new(controls: Vec<Control>) -> Self {
        let mut by_line = HashMap::new();
        for (index, control) in controls.iter().enumerate() {
            by_line.insert(control.line, index);
            if let Some(aux) = control.aux {
                by_line.insert(aux, index);
            }
        }
        Self { controls, by_line }
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    /// Mutable access for startup wiring (mixer handle acquisition).
    pub fn controls_mut(&mut self) -> &mut [Control] {
        &mut self.controls
    }

    pub fn control(&self, index: usize) -> &Control {
        &self.controls[index]
    }

    /// Apply one input event.
    ///
    /// `read_live` is consulted for absolute-source controls (mixer-bound)
    /// before the delta is applied, so a step always starts from the
    /// authoritative value even if something else moved it since the last
    /// event; `None` falls back to the cached value.
    ///
    /// Returns `None` when nothing should be forwarded: bounce-free no-ops
    /// at the range limits, ignored switch releases, and events that violate
    /// the registration invariants (logged, dropped, never fatal).
    pub fn apply(
        &mut self,
        event: InputEvent,
        read_live: impl FnOnce(&Control) -> Option<i32>,
    ) -> Option<Update> {
        let line = match event {
            InputEvent::Step { line, .. } | InputEvent::Level { line, .. } => line,
        };
        let Some(&index) = self.by_line.get(&line) else {
            warn!(line, "event for unmapped line, dropped");
            return None;
        };
        let control = &mut self.controls[index];

        let outcome = match (event, control.kind) {
            (InputEvent::Step { delta, .. }, ControlKind::Rotary) => {
                if let Binding::Master { .. } = control.binding {
                    // Pure relative emitter: nothing persists locally.
                    let step = control.step.step_at(control.value);
                    Some(Outcome::Relative(delta * step))
                } else {
                    if control.binding.is_absolute_source() {
                        if let Some(live) = read_live(control) {
                            control.value = control.clamped(live);
                        }
                    }
                    let step = control.step.step_at(control.value);
                    if delta < 0 && control.value > control.min {
                        control.value = (control.value - step).max(control.min);
                        Some(Outcome::Absolute(control.value))
                    } else if delta > 0 && control.value < control.max {
                        control.value = (control.value + step).min(control.max);
                        Some(Outcome::Absolute(control.value))
                    } else {
                        // Already at the limit: no update, no forwarding.
                        None
                    }
                }
            }
            (InputEvent::Level { pressed, .. }, ControlKind::Switch) => {
                if control.toggle {
                    if !pressed {
                        // Latched switches ignore releases.
                        None
                    } else {
                        control.value = if control.value == control.min {
                            control.max
                        } else {
                            control.min
                        };
                        Some(Outcome::Absolute(control.value))
                    }
                } else {
                    control.value = if pressed { control.max } else { control.min };
                    Some(Outcome::Absolute(control.value))
                }
            }
            (_, kind) => {
                warn!(
                    line,
                    control = %control.name,
                    ?kind,
                    "event does not match control kind, dropped"
                );
                None
            }
        };

        outcome.map(|outcome| Update { index, outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::StepPolicy;

    fn rotary(binding: Binding, min: i32, max: i32, step: i32) -> Control {
        Control {
            name: "test-rotary".into(),
            line: 5,
            aux: Some(6),
            kind: ControlKind::Rotary,
            binding,
            value: min,
            min,
            max,
            step: StepPolicy::Fixed(step),
            toggle: false,
            handle: None,
        }
    }

    fn switch(toggle: bool) -> Control {
        Control {
            name: "test-switch".into(),
            line: 10,
            aux: None,
            kind: ControlKind::Switch,
            binding: Binding::Midi { channel: 0, cc: 64 },
            value: 0,
            min: 0,
            max: 1,
            toggle,
            step: StepPolicy::Fixed(1),
            handle: None,
        }
    }

    fn no_live(_: &Control) -> Option<i32> {
        None
    }

    #[test]
    fn step_moves_and_clamps() {
        let mut engine = Engine::new(vec![rotary(Binding::Console, 0, 10, 3)]);
        let step = |line, delta| InputEvent::Step { line, delta };

        assert_eq!(
            engine.apply(step(5, 1), no_live),
            Some(Update {
                index: 0,
                outcome: Outcome::Absolute(3)
            })
        );
        // 3 -> 6 -> 9 -> clamped at 10
        engine.apply(step(5, 1), no_live);
        engine.apply(step(5, 1), no_live);
        assert_eq!(
            engine.apply(step(5, 1), no_live).unwrap().outcome,
            Outcome::Absolute(10)
        );
        // At max: further up-steps are silent no-ops.
        assert_eq!(engine.apply(step(5, 1), no_live), None);
        assert_eq!(
            engine.apply(step(5, -1), no_live).unwrap().outcome,
            Outcome::Absolute(7)
        );
    }

    #[test]
    fn step_resolves_via_auxiliary_line() {
        let mut engine = Engine::new(vec![rotary(Binding::Console, 0, 10, 1)]);
        let update = engine
            .apply(InputEvent::Step { line: 6, delta: 1 }, no_live)
            .unwrap();
        assert_eq!(update.index, 0);
    }

    #[test]
    fn absolute_source_is_reread_before_stepping() {
        let mut engine = Engine::new(vec![rotary(
            Binding::Mixer {
                element: "Master".into(),
            },
            -100,
            0,
            3,
        )]);
        // Something else moved the mixer to -40 since our last update; the
        // step must apply to -40, not to the cached -100.
        let update = engine
            .apply(InputEvent::Step { line: 5, delta: 1 }, |_| Some(-40))
            .unwrap();
        assert_eq!(update.outcome, Outcome::Absolute(-37));
        // The live value is clamped before stepping.
        let update = engine
            .apply(InputEvent::Step { line: 5, delta: -1 }, |_| Some(12))
            .unwrap();
        assert_eq!(update.outcome, Outcome::Absolute(-3));
    }

    #[test]
    fn failed_live_read_falls_back_to_cache() {
        let mut engine = Engine::new(vec![rotary(
            Binding::Mixer {
                element: "Master".into(),
            },
            -100,
            0,
            3,
        )]);
        let update = engine
            .apply(InputEvent::Step { line: 5, delta: 1 }, no_live)
            .unwrap();
        assert_eq!(update.outcome, Outcome::Absolute(-97));
    }

    #[test]
    fn master_emits_relative_and_keeps_no_state() {
        let mut engine = Engine::new(vec![rotary(
            Binding::Master {
                url: "osc.udp://239.0.2.149:7000".into(),
                path: "/knobd/level".into(),
            },
            -200,
            200,
            3,
        )]);
        // min == -200, so value starts at -200; use a fresh value of 0.
        engine.controls_mut()[0].value = 0;
        let step = |delta| InputEvent::Step { line: 5, delta };
        assert_eq!(
            engine.apply(step(1), no_live).unwrap().outcome,
            Outcome::Relative(3)
        );
        assert_eq!(
            engine.apply(step(-1), no_live).unwrap().outcome,
            Outcome::Relative(-3)
        );
        // The quantity is recomputed fresh each call; value never moves.
        assert_eq!(engine.control(0).value, 0);
    }

    #[test]
    fn momentary_switch_tracks_the_level() {
        let mut engine = Engine::new(vec![switch(false)]);
        let level = |pressed| InputEvent::Level { line: 10, pressed };
        assert_eq!(
            engine.apply(level(true), no_live).unwrap().outcome,
            Outcome::Absolute(1)
        );
        assert_eq!(
            engine.apply(level(false), no_live).unwrap().outcome,
            Outcome::Absolute(0)
        );
    }

    #[test]
    fn latched_switch_flips_on_press_only() {
        let mut engine = Engine::new(vec![switch(true)]);
        let level = |pressed| InputEvent::Level { line: 10, pressed };
        assert_eq!(
            engine.apply(level(true), no_live).unwrap().outcome,
            Outcome::Absolute(1)
        );
        // Release is a no-op, value stays at max.
        assert_eq!(engine.apply(level(false), no_live), None);
        assert_eq!(engine.control(0).value, 1);
        assert_eq!(
            engine.apply(level(true), no_live).unwrap().outcome,
            Outcome::Absolute(0)
        );
    }

    #[test]
    fn mismatched_event_kind_is_dropped() {
        let mut engine = Engine::new(vec![switch(false)]);
        assert_eq!(
            engine.apply(InputEvent::Step { line: 10, delta: 1 }, no_live),
            None
        );
        assert_eq!(engine.control(0).value, 0);
    }

    #[test]
    fn unmapped_line_is_dropped() {
        let mut engine = Engine::new(vec![switch(false)]);
        assert_eq!(
            engine.apply(
                InputEvent::Level {
                    line: 99,
                    pressed: true
                },
                no_live
            ),
            None
        );
    }
}
