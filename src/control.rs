//! Control model: the logical entity behind each physical input
//!
//! One [`Control`] per rotary encoder or switch (an encoder occupies two
//! GPIO lines but is one control). The control carries integer value state
//! with bounds, a step policy, and the binding that decides which output
//! target its changes are routed to.

/// Slave receivers have no physical pin; they are assigned line numbers from
/// here upward, clear of any real chip offset.
pub const VIRTUAL_LINE_BASE: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Rotary,
    Switch,
}

/// Opaque reference to a mixer element, owned by the control once acquired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixerHandle {
    pub element: String,
    pub index: u32,
}

/// Which output target a control feeds, plus the target-specific addressing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Local ALSA mixer element (playback volume for rotaries, mute for
    /// switches). The live value is authoritative, not our cache.
    Mixer { element: String },
    /// MIDI control change on the shared output port.
    Midi { channel: u8, cc: u8 },
    /// Absolute value to an OSC receiver.
    Osc { url: String, path: String },
    /// Plain line on stdout.
    Console,
    /// Relative broadcast to network followers; carries no persistent value.
    Master { url: String, path: String },
    /// Driven by the network instead of a GPIO line; applies to a local
    /// mixer element.
    Slave { element: String, path: String },
}

impl Binding {
    /// True when the bound resource can change underneath us and must be
    /// re-read before a delta is applied.
    pub fn is_absolute_source(&self) -> bool {
        matches!(self, Self::Mixer { .. } | Self::Slave { .. })
    }

    pub fn mixer_element(&self) -> Option<&str> {
        match self {
            Self::Mixer { element } | Self::Slave { element, .. } => Some(element),
            _ => None,
        }
    }
}

/// Step size per detent: constant, or a function of the current value.
///
/// Volume knobs want coarse steps down in the noise floor and fine steps
/// near the top, mimicking perceived loudness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPolicy {
    Fixed(i32),
    Tapered,
}

/// Break points for the dB taper: below the bound, use the paired step.
/// Values at or above the last bound step by 1 dB.
const DB_TAPER: &[(i32, i32)] = &[(-60, 6), (-30, 3), (-15, 2)];

impl StepPolicy {
    pub fn step_at(&self, value: i32) -> i32 {
        match *self {
            Self::Fixed(step) => step,
            Self::Tapered => DB_TAPER
                .iter()
                .find(|&&(bound, _)| value < bound)
                .map(|&(_, step)| step)
                .unwrap_or(1),
        }
    }
}

/// A logical control: physical pins, kind, target binding, and value state.
///
/// Invariant: `min <= value <= max` after every update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    /// Human-readable identity for logs, derived from the descriptor.
    pub name: String,
    /// Primary GPIO line (or virtual line for slave receivers).
    pub line: u32,
    /// Secondary line of a rotary pair.
    pub aux: Option<u32>,
    pub kind: ControlKind,
    pub binding: Binding,
    pub value: i32,
    pub min: i32,
    pub max: i32,
    pub step: StepPolicy,
    /// Switch-only: latched (press flips) instead of momentary.
    pub toggle: bool,
    /// Mixer element handle, acquired at startup for mixer-bound controls.
    pub handle: Option<MixerHandle>,
}

impl Control {
    pub fn clamped(&self, value: i32) -> i32 {
        value.clamp(self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_step_ignores_value() {
        let p = StepPolicy::Fixed(3);
        assert_eq!(p.step_at(-90), 3);
        assert_eq!(p.step_at(0), 3);
    }

    #[test]
    fn taper_is_coarse_at_the_bottom_and_fine_at_the_top() {
        let p = StepPolicy::Tapered;
        assert_eq!(p.step_at(-100), 6);
        assert_eq!(p.step_at(-61), 6);
        assert_eq!(p.step_at(-60), 3);
        assert_eq!(p.step_at(-31), 3);
        assert_eq!(p.step_at(-30), 2);
        assert_eq!(p.step_at(-16), 2);
        assert_eq!(p.step_at(-15), 1);
        assert_eq!(p.step_at(0), 1);
    }

    #[test]
    fn absolute_source_bindings() {
        assert!(Binding::Mixer {
            element: "Master".into()
        }
        .is_absolute_source());
        assert!(Binding::Slave {
            element: "Master".into(),
            path: "/knobd/level".into()
        }
        .is_absolute_source());
        assert!(!Binding::Midi { channel: 0, cc: 7 }.is_absolute_source());
        assert!(!Binding::Console.is_absolute_source());
    }
}
