//! Target router: one adapter call per updated control
//!
//! Pure dispatch on the control's binding — no business logic. A failed
//! delivery is logged and the control keeps its already-updated value, so
//! the same user action can succeed once the target recovers. The current
//! value is forwarded for every target except the master broadcast, which
//! forwards the relative quantity computed by the engine.

use tracing::warn;

use crate::control::{Binding, Control, ControlKind};
use crate::engine::Outcome;
use crate::error::TargetError;
use crate::targets::{ConsolePort, MidiPort, MixerPort, OscPort};

pub struct Router {
    mixer: Option<Box<dyn MixerPort>>,
    midi: Option<Box<dyn MidiPort>>,
    osc: Option<Box<dyn OscPort>>,
    console: Box<dyn ConsolePort>,
}

impl Router {
    pub fn new(console: Box<dyn ConsolePort>) -> Self {
        Self {
            mixer: None,
            midi: None,
            osc: None,
            console,
        }
    }

    pub fn with_mixer(mut self, mixer: Box<dyn MixerPort>) -> Self {
        self.mixer = Some(mixer);
        self
    }

    pub fn with_midi(mut self, midi: Box<dyn MidiPort>) -> Self {
        self.midi = Some(midi);
        self
    }

    pub fn with_osc(mut self, osc: Box<dyn OscPort>) -> Self {
        self.osc = Some(osc);
        self
    }

    pub fn mixer_mut(&mut self) -> Option<&mut (dyn MixerPort + 'static)> {
        self.mixer.as_deref_mut()
    }

    /// Authoritative value for absolute-source controls, `None` otherwise
    /// (and on read failure, which is logged so the engine falls back to
    /// its cached value).
    pub fn read_live(&self, control: &Control) -> Option<i32> {
        if !control.binding.is_absolute_source() {
            return None;
        }
        let mixer = self.mixer.as_ref()?;
        let Some(handle) = control.handle.as_ref() else {
            warn!(control = %control.name, "absolute-source control without handle");
            return None;
        };
        match mixer.read_db(handle) {
            Ok(db) => Some(db),
            Err(e) => {
                warn!(control = %control.name, error = %e, "live read failed, using cached value");
                None
            }
        }
    }

    /// Forward an applied update to exactly one target.
    pub fn deliver(&self, control: &Control, outcome: Outcome) {
        let value = match outcome {
            Outcome::Absolute(v) | Outcome::Relative(v) => v,
        };
        let result = match &control.binding {
            Binding::Mixer { .. } | Binding::Slave { .. } => self.deliver_mixer(control, value),
            Binding::Midi { channel, cc } => match &self.midi {
                Some(midi) => midi.send_cc(*channel, *cc, value.clamp(0, 127) as u8),
                None => {
                    warn!(control = %control.name, "no MIDI target registered, update dropped");
                    return;
                }
            },
            Binding::Osc { url, path } | Binding::Master { url, path } => match &self.osc {
                Some(osc) => osc.send(url, path, value),
                None => {
                    warn!(control = %control.name, "no OSC target registered, update dropped");
                    return;
                }
            },
            Binding::Console => {
                self.console.emit(control.line, value);
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!(control = %control.name, error = %e, "delivery failed, value retained");
        }
    }

    fn deliver_mixer(&self, control: &Control, value: i32) -> Result<(), TargetError> {
        let Some(mixer) = self.mixer.as_ref() else {
            warn!(control = %control.name, "no mixer target registered, update dropped");
            return Ok(());
        };
        let handle = control
            .handle
            .as_ref()
            .ok_or_else(|| TargetError::NoHandle(control.name.clone()))?;
        match control.kind {
            ControlKind::Rotary => mixer.write_db(handle, value),
            ControlKind::Switch => mixer.set_mute(handle, value != 0),
        }
    }
}
