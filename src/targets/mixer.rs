//! ALSA simple-mixer adapter
//!
//! Elements are resolved by name on every call, so a control keeps working
//! across device reconfiguration; a missing element is a per-call error,
//! not a crash. Volume state lives in the mixer itself — the engine
//! re-reads it before applying deltas — which is why reads first consume
//! any pending change notifications.

use alsa::mixer::{MilliBel, Mixer, Selem, SelemChannelId, SelemId};
use alsa::Round;
use tracing::debug;

use super::MixerPort;
use crate::control::MixerHandle;
use crate::error::TargetError;

pub struct AlsaMixer {
    mixer: Mixer,
}

impl AlsaMixer {
    /// Open and load the mixer for `card` (e.g. "default" or "hw:0").
    pub fn open(card: &str) -> Result<Self, TargetError> {
        let mixer = Mixer::new(card, false)?;
        debug!(card, "mixer opened");
        Ok(Self { mixer })
    }

    fn selem(&self, handle: &MixerHandle) -> Result<Selem<'_>, TargetError> {
        self.mixer
            .find_selem(&SelemId::new(&handle.element, handle.index))
            .ok_or_else(|| TargetError::ElementNotFound(handle.element.clone()))
    }
}

impl MixerPort for AlsaMixer {
    fn acquire(&mut self, element: &str) -> Result<MixerHandle, TargetError> {
        let handle = MixerHandle {
            element: element.to_string(),
            index: 0,
        };
        // Fails if the element does not exist right now; the caller decides
        // whether that is fatal.
        self.selem(&handle)?;
        Ok(handle)
    }

    fn read_db(&self, handle: &MixerHandle) -> Result<i32, TargetError> {
        // Consume pending notifications so external volume changes are
        // visible before we read.
        self.mixer.handle_events()?;
        let selem = self.selem(handle)?;
        let MilliBel(mb) = selem.get_playback_vol_db(SelemChannelId::FrontLeft)?;
        Ok((mb / 100) as i32)
    }

    fn write_db(&self, handle: &MixerHandle, db: i32) -> Result<(), TargetError> {
        let selem = self.selem(handle)?;
        selem.set_playback_db_all(MilliBel(i64::from(db) * 100), Round::Floor)?;
        Ok(())
    }

    fn set_mute(&self, handle: &MixerHandle, mute: bool) -> Result<(), TargetError> {
        let selem = self.selem(handle)?;
        if selem.has_playback_switch() {
            selem.set_playback_switch_all(i32::from(!mute))?;
        }
        Ok(())
    }
}
