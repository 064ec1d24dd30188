//! Optional YAML control file
//!
//! Declares the same descriptors as the command line, so a box with a fixed
//! panel layout can keep its wiring in a file and still add one-off
//! controls per invocation.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cli::ControlOptions;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ControlsFile {
    #[serde(default)]
    pub midi_rotary: Vec<String>,
    #[serde(default)]
    pub midi_switch: Vec<String>,
    #[serde(default)]
    pub mixer_rotary: Vec<String>,
    #[serde(default)]
    pub mixer_mute: Vec<String>,
    #[serde(default)]
    pub osc_rotary: Vec<String>,
    #[serde(default)]
    pub osc_switch: Vec<String>,
    #[serde(default)]
    pub console_rotary: Vec<String>,
    #[serde(default)]
    pub console_switch: Vec<String>,
    #[serde(default)]
    pub master_rotary: Vec<String>,
    #[serde(default)]
    pub master_switch: Vec<String>,
    #[serde(default)]
    pub rotary_slave: Vec<String>,
    #[serde(default)]
    pub switch_slave: Vec<String>,
    pub osc_url: Option<String>,
}

impl ControlsFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading control file '{}'", path.display()))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("parsing control file '{}'", path.display()))
    }

    pub fn into_options(self) -> ControlOptions {
        ControlOptions {
            midi_rotary: self.midi_rotary,
            midi_switch: self.midi_switch,
            mixer_rotary: self.mixer_rotary,
            mixer_mute: self.mixer_mute,
            osc_rotary: self.osc_rotary,
            osc_switch: self.osc_switch,
            console_rotary: self.console_rotary,
            console_switch: self.console_switch,
            master_rotary: self.master_rotary,
            master_switch: self.master_switch,
            rotary_slave: self.rotary_slave,
            switch_slave: self.switch_slave,
            osc_url: self.osc_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_descriptors_and_merges_with_cli() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "mixer-rotary:\n  - \"5,6,Master\"\nmixer-mute:\n  - \"13,Master\"\nosc-url: \"osc.udp://239.0.2.149:7000\"\n"
        )
        .unwrap();

        let loaded = ControlsFile::load(file.path()).unwrap();
        let mut options = ControlOptions {
            console_switch: vec!["7".into()],
            ..Default::default()
        };
        options.prepend(loaded.into_options());

        let controls = options.build().unwrap();
        assert_eq!(controls.len(), 3);
        assert_eq!(options.osc_url.as_deref(), Some("osc.udp://239.0.2.149:7000"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "mixer-rotray:\n  - \"5,6,Master\"\n").unwrap();
        assert!(ControlsFile::load(file.path()).is_err());
    }
}
