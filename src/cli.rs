//! Control descriptors
//!
//! Each control option takes one comma-separated descriptor, repeated for
//! as many controls as needed. Parsing validates ranges and duplicates
//! eagerly: every problem here is fatal before a single GPIO line is
//! requested.

use clap::Args;

use crate::control::{Binding, Control, ControlKind, StepPolicy, VIRTUAL_LINE_BASE};
use crate::error::ConfigError;
use crate::targets::osc::parse_udp_url;

/// Broadcast paths shared between masters and slaves.
pub const MASTER_LEVEL_PATH: &str = "/knobd/level";
pub const MASTER_MUTE_PATH: &str = "/knobd/mute";

const MAX_LINE: i64 = VIRTUAL_LINE_BASE as i64 - 1;
const MAX_CC: i64 = 120;
const MAX_CC_VALUE: i64 = 127;

/// All control descriptor options, flattened into the binary's parser and
/// mirrored by the YAML control file.
#[derive(Debug, Clone, Default, Args)]
pub struct ControlOptions {
    /// MIDI CC rotary: clk,dt,cc[,ch[,min[,max[,step[,default]]]]]
    #[arg(long, value_name = "SPEC")]
    pub midi_rotary: Vec<String>,

    /// MIDI CC switch: sw,cc[,ch[,toggle[,min[,max[,default]]]]]
    #[arg(long, value_name = "SPEC")]
    pub midi_switch: Vec<String>,

    /// ALSA mixer volume rotary: clk,dt,element[,step]
    #[arg(long, value_name = "SPEC")]
    pub mixer_rotary: Vec<String>,

    /// ALSA mixer mute switch: sw,element
    #[arg(long, value_name = "SPEC")]
    pub mixer_mute: Vec<String>,

    /// OSC rotary: clk,dt,url,path[,min[,max[,step[,default]]]]
    #[arg(long, value_name = "SPEC")]
    pub osc_rotary: Vec<String>,

    /// OSC switch: sw,url,path[,toggle[,min[,max[,default]]]]
    #[arg(long, value_name = "SPEC")]
    pub osc_switch: Vec<String>,

    /// Console rotary: clk,dt[,min[,max[,step[,default]]]]
    #[arg(long, value_name = "SPEC")]
    pub console_rotary: Vec<String>,

    /// Console switch: sw[,toggle]
    #[arg(long, value_name = "SPEC")]
    pub console_switch: Vec<String>,

    /// Network master rotary, broadcasts relative steps: clk,dt,url[,step]
    #[arg(long, value_name = "SPEC")]
    pub master_rotary: Vec<String>,

    /// Network master switch, broadcasts its latched value: sw,url
    #[arg(long, value_name = "SPEC")]
    pub master_switch: Vec<String>,

    /// Network-driven mixer volume: element (requires --osc-url)
    #[arg(long, value_name = "ELEMENT")]
    pub rotary_slave: Vec<String>,

    /// Network-driven mixer mute: element (requires --osc-url)
    #[arg(long, value_name = "ELEMENT")]
    pub switch_slave: Vec<String>,

    /// URL slave controls listen on, e.g. osc.udp://239.0.2.149:7000
    #[arg(long, value_name = "URL")]
    pub osc_url: Option<String>,
}

impl ControlOptions {
    /// Append descriptors from a config file; CLI descriptors keep their
    /// place after the file's.
    pub fn prepend(&mut self, mut file: ControlOptions) {
        macro_rules! merge {
            ($($field:ident),*) => {$(
                file.$field.extend(self.$field.drain(..));
                self.$field = file.$field;
            )*};
        }
        merge!(
            midi_rotary,
            midi_switch,
            mixer_rotary,
            mixer_mute,
            osc_rotary,
            osc_switch,
            console_rotary,
            console_switch,
            master_rotary,
            master_switch,
            rotary_slave,
            switch_slave
        );
        if self.osc_url.is_none() {
            self.osc_url = file.osc_url;
        }
    }

    /// Parse every descriptor into a control list. Slave controls receive
    /// virtual line numbers in declaration order.
    pub fn build(&self) -> Result<Vec<Control>, ConfigError> {
        let mut controls = Vec::new();
        for d in &self.midi_rotary {
            controls.push(midi_rotary(d)?);
        }
        for d in &self.midi_switch {
            controls.push(midi_switch(d)?);
        }
        for d in &self.mixer_rotary {
            controls.push(mixer_rotary(d)?);
        }
        for d in &self.mixer_mute {
            controls.push(mixer_mute(d)?);
        }
        for d in &self.osc_rotary {
            controls.push(osc_rotary(d)?);
        }
        for d in &self.osc_switch {
            controls.push(osc_switch(d)?);
        }
        for d in &self.console_rotary {
            controls.push(console_rotary(d)?);
        }
        for d in &self.console_switch {
            controls.push(console_switch(d)?);
        }
        for d in &self.master_rotary {
            controls.push(master_rotary(d)?);
        }
        for d in &self.master_switch {
            controls.push(master_switch(d)?);
        }

        let mut virtual_line = VIRTUAL_LINE_BASE;
        for element in &self.rotary_slave {
            controls.push(rotary_slave(element, virtual_line)?);
            virtual_line += 1;
        }
        for element in &self.switch_slave {
            controls.push(switch_slave(element, virtual_line)?);
            virtual_line += 1;
        }
        if virtual_line > VIRTUAL_LINE_BASE && self.osc_url.is_none() {
            return Err(ConfigError::Missing(
                "--osc-url is required when slave controls are configured",
            ));
        }
        if let Some(url) = &self.osc_url {
            parse_udp_url(url).map_err(|_| ConfigError::bad(url, "not an osc.udp:// url"))?;
        }
        Ok(controls)
    }
}

struct Fields<'a> {
    descriptor: &'a str,
    parts: Vec<&'a str>,
    next: usize,
}

impl<'a> Fields<'a> {
    fn new(descriptor: &'a str, max: usize) -> Result<Self, ConfigError> {
        let parts: Vec<&str> = descriptor.split(',').map(str::trim).collect();
        if parts.len() > max {
            return Err(ConfigError::bad(descriptor, "too many arguments"));
        }
        Ok(Self {
            descriptor,
            parts,
            next: 0,
        })
    }

    fn take(&mut self) -> Option<&'a str> {
        let part = self.parts.get(self.next).copied().filter(|p| !p.is_empty());
        self.next += 1;
        part
    }

    fn req_str(&mut self, field: &'static str) -> Result<&'a str, ConfigError> {
        self.take()
            .ok_or_else(|| ConfigError::bad(self.descriptor, format!("{field} must not be empty")))
    }

    fn num(
        &mut self,
        field: &'static str,
        min: i64,
        max: i64,
    ) -> Result<Option<i64>, ConfigError> {
        let Some(raw) = self.take() else {
            return Ok(None);
        };
        let value: i64 = raw.parse().map_err(|_| {
            ConfigError::bad(self.descriptor, format!("{field} is not a number: '{raw}'"))
        })?;
        if value < min || value > max {
            return Err(ConfigError::OutOfRange {
                field,
                value,
                min,
                max,
            });
        }
        Ok(Some(value))
    }

    fn req_num(&mut self, field: &'static str, min: i64, max: i64) -> Result<i64, ConfigError> {
        self.num(field, min, max)?
            .ok_or_else(|| ConfigError::bad(self.descriptor, format!("{field} is required")))
    }

    fn line(&mut self, field: &'static str) -> Result<u32, ConfigError> {
        Ok(self.req_num(field, 0, MAX_LINE)? as u32)
    }

    /// MIDI channel is 1-16 on the command line, 0-15 on the wire.
    fn midi_channel(&mut self) -> Result<u8, ConfigError> {
        Ok((self.num("ch", 1, 16)?.unwrap_or(1) - 1) as u8)
    }

    fn toggle(&mut self) -> Result<bool, ConfigError> {
        Ok(self.num("toggle", 0, 1)?.unwrap_or(0) != 0)
    }
}

fn rotary_pair(f: &mut Fields<'_>) -> Result<(u32, u32), ConfigError> {
    let clk = f.line("clk")?;
    let dt = f.line("dt")?;
    Ok((clk, dt))
}

fn midi_rotary(descriptor: &str) -> Result<Control, ConfigError> {
    let mut f = Fields::new(descriptor, 8)?;
    let (clk, dt) = rotary_pair(&mut f)?;
    let cc = f.req_num("cc", 0, MAX_CC)? as u8;
    let channel = f.midi_channel()?;
    let min = f.num("min", 0, MAX_CC_VALUE)?.unwrap_or(0) as i32;
    let max = f.num("max", 0, MAX_CC_VALUE)?.unwrap_or(MAX_CC_VALUE) as i32;
    let step = f.num("step", 1, MAX_CC_VALUE)?.unwrap_or(1) as i32;
    let value = f
        .num("default", i64::from(min), i64::from(max))?
        .unwrap_or(i64::from(min)) as i32;
    if min > max {
        return Err(ConfigError::bad(
            descriptor,
            format!("min ({min}) is greater than max ({max})"),
        ));
    }
    Ok(Control {
        name: format!("midi-rotary@{clk}/{dt}"),
        line: clk,
        aux: Some(dt),
        kind: ControlKind::Rotary,
        binding: Binding::Midi { channel, cc },
        value,
        min,
        max,
        step: StepPolicy::Fixed(step),
        toggle: false,
        handle: None,
    })
}

fn midi_switch(descriptor: &str) -> Result<Control, ConfigError> {
    let mut f = Fields::new(descriptor, 7)?;
    let sw = f.line("sw")?;
    let cc = f.req_num("cc", 0, MAX_CC)? as u8;
    let channel = f.midi_channel()?;
    let toggle = f.toggle()?;
    let min = f.num("min", 0, MAX_CC_VALUE)?.unwrap_or(0) as i32;
    let max = f.num("max", 0, MAX_CC_VALUE)?.unwrap_or(MAX_CC_VALUE) as i32;
    let value = f
        .num("default", i64::from(min), i64::from(max))?
        .unwrap_or(i64::from(min)) as i32;
    if min > max {
        return Err(ConfigError::bad(
            descriptor,
            format!("min ({min}) is greater than max ({max})"),
        ));
    }
    Ok(Control {
        name: format!("midi-switch@{sw}"),
        line: sw,
        aux: None,
        kind: ControlKind::Switch,
        binding: Binding::Midi { channel, cc },
        value,
        min,
        max,
        step: StepPolicy::Fixed(1),
        toggle,
        handle: None,
    })
}

fn mixer_rotary(descriptor: &str) -> Result<Control, ConfigError> {
    let mut f = Fields::new(descriptor, 4)?;
    let (clk, dt) = rotary_pair(&mut f)?;
    let element = f.req_str("element")?.to_string();
    // An explicit step opts out of the dB taper.
    let step = match f.num("step", 1, 24)? {
        Some(step) => StepPolicy::Fixed(step as i32),
        None => StepPolicy::Tapered,
    };
    Ok(Control {
        name: format!("mixer-rotary@{clk}/{dt}:{element}"),
        line: clk,
        aux: Some(dt),
        kind: ControlKind::Rotary,
        binding: Binding::Mixer { element },
        value: -100,
        min: -100,
        max: 0,
        step,
        toggle: false,
        handle: None,
    })
}

fn mixer_mute(descriptor: &str) -> Result<Control, ConfigError> {
    let mut f = Fields::new(descriptor, 2)?;
    let sw = f.line("sw")?;
    let element = f.req_str("element")?.to_string();
    Ok(Control {
        name: format!("mixer-mute@{sw}:{element}"),
        line: sw,
        aux: None,
        kind: ControlKind::Switch,
        binding: Binding::Mixer { element },
        value: 0,
        min: 0,
        max: 1,
        step: StepPolicy::Fixed(1),
        toggle: true,
        handle: None,
    })
}

fn osc_target(f: &mut Fields<'_>) -> Result<(String, String), ConfigError> {
    let url = f.req_str("url")?.to_string();
    parse_udp_url(&url).map_err(|_| ConfigError::bad(&url, "not an osc.udp:// url"))?;
    let path = f.req_str("path")?.to_string();
    if !path.starts_with('/') {
        return Err(ConfigError::bad(&path, "OSC path must start with '/'"));
    }
    Ok((url, path))
}

fn osc_rotary(descriptor: &str) -> Result<Control, ConfigError> {
    let mut f = Fields::new(descriptor, 8)?;
    let (clk, dt) = rotary_pair(&mut f)?;
    let (url, path) = osc_target(&mut f)?;
    let min = f
        .num("min", i64::from(i32::MIN), i64::from(i32::MAX))?
        .unwrap_or(0) as i32;
    let max = f
        .num("max", i64::from(i32::MIN), i64::from(i32::MAX))?
        .unwrap_or(100) as i32;
    if min > max {
        return Err(ConfigError::bad(
            descriptor,
            format!("min ({min}) is greater than max ({max})"),
        ));
    }
    let step = f.num("step", 1, i64::from(i32::MAX))?.unwrap_or(1) as i32;
    let value = f
        .num("default", i64::from(min), i64::from(max))?
        .unwrap_or(i64::from(min)) as i32;
    Ok(Control {
        name: format!("osc-rotary@{clk}/{dt}:{path}"),
        line: clk,
        aux: Some(dt),
        kind: ControlKind::Rotary,
        binding: Binding::Osc { url, path },
        value,
        min,
        max,
        step: StepPolicy::Fixed(step),
        toggle: false,
        handle: None,
    })
}

fn osc_switch(descriptor: &str) -> Result<Control, ConfigError> {
    let mut f = Fields::new(descriptor, 7)?;
    let sw = f.line("sw")?;
    let (url, path) = osc_target(&mut f)?;
    let toggle = f.toggle()?;
    let min = f
        .num("min", i64::from(i32::MIN), i64::from(i32::MAX))?
        .unwrap_or(0) as i32;
    let max = f
        .num("max", i64::from(i32::MIN), i64::from(i32::MAX))?
        .unwrap_or(100) as i32;
    if min > max {
        return Err(ConfigError::bad(
            descriptor,
            format!("min ({min}) is greater than max ({max})"),
        ));
    }
    let value = f
        .num("default", i64::from(min), i64::from(max))?
        .unwrap_or(i64::from(min)) as i32;
    Ok(Control {
        name: format!("osc-switch@{sw}:{path}"),
        line: sw,
        aux: None,
        kind: ControlKind::Switch,
        binding: Binding::Osc { url, path },
        value,
        min,
        max,
        step: StepPolicy::Fixed(1),
        toggle,
        handle: None,
    })
}

fn console_rotary(descriptor: &str) -> Result<Control, ConfigError> {
    let mut f = Fields::new(descriptor, 6)?;
    let (clk, dt) = rotary_pair(&mut f)?;
    let min = f
        .num("min", i64::from(i32::MIN), i64::from(i32::MAX))?
        .unwrap_or(0) as i32;
    let max = f
        .num("max", i64::from(i32::MIN), i64::from(i32::MAX))?
        .unwrap_or(100) as i32;
    if min > max {
        return Err(ConfigError::bad(
            descriptor,
            format!("min ({min}) is greater than max ({max})"),
        ));
    }
    let step = f.num("step", 1, i64::from(i32::MAX))?.unwrap_or(1) as i32;
    let value = f
        .num("default", i64::from(min), i64::from(max))?
        .unwrap_or(i64::from(min)) as i32;
    Ok(Control {
        name: format!("console-rotary@{clk}/{dt}"),
        line: clk,
        aux: Some(dt),
        kind: ControlKind::Rotary,
        binding: Binding::Console,
        value,
        min,
        max,
        step: StepPolicy::Fixed(step),
        toggle: false,
        handle: None,
    })
}

fn console_switch(descriptor: &str) -> Result<Control, ConfigError> {
    let mut f = Fields::new(descriptor, 2)?;
    let sw = f.line("sw")?;
    let toggle = f.toggle()?;
    Ok(Control {
        name: format!("console-switch@{sw}"),
        line: sw,
        aux: None,
        kind: ControlKind::Switch,
        binding: Binding::Console,
        value: 0,
        min: 0,
        max: 1,
        step: StepPolicy::Fixed(1),
        toggle,
        handle: None,
    })
}

fn master_rotary(descriptor: &str) -> Result<Control, ConfigError> {
    let mut f = Fields::new(descriptor, 4)?;
    let (clk, dt) = rotary_pair(&mut f)?;
    let url = f.req_str("url")?.to_string();
    parse_udp_url(&url).map_err(|_| ConfigError::bad(&url, "not an osc.udp:// url"))?;
    let step = f.num("step", 1, i64::from(i32::MAX))?.unwrap_or(3) as i32;
    Ok(Control {
        name: format!("master-rotary@{clk}/{dt}"),
        line: clk,
        aux: Some(dt),
        kind: ControlKind::Rotary,
        binding: Binding::Master {
            url,
            path: MASTER_LEVEL_PATH.to_string(),
        },
        // Four times the usual volume range so the master never hits its
        // limits before the slaves do.
        value: 0,
        min: -200,
        max: 200,
        step: StepPolicy::Fixed(step),
        toggle: false,
        handle: None,
    })
}

fn master_switch(descriptor: &str) -> Result<Control, ConfigError> {
    let mut f = Fields::new(descriptor, 2)?;
    let sw = f.line("sw")?;
    let url = f.req_str("url")?.to_string();
    parse_udp_url(&url).map_err(|_| ConfigError::bad(&url, "not an osc.udp:// url"))?;
    Ok(Control {
        name: format!("master-switch@{sw}"),
        line: sw,
        aux: None,
        kind: ControlKind::Switch,
        binding: Binding::Master {
            url,
            path: MASTER_MUTE_PATH.to_string(),
        },
        value: 0,
        min: 0,
        max: 1,
        step: StepPolicy::Fixed(1),
        toggle: true,
        handle: None,
    })
}

fn rotary_slave(element: &str, line: u32) -> Result<Control, ConfigError> {
    if element.trim().is_empty() {
        return Err(ConfigError::bad(element, "element must not be empty"));
    }
    Ok(Control {
        name: format!("rotary-slave:{element}"),
        line,
        aux: None,
        kind: ControlKind::Rotary,
        binding: Binding::Slave {
            element: element.trim().to_string(),
            path: MASTER_LEVEL_PATH.to_string(),
        },
        value: -100,
        min: -100,
        max: 0,
        step: StepPolicy::Tapered,
        toggle: false,
        handle: None,
    })
}

fn switch_slave(element: &str, line: u32) -> Result<Control, ConfigError> {
    if element.trim().is_empty() {
        return Err(ConfigError::bad(element, "element must not be empty"));
    }
    Ok(Control {
        name: format!("switch-slave:{element}"),
        line,
        aux: None,
        kind: ControlKind::Switch,
        binding: Binding::Slave {
            element: element.trim().to_string(),
            path: MASTER_MUTE_PATH.to_string(),
        },
        value: 0,
        min: 0,
        max: 1,
        step: StepPolicy::Fixed(1),
        // Momentary: mirrors the master's latched value as received.
        toggle: false,
        handle: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midi_rotary_defaults() {
        let c = midi_rotary("5,6,20").unwrap();
        assert_eq!(c.line, 5);
        assert_eq!(c.aux, Some(6));
        assert_eq!(c.binding, Binding::Midi { channel: 0, cc: 20 });
        assert_eq!((c.min, c.max, c.value), (0, 127, 0));
        assert_eq!(c.step, StepPolicy::Fixed(1));
    }

    #[test]
    fn midi_rotary_full_descriptor() {
        let c = midi_rotary("5,6,20,2,10,100,5,50").unwrap();
        assert_eq!(c.binding, Binding::Midi { channel: 1, cc: 20 });
        assert_eq!((c.min, c.max, c.value), (10, 100, 50));
        assert_eq!(c.step, StepPolicy::Fixed(5));
    }

    #[test]
    fn midi_rotary_rejects_bad_input() {
        assert!(midi_rotary("5,6").is_err()); // cc missing
        assert!(midi_rotary("5,6,200").is_err()); // cc out of range
        assert!(midi_rotary("5,6,20,17").is_err()); // channel out of range
        assert!(midi_rotary("5,6,20,1,100,10").is_err()); // min > max
        assert!(midi_rotary("5,6,20,1,0,127,1,0,9").is_err()); // too many
        assert!(midi_rotary("5,six,20").is_err());
    }

    #[test]
    fn default_value_must_lie_within_the_range() {
        assert!(midi_rotary("5,6,20,1,10,100,1,5").is_err());
        assert!(midi_rotary("5,6,20,1,10,100,1,101").is_err());
    }

    #[test]
    fn mixer_rotary_tapers_unless_step_is_given() {
        let c = mixer_rotary("5,6,Master").unwrap();
        assert_eq!(c.step, StepPolicy::Tapered);
        assert_eq!((c.min, c.max, c.value), (-100, 0, -100));
        let c = mixer_rotary("5,6,Master,3").unwrap();
        assert_eq!(c.step, StepPolicy::Fixed(3));
    }

    #[test]
    fn mixer_mute_is_latched() {
        let c = mixer_mute("13,Master").unwrap();
        assert!(c.toggle);
        assert_eq!(c.kind, ControlKind::Switch);
        assert_eq!(
            c.binding,
            Binding::Mixer {
                element: "Master".into()
            }
        );
    }

    #[test]
    fn osc_descriptors_validate_url_and_path() {
        assert!(osc_rotary("5,6,osc.udp://10.0.0.1:9000,/mixer/level").is_ok());
        assert!(osc_rotary("5,6,osc.tcp://10.0.0.1:9000,/mixer/level").is_err());
        assert!(osc_rotary("5,6,osc.udp://10.0.0.1:9000,no-slash").is_err());
        let c = osc_switch("9,osc.udp://10.0.0.1:9000,/mixer/mute,1").unwrap();
        assert!(c.toggle);
        assert_eq!((c.min, c.max), (0, 100));
    }

    #[test]
    fn master_rotary_uses_the_wide_range() {
        let c = master_rotary("5,6,osc.udp://239.0.2.149:7000").unwrap();
        assert_eq!((c.min, c.max, c.value), (-200, 200, 0));
        assert_eq!(c.step, StepPolicy::Fixed(3));
        assert_eq!(
            c.binding,
            Binding::Master {
                url: "osc.udp://239.0.2.149:7000".into(),
                path: MASTER_LEVEL_PATH.into()
            }
        );
    }

    #[test]
    fn slaves_require_the_listen_url() {
        let opts = ControlOptions {
            rotary_slave: vec!["Master".into()],
            ..Default::default()
        };
        assert_eq!(
            opts.build(),
            Err(ConfigError::Missing(
                "--osc-url is required when slave controls are configured"
            ))
        );
    }

    #[test]
    fn slaves_get_sequential_virtual_lines() {
        let opts = ControlOptions {
            rotary_slave: vec!["Master".into(), "PCM".into()],
            switch_slave: vec!["Master".into()],
            osc_url: Some("osc.udp://239.0.2.149:7000".into()),
            ..Default::default()
        };
        let controls = opts.build().unwrap();
        let lines: Vec<u32> = controls.iter().map(|c| c.line).collect();
        assert_eq!(
            lines,
            vec![VIRTUAL_LINE_BASE, VIRTUAL_LINE_BASE + 1, VIRTUAL_LINE_BASE + 2]
        );
    }

    #[test]
    fn file_descriptors_come_before_cli_descriptors() {
        let mut cli = ControlOptions {
            console_switch: vec!["7".into()],
            ..Default::default()
        };
        let file = ControlOptions {
            console_switch: vec!["3".into()],
            osc_url: Some("osc.udp://239.0.2.149:7000".into()),
            ..Default::default()
        };
        cli.prepend(file);
        assert_eq!(cli.console_switch, vec!["3".to_string(), "7".to_string()]);
        assert_eq!(cli.osc_url.as_deref(), Some("osc.udp://239.0.2.149:7000"));
    }

    #[test]
    fn console_switch_momentary_by_default() {
        let c = console_switch("7").unwrap();
        assert!(!c.toggle);
        let c = console_switch("7,1").unwrap();
        assert!(c.toggle);
    }
}
