//! Console target: one line per update on stdout
//!
//! The output format is a template with `%gpi%` and `%val%` tokens so the
//! daemon can feed line-oriented consumers directly.

use super::ConsolePort;
use crate::error::ConfigError;

pub const DEFAULT_TEMPLATE: &str = "<%gpi%|%val%>";

const TOKEN_LINE: &str = "%gpi%";
const TOKEN_VALUE: &str = "%val%";

/// A custom template must reference both tokens, or the output would be
/// ambiguous across controls.
pub fn validate_template(template: &str) -> Result<(), ConfigError> {
    for token in [TOKEN_LINE, TOKEN_VALUE] {
        if !template.contains(token) {
            return Err(ConfigError::bad(template, format!("no {token} token found")));
        }
    }
    Ok(())
}

pub struct Console {
    template: String,
}

impl Console {
    pub fn new(template: Option<String>) -> Self {
        Self {
            template: template.unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
        }
    }
}

impl ConsolePort for Console {
    fn emit(&self, line: u32, value: i32) {
        println!(
            "{}",
            self.template
                .replace(TOKEN_LINE, &line.to_string())
                .replace(TOKEN_VALUE, &value.to_string())
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_is_valid() {
        validate_template(DEFAULT_TEMPLATE).unwrap();
    }

    #[test]
    fn template_must_name_both_tokens() {
        assert!(validate_template("volume=%val%").is_err());
        assert!(validate_template("line %gpi% changed").is_err());
        assert!(validate_template("%gpi% -> %val%").is_ok());
    }
}
