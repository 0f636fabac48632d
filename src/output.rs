//! # Output Configuration
//!
//! Controls CLI output appearance: color and status markers, based on
//! terminal capabilities and user preferences.
//!
//! The module respects the following environment variables and flags:
//! - `--color=never|always|auto` - CLI flag for color control
//! - `NO_COLOR` - Disables colors when set (per https://no-color.org/)
//! - `CLICOLOR=0` - Disables colors
//! - `CLICOLOR_FORCE=1` - Forces colors even in non-TTY
//! - `TERM=dumb` - Disables colors for dumb terminals

use std::env;

use console::Style;

/// Output configuration for controlling colors and markers.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Whether colors and symbol markers should be used in output.
    pub use_color: bool,
}

/// Outcome class of one reported line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Warn,
    Error,
    Info,
}

impl OutputConfig {
    /// Create an output configuration from environment and CLI flag.
    ///
    /// `--color=always` forces colors on (overriding NO_COLOR), `never` forces
    /// them off and `auto` detects them from the environment and the TTY.
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };

        Self { use_color }
    }

    fn detect_color_support() -> bool {
        // The presence of NO_COLOR (even if empty) disables colors
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }
        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }
        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }
        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }

        console::Term::stdout().features().colors_supported()
    }

    /// Marker printed in front of a status line: a colored symbol, or a
    /// bracketed tag when colors are off.
    pub fn marker(&self, status: Status) -> String {
        let (symbol, plain, style) = match status {
            Status::Ok => ("✔", "[OK]", Style::new().green().force_styling(true)),
            Status::Warn => ("!", "[WARN]", Style::new().yellow().force_styling(true)),
            Status::Error => ("✘", "[ERR]", Style::new().red().force_styling(true)),
            Status::Info => ("•", "[INFO]", Style::new().cyan().force_styling(true)),
        };
        if self.use_color {
            style.apply_to(symbol).to_string()
        } else {
            plain.to_string()
        }
    }

    /// Render `text` bold when colors are enabled.
    pub fn emphasis(&self, text: &str) -> String {
        if self.use_color {
            Style::new().bold().force_styling(true).apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }

    /// Render `text` dimmed when colors are enabled.
    pub fn dim(&self, text: &str) -> String {
        if self.use_color {
            Style::new().dim().force_styling(true).apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }

    #[cfg(test)]
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    #[cfg(test)]
    pub fn without_color() -> Self {
        Self { use_color: false }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}
