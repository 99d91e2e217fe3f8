//! Session configuration
//!
//! TOML-backed settings for spawning terminal sessions. Every field has a
//! default, so a partial (or absent) file is fine:
//!
//! ```toml
//! program = "/bin/zsh"
//! args = ["-l"]
//! working_directory = "/home/me"
//!
//! columns = 120
//! rows = 40
//!
//! # Translate pasted line endings to CRLF
//! paste_crlf = false
//!
//! # Permit DECSET 47/1047/1049 alternate-screen switching
//! allow_alt_screen = true
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Settings for one terminal session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TermConfig {
    /// Program to spawn. Defaults to the user's shell.
    pub program: String,
    /// Arguments passed after the program name.
    pub args: Vec<String>,
    /// Child working directory; empty inherits ours.
    pub working_directory: String,
    /// Initial grid geometry.
    pub columns: u16,
    pub rows: u16,
    /// Translate pasted line endings to CRLF instead of CR.
    pub paste_crlf: bool,
    /// Honor alternate-screen switching requests from the child.
    pub allow_alt_screen: bool,
}

impl Default for TermConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
            working_directory: String::new(),
            columns: 80,
            rows: 24,
            paste_crlf: false,
            allow_alt_screen: true,
        }
    }
}

#[cfg(unix)]
fn default_program() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}

#[cfg(windows)]
fn default_program() -> String {
    std::env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string())
}

impl TermConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config = toml::from_str(&text)?;
        Ok(config)
    }
}
