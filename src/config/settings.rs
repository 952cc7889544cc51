use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::paths;
use crate::sieve::emitter::GeneratorOptions;
use crate::sieve::parser::{ParseOptions, DEFAULT_MAX_DEPTH};

const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Newline {
    #[default]
    Lf,
    Crlf,
}

impl Newline {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::Crlf => "\r\n",
        }
    }
}

/// User preferences stored as `settings.json` in the config directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub indent_width: usize,
    pub newline: Newline,
    pub max_depth: usize,
    /// An `EnvFilter` directive such as `warn` or `sieveform=debug`.
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            indent_width: 4,
            newline: Newline::Lf,
            max_depth: DEFAULT_MAX_DEPTH,
            log_level: "warn".to_string(),
        }
    }
}

impl Settings {
    pub fn generator_options(&self) -> GeneratorOptions {
        GeneratorOptions {
            indent: " ".repeat(self.indent_width),
            newline: self.newline.as_str().to_string(),
        }
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions { max_depth: self.max_depth, ..ParseOptions::default() }
    }
}

pub fn settings_path() -> Option<PathBuf> {
    paths::config_dir().map(|d| d.join(SETTINGS_FILE))
}

/// Load from the default location; a missing file yields defaults.
pub fn load_settings() -> Settings {
    match settings_path() {
        Some(path) => load_settings_from(&path),
        None => Settings::default(),
    }
}

pub fn load_settings_from(path: &Path) -> Settings {
    let Ok(data) = fs::read_to_string(path) else {
        return Settings::default();
    };
    match serde_json::from_str(&data) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring invalid settings file");
            Settings::default()
        }
    }
}

pub fn save_settings_to(path: &Path, settings: &Settings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_string_pretty(settings)?;
    fs::write(path, data)
}

/// Write a default settings file at `path` unless one is already there.
/// Returns whether a file was written.
pub fn init_settings(path: &Path) -> std::io::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    save_settings_to(path, &Settings::default())?;
    tracing::info!(path = %path.display(), "wrote default settings");
    Ok(true)
}
