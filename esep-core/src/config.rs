//! Session configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no file
//! at all) gives the stock lab setup: `esep.csv` in the working directory,
//! the robot's command server on localhost:8000, recording off.
//!
//! Lookup order: explicit `--config` path, then `<config dir>/esep/esep.toml`,
//! then built-in defaults.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use directories::ProjectDirs;
use esep_io::{ActuatorConfig, ShortcutVocabulary};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ScriptError};
use crate::recording::RecordingConfig;
use crate::script::{Script, load_script};
use crate::session::SessionOptions;

pub const CONFIG_FILE_NAME: &str = "esep.toml";
pub const DEFAULT_DELIMITER: u8 = b';';

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub script: PathBuf,
    pub script_delimiter: char,
    pub log_dir: PathBuf,
    pub video_dir: PathBuf,
    pub randomize_phases: bool,
    pub shortcut_advances: bool,
    pub actuator: ActuatorConfig,
    pub shortcuts: ShortcutVocabulary,
    pub recording: RecordingConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            script: PathBuf::from("esep.csv"),
            script_delimiter: ';',
            log_dir: PathBuf::from("."),
            video_dir: PathBuf::from("."),
            randomize_phases: false,
            shortcut_advances: false,
            actuator: ActuatorConfig::default(),
            shortcuts: ShortcutVocabulary::default(),
            recording: RecordingConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Read a config file. A missing file is an error here.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&text, path)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// `explicit` if given, else the per-user config file if it exists,
    /// else defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(path),
            _ => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// `~/.config/esep/esep.toml` on Linux, the platform equivalent elsewhere.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "esep").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// The script delimiter as a byte. Non-ASCII delimiters fall back to `;`.
    pub fn delimiter_byte(&self) -> u8 {
        if self.script_delimiter.is_ascii() {
            self.script_delimiter as u8
        } else {
            tracing::warn!(
                "Script delimiter {:?} is not ASCII, using ';'",
                self.script_delimiter
            );
            DEFAULT_DELIMITER
        }
    }

    /// Load the configured script, shuffling its middle phases if asked to.
    pub fn read_script(&self) -> Result<Script, ScriptError> {
        let mut script = load_script(&self.script, self.delimiter_byte())?;
        if self.randomize_phases {
            script.randomize_middle(&mut rand::rng());
        }
        Ok(script)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            shortcut_advances: self.shortcut_advances,
        }
    }

    /// Where this session's log and video go, stamped with `now`.
    pub fn artifacts<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> ArtifactPaths
    where
        Tz::Offset: std::fmt::Display,
    {
        let stem = format!("experiment_log_{}", now.format("%Y-%m-%d_%H%M"));
        ArtifactPaths {
            log: self.log_dir.join(format!("{}.csv", stem)),
            video: self.video_dir.join(format!("{}.mkv", stem)),
            trace: self.log_dir.join("esep.trace.log"),
        }
    }
}

/// Files produced by one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub log: PathBuf,
    pub video: PathBuf,
    pub trace: PathBuf,
}
