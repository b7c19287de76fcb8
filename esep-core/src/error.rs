//! Error taxonomy for the session core.
//!
//! - `ScriptError` / `ConfigError`: startup, fatal, raised before any
//!   network or recording resource exists.
//! - `LogError`: the log is the scientific record; losing a row is fatal.
//! - `RecordingError`: reported to the operator, never stops the protocol.
//!
//! Actuator failures live in `esep_io::DispatchError` and never reach here.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("cannot read script {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed script: {0}")]
    Csv(#[from] csv::Error),

    #[error("script is missing required column(s): {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("row {row}: column {column:?} must be an integer, got {value:?}")]
    InvalidNumber {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("phase {phase} lists line {line} more than once")]
    DuplicateLine { phase: i64, line: i64 },

    #[error("script contains no lines")]
    Empty,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("event log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("event log {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to signal capture process {pid}: {reason}")]
    Signal { pid: u32, reason: String },

    #[error("failed waiting for capture process: {0}")]
    Wait(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Log(#[from] LogError),
}
