pub mod config;
pub mod error;
pub mod event_log;
pub mod recording;
pub mod script;
pub mod session;

// Re-export the main types so users can just use `esep_core::Session`
pub use config::{ArtifactPaths, SessionConfig};
pub use error::{ConfigError, LogError, RecordingError, ScriptError, SessionError};
pub use event_log::EventLog;
pub use recording::{CaptureCommand, Recording, RecordingConfig, RecordingSupervisor};
pub use script::{Line, Phase, Position, Script, load_script, parse_script};
pub use session::{Command, Session, SessionOptions, SessionState, Step};
