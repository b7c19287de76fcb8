//! Command-line arguments. Flags given here override the config file.

use std::path::PathBuf;

use clap::Parser;
use esep_core::SessionConfig;

/// Run a scripted robot experiment session.
#[derive(Parser, Debug, Default)]
#[command(name = "esep")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Config file (default: the per-user esep.toml, if present)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Script CSV with Phase, Phase description, Line, Script and Motion columns
    #[arg(short, long, value_name = "PATH")]
    pub script: Option<PathBuf>,

    /// Directory for the experiment log and the trace log
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Directory for the session video
    #[arg(long, value_name = "DIR")]
    pub video_dir: Option<PathBuf>,

    /// Robot command endpoint, e.g. http://localhost:8000/command
    #[arg(long, value_name = "URL")]
    pub actuator_url: Option<String>,

    /// Shuffle every phase except the first and the last
    #[arg(long)]
    pub randomize: bool,

    /// Record the robot's camera stream for the whole session
    #[arg(long)]
    pub record: bool,

    /// Move to the next line after a yes/no/retry/repeat shortcut
    #[arg(long)]
    pub shortcut_advances: bool,
}

impl Args {
    pub fn apply(&self, config: &mut SessionConfig) {
        if let Some(script) = &self.script {
            config.script = script.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = dir.clone();
        }
        if let Some(dir) = &self.video_dir {
            config.video_dir = dir.clone();
        }
        if let Some(url) = &self.actuator_url {
            config.actuator.base_url = url.clone();
        }
        config.randomize_phases |= self.randomize;
        config.recording.enabled |= self.record;
        config.shortcut_advances |= self.shortcut_advances;
    }
}
