//! Recording supervisor.
//!
//! Runs an external capture process (ffmpeg against the robot's MJPEG eye
//! camera) for the lifetime of a session. The process is ours from `start`
//! until `stop`; if a `Recording` is dropped without being stopped the
//! child is killed rather than left running.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};

use crate::error::RecordingError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub enabled: bool,
    pub program: String,
    pub stream_url: String,
    pub frame_rate: u32,
    pub quality: u32,
    pub stop_timeout_secs: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            program: "ffmpeg".to_string(),
            stream_url: "http://righteye.local:8080/stream/video.mjpeg".to_string(),
            frame_rate: 12,
            quality: 5,
            stop_timeout_secs: 5,
        }
    }
}

/// The external command line that does the capturing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl CaptureCommand {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Re-encode the stream at a reduced frame rate into `output`.
    pub fn ffmpeg(config: &RecordingConfig, output: &Path) -> Self {
        let frame_rate = config.frame_rate.to_string();
        let quality = config.quality.to_string();
        let output = output.to_string_lossy();
        Self::new(
            &config.program,
            &[
                "-loglevel",
                "quiet",
                "-i",
                config.stream_url.as_str(),
                "-r",
                frame_rate.as_str(),
                "-c:v",
                "mjpeg",
                "-q:v",
                quality.as_str(),
                &*output,
            ],
        )
    }
}

#[derive(Debug, Clone)]
pub struct RecordingSupervisor {
    stop_timeout: Duration,
}

impl RecordingSupervisor {
    pub fn new(stop_timeout: Duration) -> Self {
        Self { stop_timeout }
    }

    pub fn from_config(config: &RecordingConfig) -> Self {
        Self::new(Duration::from_secs(config.stop_timeout_secs))
    }

    /// Launch the capture process. Its stdio is detached from the terminal.
    pub fn start(&self, command: &CaptureCommand, output: &Path) -> Result<Recording, RecordingError> {
        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RecordingError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        tracing::info!(
            "Recording started: {} (pid {:?}) -> {}",
            command.program,
            child.id(),
            output.display()
        );

        Ok(Recording {
            child,
            output: output.to_path_buf(),
            stop_timeout: self.stop_timeout,
            started: Instant::now(),
            stopped: false,
        })
    }
}

/// Handle to a running capture process.
#[derive(Debug)]
pub struct Recording {
    child: Child,
    output: PathBuf,
    stop_timeout: Duration,
    started: Instant,
    stopped: bool,
}

impl Recording {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// False once the process has exited on its own.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Ask the process to finish, wait for it, kill it if it will not.
    pub async fn stop(mut self) -> Result<ExitStatus, RecordingError> {
        self.stopped = true;

        if let Some(status) = self.child.try_wait().map_err(RecordingError::Wait)? {
            tracing::warn!("Recording process had already exited ({})", status);
            return Ok(status);
        }

        if let Err(e) = self.request_terminate() {
            tracing::warn!("{}; killing instead", e);
            self.child.kill().await.map_err(RecordingError::Wait)?;
        }

        let status = match tokio::time::timeout(self.stop_timeout, self.child.wait()).await {
            Ok(waited) => waited.map_err(RecordingError::Wait)?,
            Err(_) => {
                tracing::warn!(
                    "Recording did not stop within {:?}; killing",
                    self.stop_timeout
                );
                self.child.kill().await.map_err(RecordingError::Wait)?;
                self.child.wait().await.map_err(RecordingError::Wait)?
            }
        };

        tracing::info!(
            "Recording stopped after {:.1}s ({}) -> {}",
            self.uptime().as_secs_f64(),
            status,
            self.output.display()
        );
        Ok(status)
    }

    #[cfg(unix)]
    fn request_terminate(&mut self) -> Result<(), RecordingError> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(|e| RecordingError::Signal {
            pid,
            reason: e.to_string(),
        })
    }

    #[cfg(not(unix))]
    fn request_terminate(&mut self) -> Result<(), RecordingError> {
        self.child.start_kill().map_err(RecordingError::Wait)
    }
}

impl Drop for Recording {
    fn drop(&mut self) {
        if !self.stopped {
            tracing::error!(
                "Recording {:?} dropped without stop(); killing capture process",
                self.child.id()
            );
        }
    }
}
