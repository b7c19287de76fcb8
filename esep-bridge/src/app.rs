//! Session driver.
//!
//! Startup order matters: the script is loaded and validated before the log
//! file, the terminal or the capture process are touched, and the recording
//! is stopped after the key loop on every exit path, errors included.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use anyhow::Context;
use crossterm::event::{Event, EventStream};
use esep_core::{
    ArtifactPaths, CaptureCommand, Command, EventLog, Recording, RecordingError,
    RecordingSupervisor, Script, Session, SessionConfig, SessionError,
};
use esep_io::{Actuator, Dispatcher, HttpActuator};
use futures::{Stream, StreamExt};

use crate::console::{self, Console, Overlay, RecordingStatus, Screen};
use crate::keyboard::{self, KeyAction, PromptBuffer, PromptOutcome};

// ════════════════════════════════════════════════════════════════════
// Startup
// ════════════════════════════════════════════════════════════════════

/// Load and validate the configured script. Touches nothing on disk.
pub fn read_script(config: &SessionConfig) -> anyhow::Result<Script> {
    config
        .read_script()
        .with_context(|| format!("cannot use script {}", config.script.display()))
}

/// What `main` needs before the runtime starts.
#[derive(Debug)]
pub struct Prepared {
    pub script: Script,
    pub artifacts: ArtifactPaths,
    pub trace: File,
}

/// Validate the script, then open the trace file next to the session log.
/// A bad script leaves the log directory untouched.
pub fn prepare(
    config: &SessionConfig,
    started: &chrono::DateTime<chrono::Local>,
) -> anyhow::Result<Prepared> {
    let script = read_script(config)?;
    let artifacts = config.artifacts(started);
    let trace = open_trace_file(&artifacts.trace)?;
    Ok(Prepared {
        script,
        artifacts,
        trace,
    })
}

fn open_trace_file(path: &Path) -> anyhow::Result<File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open trace log {}", path.display()))
}

/// Build the actuator, then create the log.
pub fn open_session(
    config: &SessionConfig,
    script: Script,
    artifacts: &ArtifactPaths,
) -> anyhow::Result<Session<HttpActuator>> {
    let actuator = HttpActuator::new(&config.actuator)?;
    let dispatcher = Dispatcher::new(actuator, config.shortcuts.clone());
    let log = EventLog::create(&artifacts.log)?;

    Ok(Session::new(script, dispatcher, log, config.session_options()))
}

/// Start the capture process if enabled. A failure is reported, not fatal.
pub fn start_recording(config: &SessionConfig, output: &Path) -> (Option<Recording>, RecordingStatus) {
    if !config.recording.enabled {
        return (None, RecordingStatus::Off);
    }

    if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty())
        && let Err(e) = fs::create_dir_all(dir)
    {
        tracing::error!("Cannot create video directory {}: {}", dir.display(), e);
        return (None, RecordingStatus::Failed(e.to_string()));
    }

    let command = CaptureCommand::ffmpeg(&config.recording, output);
    match RecordingSupervisor::from_config(&config.recording).start(&command, output) {
        Ok(recording) => (Some(recording), RecordingStatus::Running(output.to_path_buf())),
        Err(e) => {
            tracing::error!("{}", e);
            (None, RecordingStatus::Failed(e.to_string()))
        }
    }
}

// ════════════════════════════════════════════════════════════════════
// Teardown
// ════════════════════════════════════════════════════════════════════

/// How a stopped recording ended.
#[derive(Debug)]
pub struct RecordingReport {
    pub output: PathBuf,
    pub result: Result<ExitStatus, RecordingError>,
}

impl RecordingReport {
    pub fn describe(&self) -> String {
        match &self.result {
            Ok(status) => format!("Video: {} ({})", self.output.display(), status),
            Err(e) => format!("Video: {} (stop failed: {})", self.output.display(), e),
        }
    }
}

/// Operator text for an optional recording report.
pub fn describe_video(report: Option<&RecordingReport>) -> String {
    report.map_or_else(|| "Video: not recorded".to_string(), RecordingReport::describe)
}

/// Stop the capture process, if one is running.
pub async fn stop_recording(recording: Option<Recording>) -> Option<RecordingReport> {
    let recording = recording?;
    let output = recording.output().to_path_buf();
    let result = recording.stop().await;
    if let Err(e) = &result {
        tracing::error!("{}", e);
    }
    Some(RecordingReport { output, result })
}

/// Everything left over once a session has ended.
#[derive(Debug)]
pub struct Teardown {
    pub outcome: anyhow::Result<()>,
    pub video: Option<RecordingReport>,
    pub rows: usize,
    pub log: Result<PathBuf, SessionError>,
}

/// Run the key loop to completion, then stop the recording and close the
/// log, whichever way the loop ended.
pub async fn run_session<A, S, D>(
    mut session: Session<A>,
    recording: Option<Recording>,
    events: &mut S,
    screen: &mut D,
    overlay: &mut Overlay,
) -> Teardown
where
    A: Actuator,
    S: Stream<Item = io::Result<Event>> + Unpin,
    D: Screen,
{
    let outcome = drive(&mut session, screen, events, overlay).await;
    if let Err(e) = &outcome {
        tracing::error!("Key loop failed: {:#}", e);
    }

    let video = stop_recording(recording).await;
    let rows = session.log_rows();
    let log = session.close();

    Teardown {
        outcome,
        video,
        rows,
        log,
    }
}

// ════════════════════════════════════════════════════════════════════
// Run
// ════════════════════════════════════════════════════════════════════

pub async fn run(config: SessionConfig, script: Script, artifacts: ArtifactPaths) -> anyhow::Result<()> {
    let session = open_session(&config, script, &artifacts)?;
    let mut console = Console::enter().context("cannot take over the terminal")?;
    let mut events = EventStream::new();

    let (recording, status) = start_recording(&config, &artifacts.video);
    let mut overlay = Overlay::new(status);

    let teardown = run_session(session, recording, &mut events, &mut console, &mut overlay).await;

    if teardown.outcome.is_ok()
        && let Ok(path) = &teardown.log
    {
        tracing::info!("Session finished: {} rows in {}", teardown.rows, path.display());
        let video = describe_video(teardown.video.as_ref());
        console.draw(&console::finished_lines(path, teardown.rows, &video))?;
        wait_for_key(&mut events).await?;
    }
    drop(console);

    teardown.outcome?;
    teardown.log?;
    Ok(())
}

/// The key loop. Returns once the session is finished or input closes.
async fn drive<A, S, D>(
    session: &mut Session<A>,
    screen: &mut D,
    events: &mut S,
    overlay: &mut Overlay,
) -> anyhow::Result<()>
where
    A: Actuator,
    S: Stream<Item = io::Result<Event>> + Unpin,
    D: Screen,
{
    let step = session.begin().await?;
    overlay.notices.absorb(&step);
    screen.draw(&console::session_lines(session, overlay))?;

    let mut prompt: Option<PromptBuffer> = None;

    while let Some(event) = events.next().await {
        let command = match event? {
            Event::Key(key) if keyboard::is_press(&key) => {
                if keyboard::is_interrupt(&key) {
                    Some(Command::Quit)
                } else if let Some(buffer) = prompt.as_mut() {
                    match buffer.handle(&key) {
                        PromptOutcome::Editing => None,
                        PromptOutcome::Cancel => {
                            prompt = None;
                            None
                        }
                        PromptOutcome::Submit(text) => {
                            prompt = None;
                            Some(Command::Custom(text))
                        }
                    }
                } else {
                    match keyboard::map_key(&key) {
                        KeyAction::Command(command) => Some(command),
                        KeyAction::OpenPrompt => {
                            prompt = Some(PromptBuffer::new());
                            None
                        }
                        KeyAction::Ignore => None,
                    }
                }
            }
            Event::Resize(..) => Some(Command::Redraw),
            _ => None,
        };

        if let Some(command) = command {
            tracing::debug!("Command: {:?}", command);
            let step = session.handle(command).await?;
            overlay.notices.absorb(&step);
            if step.is_finished() {
                return Ok(());
            }
        }

        overlay.prompt = prompt.as_ref().map(|p| p.text().to_string());
        screen.draw(&console::session_lines(session, overlay))?;
    }

    tracing::warn!("Terminal input closed; ending session");
    Ok(())
}

async fn wait_for_key<S>(events: &mut S) -> anyhow::Result<()>
where
    S: Stream<Item = io::Result<Event>> + Unpin,
{
    while let Some(event) = events.next().await {
        if let Event::Key(key) = event?
            && keyboard::is_press(&key)
        {
            break;
        }
    }
    Ok(())
}
