//! Full-screen operator console.
//!
//! Screen content is built as plain lines by `session_lines` /
//! `finished_lines` and painted through a `Screen`. The `Console` screen owns
//! raw mode and the alternate screen; dropping it restores the terminal.

use std::collections::VecDeque;
use std::io::{self, Stdout, Write};
use std::path::{Path, PathBuf};

use crossterm::style::Print;
use crossterm::terminal::{self, ClearType};
use crossterm::{cursor, execute, queue};
use esep_core::{Session, Step};
use esep_io::Actuator;

pub const CONTROLS: &str =
    "Controls: SPACE/f=Forward  b=Back  y=Yes  n=No  p=Retry  r=Repeat  t=Message  q=Quit";

const MAX_NOTICES: usize = 4;

// ────────────────────────────────────────────────────────────────
// Status
// ────────────────────────────────────────────────────────────────

/// Most recent problems worth showing the operator (oldest dropped first).
#[derive(Debug, Default)]
pub struct Notices {
    items: VecDeque<String>,
}

impl Notices {
    pub fn push(&mut self, message: impl Into<String>) {
        if self.items.len() == MAX_NOTICES {
            self.items.pop_front();
        }
        self.items.push_back(message.into());
    }

    /// Record the dispatch failures of one step.
    pub fn absorb(&mut self, step: &Step) {
        for failure in &step.failures {
            self.push(format!("! {}", failure));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingStatus {
    Off,
    Running(PathBuf),
    Failed(String),
}

impl RecordingStatus {
    pub fn describe(&self) -> String {
        match self {
            RecordingStatus::Off => "Recording: off".to_string(),
            RecordingStatus::Running(path) => format!("Recording: on -> {}", path.display()),
            RecordingStatus::Failed(reason) => format!("Recording: FAILED ({})", reason),
        }
    }
}

/// Everything on screen that is not session state.
#[derive(Debug)]
pub struct Overlay {
    pub prompt: Option<String>,
    pub notices: Notices,
    pub recording: RecordingStatus,
}

impl Overlay {
    pub fn new(recording: RecordingStatus) -> Self {
        Self {
            prompt: None,
            notices: Notices::default(),
            recording,
        }
    }
}

// ────────────────────────────────────────────────────────────────
// Layout
// ────────────────────────────────────────────────────────────────

pub fn session_lines<A: Actuator>(session: &Session<A>, overlay: &Overlay) -> Vec<String> {
    let mut lines = vec![CONTROLS.to_string()];

    let script = session.script();
    let pos = session.position();
    match session.current() {
        Some((phase, line)) => {
            lines.push(format!(
                "Phase {} ({}/{}): {}",
                phase.number,
                pos.phase + 1,
                script.phases().len(),
                phase.description
            ));
            lines.push(format!(
                "Line {} ({}/{}): {}",
                line.number,
                pos.line + 1,
                phase.lines.len(),
                line.text
            ));
            if let Some(code) = line.motion {
                lines.push(format!("Motion: {}", code));
            }
        }
        None => lines.push("No current line".to_string()),
    }

    let upcoming = script
        .next_position(pos)
        .and_then(|next| script.get(next))
        .map(|(_, l)| l.text.as_str());
    lines.push(match upcoming {
        Some(text) => format!("Next: {}", text),
        None => "Next: (end of script)".to_string(),
    });

    lines.push(String::new());
    lines.push(format!(
        "t = {:.2}s  |  {} rows logged to {}",
        session.elapsed(),
        session.log_rows(),
        session.log_path().display()
    ));
    lines.push(overlay.recording.describe());

    if let Some(text) = &overlay.prompt {
        lines.push(String::new());
        lines.push(format!("Message (Enter=send, Esc=cancel): {}_", text));
    }

    if !overlay.notices.is_empty() {
        lines.push(String::new());
        lines.extend(overlay.notices.iter().map(str::to_string));
    }

    lines
}

pub fn finished_lines(log_path: &Path, rows: usize, recording: &str) -> Vec<String> {
    vec![
        "Experiment finished.".to_string(),
        format!("Log: {} ({} rows)", log_path.display(), rows),
        recording.to_string(),
        String::new(),
        "Press any key to exit.".to_string(),
    ]
}

/// Cut `line` to at most `width` characters.
pub fn clip(line: &str, width: usize) -> String {
    line.chars().take(width).collect()
}

// ────────────────────────────────────────────────────────────────
// Terminal
// ────────────────────────────────────────────────────────────────

/// Anything a frame of lines can be painted on.
pub trait Screen {
    fn draw(&mut self, lines: &[String]) -> io::Result<()>;
}

pub struct Console {
    out: Stdout,
}

impl Console {
    /// Switch to raw mode on the alternate screen.
    pub fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        let mut out = io::stdout();
        if let Err(e) = execute!(out, terminal::EnterAlternateScreen, cursor::Hide) {
            let _ = terminal::disable_raw_mode();
            return Err(e);
        }
        Ok(Self { out })
    }
}

impl Screen for Console {
    fn draw(&mut self, lines: &[String]) -> io::Result<()> {
        let (width, height) = terminal::size().unwrap_or((80, 24));
        queue!(self.out, terminal::Clear(ClearType::All))?;
        for (row, line) in lines.iter().take(height as usize).enumerate() {
            queue!(
                self.out,
                cursor::MoveTo(0, row as u16),
                Print(clip(line, width as usize))
            )?;
        }
        self.out.flush()
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        let _ = execute!(self.out, cursor::Show, terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}
