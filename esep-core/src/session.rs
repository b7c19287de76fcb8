//! Session state machine.
//!
//! Owns the navigation position, the dispatcher and the event log. Every
//! operator command is handled to completion (position change, actuator
//! calls, log rows) before `handle` returns, so log order is exactly the
//! order in which the operator pressed keys.
//!
//! ```text
//!   Running ──Advance past last line──▶ Finished
//!   Running ──Quit───────────────────▶ Finished
//! ```

use std::path::{Path, PathBuf};

use esep_io::{Action, Actuator, DispatchError, Dispatcher, Shortcut};

use crate::error::SessionError;
use crate::event_log::EventLog;
use crate::script::{Line, Phase, Position, Script};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Finished,
}

/// One operator intent, already decoded from the keyboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Advance,
    Retreat,
    Shortcut(Shortcut),
    Custom(String),
    Quit,
    Redraw,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Yes/No/Retry/Repeat also move to the next line afterwards.
    pub shortcut_advances: bool,
}

/// What one command did.
#[derive(Debug)]
pub struct Step {
    pub state: SessionState,
    pub moved: bool,
    pub rows: usize,
    pub failures: Vec<DispatchError>,
}

impl Step {
    fn new(state: SessionState) -> Self {
        Self {
            state,
            moved: false,
            rows: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == SessionState::Finished
    }
}

#[derive(Debug)]
pub struct Session<A> {
    script: Script,
    position: Position,
    state: SessionState,
    dispatcher: Dispatcher<A>,
    log: EventLog,
    options: SessionOptions,
}

impl<A: Actuator> Session<A> {
    pub fn new(script: Script, dispatcher: Dispatcher<A>, log: EventLog, options: SessionOptions) -> Self {
        Self {
            script,
            position: Position::START,
            state: SessionState::Running,
            dispatcher,
            log,
            options,
        }
    }

    // ────────────────────────────────────────────────────────────────
    // Accessors
    // ────────────────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn current(&self) -> Option<(&Phase, &Line)> {
        self.script.get(self.position)
    }

    pub fn current_phase(&self) -> Option<&Phase> {
        self.current().map(|(phase, _)| phase)
    }

    pub fn current_line(&self) -> Option<&Line> {
        self.current().map(|(_, line)| line)
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    pub fn log_rows(&self) -> usize {
        self.log.rows()
    }

    pub fn elapsed(&self) -> f64 {
        self.log.elapsed()
    }

    // ────────────────────────────────────────────────────────────────
    // Lifecycle
    // ────────────────────────────────────────────────────────────────

    /// Play the opening line.
    pub async fn begin(&mut self) -> Result<Step, SessionError> {
        let mut step = Step::new(self.state);
        tracing::info!(
            "Session started: {} phases, {} lines",
            self.script.phases().len(),
            self.script.total_lines()
        );
        self.play_current(&mut step).await?;
        Ok(step)
    }

    pub async fn handle(&mut self, command: Command) -> Result<Step, SessionError> {
        let mut step = Step::new(self.state);
        if self.state == SessionState::Finished {
            tracing::debug!("Ignoring {:?}: session finished", command);
            return Ok(step);
        }

        match command {
            Command::Advance => self.advance(&mut step).await?,
            Command::Retreat => self.retreat(&mut step).await?,
            Command::Shortcut(Shortcut::Custom) => {
                tracing::debug!("Custom shortcut without text ignored");
            }
            Command::Shortcut(kind) => {
                let payload = self.current_line().map(|l| l.text.clone()).unwrap_or_default();
                self.shortcut(kind, &payload, &mut step).await?;
                if self.options.shortcut_advances {
                    self.advance(&mut step).await?;
                }
            }
            Command::Custom(text) => {
                if text.trim().is_empty() {
                    tracing::debug!("Empty custom message ignored");
                } else {
                    self.shortcut(Shortcut::Custom, &text, &mut step).await?;
                }
            }
            Command::Quit => {
                tracing::info!("Operator quit at {:?}", self.position);
                self.state = SessionState::Finished;
            }
            Command::Redraw => {}
        }

        step.state = self.state;
        Ok(step)
    }

    /// Flush the log and hand back its path.
    pub fn close(self) -> Result<PathBuf, SessionError> {
        Ok(self.log.close()?)
    }

    // ────────────────────────────────────────────────────────────────
    // Transitions
    // ────────────────────────────────────────────────────────────────

    async fn advance(&mut self, step: &mut Step) -> Result<(), SessionError> {
        match self.script.next_position(self.position) {
            Some(next) => {
                self.position = next;
                step.moved = true;
                self.play_current(step).await
            }
            None => {
                tracing::info!("End of script reached");
                self.state = SessionState::Finished;
                Ok(())
            }
        }
    }

    async fn retreat(&mut self, step: &mut Step) -> Result<(), SessionError> {
        match self.script.prev_position(self.position) {
            Some(prev) => {
                self.position = prev;
                step.moved = true;
                self.play_current(step).await
            }
            None => Ok(()),
        }
    }

    /// Send the current line, logging each action as soon as it has gone
    /// out so a row's timestamp is the moment of its own send.
    async fn play_current(&mut self, step: &mut Step) -> Result<(), SessionError> {
        let Some((phase, line)) = self.script.get(self.position) else {
            tracing::error!("Position {:?} is outside the script", self.position);
            return Ok(());
        };
        let (phase_no, line_no) = (phase.number, line.number);
        let actions = line.cue().actions();

        if actions.is_empty() {
            tracing::debug!("Phase {} line {} has nothing to send", phase_no, line_no);
        }

        for action in actions {
            let sent = self.dispatcher.send(&action).await;
            let text = match &action {
                Action::Trigger(code) => format!("[Motion] {}", code),
                Action::Speak(text) => text.clone(),
            };
            self.log.record(phase_no, line_no, &text)?;
            step.rows += 1;
            if let Err(e) = sent {
                step.failures.push(e);
            }
        }
        Ok(())
    }

    async fn shortcut(&mut self, kind: Shortcut, payload: &str, step: &mut Step) -> Result<(), SessionError> {
        let (phase_no, line_no) = self
            .current()
            .map(|(p, l)| (p.number, l.number))
            .unwrap_or_default();

        let out = self.dispatcher.dispatch_shortcut(kind, payload).await;
        self.log.record(phase_no, line_no, &out.log_text)?;
        step.rows += 1;

        step.failures.extend(out.report.failures);
        Ok(())
    }
}
