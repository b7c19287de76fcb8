//! Cue and shortcut dispatch.
//!
//! A cue is one scripted line: an optional motion code and a (possibly
//! empty) utterance. The motion goes out first, then the speech. The two
//! sends are independent, so a failed motion never suppresses the speech.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::actuator::Actuator;
use crate::error::DispatchError;

// ────────────────────────────────────────────────────────────────
// Vocabulary
// ────────────────────────────────────────────────────────────────

/// The two command families the actuator understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Speech,
    Motion,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Speech => write!(f, "speech"),
            ActionKind::Motion => write!(f, "motion"),
        }
    }
}

/// One command handed to the actuator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Speak(String),
    Trigger(u32),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Speak(_) => ActionKind::Speech,
            Action::Trigger(_) => ActionKind::Motion,
        }
    }
}

/// What a scripted line asks the robot to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cue<'a> {
    pub text: &'a str,
    pub motion: Option<u32>,
}

impl<'a> Cue<'a> {
    pub fn new(text: &'a str, motion: Option<u32>) -> Self {
        Self { text, motion }
    }

    /// A blank utterance is never sent.
    pub fn has_speech(&self) -> bool {
        !self.text.trim().is_empty()
    }

    /// The commands this cue turns into, in send order: motion, then speech.
    pub fn actions(&self) -> Vec<Action> {
        let mut actions = Vec::with_capacity(2);
        if let Some(code) = self.motion {
            actions.push(Action::Trigger(code));
        }
        if self.has_speech() {
            actions.push(Action::Speak(self.text.to_string()));
        }
        actions
    }
}

/// Operator overrides that bypass the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    Yes,
    No,
    Retry,
    Repeat,
    Custom,
}

/// The fixed words and gestures behind each shortcut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortcutVocabulary {
    pub yes_motion: u32,
    pub no_motion: u32,
    pub yes_text: String,
    pub no_text: String,
    pub retry_text: String,
    pub repeat_prefix: String,
}

impl Default for ShortcutVocabulary {
    fn default() -> Self {
        Self {
            yes_motion: 0,
            no_motion: 1,
            yes_text: "yes".to_string(),
            no_text: "no".to_string(),
            retry_text: "please try again".to_string(),
            repeat_prefix: "I repeat:".to_string(),
        }
    }
}

impl ShortcutVocabulary {
    /// Resolve a shortcut into the cue to send and the text to log.
    /// `payload` is the current line (Repeat) or the operator's text (Custom).
    pub fn resolve(&self, kind: Shortcut, payload: &str) -> (String, Option<u32>, String) {
        match kind {
            Shortcut::Yes => (
                self.yes_text.clone(),
                Some(self.yes_motion),
                format!("[Shortcut] {}", self.yes_text),
            ),
            Shortcut::No => (
                self.no_text.clone(),
                Some(self.no_motion),
                format!("[Shortcut] {}", self.no_text),
            ),
            Shortcut::Retry => (
                self.retry_text.clone(),
                None,
                format!("[Shortcut] {}", self.retry_text),
            ),
            Shortcut::Repeat => {
                let text = format!("{} {}", self.repeat_prefix, payload);
                let log = format!("[Shortcut] {}", text);
                (text, None, log)
            }
            Shortcut::Custom => (payload.to_string(), None, format!("[Custom] {}", payload)),
        }
    }
}

// ────────────────────────────────────────────────────────────────
// Reports
// ────────────────────────────────────────────────────────────────

/// Outcome of one dispatch: what was attempted, what failed.
#[derive(Debug, Default)]
pub struct Dispatched {
    pub attempted: Vec<Action>,
    pub failures: Vec<DispatchError>,
}

impl Dispatched {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn motion(&self) -> Option<u32> {
        self.attempted.iter().find_map(|a| match a {
            Action::Trigger(code) => Some(*code),
            Action::Speak(_) => None,
        })
    }

    pub fn spoke(&self) -> bool {
        self.attempted.iter().any(|a| matches!(a, Action::Speak(_)))
    }
}

/// A dispatched shortcut together with its log row text.
#[derive(Debug)]
pub struct ShortcutDispatch {
    pub report: Dispatched,
    pub log_text: String,
}

// ────────────────────────────────────────────────────────────────
// Dispatcher
// ────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Dispatcher<A> {
    actuator: A,
    vocabulary: ShortcutVocabulary,
}

impl<A: Actuator> Dispatcher<A> {
    pub fn new(actuator: A, vocabulary: ShortcutVocabulary) -> Self {
        Self {
            actuator,
            vocabulary,
        }
    }

    /// Send a single command. Failures are traced and handed back.
    pub async fn send(&self, action: &Action) -> Result<(), DispatchError> {
        let result = match action {
            Action::Trigger(code) => self.actuator.trigger(*code).await,
            Action::Speak(text) => self.actuator.speak(text).await,
        };
        if let Err(e) = &result {
            match action {
                Action::Trigger(code) => tracing::warn!("Motion {} not delivered: {}", code, e),
                Action::Speak(text) => tracing::warn!("Speech {:?} not delivered: {}", text, e),
            }
        }
        result
    }

    /// Send a cue: motion first (if any), then speech (if non-blank).
    /// The two sends are attempted independently.
    pub async fn dispatch(&self, cue: Cue<'_>) -> Dispatched {
        let mut report = Dispatched::default();
        for action in cue.actions() {
            if let Err(e) = self.send(&action).await {
                report.failures.push(e);
            }
            report.attempted.push(action);
        }
        report
    }

    /// Send one of the fixed operator overrides.
    pub async fn dispatch_shortcut(&self, kind: Shortcut, payload: &str) -> ShortcutDispatch {
        let (text, motion, log_text) = self.vocabulary.resolve(kind, payload);
        tracing::info!("Shortcut {:?}: {}", kind, log_text);

        let report = self.dispatch(Cue::new(&text, motion)).await;
        ShortcutDispatch { report, log_text }
    }
}
