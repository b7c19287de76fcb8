//! Keyboard mapping.
//!
//! Turns crossterm key events into session commands. Only key presses are
//! mapped; repeat and release events (reported on some platforms) are
//! ignored so one keystroke is one command.
//!
//! Ctrl+C quits from any mode, including the custom-message prompt.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use esep_core::Command;
use esep_io::Shortcut;

/// What a key means while no prompt is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    Command(Command),
    OpenPrompt,
    Ignore,
}

// ────────────────────────────────────────────────────────────────
// Command keys
// ────────────────────────────────────────────────────────────────

pub fn is_press(key: &KeyEvent) -> bool {
    key.kind == KeyEventKind::Press
}

pub fn is_interrupt(key: &KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL)
        && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('C'))
}

pub fn map_key(key: &KeyEvent) -> KeyAction {
    if !is_press(key) {
        return KeyAction::Ignore;
    }
    if is_interrupt(key) {
        return KeyAction::Command(Command::Quit);
    }
    // Other control/alt chords are not bound.
    if key
        .modifiers
        .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
    {
        return KeyAction::Ignore;
    }

    let KeyCode::Char(c) = key.code else {
        return KeyAction::Ignore;
    };

    match c.to_ascii_lowercase() {
        ' ' | 'f' => KeyAction::Command(Command::Advance),
        'b' => KeyAction::Command(Command::Retreat),
        'y' => KeyAction::Command(Command::Shortcut(Shortcut::Yes)),
        'n' => KeyAction::Command(Command::Shortcut(Shortcut::No)),
        'p' => KeyAction::Command(Command::Shortcut(Shortcut::Retry)),
        'r' => KeyAction::Command(Command::Shortcut(Shortcut::Repeat)),
        't' => KeyAction::OpenPrompt,
        'q' => KeyAction::Command(Command::Quit),
        _ => KeyAction::Ignore,
    }
}

// ────────────────────────────────────────────────────────────────
// Custom message prompt
// ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome {
    Editing,
    Submit(String),
    Cancel,
}

/// Line editor for the custom-message prompt.
#[derive(Debug, Clone, Default)]
pub struct PromptBuffer {
    text: String,
}

impl PromptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Enter submits the trimmed text (an empty submit cancels), Esc cancels.
    pub fn handle(&mut self, key: &KeyEvent) -> PromptOutcome {
        if !is_press(key) {
            return PromptOutcome::Editing;
        }
        match key.code {
            KeyCode::Enter => {
                let text = std::mem::take(&mut self.text);
                let text = text.trim();
                if text.is_empty() {
                    PromptOutcome::Cancel
                } else {
                    PromptOutcome::Submit(text.to_string())
                }
            }
            KeyCode::Esc => {
                self.text.clear();
                PromptOutcome::Cancel
            }
            KeyCode::Backspace => {
                self.text.pop();
                PromptOutcome::Editing
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.text.push(c);
                PromptOutcome::Editing
            }
            _ => PromptOutcome::Editing,
        }
    }
}
