//! In-memory actuator for tests and dry runs.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::actuator::Actuator;
use crate::dispatch::{Action, ActionKind};
use crate::error::DispatchError;

/// Records every command instead of sending it. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct MockActuator {
    sent: Arc<Mutex<Vec<Action>>>,
    fail_speech: bool,
    fail_motion: bool,
}

impl MockActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every speech command answers HTTP 503 (still recorded).
    pub fn failing_speech(mut self) -> Self {
        self.fail_speech = true;
        self
    }

    /// Every motion command answers HTTP 503 (still recorded).
    pub fn failing_motion(mut self) -> Self {
        self.fail_motion = true;
        self
    }

    pub fn sent(&self) -> Vec<Action> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn record(&self, action: Action, fail: bool) -> Result<(), DispatchError> {
        let kind = action.kind();
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(action);
        if fail {
            return Err(DispatchError::Status { kind, status: 503 });
        }
        Ok(())
    }
}

#[async_trait]
impl Actuator for MockActuator {
    async fn speak(&self, text: &str) -> Result<(), DispatchError> {
        self.record(Action::Speak(text.to_string()), self.fail_speech)
    }

    async fn trigger(&self, code: u32) -> Result<(), DispatchError> {
        self.record(Action::Trigger(code), self.fail_motion)
    }
}

/// Convenience for assertions: only the kinds, in order.
pub fn kinds(actions: &[Action]) -> Vec<ActionKind> {
    actions.iter().map(Action::kind).collect()
}
