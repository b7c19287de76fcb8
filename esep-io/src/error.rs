use thiserror::Error;

use crate::dispatch::ActionKind;

/// A single speech or motion command that did not reach the actuator.
///
/// These never abort a session; the dispatcher hands them back so the
/// console can show them.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid actuator URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("{kind} request failed: {source}")]
    Request {
        kind: ActionKind,
        #[source]
        source: reqwest::Error,
    },

    #[error("{kind} request returned HTTP {status}")]
    Status { kind: ActionKind, status: u16 },
}

impl DispatchError {
    /// True when the request gave up waiting on the actuator.
    pub fn is_timeout(&self) -> bool {
        match self {
            DispatchError::Request { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}
