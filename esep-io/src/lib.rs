//! # ESEP IO
//!
//! The Actuator Bridge.
//! Turns scripted cues and operator shortcuts into speech/motion commands
//! for the robot's HTTP command server. Fire-and-forget: every failure is
//! reported back to the caller, nothing is retried.

pub mod actuator;
pub mod dispatch;
pub mod error;
pub mod testing;

pub use actuator::{Actuator, ActuatorConfig, HttpActuator};
pub use dispatch::{Action, ActionKind, Cue, Dispatched, Dispatcher, Shortcut, ShortcutDispatch, ShortcutVocabulary};
pub use error::DispatchError;
