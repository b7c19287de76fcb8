//! ESEP Bridge library target.
//!
//! The binary entry point is in `main.rs`; this file exposes the console
//! logic so `tests/*.rs` can import it.

pub mod app;
pub mod cli;
pub mod console;
pub mod keyboard;
