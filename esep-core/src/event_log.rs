//! Event log.
//!
//! One CSV row per dispatched action:
//! `Time_since_start(s),Phase,Line,Script`
//!
//! The file is truncated and given its header once, when the session
//! starts; the clock starts at the same moment. Every `record` writes and
//! flushes its row before returning, so an abnormal exit loses at most the
//! row being written.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::LogError;

pub const LOG_HEADER: [&str; 4] = ["Time_since_start(s)", "Phase", "Line", "Script"];

#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    writer: csv::Writer<File>,
    started: Instant,
    last_elapsed: f64,
    rows: usize,
}

impl EventLog {
    /// Create (or truncate) the log at `path` and write the header.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| LogError::Io {
                path: path.clone(),
                source,
            })?;
        }

        let file = File::create(&path).map_err(|source| LogError::Io {
            path: path.clone(),
            source,
        })?;

        let mut log = Self {
            path,
            writer: csv::Writer::from_writer(file),
            started: Instant::now(),
            last_elapsed: 0.0,
            rows: 0,
        };
        log.write_row(&LOG_HEADER)?;

        tracing::info!("Event log opened at {}", log.path.display());
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data rows written so far (header excluded).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Seconds since the log was created, rounded to centiseconds.
    pub fn elapsed(&self) -> f64 {
        round_centis(self.started.elapsed().as_secs_f64())
    }

    /// Append one event. Returns the elapsed time written to the row.
    pub fn record(&mut self, phase: i64, line: i64, text: &str) -> Result<f64, LogError> {
        let elapsed = self.elapsed().max(self.last_elapsed);

        let stamp = format!("{:.2}", elapsed);
        let phase = phase.to_string();
        let line = line.to_string();
        self.write_row(&[stamp.as_str(), phase.as_str(), line.as_str(), text])?;

        self.last_elapsed = elapsed;
        self.rows += 1;
        tracing::debug!("[LOG] {:.2}s phase={} line={} {:?}", elapsed, phase, line, text);
        Ok(elapsed)
    }

    /// Flush and release the file.
    pub fn close(mut self) -> Result<PathBuf, LogError> {
        self.flush()?;
        tracing::info!(
            "Event log closed: {} rows in {}",
            self.rows,
            self.path.display()
        );
        Ok(self.path)
    }

    fn write_row(&mut self, fields: &[&str]) -> Result<(), LogError> {
        self.writer
            .write_record(fields)
            .map_err(|source| LogError::Csv {
                path: self.path.clone(),
                source,
            })?;
        self.flush()
    }

    fn flush(&mut self) -> Result<(), LogError> {
        self.writer.flush().map_err(|source| LogError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

fn round_centis(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}
