//! Reading sources: line-delimited device reads plus a simulated waveform.
//! A source yields raw text lines; the pipeline parses and timestamps them.

mod line;
mod sim;

pub use line::LineSource;
pub use sim::SimulatedSource;

use serde::Serialize;
use std::time::Instant;

/// One scalar sensor reading with a monotonic timestamp in seconds.
/// Ephemeral: consumed immediately by the feature extractor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    pub value: f64,
    pub timestamp: f64,
}

impl Reading {
    pub fn new(value: f64, timestamp: f64) -> Self {
        Self { value, timestamp }
    }
}

/// Source failure; the producer loop treats any of these as a disconnect.
#[derive(Debug)]
pub enum SourceError {
    /// The device went away or reached a hard end of stream
    Disconnected(String),
    Io(std::io::Error),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Disconnected(why) => write!(f, "source disconnected: {}", why),
            SourceError::Io(e) => write!(f, "source read error: {}", e),
        }
    }
}

impl std::error::Error for SourceError {}

impl From<std::io::Error> for SourceError {
    fn from(e: std::io::Error) -> Self {
        SourceError::Io(e)
    }
}

/// A pull source of raw reading lines with bounded polls.
pub trait ReadingSource: Send {
    fn name(&self) -> &str;

    /// Poll once. `Ok(Some)` carries a raw line, `Ok(None)` means nothing
    /// arrived this poll. Any `Err` ends the stream.
    fn next_line(&mut self) -> Result<Option<String>, SourceError>;
}

/// Monotonic seconds relative to clock creation, used to stamp readings.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
