//! ndjson event log: one JSON object per line, append-only.

use super::{EventSink, OutboundEvent, SinkError};
use crate::logging::StructuredLogger;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

pub struct JsonlSink {
    file: Mutex<File>,
}

impl JsonlSink {
    pub fn open(path: &Path) -> Result<Self, std::io::Error> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl EventSink for JsonlSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn deliver(&self, event: &OutboundEvent) -> Result<(), SinkError> {
        let mut file = self.file.lock().map_err(|_| "event log lock poisoned")?;
        StructuredLogger::emit_json(event, &mut *file)?;
        Ok(())
    }
}
