//! Line reader over a serial device node, FIFO, or plain file.
//! Device discovery and port configuration happen outside the agent; by the
//! time we open the path, it is expected to emit one numeric reading per line.

use super::{ReadingSource, SourceError};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

pub struct LineSource {
    path: PathBuf,
    reader: BufReader<File>,
}

impl LineSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
        })
    }
}

impl ReadingSource for LineSource {
    fn name(&self) -> &str {
        self.path.to_str().unwrap_or("line-source")
    }

    fn next_line(&mut self) -> Result<Option<String>, SourceError> {
        let mut buf = String::new();
        let n = self.reader.read_line(&mut buf)?;
        if n == 0 {
            // EOF: a plain file is exhausted, a tty/FIFO may produce more later.
            // The producer loop counts idle polls and decides when to give up.
            return Ok(None);
        }
        let trimmed = buf.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        Ok(Some(trimmed.to_string()))
    }
}
