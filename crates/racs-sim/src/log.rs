//! Flight log file: a JSON array written one record per line.
//!
//! The closing bracket is never written, so a log cut off by power loss
//! is still readable with [`read_log`].

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use racs_core::error::LogError;
use racs_core::hal::LogSink;
use serde_json::Value;

pub struct JsonArrayLog<W: Write> {
    writer: W,
    open: bool,
    records: u64,
}

impl JsonArrayLog<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        let file =
            File::create(path).with_context(|| format!("creating log {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> JsonArrayLog<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            open: false,
            records: 0,
        }
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> LogSink for JsonArrayLog<W> {
    fn open(&mut self) -> Result<(), LogError> {
        self.writer
            .write_all(b"[\n")
            .map_err(|_| LogError::OpenFailed)?;
        self.open = true;
        Ok(())
    }

    fn write_record(&mut self, record: &str) -> Result<(), LogError> {
        if !self.open {
            return Err(LogError::NotOpen);
        }
        self.writer
            .write_all(record.as_bytes())
            .and_then(|()| self.writer.write_all(b",\n"))
            .map_err(|_| LogError::WriteFailed)?;
        self.records += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), LogError> {
        if !self.open {
            return Err(LogError::NotOpen);
        }
        self.writer.flush().map_err(|_| LogError::FlushFailed)
    }
}

/// Parse a log, tolerating the trailing comma and missing `]`.
pub fn read_log(text: &str) -> Result<Vec<Value>> {
    let body = text.trim_end().trim_end_matches(',').trim_end_matches(']');
    let body = body.trim_end().trim_end_matches(',');
    serde_json::from_str(&format!("{body}]")).context("parsing flight log")
}
