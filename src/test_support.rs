//! Shared helpers for unit tests.

use crate::writer::RedactingMakeWriter;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;

/// In-memory log sink.
#[derive(Clone, Default)]
pub(crate) struct CapturedLogs {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8(self.buf.lock().unwrap().clone()).unwrap()
    }

    pub(crate) fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }

    /// Parse every line as a JSON event.
    pub(crate) fn json_records(&self) -> Vec<serde_json::Value> {
        self.lines()
            .iter()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    pub(crate) fn error_records(&self) -> Vec<serde_json::Value> {
        self.json_records()
            .into_iter()
            .filter(|record| record["level"] == "ERROR")
            .collect()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// JSON subscriber writing redacted output into `logs`.
pub(crate) fn json_subscriber(logs: &CapturedLogs) -> impl Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_writer(RedactingMakeWriter::new(logs.clone()))
        .finish()
}

/// Single-line text subscriber writing redacted output into `logs`.
pub(crate) fn compact_subscriber(logs: &CapturedLogs) -> impl Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .compact()
        .with_ansi(false)
        .without_time()
        .with_writer(RedactingMakeWriter::new(logs.clone()))
        .finish()
}
