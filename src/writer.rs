//! Writer middleware that redacts rendered log lines.
//!
//! `tracing-subscriber` formats an event into text and then hands it to the
//! writer produced by a [`MakeWriter`]. Wrapping that `MakeWriter` in
//! [`RedactingMakeWriter`] puts redaction on the render boundary, after field
//! and argument substitution, for every event and every format.
//!
//! ```ignore
//! use logshield::RedactingMakeWriter;
//!
//! tracing_subscriber::fmt()
//!     .with_writer(RedactingMakeWriter::new(std::io::stderr))
//!     .init();
//! ```

use crate::redaction::{redact, Redactor};
use std::io::{self, Write};
use std::mem;
use std::sync::Arc;
use tracing::Metadata;
use tracing_subscriber::fmt::MakeWriter;

/// A [`MakeWriter`] whose writers redact everything passing through them.
#[derive(Debug, Clone)]
pub struct RedactingMakeWriter<M> {
    inner: M,
    extra: Option<Arc<Redactor>>,
}

impl<M> RedactingMakeWriter<M> {
    pub fn new(inner: M) -> Self {
        Self { inner, extra: None }
    }

    /// Apply `redactor`'s rules in addition to the built-in ones.
    pub fn with_redactor(inner: M, redactor: Redactor) -> Self {
        Self {
            inner,
            extra: Some(Arc::new(redactor)),
        }
    }

    pub fn get_ref(&self) -> &M {
        &self.inner
    }
}

impl<'a, M> MakeWriter<'a> for RedactingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = RedactingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new(self.inner.make_writer(), self.extra.clone())
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        RedactingWriter::new(self.inner.make_writer_for(meta), self.extra.clone())
    }
}

/// Buffers output up to each newline, redacts the completed lines and
/// forwards them to the inner writer.
///
/// Secrets never span a newline, so line granularity is enough. A trailing
/// partial line is redacted and written on `flush` or drop.
///
/// When the inner writer fails, the bytes of the failing `write` are not
/// consumed and anything buffered before it is kept for the next attempt.
/// Bytes the inner writer accepted before failing may be written again.
pub struct RedactingWriter<W: Write> {
    inner: W,
    pending: Vec<u8>,
    extra: Option<Arc<Redactor>>,
}

impl<W: Write> RedactingWriter<W> {
    fn new(inner: W, extra: Option<Arc<Redactor>>) -> Self {
        Self {
            inner,
            pending: Vec::new(),
            extra,
        }
    }

    fn write_redacted(&mut self, bytes: &[u8]) -> io::Result<()> {
        let text = String::from_utf8_lossy(bytes);
        let redacted = redact(&text);
        match &self.extra {
            Some(redactor) => self
                .inner
                .write_all(redactor.redact(&redacted).as_bytes()),
            None => self.inner.write_all(redacted.as_bytes()),
        }
    }

    fn write_pending(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let rest = mem::take(&mut self.pending);
        let result = self.write_redacted(&rest);
        if result.is_err() {
            self.pending = rest;
        }
        result
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let buffered = self.pending.len();
        self.pending.extend_from_slice(buf);
        if let Some(pos) = self.pending.iter().rposition(|&b| b == b'\n') {
            let complete: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Err(e) = self.write_redacted(&complete) {
                // None of `buf` counts as written; earlier bytes stay queued
                let mut restored = complete;
                restored.append(&mut self.pending);
                restored.truncate(buffered);
                self.pending = restored;
                return Err(e);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.write_pending()?;
        self.inner.flush()
    }
}

impl<W: Write> Drop for RedactingWriter<W> {
    fn drop(&mut self) {
        // No caller left to report to
        let _ = self.write_pending();
    }
}
