//! JSONL framing over AsyncBufRead/AsyncWrite.
//!
//! Both ends of the bridge read and write at the same time, so the reading
//! and writing halves are separate types.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Longest line [`FrameReader`] accepts, newline included
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse or produce JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// A line exceeded the frame limit and was skipped.
    #[error("frame longer than {0} bytes")]
    FrameTooLong(usize),
}

impl TransportError {
    /// Whether the offending line was consumed and reading may go on
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TransportError::Json(_) | TransportError::FrameTooLong(_))
    }
}

/// Reads one JSON message per line
pub struct FrameReader<R> {
    reader: R,
    line: Vec<u8>,
    max_len: usize,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_len(reader, MAX_FRAME_LEN)
    }

    pub fn with_max_len(reader: R, max_len: usize) -> Self {
        Self {
            reader,
            line: Vec::new(),
            max_len,
        }
    }

    /// Read the next message.
    ///
    /// Returns `Ok(None)` on EOF. Skips empty lines. A malformed or oversized
    /// line is consumed and reported, so the caller may keep reading.
    pub async fn read_frame<T: DeserializeOwned>(&mut self) -> Result<Option<T>, TransportError> {
        loop {
            self.line.clear();
            let bytes_read = (&mut self.reader)
                .take(self.max_len as u64)
                .read_until(b'\n', &mut self.line)
                .await?;
            if bytes_read == 0 {
                return Ok(None);
            }
            if bytes_read == self.max_len && self.line.last() != Some(&b'\n') {
                self.line.clear();
                self.skip_line().await?;
                return Err(TransportError::FrameTooLong(self.max_len));
            }
            if self.line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Ok(Some(serde_json::from_slice(&self.line)?));
        }
    }

    /// Drop input up to and including the next newline
    async fn skip_line(&mut self) -> Result<(), TransportError> {
        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Ok(());
            }
            let (used, done) = match buf.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (buf.len(), false),
            };
            self.reader.consume(used);
            if done {
                return Ok(());
            }
        }
    }
}

/// Writes one JSON message per line
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write `message` as a single line and flush
    pub async fn write_frame<T: Serialize>(&mut self, message: &T) -> Result<(), TransportError> {
        let json = serde_json::to_string(message)?;
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
