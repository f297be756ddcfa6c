//! Line framing over a byte [`Transport`].
//!
//! [`LineChannel`] turns the raw byte stream into whole lines. It owns a
//! reassembly buffer, so a read that is cancelled or times out never loses
//! bytes: a partial line simply waits for the rest to arrive.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{trace, warn};

use rfidlib_core::error::{Error, Result};
use rfidlib_core::transport::Transport;

/// Maximum buffered bytes without a terminator before the buffer is reset.
/// Reader lines are well under 200 bytes; anything this long is line noise.
pub const MAX_BUF: usize = 8192;

const READ_CHUNK: usize = 512;

pub struct LineChannel {
    transport: Box<dyn Transport>,
    terminator: String,
    receive_timeout: Duration,
    buf: Vec<u8>,
}

impl LineChannel {
    pub fn new(transport: Box<dyn Transport>, terminator: &str, receive_timeout: Duration) -> Self {
        LineChannel {
            transport,
            terminator: terminator.to_string(),
            receive_timeout,
            buf: Vec::new(),
        }
    }

    pub fn line_terminator(&self) -> &str {
        &self.terminator
    }

    pub fn set_line_terminator(&mut self, terminator: &str) {
        self.terminator = terminator.to_string();
    }

    pub fn receive_timeout(&self) -> Duration {
        self.receive_timeout
    }

    pub fn set_receive_timeout(&mut self, timeout: Duration) {
        self.receive_timeout = timeout;
    }

    pub fn baud_rate(&self) -> Result<u32> {
        self.transport.baud_rate()
    }

    pub async fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.transport.set_baud_rate(baud_rate).await
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Send raw bytes.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.transport.send(data).await
    }

    /// Send one line followed by the terminator.
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        trace!(line, "tx");
        let mut frame = Vec::with_capacity(line.len() + self.terminator.len());
        frame.extend_from_slice(line.as_bytes());
        frame.extend_from_slice(self.terminator.as_bytes());
        self.transport.send(&frame).await
    }

    /// Read one line using the configured receive timeout.
    pub async fn read_line(&mut self) -> Result<String> {
        self.read_line_timeout(self.receive_timeout).await
    }

    /// Read one line, waiting at most `timeout` for its terminator.
    ///
    /// Returns [`Error::Timeout`] with no command when the terminator does
    /// not arrive in time. Any partial line stays buffered.
    pub async fn read_line_timeout(&mut self, timeout: Duration) -> Result<String> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(line) = self.take_line() {
                return Ok(line);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::read_timeout());
            }

            // Only a buffer with no terminator left in it is discarded.
            if self.buf.len() > MAX_BUF {
                warn!(len = self.buf.len(), "line buffer overflow, resetting");
                self.buf.clear();
            }

            let n = self.transport.receive(&mut chunk, deadline - now).await?;
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Pop the next complete line from the buffer, if there is one.
    ///
    /// Stray CR/LF left over from a mismatched terminator are trimmed so
    /// both `\r` and `\r\n` devices frame cleanly.
    pub fn take_line(&mut self) -> Option<String> {
        let term = self.terminator.as_bytes();
        if term.is_empty() {
            return None;
        }
        let pos = self.buf.windows(term.len()).position(|w| w == term)?;
        let raw: Vec<u8> = self.buf.drain(..pos + term.len()).collect();
        let line = String::from_utf8_lossy(&raw[..pos]);
        let line = line.trim_matches(['\r', '\n']).to_string();
        trace!(line = %line, "rx");
        Some(line)
    }

    pub async fn close(&mut self) -> Result<()> {
        self.buf.clear();
        self.transport.close().await
    }
}
