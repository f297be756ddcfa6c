//! Transport trait for reader communication.
//!
//! The [`Transport`] trait abstracts over the physical link to a reader.
//! Implementations exist for serial ports and TCP sockets in
//! `rfidlib-transport`, and for scripted mocks in `rfidlib-test-harness`.
//!
//! Line framing sits one layer up, in `rfidlib-line-io`, so a transport only
//! ever moves bytes.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{Error, Result};

/// Asynchronous byte-level transport to a reader.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the reader.
    ///
    /// Implementations should block until all bytes have been written to
    /// the underlying transport (serial TX buffer, TCP socket).
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the reader into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Will wait up to `timeout`
    /// for data to arrive; returns [`Error::Timeout`] if no data is received
    /// within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`].
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;

    /// Current line speed. Only meaningful for serial links.
    fn baud_rate(&self) -> Result<u32> {
        Err(Error::Transport("baud rate not available on this transport".into()))
    }

    /// Change the line speed. Only meaningful for serial links.
    async fn set_baud_rate(&mut self, _baud_rate: u32) -> Result<()> {
        Err(Error::Transport("baud rate not available on this transport".into()))
    }
}
