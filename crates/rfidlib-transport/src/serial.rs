//! Serial port transport for reader communication.
//!
//! [`SerialTransport`] implements [`Transport`] for USB virtual COM ports and
//! RS-232/RS-485 adapters. Desktop and module readers usually enumerate as a
//! USB CDC device running at 115200 baud, 8N1, no flow control.
//!
//! # Example
//!
//! ```no_run
//! use rfidlib_transport::SerialTransport;
//! use rfidlib_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> rfidlib_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyACM0", 115_200).await?;
//! transport.send(b"ATI\r\n").await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use rfidlib_core::error::{Error, Result};
use rfidlib_core::transport::Transport;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{
    DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream, StopBits,
};

/// Serial port transport for reader communication.
pub struct SerialTransport {
    port: Option<SerialStream>,
    port_name: String,
}

impl SerialTransport {
    /// Open a serial port at `baud_rate`, 8N1, no flow control.
    pub async fn open(port: &str, baud_rate: u32) -> Result<Self> {
        tracing::debug!(port = %port, baud_rate, "opening serial port");

        let stream = tokio_serial::new(port, baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                tracing::error!(port = %port, error = %e, "failed to open serial port");
                Error::Transport(format!("failed to open serial port {port}: {e}"))
            })?;

        tracing::info!(port = %port, baud_rate, "serial port opened");

        Ok(Self {
            port: Some(stream),
            port_name: port.to_string(),
        })
    }
}

fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::NotConnected => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(port = %self.port_name, data = ?String::from_utf8_lossy(data), "sending");

        port.write_all(data).await.map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "serial write failed");
            map_io_error(e)
        })?;
        port.flush().await.map_err(map_io_error)?;
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        match tokio::time::timeout(timeout, port.read(buf)).await {
            Ok(Ok(n)) => {
                tracing::trace!(
                    port = %self.port_name,
                    bytes = n,
                    data = ?String::from_utf8_lossy(&buf[..n]),
                    "received"
                );
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::error!(port = %self.port_name, error = %e, "serial read failed");
                Err(map_io_error(e))
            }
            Err(_) => Err(Error::read_timeout()),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.flush().await {
                tracing::warn!(port = %self.port_name, error = %e, "flush before close failed");
            }
            tracing::info!(port = %self.port_name, "serial port closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn baud_rate(&self) -> Result<u32> {
        let port = self.port.as_ref().ok_or(Error::NotConnected)?;
        port.baud_rate()
            .map_err(|e| Error::Transport(format!("cannot read baud rate: {e}")))
    }

    async fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;
        port.set_baud_rate(baud_rate)
            .map_err(|e| Error::Transport(format!("cannot set baud rate {baud_rate}: {e}")))?;
        tracing::debug!(port = %self.port_name, baud_rate, "baud rate changed");
        Ok(())
    }
}
