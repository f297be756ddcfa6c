//! TCP transport for network-attached readers.
//!
//! [`TcpTransport`] implements [`Transport`] for readers with an Ethernet
//! interface. These readers expose the same line protocol on a raw TCP port
//! and close idle sessions unless a heartbeat is configured, which the
//! session layer does for [`LinkKind::Network`](rfidlib_core::LinkKind) links.
//!
//! # Example
//!
//! ```no_run
//! use rfidlib_transport::TcpTransport;
//! use rfidlib_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> rfidlib_core::Result<()> {
//! let mut transport = TcpTransport::connect("192.168.2.239:10001").await?;
//! transport.send(b"ATI\r\n").await?;
//!
//! let mut buf = [0u8; 1024];
//! let n = transport.receive(&mut buf, Duration::from_secs(2)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use rfidlib_core::error::{Error, Result};
use rfidlib_core::transport::Transport;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP transport for reader communication.
#[derive(Debug)]
pub struct TcpTransport {
    /// `None` after `close()`.
    stream: Option<TcpStream>,
    addr: String,
}

impl TcpTransport {
    /// Connect to a `host:port` endpoint with the default 5 s timeout.
    pub async fn connect(addr: &str) -> Result<Self> {
        Self::connect_with_timeout(addr, DEFAULT_CONNECT_TIMEOUT).await
    }

    pub async fn connect_with_timeout(addr: &str, timeout: Duration) -> Result<Self> {
        tracing::debug!(addr = %addr, timeout_ms = timeout.as_millis(), "connecting");

        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                tracing::error!(addr = %addr, "TCP connect timed out");
                Error::Transport(format!("connection to {addr} timed out"))
            })?
            .map_err(|e| {
                tracing::error!(addr = %addr, error = %e, "TCP connect failed");
                map_connect_error(e, addr)
            })?;

        // Commands are a few bytes each; don't let Nagle hold them back.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(addr = %addr, error = %e, "failed to set TCP_NODELAY");
        }

        tracing::info!(addr = %addr, "TCP connection established");

        Ok(Self {
            stream: Some(stream),
            addr: addr.to_string(),
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(addr = %self.addr, data = ?String::from_utf8_lossy(data), "sending");

        stream.write_all(data).await.map_err(|e| {
            tracing::error!(addr = %self.addr, error = %e, "TCP write failed");
            map_io_error(e)
        })?;
        stream.flush().await.map_err(map_io_error)?;
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        match tokio::time::timeout(timeout, stream.read(buf)).await {
            Ok(Ok(0)) => {
                tracing::warn!(addr = %self.addr, "peer closed connection");
                Err(Error::ConnectionLost)
            }
            Ok(Ok(n)) => {
                tracing::trace!(
                    addr = %self.addr,
                    bytes = n,
                    data = ?String::from_utf8_lossy(&buf[..n]),
                    "received"
                );
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::error!(addr = %self.addr, error = %e, "TCP read failed");
                Err(map_io_error(e))
            }
            Err(_) => Err(Error::read_timeout()),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::warn!(addr = %self.addr, error = %e, "TCP shutdown failed");
            }
            tracing::info!(addr = %self.addr, "TCP connection closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

fn map_connect_error(e: std::io::Error, addr: &str) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionRefused => {
            Error::Transport(format!("connection refused: {addr}"))
        }
        _ => Error::Io(e),
    }
}

fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::ConnectionAborted => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn test_listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    #[tokio::test]
    async fn command_and_reply_lines() {
        let (listener, addr) = test_listener().await;

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let n = stream.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"AT+ANT?\r\n");
            stream.write_all(b"AT+ANT?\r\n+ANT: 1\r\nOK\r\n").await.unwrap();
            stream.flush().await.unwrap();
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        assert!(transport.is_connected());

        transport.send(b"AT+ANT?\r\n").await.unwrap();

        let mut received = Vec::new();
        let mut buf = [0u8; 64];
        while !received.ends_with(b"OK\r\n") {
            let n = transport
                .receive(&mut buf, Duration::from_secs(2))
                .await
                .unwrap();
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(received, b"AT+ANT?\r\n+ANT: 1\r\nOK\r\n");

        transport.close().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        match TcpTransport::connect(&addr).await {
            Err(Error::Transport(msg)) => assert!(msg.contains("connection refused"), "{msg}"),
            other => panic!("expected Transport error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn receive_timeout() {
        let (listener, addr) = test_listener().await;

        let server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        let mut buf = [0u8; 64];
        let result = transport.receive(&mut buf, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(Error::Timeout { command: None })));

        transport.close().await.unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn peer_close_is_connection_lost() {
        let (listener, addr) = test_listener().await;

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        server.await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut buf = [0u8; 64];
        let result = transport.receive(&mut buf, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(Error::ConnectionLost)), "got: {result:?}");
    }

    #[tokio::test]
    async fn closed_transport_rejects_io() {
        let (listener, addr) = test_listener().await;

        let server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        transport.close().await.unwrap();
        assert!(!transport.is_connected());
        transport.close().await.unwrap();

        assert!(matches!(transport.send(b"ATI\r\n").await, Err(Error::NotConnected)));
        let mut buf = [0u8; 8];
        assert!(matches!(
            transport.receive(&mut buf, Duration::from_millis(10)).await,
            Err(Error::NotConnected)
        ));

        server.abort();
    }

    #[tokio::test]
    async fn baud_rate_is_unsupported_over_tcp() {
        let (listener, addr) = test_listener().await;
        let server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        assert!(matches!(transport.baud_rate(), Err(Error::Transport(_))));
        assert!(matches!(
            transport.set_baud_rate(9600).await,
            Err(Error::Transport(_))
        ));

        transport.close().await.unwrap();
        server.abort();
    }
}
