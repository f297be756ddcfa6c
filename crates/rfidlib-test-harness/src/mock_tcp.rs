//! Mock TCP server for testing readers over the network path.
//!
//! [`MockTcpServer`] listens on a random localhost port, accepts a single
//! client, and plays back scripted request/response pairs in order. After
//! the script is done it keeps the connection open until the client closes
//! it, the way a reader does.
//!
//! # Example
//!
//! ```
//! use rfidlib_test_harness::MockTcpServer;
//!
//! # async fn example() -> rfidlib_core::Result<()> {
//! let mut server = MockTcpServer::new().await?;
//! server.expect(b"AT+HBT=10\r\n", b"AT+HBT=10\r\nOK\r\n");
//! server.start();
//! let addr = server.addr().to_string();
//! // ... connect a TcpTransport to `addr` ...
//! server.wait().await?;
//! # Ok(())
//! # }
//! ```

use rfidlib_core::error::{Error, Result};
use std::collections::VecDeque;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
struct TcpExpectation {
    request: Vec<u8>,
    response: Vec<u8>,
}

/// A scripted single-client TCP server.
pub struct MockTcpServer {
    addr: String,
    listener: Option<TcpListener>,
    expectations: VecDeque<TcpExpectation>,
    server_handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl MockTcpServer {
    /// Bind to a random localhost port. Nothing is accepted until
    /// [`start`](MockTcpServer::start).
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock TCP server: {e}")))?;
        let addr = listener.local_addr().map_err(Error::Io)?.to_string();
        Ok(Self {
            addr,
            listener: Some(listener),
            expectations: VecDeque::new(),
            server_handle: None,
        })
    }

    /// Add an expected request/response pair.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expectations.push_back(TcpExpectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Spawn the server task.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let expectations: Vec<TcpExpectation> = self.expectations.drain(..).collect();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {e}"))?;

            for (i, expectation) in expectations.iter().enumerate() {
                let mut buf = vec![0u8; expectation.request.len()];
                stream
                    .read_exact(&mut buf)
                    .await
                    .map_err(|e| format!("expectation {i}: read error: {e}"))?;

                if buf != expectation.request {
                    return Err(format!(
                        "expectation {i}: request mismatch: expected {:?}, got {:?}",
                        String::from_utf8_lossy(&expectation.request),
                        String::from_utf8_lossy(&buf)
                    ));
                }

                stream
                    .write_all(&expectation.response)
                    .await
                    .map_err(|e| format!("expectation {i}: write error: {e}"))?;
                stream
                    .flush()
                    .await
                    .map_err(|e| format!("expectation {i}: flush error: {e}"))?;
            }

            // Hold the session open until the client hangs up.
            let mut rest = Vec::new();
            let _ = stream.read_to_end(&mut rest).await;
            if !rest.is_empty() {
                return Err(format!(
                    "unexpected data after script: {:?}",
                    String::from_utf8_lossy(&rest)
                ));
            }
            Ok(())
        });

        self.server_handle = Some(handle);
    }

    /// Wait for the server task and surface any script mismatch.
    pub async fn wait(&mut self) -> Result<()> {
        match self.server_handle.take() {
            Some(handle) => match handle.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(msg)) => Err(Error::Transport(msg)),
                Err(e) => Err(Error::Transport(format!("mock server task failed: {e}"))),
            },
            None => Ok(()),
        }
    }
}
