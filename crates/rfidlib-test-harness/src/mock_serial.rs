//! Mock transport for deterministic testing of the line protocol engine.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs. Clones share the same script and logs, so a test
//! can hand one clone to a reader and keep another to inject unsolicited
//! lines (heartbeats, inventory reports) or inspect what was sent.
//!
//! # Example
//!
//! ```
//! use rfidlib_test_harness::MockTransport;
//!
//! let mock = MockTransport::new();
//! // When the engine sends `AT+ANT=2`, the reader echoes and acknowledges.
//! mock.expect(b"AT+ANT=2\r\n", b"AT+ANT=2\r\nOK\r\n");
//! // A heartbeat that arrives on its own.
//! mock.inject(b"+HBT\r\n");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rfidlib_core::error::{Error, Result};
use rfidlib_core::transport::Transport;

/// Upper bound on how long an idle `receive()` pretends to wait.
const IDLE_WAIT: Duration = Duration::from_millis(2);

#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    response: Vec<u8>,
}

#[derive(Debug)]
struct MockState {
    expectations: VecDeque<Expectation>,
    /// Bytes waiting to be returned by `receive()`.
    incoming: VecDeque<u8>,
    connected: bool,
    /// Once set, every operation fails with `ConnectionLost`.
    severed: bool,
    sent_log: Vec<Vec<u8>>,
    baud_rate: Option<u32>,
}

/// A mock [`Transport`] for testing without hardware.
///
/// Expectations are consumed in order. Each `send()` is recorded and matched
/// against the next expectation; the matching response is queued for
/// `receive()`. With nothing queued, `receive()` waits briefly and returns
/// [`Error::Timeout`] like a quiet serial line.
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            state: Arc::new(Mutex::new(MockState {
                expectations: VecDeque::new(),
                incoming: VecDeque::new(),
                connected: true,
                severed: false,
                sent_log: Vec::new(),
                baud_rate: None,
            })),
        }
    }

    /// Behave like a serial port running at `baud_rate`.
    pub fn with_baud_rate(baud_rate: u32) -> Self {
        let mock = Self::new();
        mock.lock().baud_rate = Some(baud_rate);
        mock
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the original failure.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add an expected request/response pair.
    pub fn expect(&self, request: &[u8], response: &[u8]) {
        self.lock().expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Queue bytes that arrive without being asked for.
    pub fn inject(&self, data: &[u8]) {
        self.lock().incoming.extend(data.iter().copied());
    }

    /// Every `send()` payload so far, in order.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.lock().sent_log.clone()
    }

    /// Sent payloads as text with line terminators trimmed.
    pub fn sent_lines(&self) -> Vec<String> {
        self.lock()
            .sent_log
            .iter()
            .map(|d| String::from_utf8_lossy(d).trim_end_matches(['\r', '\n']).to_string())
            .collect()
    }

    pub fn remaining_expectations(&self) -> usize {
        self.lock().expectations.len()
    }

    /// When `false`, `send()` and `receive()` return [`Error::NotConnected`].
    pub fn set_connected(&self, connected: bool) {
        self.lock().connected = connected;
    }

    /// Simulate the link dropping: every later operation fails with
    /// [`Error::ConnectionLost`].
    pub fn sever(&self) {
        self.lock().severed = true;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.lock();
        if state.severed {
            return Err(Error::ConnectionLost);
        }
        if !state.connected {
            return Err(Error::NotConnected);
        }

        state.sent_log.push(data.to_vec());

        match state.expectations.pop_front() {
            Some(expectation) if data == expectation.request.as_slice() => {
                state.incoming.extend(expectation.response);
                Ok(())
            }
            Some(expectation) => Err(Error::Transport(format!(
                "unexpected send data: expected {:?}, got {:?}",
                String::from_utf8_lossy(&expectation.request),
                String::from_utf8_lossy(data)
            ))),
            None => Err(Error::Transport(format!(
                "no more expectations in mock transport (sent {:?})",
                String::from_utf8_lossy(data)
            ))),
        }
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        {
            let mut state = self.lock();
            if state.severed {
                return Err(Error::ConnectionLost);
            }
            if !state.connected {
                return Err(Error::NotConnected);
            }
            if !state.incoming.is_empty() {
                let n = state.incoming.len().min(buf.len());
                for (slot, byte) in buf.iter_mut().zip(state.incoming.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
        }
        tokio::time::sleep(timeout.min(IDLE_WAIT)).await;
        Err(Error::read_timeout())
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.connected = false;
        state.incoming.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        let state = self.lock();
        state.connected && !state.severed
    }

    fn baud_rate(&self) -> Result<u32> {
        self.lock()
            .baud_rate
            .ok_or_else(|| Error::Transport("baud rate not available on this transport".into()))
    }

    async fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        let mut state = self.lock();
        match state.baud_rate.as_mut() {
            Some(current) => {
                *current = baud_rate;
                Ok(())
            }
            None => Err(Error::Transport(
                "baud rate not available on this transport".into(),
            )),
        }
    }
}
