//! rfidlib-test-harness: Mock transports for rfidlib.
//!
//! [`MockTransport`] drives the line protocol engine deterministically
//! without reader hardware. [`MockTcpServer`] exercises the TCP transport
//! and network-link behaviour (heartbeat negotiation) end to end.

pub mod mock_serial;
pub mod mock_tcp;

pub use mock_serial::MockTransport;
pub use mock_tcp::MockTcpServer;
