//! Transport implementations for rfidlib.
//!
//! Concrete implementations of the [`Transport`](rfidlib_core::Transport)
//! trait from `rfidlib-core`:
//!
//! - [`SerialTransport`]: USB CDC and RS-232 readers
//! - [`TcpTransport`]: Ethernet readers on a raw TCP port

pub mod serial;
pub mod tcp;

pub use serial::SerialTransport;
pub use tcp::TcpTransport;
