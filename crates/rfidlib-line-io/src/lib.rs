//! rfidlib-line-io: The shared engine behind both reader dialects.
//!
//! Readers speak a line-oriented ASCII protocol in which command replies and
//! unsolicited events (heartbeats, inventory reports, input changes) share
//! one channel. This crate provides:
//!
//! - [`LineChannel`]: line framing over a byte transport
//! - [`protocol`]: line classification and reply assembly
//! - [`Dialect`]: the hooks a concrete dialect fills in
//! - [`Command`] and reply parsers shared by both dialects
//! - [`io`]: the IO task with its single in-flight command slot

pub mod channel;
pub mod commands;
pub mod dialect;
pub mod io;
pub mod protocol;

pub use channel::LineChannel;
pub use commands::Command;
pub use dialect::Dialect;
pub use io::{CommandHandle, IoConfig, IoContext, ReaderIo, spawn_io_task};
pub use protocol::{EventClass, LineClass, Reply};
