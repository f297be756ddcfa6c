//! rfidlib-core: Core types, error definitions, and the transport contract
//! for rfidlib.
//!
//! This crate holds the dialect-agnostic pieces every reader backend shares.
//! Applications depend on these types without pulling in a specific dialect.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel
//! - [`Tag`] / [`TagStore`] -- transponders aggregated over an inventory session
//! - [`SessionState`] -- mutable state of one reader connection
//! - [`ReaderEvent`] / [`EventBus`] -- asynchronous notifications
//! - [`ReaderModel`] -- static per-model configuration
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod session;
pub mod tag;
pub mod transport;
pub mod types;

pub use error::{Error, ReaderErrorCode, Result, TransponderErrorCode};
pub use events::{EventBus, EventKind, EventSubscription, ReaderEvent};
pub use session::{SessionState, SharedSession};
pub use tag::{InventoryReport, Tag, TagKind, TagSighting, TagStore};
pub use transport::Transport;
pub use types::*;
