//! AT-command dialect for UHF readers.
//!
//! - **Dialect** ([`dialect`]) -- `AT+`-prefixed commands, echo handling,
//!   `+CINV:` inventory records and textual error classification.
//! - **Model definitions** ([`models`]) -- capability records for the
//!   supported readers (Pulsar LR, QR G2, Deskid UHF, Dwarf G2).
//!
//! # Example
//!
//! ```
//! use rfidlib_at::AtDialect;
//! use rfidlib_line_io::{Command, Dialect};
//!
//! let dialect = AtDialect::new();
//! assert_eq!(dialect.encode(&Command::SetAntenna(2)), "AT+ANT=2");
//! ```

pub mod dialect;
pub mod models;

pub use dialect::AtDialect;
pub use models::all_at_models;
