//! # rfidlib -- async drivers for line-protocol RFID readers
//!
//! `rfidlib` talks to HF and UHF RFID readers over serial ports or TCP. Both
//! wire dialects are line oriented: the host sends one command per line and
//! the reader answers with an optional echo, data lines, and `OK` or
//! `ERROR`, while heartbeats, inventory reports and input changes arrive
//! unsolicited on the same channel.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rfidlib::{EventKind, ReaderBuilder, ReaderEvent};
//! use rfidlib::at::models::pulsar_lr;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let reader = ReaderBuilder::new(pulsar_lr())
//!         .serial_port("/dev/ttyUSB0")
//!         .build()
//!         .await?;
//!     reader.connect().await?;
//!
//!     let mut inventory = reader.subscribe_to(&[EventKind::Inventory]);
//!     reader.start_inventory().await?;
//!     while let Some(ReaderEvent::InventoryUpdated { tags, .. }) = inventory.recv().await {
//!         for tag in tags {
//!             println!("{} seen {} times", tag.id, tag.seen_count);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                  | Purpose                                             |
//! |------------------------|-----------------------------------------------------|
//! | `rfidlib-core`         | Errors, tag model, events, session state, `Transport` |
//! | `rfidlib-transport`    | Serial and TCP transports                           |
//! | `rfidlib-line-io`      | Line framing, reply assembly, the IO task           |
//! | `rfidlib-at`           | AT-command dialect and UHF models                   |
//! | `rfidlib-ascii`        | ASCII dialect and HF models                         |
//! | **`rfidlib`**          | This facade: [`RfidReader`] and [`ReaderBuilder`]   |

pub use rfidlib_core::*;

pub mod builder;
pub mod reader;

pub use builder::ReaderBuilder;
pub use reader::RfidReader;
pub use rfidlib_line_io::{Command, Dialect, Reply};

/// AT-command dialect and UHF reader models.
pub mod at {
    pub use rfidlib_at::*;
}

/// ASCII dialect and HF reader models.
pub mod ascii {
    pub use rfidlib_ascii::*;
}

/// Every supported reader model across both dialects.
///
/// ```
/// for model in rfidlib::supported_readers() {
///     println!("{} {} ({:?})", model.manufacturer, model.name, model.protocol);
/// }
/// ```
pub fn supported_readers() -> Vec<ReaderModel> {
    let mut models = at::all_at_models();
    models.extend(ascii::all_ascii_models());
    models
}

/// Look a model up by name, ignoring case.
pub fn find_model(name: &str) -> Option<ReaderModel> {
    supported_readers()
        .into_iter()
        .find(|m| m.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_readers_cover_both_dialects() {
        let models = supported_readers();
        assert!(models.iter().any(|m| m.protocol == ProtocolDialect::At));
        assert!(models.iter().any(|m| m.protocol == ProtocolDialect::Ascii));
    }

    #[test]
    fn find_model_ignores_case() {
        assert_eq!(find_model("pulsar lr").unwrap().name, "Pulsar LR");
        assert!(find_model("nonexistent").is_none());
    }
}
