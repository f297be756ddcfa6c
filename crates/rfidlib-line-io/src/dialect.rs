//! The per-dialect hooks the shared engine is parameterised over.
//!
//! Both reader dialects share framing, reply structure, and event markers.
//! They differ in command spelling, terminator, echo behaviour, inventory
//! record layout, and how error details are worded. Those differences live
//! behind [`Dialect`], selected once when a reader is built.

use tracing::debug;

use rfidlib_core::error::{Error, Result};
use rfidlib_core::tag::InventoryReport;

use crate::commands::Command;
use crate::protocol::{self, EventClass};

pub trait Dialect: Send + Sync + 'static {
    /// Short name used in log fields.
    fn name(&self) -> &'static str;

    /// Line terminator for both directions.
    fn line_terminator(&self) -> &'static str;

    /// Prefix of echoed command lines, if the reader echoes.
    fn echo_prefix(&self) -> Option<&'static str>;

    /// Terminal success line.
    fn success_token(&self) -> &'static str {
        protocol::SUCCESS_TOKEN
    }

    /// Prefix of terminal failure lines.
    fn failure_token(&self) -> &'static str {
        protocol::FAILURE_TOKEN
    }

    /// Decide whether a `+`-prefixed line is an unsolicited event.
    ///
    /// `None` means the line is not an event the dialect knows about; the
    /// classifier then treats it as reply material if a command is
    /// outstanding.
    fn event_class(&self, line: &str) -> Option<EventClass> {
        protocol::standard_event_class(line)
    }

    /// Spell a command for the wire, without terminator.
    fn encode(&self, command: &Command) -> String;

    /// Parse one inventory line (event or single-inventory reply).
    fn parse_inventory(&self, line: &str) -> Result<InventoryReport>;

    /// Turn a bracketed error detail into a reader or transponder error.
    fn classify_error(&self, command: &str, detail: &str) -> Error;

    /// Fallback for event lines nothing else claimed.
    fn handle_unsolicited(&self, line: &str) {
        debug!(dialect = self.name(), line, "ignoring unsolicited line");
    }
}
