//! Line classification and reply assembly.
//!
//! Every line read from the channel goes through [`classify_line`] first:
//! empty lines are dropped, `+`-prefixed lines the dialect recognises are
//! unsolicited events, and everything else is reply material for the one
//! outstanding command, which a [`ReplyAccumulator`] folds into a [`Reply`]
//! or an error.

use tracing::warn;

use rfidlib_core::error::{Error, ReaderErrorCode, Result};

use crate::dialect::Dialect;

/// First character of every unsolicited event line.
pub const EVENT_MARKER: char = '+';

/// Default terminal success line.
pub const SUCCESS_TOKEN: &str = "OK";

/// Default prefix of terminal failure lines.
pub const FAILURE_TOKEN: &str = "ERROR";

/// Keep-alive line. Carries no payload.
pub const HEARTBEAT_TOKEN: &str = "+HBT";

/// Inventory report tokens, recognised even while a command is outstanding.
pub const INVENTORY_TOKENS: &[&str] = &["+CINV", "+CMINV"];

/// Input change: `+IEV: <pin>,<HIGH|LOW>`.
pub const INPUT_EVENT_TOKEN: &str = "+IEV";

/// Kinds of unsolicited line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    Heartbeat,
    Inventory,
    InputChange,
    /// Recognised as an event but not handled by the engine.
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    Empty,
    Event(EventClass),
    Reply,
}

/// The `+NAME` token at the start of an event line.
pub fn event_token(line: &str) -> &str {
    let end = line
        .find(|c: char| c == ':' || c == ',' || c.is_whitespace())
        .unwrap_or(line.len());
    &line[..end]
}

/// Any `+C…` token. Only [`INVENTORY_TOKENS`] are events unconditionally;
/// the rest of the family counts as inventory when no command is waiting.
pub fn is_inventory_family(token: &str) -> bool {
    token.len() > 2 && token[1..].starts_with('C')
}

/// Event tokens shared by both dialects: `+HBT`, the inventory reports,
/// and `+IEV`.
pub fn standard_event_class(line: &str) -> Option<EventClass> {
    let token = event_token(line);
    if token == HEARTBEAT_TOKEN && line.trim() == HEARTBEAT_TOKEN {
        Some(EventClass::Heartbeat)
    } else if INVENTORY_TOKENS.contains(&token) {
        Some(EventClass::Inventory)
    } else if token == INPUT_EVENT_TOKEN {
        Some(EventClass::InputChange)
    } else {
        None
    }
}

/// Decide where a line belongs.
///
/// A `+` line the dialect does not claim is reply material while a command
/// is outstanding (`+MUX: 3`). Otherwise it is an inventory report when it
/// belongs to the `+C…` family and an unknown event if not.
pub fn classify_line(line: &str, dialect: &dyn Dialect, command_outstanding: bool) -> LineClass {
    let line = line.trim();
    if line.is_empty() {
        return LineClass::Empty;
    }
    if !line.starts_with(EVENT_MARKER) {
        return LineClass::Reply;
    }
    match dialect.event_class(line) {
        Some(class) => LineClass::Event(class),
        None if command_outstanding => LineClass::Reply,
        None if is_inventory_family(event_token(line)) => LineClass::Event(EventClass::Inventory),
        None => LineClass::Event(EventClass::Other),
    }
}

/// The value part of a data line: `+MUX: 3` → `3`, `3` → `3`.
pub fn reply_value(line: &str) -> &str {
    let line = line.trim();
    if line.starts_with(EVENT_MARKER) {
        if let Some((_, value)) = line.split_once(':') {
            return value.trim();
        }
        return "";
    }
    line
}

/// Inner text of the first `<…>` segment.
pub fn extract_error_detail(text: &str) -> Option<&str> {
    let start = text.find('<')?;
    let len = text[start + 1..].find('>')?;
    Some(text[start + 1..start + 1 + len].trim())
}

/// Parse `+IEV: <pin>,<HIGH|LOW>` into (pin, high).
pub fn parse_input_change(line: &str) -> Result<(u8, bool)> {
    let malformed = || Error::MalformedResponse {
        command: INPUT_EVENT_TOKEN.into(),
        response: line.to_string(),
    };
    let (pin, level) = reply_value(line).split_once(',').ok_or_else(malformed)?;
    let pin: u8 = pin.trim().parse().map_err(|_| malformed())?;
    let high = parse_level(level).ok_or_else(malformed)?;
    Ok((pin, high))
}

/// `HIGH`/`LOW` (any case) or `1`/`0`.
pub fn parse_level(token: &str) -> Option<bool> {
    let token = token.trim();
    if token.eq_ignore_ascii_case("HIGH") || token == "1" {
        Some(true)
    } else if token.eq_ignore_ascii_case("LOW") || token == "0" {
        Some(false)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Reply assembly
// ---------------------------------------------------------------------------

/// A successful reply: every intermediate line between echo and `OK`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub command: String,
    pub lines: Vec<String>,
}

impl Reply {
    /// The most recent intermediate line, or empty.
    pub fn payload(&self) -> &str {
        self.lines.last().map(String::as_str).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Build the error for a reply this layer could not interpret.
    pub fn malformed(&self) -> Error {
        Error::MalformedResponse {
            command: self.command.clone(),
            response: self.lines.join("\n"),
        }
    }
}

/// Outcome of feeding one reply line.
#[derive(Debug)]
pub enum Step {
    Pending,
    Done(Result<Reply>),
}

/// Folds reply lines for one command into a result.
#[derive(Debug)]
pub struct ReplyAccumulator {
    command: String,
    lines: Vec<String>,
    echo_pending: bool,
}

impl ReplyAccumulator {
    pub fn new(command: impl Into<String>, expects_echo: bool) -> Self {
        ReplyAccumulator {
            command: command.into(),
            lines: Vec::new(),
            echo_pending: expects_echo,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn feed(&mut self, line: &str, dialect: &dyn Dialect) -> Step {
        let line = line.trim();

        if self.echo_pending {
            if let Some(prefix) = dialect.echo_prefix() {
                if line.starts_with(prefix) {
                    self.echo_pending = false;
                    if line != self.command {
                        warn!(sent = %self.command, echo = line, "echo does not match command");
                    }
                    return Step::Pending;
                }
            }
        }

        if line == dialect.success_token() {
            return Step::Done(Ok(Reply {
                command: std::mem::take(&mut self.command),
                lines: std::mem::take(&mut self.lines),
            }));
        }

        if line.starts_with(dialect.failure_token()) {
            return Step::Done(Err(self.failure(line, dialect)));
        }

        self.lines.push(line.to_string());
        Step::Pending
    }

    fn failure(&self, line: &str, dialect: &dyn Dialect) -> Error {
        let detail = extract_error_detail(line).or_else(|| {
            self.lines
                .iter()
                .rev()
                .find_map(|l| extract_error_detail(l))
        });
        match detail {
            Some(detail) => dialect.classify_error(&self.command, detail),
            None => {
                let message = if self.lines.is_empty() {
                    line.to_string()
                } else {
                    self.lines.join("; ")
                };
                Error::Reader {
                    command: self.command.clone(),
                    code: ReaderErrorCode::Other,
                    message,
                }
            }
        }
    }

    /// Error for a deadline that passed before a terminal line.
    ///
    /// Intermediate lines with no terminator mean the reader answered in a
    /// shape we did not expect, which is reported as malformed rather than
    /// as a plain timeout.
    pub fn expire(self) -> Error {
        if self.lines.is_empty() {
            Error::timeout(self.command)
        } else {
            Error::MalformedResponse {
                command: self.command,
                response: self.lines.join("\n"),
            }
        }
    }
}
