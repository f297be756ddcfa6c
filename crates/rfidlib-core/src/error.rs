//! Error types for rfidlib.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport failures, device-reported
//! faults, reply parsing problems, and local argument validation are all
//! captured here.

use std::fmt;

/// The error type for all rfidlib operations.
///
/// Transport-level failures (`Transport`, `Io`) are fatal to the connection.
/// `Timeout`, `Reader`, `Transponder`, and `MalformedResponse` are scoped to
/// the command that produced them and leave the session usable.
/// `InvalidParameter` is raised locally before anything reaches the device.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port, TCP socket).
    #[error("transport error: {0}")]
    Transport(String),

    /// No terminal reply arrived before the deadline.
    ///
    /// `command` is `None` for raw transport reads, which the command engine
    /// treats as "no data yet".
    #[error("timeout waiting for response{}", TimeoutCommand(.command))]
    Timeout { command: Option<String> },

    /// The reader rejected a command or reported a general fault.
    #[error("reader error for `{command}`: {message} ({code})")]
    Reader {
        command: String,
        code: ReaderErrorCode,
        message: String,
    },

    /// The reader reported a fault tied to a transponder operation.
    #[error("transponder error for `{command}`: {message} ({code})")]
    Transponder {
        command: String,
        code: TransponderErrorCode,
        message: String,
    },

    /// The reply could not be interpreted for the command that was sent.
    #[error("malformed response for `{command}`: {response:?}")]
    MalformedResponse { command: String, response: String },

    /// An argument is outside the reader's legal range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The operation is not supported by this reader model or firmware.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// No connection to the reader has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the reader was lost while a command was pending.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Timeout for a specific command.
    pub fn timeout(command: impl Into<String>) -> Self {
        Error::Timeout {
            command: Some(command.into()),
        }
    }

    /// Raw read timeout with no associated command.
    pub fn read_timeout() -> Self {
        Error::Timeout { command: None }
    }

    /// True for device-reported faults, including transponder faults.
    pub fn is_reader_error(&self) -> bool {
        matches!(self, Error::Reader { .. } | Error::Transponder { .. })
    }

    pub fn is_transponder_error(&self) -> bool {
        matches!(self, Error::Transponder { .. })
    }

    /// True for failures that end the connection.
    pub fn is_communication_error(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Io(_) | Error::ConnectionLost
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// The reader error code, if this is a [`Error::Reader`].
    pub fn reader_code(&self) -> Option<ReaderErrorCode> {
        match self {
            Error::Reader { code, .. } => Some(*code),
            _ => None,
        }
    }
}

struct TimeoutCommand<'a>(&'a Option<String>);

impl fmt::Display for TimeoutCommand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(cmd) => write!(f, " to `{cmd}`"),
            None => Ok(()),
        }
    }
}

/// Device-level failure categories.
///
/// Each dialect maps its own error detail text onto these codes once, so
/// callers never match on device wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReaderErrorCode {
    /// The reader did not recognise the command.
    UnknownCommand,
    /// A command parameter was rejected by the reader.
    InvalidParameter,
    /// A stop was requested for an operation that is not running.
    NotRunning,
    /// The requested antenna port is not available.
    AntennaUnavailable,
    /// The reader is busy with another operation.
    Busy,
    /// Any other reader fault, or a failure without detail.
    Other,
}

impl fmt::Display for ReaderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReaderErrorCode::UnknownCommand => "unknown command",
            ReaderErrorCode::InvalidParameter => "invalid parameter",
            ReaderErrorCode::NotRunning => "not running",
            ReaderErrorCode::AntennaUnavailable => "antenna unavailable",
            ReaderErrorCode::Busy => "busy",
            ReaderErrorCode::Other => "other",
        };
        f.write_str(s)
    }
}

/// Transponder-level failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransponderErrorCode {
    NoTag,
    AccessDenied,
    MemoryLocked,
    MemoryOverrun,
    InsufficientPower,
    Crc,
    Other,
}

impl fmt::Display for TransponderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransponderErrorCode::NoTag => "no tag",
            TransponderErrorCode::AccessDenied => "access denied",
            TransponderErrorCode::MemoryLocked => "memory locked",
            TransponderErrorCode::MemoryOverrun => "memory overrun",
            TransponderErrorCode::InsufficientPower => "insufficient power",
            TransponderErrorCode::Crc => "CRC error",
            TransponderErrorCode::Other => "other",
        };
        f.write_str(s)
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
