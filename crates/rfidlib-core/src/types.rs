//! Shared value types: connection states, reader identity, and model records.

use std::fmt;
use std::ops::RangeInclusive;

use crate::error::{Error, Result};

/// Session lifecycle of a reader connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Initializing,
    Ready,
    Scanning,
}

impl ConnectionState {
    /// True once initialization has completed and until disconnect.
    pub fn is_operational(self) -> bool {
        matches!(self, ConnectionState::Ready | ConnectionState::Scanning)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Initializing => "initializing",
            ConnectionState::Ready => "ready",
            ConnectionState::Scanning => "scanning",
        };
        f.write_str(s)
    }
}

/// Physical link category. Network links need a heartbeat to stay open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Serial,
    Network,
}

/// Which command dialect a reader speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolDialect {
    /// `AT+`-prefixed commands with echo, `\r\n` terminated.
    At,
    /// Bare commands without echo, `\r` terminated.
    Ascii,
}

/// Transponder family a reader works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagFamily {
    Hf,
    Uhf,
}

/// Firmware revision used for capability gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FirmwareVersion {
    pub major: u32,
    pub minor: u32,
}

impl FirmwareVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        FirmwareVersion { major, minor }
    }

    /// Split a version token into major (first two digits) and minor (rest).
    ///
    /// Separators are ignored, so `0104` and `01.04` are the same version.
    /// A single digit is taken as the major number.
    pub fn parse(text: &str) -> Result<Self> {
        let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Err(Error::InvalidParameter(format!(
                "firmware version {text:?} has no digits"
            )));
        }
        let split = digits.len().min(2);
        let (major, minor) = digits.split_at(split);
        let parse = |s: &str| -> Result<u32> {
            if s.is_empty() {
                return Ok(0);
            }
            s.parse()
                .map_err(|_| Error::InvalidParameter(format!("firmware version {text:?} too long")))
        };
        Ok(FirmwareVersion {
            major: parse(major)?,
            minor: parse(minor)?,
        })
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.major, self.minor)
    }
}

/// Identification strings reported by the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderIdentity {
    pub firmware_name: String,
    pub firmware_version: String,
    pub hardware_name: String,
    pub hardware_version: String,
    pub serial_number: String,
    pub firmware: FirmwareVersion,
}

/// How antennas are being driven.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AntennaMode {
    /// One fixed port.
    Single(u8),
    /// The reader cycles through these ports in order.
    Multiplex(Vec<u8>),
}

impl AntennaMode {
    pub fn is_single(&self) -> bool {
        matches!(self, AntennaMode::Single(_))
    }
}

/// Argument to a multiplex configuration command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Multiplex {
    /// Cycle through ports `1..=n`.
    Count(u8),
    /// Cycle through an explicit port sequence.
    Sequence(Vec<u8>),
}

impl Multiplex {
    /// The port sequence the reader will cycle through.
    pub fn ports(&self) -> Vec<u8> {
        match self {
            Multiplex::Count(n) => (1..=*n).collect(),
            Multiplex::Sequence(ports) => ports.clone(),
        }
    }
}

/// Static description of a reader model.
///
/// Model differences are data, not code: pin counts, power range, dialect,
/// and firmware gates all live here and are consumed by one shared engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderModel {
    pub name: &'static str,
    pub manufacturer: &'static str,
    pub protocol: ProtocolDialect,
    pub family: TagFamily,
    pub default_baud_rate: u32,
    pub default_tcp_port: Option<u16>,
    pub antenna_count: u8,
    pub input_pins: u8,
    pub output_pins: u8,
    /// Transmit power range in device units (dBm for UHF, mW for HF).
    pub power_range: Option<RangeInclusive<u16>>,
    pub supports_heartbeat: bool,
    /// Firmware needed for input-change notifications, if they are gated.
    pub input_events_since: Option<FirmwareVersion>,
}

impl ReaderModel {
    pub fn check_antenna(&self, port: u8) -> Result<()> {
        check_range("antenna port", port, self.antenna_count)
    }

    pub fn check_input_pin(&self, pin: u8) -> Result<()> {
        check_range("input pin", pin, self.input_pins)
    }

    pub fn check_output_pin(&self, pin: u8) -> Result<()> {
        check_range("output pin", pin, self.output_pins)
    }

    pub fn check_power(&self, level: u16) -> Result<()> {
        match &self.power_range {
            None => Err(Error::Unsupported(format!(
                "{} has no adjustable power",
                self.name
            ))),
            Some(range) if !range.contains(&level) => Err(Error::InvalidParameter(format!(
                "power {level} out of range ({}..={})",
                range.start(),
                range.end()
            ))),
            Some(_) => Ok(()),
        }
    }
}

fn check_range(what: &str, value: u8, count: u8) -> Result<()> {
    if count == 0 {
        return Err(Error::InvalidParameter(format!(
            "{what} {value} out of range (device has none)"
        )));
    }
    if value == 0 || value > count {
        return Err(Error::InvalidParameter(format!(
            "{what} {value} out of range (1..={count})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> ReaderModel {
        ReaderModel {
            name: "Test",
            manufacturer: "Test",
            protocol: ProtocolDialect::At,
            family: TagFamily::Uhf,
            default_baud_rate: 115_200,
            default_tcp_port: Some(10001),
            antenna_count: 4,
            input_pins: 2,
            output_pins: 4,
            power_range: Some(0..=30),
            supports_heartbeat: true,
            input_events_since: None,
        }
    }

    #[test]
    fn firmware_version_splits_after_two_digits() {
        assert_eq!(FirmwareVersion::parse("0104").unwrap(), FirmwareVersion::new(1, 4));
        assert_eq!(FirmwareVersion::parse("03.12").unwrap(), FirmwareVersion::new(3, 12));
        assert_eq!(FirmwareVersion::parse("12").unwrap(), FirmwareVersion::new(12, 0));
        assert_eq!(FirmwareVersion::parse("7").unwrap(), FirmwareVersion::new(7, 0));
    }

    #[test]
    fn firmware_version_without_digits_fails() {
        assert!(FirmwareVersion::parse("beta").is_err());
    }

    #[test]
    fn firmware_version_ordering() {
        assert!(FirmwareVersion::new(1, 4) < FirmwareVersion::new(1, 10));
        assert!(FirmwareVersion::new(2, 0) > FirmwareVersion::new(1, 99));
        assert_eq!(FirmwareVersion::new(1, 4).to_string(), "1.04");
    }

    #[test]
    fn multiplex_count_expands() {
        assert_eq!(Multiplex::Count(3).ports(), vec![1, 2, 3]);
        assert_eq!(Multiplex::Sequence(vec![4, 1]).ports(), vec![4, 1]);
    }

    #[test]
    fn output_pin_bounds() {
        let m = model();
        assert!(matches!(m.check_output_pin(0), Err(Error::InvalidParameter(_))));
        assert!(matches!(m.check_output_pin(5), Err(Error::InvalidParameter(_))));
        for pin in 1..=4 {
            assert!(m.check_output_pin(pin).is_ok());
        }
    }

    #[test]
    fn out_of_range_message() {
        let err = model().check_antenna(9).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn model_without_pins_rejects_everything() {
        let mut m = model();
        m.input_pins = 0;
        assert!(m.check_input_pin(1).is_err());
    }

    #[test]
    fn power_range_checks() {
        let mut m = model();
        assert!(m.check_power(30).is_ok());
        assert!(matches!(m.check_power(31), Err(Error::InvalidParameter(_))));
        m.power_range = None;
        assert!(matches!(m.check_power(10), Err(Error::Unsupported(_))));
    }

    #[test]
    fn connection_state_operational() {
        assert!(ConnectionState::Ready.is_operational());
        assert!(ConnectionState::Scanning.is_operational());
        assert!(!ConnectionState::Initializing.is_operational());
    }
}
