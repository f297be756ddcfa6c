//! Command vocabulary and reply parsers shared by both dialects.
//!
//! A [`Command`] names an operation; each [`Dialect`](crate::Dialect) spells
//! it for the wire. Replies have the same shape in both dialects apart from
//! the optional `+NAME:` header, which [`reply_value`] strips, so the parsers
//! here serve both.

use rfidlib_core::error::{Error, Result};
use rfidlib_core::types::{FirmwareVersion, Multiplex, ReaderIdentity};

use crate::protocol::{Reply, parse_level, reply_value};

/// Operations the session layer issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetAntenna(u8),
    GetAntenna,
    SetMultiplex(Multiplex),
    GetMultiplex,
    /// One field per output pin; `None` leaves the pin untouched.
    SetOutputs(Vec<Option<bool>>),
    GetOutputs,
    GetInputs,
    SetInputEvents(bool),
    SetHeartbeat(u32),
    DeviceInfo,
    StartInventory,
    StopInventory,
    Inventory,
    SetPower(u16),
    GetPower,
    Reset,
}

impl Command {
    /// Dialect-neutral mnemonic and arguments, e.g. `ANT=2` or `MUX?`.
    ///
    /// Device identification has no common spelling; dialects encode
    /// [`Command::DeviceInfo`] themselves and this returns the revision
    /// query used by the bare dialect.
    pub fn body(&self) -> String {
        match self {
            Command::SetAntenna(port) => format!("ANT={port}"),
            Command::GetAntenna => "ANT?".into(),
            Command::SetMultiplex(Multiplex::Count(n)) => format!("MUX={n}"),
            Command::SetMultiplex(Multiplex::Sequence(ports)) => format!("MUX={}", join(ports)),
            Command::GetMultiplex => "MUX?".into(),
            Command::SetOutputs(fields) => format!("OUT={}", output_fields(fields)),
            Command::GetOutputs => "OUT?".into(),
            Command::GetInputs => "IN?".into(),
            Command::SetInputEvents(on) => format!("IEV={}", u8::from(*on)),
            Command::SetHeartbeat(secs) => format!("HBT={secs}"),
            Command::DeviceInfo => "REV".into(),
            Command::StartInventory => "CINV".into(),
            Command::StopInventory => "BINV".into(),
            Command::Inventory => "INV".into(),
            Command::SetPower(level) => format!("PWR={level}"),
            Command::GetPower => "PWR?".into(),
            Command::Reset => "RST".into(),
        }
    }
}

fn join(ports: &[u8]) -> String {
    ports
        .iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// `[None, None, Some(true), None]` → `,,1,`.
pub fn output_fields(fields: &[Option<bool>]) -> String {
    fields
        .iter()
        .map(|f| match f {
            Some(true) => "1",
            Some(false) => "0",
            None => "",
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Fields for setting one pin of `pin_count`, leaving the rest blank.
pub fn single_output(pin: u8, value: bool, pin_count: u8) -> Vec<Option<bool>> {
    (1..=pin_count)
        .map(|p| (p == pin).then_some(value))
        .collect()
}

// ---------------------------------------------------------------------------
// Reply parsers
// ---------------------------------------------------------------------------

/// Single number reply: `+ANT: 2` or `2`.
pub fn parse_number<T: std::str::FromStr>(reply: &Reply) -> Result<T> {
    reply_value(reply.payload())
        .parse()
        .map_err(|_| reply.malformed())
}

/// Multiplex reply. A bare count `n` means ports `1..=n`.
pub fn parse_multiplex(reply: &Reply) -> Result<Vec<u8>> {
    let value = reply_value(reply.payload());
    let ports: Vec<u8> = value
        .split(',')
        .map(|p| p.trim().parse::<u8>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| reply.malformed())?;
    match ports.as_slice() {
        [] | [0] => Err(reply.malformed()),
        [count] => Ok((1..=*count).collect()),
        _ => Ok(ports),
    }
}

/// Pin level list: `,,HIGH,` → `[None, None, Some(true), None]`.
pub fn parse_levels(reply: &Reply) -> Result<Vec<Option<bool>>> {
    reply_value(reply.payload())
        .split(',')
        .map(|field| {
            if field.trim().is_empty() {
                Ok(None)
            } else {
                parse_level(field).map(Some).ok_or_else(|| reply.malformed())
            }
        })
        .collect()
}

/// Identification reply.
///
/// Line 1 is the firmware name and version, line 2 the hardware name and
/// version (the firmware values stand in when it is missing or too short),
/// line 3 the serial number.
pub fn parse_identity(reply: &Reply) -> Result<ReaderIdentity> {
    let mut lines = reply.lines.iter().map(|l| reply_value(l));

    let (firmware_name, firmware_version) = lines
        .next()
        .and_then(split_name_version)
        .ok_or_else(|| reply.malformed())?;
    let firmware = FirmwareVersion::parse(firmware_version).map_err(|_| reply.malformed())?;

    let (hardware_name, hardware_version) = lines
        .next()
        .and_then(split_name_version)
        .unwrap_or((firmware_name, firmware_version));

    let serial_number = lines.next().unwrap_or_default();

    Ok(ReaderIdentity {
        firmware_name: firmware_name.to_string(),
        firmware_version: firmware_version.to_string(),
        hardware_name: hardware_name.to_string(),
        hardware_version: hardware_version.to_string(),
        serial_number: serial_number.to_string(),
        firmware,
    })
}

/// `PULSAR_LR 0104` → (`PULSAR_LR`, `0104`).
fn split_name_version(line: &str) -> Option<(&str, &str)> {
    let (name, version) = line.trim().rsplit_once(char::is_whitespace)?;
    let (name, version) = (name.trim(), version.trim());
    if name.is_empty() || version.is_empty() {
        None
    } else {
        Some((name, version))
    }
}

/// Fail unless the reply carries no data lines.
pub fn expect_empty(reply: &Reply) -> Result<()> {
    if reply.is_empty() {
        Ok(())
    } else {
        Err(Error::MalformedResponse {
            command: reply.command.clone(),
            response: reply.lines.join("\n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(command: &str, lines: &[&str]) -> Reply {
        Reply {
            command: command.into(),
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }

    #[test]
    fn bodies() {
        assert_eq!(Command::SetAntenna(2).body(), "ANT=2");
        assert_eq!(Command::SetMultiplex(Multiplex::Count(3)).body(), "MUX=3");
        assert_eq!(
            Command::SetMultiplex(Multiplex::Sequence(vec![1, 2, 3])).body(),
            "MUX=1,2,3"
        );
        assert_eq!(Command::SetHeartbeat(10).body(), "HBT=10");
        assert_eq!(Command::SetInputEvents(true).body(), "IEV=1");
        assert_eq!(Command::SetInputEvents(false).body(), "IEV=0");
    }

    #[test]
    fn set_output_pin_three_of_four() {
        let fields = single_output(3, true, 4);
        assert_eq!(fields, vec![None, None, Some(true), None]);
        assert_eq!(Command::SetOutputs(fields).body(), "OUT=,,1,");
    }

    #[test]
    fn set_output_low_first_pin() {
        assert_eq!(output_fields(&single_output(1, false, 2)), "0,");
    }

    #[test]
    fn multiplex_count_is_expanded() {
        assert_eq!(parse_multiplex(&reply("AT+MUX?", &["+MUX: 3"])).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn multiplex_sequence_is_kept() {
        assert_eq!(
            parse_multiplex(&reply("AT+MUX?", &["+MUX: 4,1,2"])).unwrap(),
            vec![4, 1, 2]
        );
        assert_eq!(parse_multiplex(&reply("MUX?", &["2,3"])).unwrap(), vec![2, 3]);
    }

    #[test]
    fn multiplex_garbage_is_malformed() {
        assert!(matches!(
            parse_multiplex(&reply("AT+MUX?", &["+MUX: x"])),
            Err(Error::MalformedResponse { .. })
        ));
        assert!(parse_multiplex(&reply("AT+MUX?", &[])).is_err());
        assert!(parse_multiplex(&reply("AT+MUX?", &["+MUX: 0"])).is_err());
    }

    #[test]
    fn levels_with_blanks() {
        assert_eq!(
            parse_levels(&reply("AT+OUT?", &["+OUT: ,,HIGH,"])).unwrap(),
            vec![None, None, Some(true), None]
        );
        assert_eq!(
            parse_levels(&reply("IN?", &["LOW,high"])).unwrap(),
            vec![Some(false), Some(true)]
        );
        assert!(parse_levels(&reply("AT+IN?", &["+IN: ON"])).is_err());
    }

    #[test]
    fn number_reply() {
        assert_eq!(parse_number::<u8>(&reply("AT+ANT?", &["+ANT: 2"])).unwrap(), 2);
        assert_eq!(parse_number::<u16>(&reply("PWR?", &["500"])).unwrap(), 500);
        assert!(parse_number::<u8>(&reply("AT+ANT?", &[])).is_err());
    }

    #[test]
    fn identity_three_lines() {
        let id = parse_identity(&reply(
            "ATI",
            &["+SW: PULSAR_LR 0104", "+HW: PULSAR_LR 0200", "+SERIAL: 2020090817420000"],
        ))
        .unwrap();
        assert_eq!(id.firmware_name, "PULSAR_LR");
        assert_eq!(id.firmware_version, "0104");
        assert_eq!(id.firmware, FirmwareVersion::new(1, 4));
        assert_eq!(id.hardware_name, "PULSAR_LR");
        assert_eq!(id.hardware_version, "0200");
        assert_eq!(id.serial_number, "2020090817420000");
    }

    #[test]
    fn identity_falls_back_to_firmware_values() {
        let id = parse_identity(&reply("REV", &["QUASAR_MX 0312", "X"])).unwrap();
        assert_eq!(id.hardware_name, "QUASAR_MX");
        assert_eq!(id.hardware_version, "0312");
        assert_eq!(id.serial_number, "");
        assert_eq!(id.firmware, FirmwareVersion::new(3, 12));
    }

    #[test]
    fn identity_without_version_is_malformed() {
        assert!(matches!(
            parse_identity(&reply("ATI", &["+SW: PULSAR"])),
            Err(Error::MalformedResponse { .. })
        ));
        assert!(parse_identity(&reply("ATI", &[])).is_err());
    }

    #[test]
    fn expect_empty_reply() {
        assert!(expect_empty(&reply("AT+ANT=2", &[])).is_ok());
        assert!(expect_empty(&reply("AT+ANT=2", &["+ANT: 2"])).is_err());
    }
}
