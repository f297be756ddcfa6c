//! The plain ASCII dialect spoken by HF readers.
//!
//! Same command vocabulary as the AT dialect but without the `AT+` prefix,
//! no echo, and a bare `\r` terminator. Errors carry three-letter detail
//! codes (`ERROR <UCO>`). Inventory records:
//!
//! ```text
//! +CINV: E0040150954F02C8
//! +CINV: E0040150954F02C8,ISO15,00
//! +CINV: 04A2B3C4D5E680,ISO14A,08,0044
//! +CINV: E0040150954F02C8,<TNR>
//! ```

use tracing::debug;

use rfidlib_core::error::{Error, ReaderErrorCode, Result, TransponderErrorCode};
use rfidlib_core::tag::{InventoryReport, TagKind, TagSighting};
use rfidlib_line_io::commands::Command;
use rfidlib_line_io::dialect::Dialect;
use rfidlib_line_io::protocol::{extract_error_detail, reply_value};

/// ASCII dialect.
#[derive(Debug, Default, Clone, Copy)]
pub struct AsciiDialect;

impl AsciiDialect {
    pub fn new() -> Self {
        AsciiDialect
    }
}

/// Map a detail mnemonic to a reader or transponder error code.
pub fn detail_code(code: &str) -> Option<DetailCode> {
    use DetailCode::{Reader, Transponder};
    let mapped = match code {
        "UCO" => Reader(ReaderErrorCode::UnknownCommand),
        "WDL" | "EDX" | "NOS" => Reader(ReaderErrorCode::InvalidParameter),
        "NOR" => Reader(ReaderErrorCode::NotRunning),
        "ARH" | "ANT" => Reader(ReaderErrorCode::AntennaUnavailable),
        "BSY" | "ARU" => Reader(ReaderErrorCode::Busy),
        "TNR" => Transponder(TransponderErrorCode::NoTag),
        "TAE" | "ACE" => Transponder(TransponderErrorCode::AccessDenied),
        "TML" | "BLE" => Transponder(TransponderErrorCode::MemoryLocked),
        "TOR" => Transponder(TransponderErrorCode::MemoryOverrun),
        "TIP" => Transponder(TransponderErrorCode::InsufficientPower),
        "TCE" | "CER" => Transponder(TransponderErrorCode::Crc),
        "TOE" | "FLE" => Transponder(TransponderErrorCode::Other),
        _ => return None,
    };
    Some(mapped)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailCode {
    Reader(ReaderErrorCode),
    Transponder(TransponderErrorCode),
}

impl Dialect for AsciiDialect {
    fn name(&self) -> &'static str {
        "ascii"
    }

    fn line_terminator(&self) -> &'static str {
        "\r"
    }

    fn echo_prefix(&self) -> Option<&'static str> {
        None
    }

    fn encode(&self, command: &Command) -> String {
        command.body()
    }

    fn parse_inventory(&self, line: &str) -> Result<InventoryReport> {
        parse_hf_record(line)
    }

    fn classify_error(&self, command: &str, detail: &str) -> Error {
        let mnemonic = detail.trim().to_ascii_uppercase();
        match detail_code(&mnemonic) {
            Some(DetailCode::Reader(code)) => Error::Reader {
                command: command.into(),
                code,
                message: detail.into(),
            },
            Some(DetailCode::Transponder(code)) => Error::Transponder {
                command: command.into(),
                code,
                message: detail.into(),
            },
            None => Error::Reader {
                command: command.into(),
                code: ReaderErrorCode::Other,
                message: detail.into(),
            },
        }
    }
}

/// Parse one HF inventory record.
pub fn parse_hf_record(line: &str) -> Result<InventoryReport> {
    let malformed = || Error::MalformedResponse {
        command: "inventory".into(),
        response: line.to_string(),
    };
    let value = reply_value(line);
    if value.is_empty() {
        return Err(malformed());
    }

    if value.starts_with('<') {
        let detail = extract_error_detail(value).ok_or_else(malformed)?;
        let upper = detail.to_ascii_uppercase();
        if upper.starts_with("ROUND FINISHED") {
            return Ok(InventoryReport {
                sightings: Vec::new(),
                round_antenna: upper
                    .split_once("ANT=")
                    .and_then(|(_, n)| n.trim().parse().ok()),
            });
        }
        if !upper.starts_with("NO TAGS FOUND") {
            debug!(detail, "ignoring inventory status");
        }
        return Ok(InventoryReport::default());
    }

    let (fields, error) = match value.find('<') {
        Some(pos) => (
            value[..pos].trim_end_matches([',', ' ']),
            extract_error_detail(&value[pos..]).map(str::to_string),
        ),
        None => (value, None),
    };

    let parts: Vec<&str> = fields.split(',').map(str::trim).collect();
    let uid = parts[0];
    if !is_hex(uid) {
        return Err(malformed());
    }

    let kind = match &parts[1..] {
        [] => TagKind::Hf,
        ["ISO15"] => TagKind::Iso15 { dsfid: None },
        ["ISO15", dsfid] => TagKind::Iso15 {
            dsfid: Some(u8::from_str_radix(dsfid, 16).map_err(|_| malformed())?),
        },
        ["ISO14A", sak, atqa] => TagKind::Iso14a {
            sak: u8::from_str_radix(sak, 16).map_err(|_| malformed())?,
            atqa: u16::from_str_radix(atqa, 16).map_err(|_| malformed())?,
        },
        _ => return Err(malformed()),
    };

    let mut sighting = TagSighting::new(uid, kind);
    sighting.error = error;
    Ok(InventoryReport {
        sightings: vec![sighting],
        round_antenna: None,
    })
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfidlib_core::types::Multiplex;

    #[test]
    fn encodes_without_prefix() {
        let d = AsciiDialect::new();
        assert_eq!(d.encode(&Command::SetAntenna(2)), "ANT=2");
        assert_eq!(d.encode(&Command::GetMultiplex), "MUX?");
        assert_eq!(d.encode(&Command::SetMultiplex(Multiplex::Count(2))), "MUX=2");
        assert_eq!(d.encode(&Command::DeviceInfo), "REV");
        assert_eq!(d.encode(&Command::StartInventory), "CINV");
        assert_eq!(d.line_terminator(), "\r");
        assert!(d.echo_prefix().is_none());
    }

    #[test]
    fn generic_uid() {
        let report = parse_hf_record("+CINV: E0040150954F02C8").unwrap();
        assert_eq!(report.sightings[0].id, "E0040150954F02C8");
        assert_eq!(report.sightings[0].kind, TagKind::Hf);
    }

    #[test]
    fn iso15_with_dsfid() {
        let report = parse_hf_record("+CINV: E0040150954F02C8,ISO15,1F").unwrap();
        assert_eq!(report.sightings[0].kind, TagKind::Iso15 { dsfid: Some(0x1F) });
    }

    #[test]
    fn iso14a_with_sak_and_atqa() {
        let report = parse_hf_record("+CINV: 04A2B3C4D5E680,ISO14A,08,0044").unwrap();
        assert_eq!(
            report.sightings[0].kind,
            TagKind::Iso14a {
                sak: 0x08,
                atqa: 0x0044
            }
        );
    }

    #[test]
    fn tag_error_field() {
        let report = parse_hf_record("+CINV: E004,<TNR>").unwrap();
        assert_eq!(report.sightings[0].error.as_deref(), Some("TNR"));
    }

    #[test]
    fn status_records() {
        assert!(parse_hf_record("+CINV: <NO TAGS FOUND>").unwrap().is_empty());
        assert_eq!(
            parse_hf_record("+CINV: <ROUND FINISHED, ANT=1>")
                .unwrap()
                .round_antenna,
            Some(1)
        );
    }

    #[test]
    fn malformed_records() {
        assert!(parse_hf_record("+CINV: E004,ISO14A,08").is_err());
        assert!(parse_hf_record("+CINV: E004,ISO15,ZZ").is_err());
        assert!(parse_hf_record("+CINV: nope").is_err());
        assert!(parse_hf_record("+CINV:").is_err());
    }

    #[test]
    fn detail_codes() {
        let d = AsciiDialect;
        assert_eq!(
            d.classify_error("ANT=9", "ARH").reader_code(),
            Some(ReaderErrorCode::AntennaUnavailable)
        );
        assert_eq!(
            d.classify_error("BINV", "NOR").reader_code(),
            Some(ReaderErrorCode::NotRunning)
        );
        assert_eq!(
            d.classify_error("XYZ", "UCO").reader_code(),
            Some(ReaderErrorCode::UnknownCommand)
        );
        match d.classify_error("RDT", "TNR") {
            Error::Transponder { code, .. } => assert_eq!(code, TransponderErrorCode::NoTag),
            other => panic!("expected transponder error, got {other:?}"),
        }
        assert_eq!(
            d.classify_error("X", "QQQ").reader_code(),
            Some(ReaderErrorCode::Other)
        );
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn arbitrary_records_never_panic(line in "\\+CINV: [ -~]{0,40}") {
                let _ = parse_hf_record(&line);
            }
        }
    }
}
