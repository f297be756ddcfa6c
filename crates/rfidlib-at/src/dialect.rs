//! The AT-command dialect spoken by UHF readers.
//!
//! Commands are `AT+`-prefixed and echoed back before the reply. Data lines
//! carry a `+NAME:` header. Inventory records look like
//!
//! ```text
//! +CINV: 3000E2001234567890ABCDEF
//! +CINV: 3000E2001234567890ABCDEF,E2801160200074CF085B0B0D,-61
//! +CINV: 3000E2001234567890ABCDEF,ANT=2
//! +CINV: 3000E2001234567890ABCDEF,<ACCESS ERROR>
//! +CINV: <NO TAGS FOUND>
//! +CINV: <ROUND FINISHED, ANT=2>
//! ```

use tracing::debug;

use rfidlib_core::error::{Error, ReaderErrorCode, Result, TransponderErrorCode};
use rfidlib_core::tag::{InventoryReport, TagKind, TagSighting};
use rfidlib_line_io::commands::Command;
use rfidlib_line_io::dialect::Dialect;
use rfidlib_line_io::protocol::{extract_error_detail, reply_value};

/// AT-command dialect.
#[derive(Debug, Default, Clone, Copy)]
pub struct AtDialect;

impl AtDialect {
    pub fn new() -> Self {
        AtDialect
    }
}

/// Transponder fault wording, checked before reader faults.
const TRANSPONDER_DETAILS: &[(&str, TransponderErrorCode)] = &[
    ("NO TAG", TransponderErrorCode::NoTag),
    ("ACCESS", TransponderErrorCode::AccessDenied),
    ("WRONG PASSWORD", TransponderErrorCode::AccessDenied),
    ("LOCKED", TransponderErrorCode::MemoryLocked),
    ("OVERRUN", TransponderErrorCode::MemoryOverrun),
    ("INSUFFICIENT POWER", TransponderErrorCode::InsufficientPower),
    ("CRC", TransponderErrorCode::Crc),
    ("TAG", TransponderErrorCode::Other),
];

const READER_DETAILS: &[(&str, ReaderErrorCode)] = &[
    ("NOT RUNNING", ReaderErrorCode::NotRunning),
    ("UNKNOWN COMMAND", ReaderErrorCode::UnknownCommand),
    ("ANTENNA", ReaderErrorCode::AntennaUnavailable),
    ("BUSY", ReaderErrorCode::Busy),
    ("ALREADY RUNNING", ReaderErrorCode::Busy),
    ("PARAMETER", ReaderErrorCode::InvalidParameter),
    ("OUT OF RANGE", ReaderErrorCode::InvalidParameter),
];

impl Dialect for AtDialect {
    fn name(&self) -> &'static str {
        "at"
    }

    fn line_terminator(&self) -> &'static str {
        "\r\n"
    }

    fn echo_prefix(&self) -> Option<&'static str> {
        Some("AT")
    }

    fn encode(&self, command: &Command) -> String {
        match command {
            Command::DeviceInfo => "ATI".into(),
            other => format!("AT+{}", other.body()),
        }
    }

    fn parse_inventory(&self, line: &str) -> Result<InventoryReport> {
        parse_uhf_record(line)
    }

    fn classify_error(&self, command: &str, detail: &str) -> Error {
        let upper = detail.to_ascii_uppercase();
        // Antenna wording wins over the generic "TAG" match below.
        if let Some((_, code)) = READER_DETAILS
            .iter()
            .find(|(needle, _)| upper.contains(needle))
        {
            return Error::Reader {
                command: command.into(),
                code: *code,
                message: detail.into(),
            };
        }
        if let Some((_, code)) = TRANSPONDER_DETAILS
            .iter()
            .find(|(needle, _)| upper.contains(needle))
        {
            return Error::Transponder {
                command: command.into(),
                code: *code,
                message: detail.into(),
            };
        }
        Error::Reader {
            command: command.into(),
            code: ReaderErrorCode::Other,
            message: detail.into(),
        }
    }
}

/// Parse one `+CINV:`/`+INV:` record.
pub fn parse_uhf_record(line: &str) -> Result<InventoryReport> {
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
        return Ok(parse_status_record(detail));
    }

    // A trailing `<…>` segment is a per-tag error and may contain commas.
    let (fields, error) = match value.find('<') {
        Some(pos) => (
            value[..pos].trim_end_matches([',', ' ']),
            extract_error_detail(&value[pos..]).map(str::to_string),
        ),
        None => (value, None),
    };

    let mut parts = fields.split(',').map(str::trim);
    let epc = parts.next().filter(|e| is_hex(e)).ok_or_else(malformed)?;

    let mut sighting = TagSighting::new(epc, TagKind::Uhf { rssi: None });
    sighting.error = error;
    let mut rssi = None;

    for field in parts.filter(|f| !f.is_empty()) {
        if let Some(ant) = field.strip_prefix("ANT=") {
            sighting.antenna = Some(ant.trim().parse().map_err(|_| malformed())?);
        } else if let Some(value) = parse_rssi(field) {
            rssi = Some(value);
        } else if is_hex(field) {
            sighting.tid = Some(field.to_string());
        } else {
            return Err(malformed());
        }
    }
    sighting.kind = TagKind::Uhf { rssi };

    Ok(InventoryReport {
        sightings: vec![sighting],
        round_antenna: None,
    })
}

/// `<NO TAGS FOUND>`, `<ROUND FINISHED, ANT=2>`, or anything else bracketed.
fn parse_status_record(detail: &str) -> InventoryReport {
    let upper = detail.to_ascii_uppercase();
    if upper.starts_with("ROUND FINISHED") {
        let round_antenna = upper
            .split_once("ANT=")
            .and_then(|(_, n)| n.trim().parse().ok());
        return InventoryReport {
            sightings: Vec::new(),
            round_antenna,
        };
    }
    if !upper.starts_with("NO TAGS FOUND") {
        debug!(detail, "ignoring inventory status");
    }
    InventoryReport::default()
}

/// RSSI is a short signed decimal; TIDs are long hex strings.
fn parse_rssi(field: &str) -> Option<i16> {
    if field.len() > 4 {
        return None;
    }
    field.parse().ok()
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}
