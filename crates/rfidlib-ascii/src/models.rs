//! HF reader models spoken to over the ASCII dialect.
//!
//! | Model       | Baud    | TCP port | Antennas | In/Out | Power (mW) | Heartbeat |
//! |-------------|---------|----------|----------|--------|------------|-----------|
//! | QuasarMX    | 115200  | 10001    | 16       | 4 / 4  | 500..=4000 | Yes       |
//! | Deskid ISO  | 115200  | -        | 1        | 0 / 0  | -          | No        |
//! | Dwarf15     | 115200  | -        | 1        | 2 / 2  | 100..=200  | No        |
//!
//! The QuasarMX drives its sixteen ports through an external multiplexer.

use rfidlib_core::types::{FirmwareVersion, ProtocolDialect, ReaderModel, TagFamily};

const MANUFACTURER: &str = "Metratec";

pub fn quasar_mx() -> ReaderModel {
    ReaderModel {
        name: "QuasarMX",
        manufacturer: MANUFACTURER,
        protocol: ProtocolDialect::Ascii,
        family: TagFamily::Hf,
        default_baud_rate: 115_200,
        default_tcp_port: Some(10001),
        antenna_count: 16,
        input_pins: 4,
        output_pins: 4,
        power_range: Some(500..=4000),
        supports_heartbeat: true,
        input_events_since: Some(FirmwareVersion::new(3, 0)),
    }
}

/// USB desktop reader.
pub fn deskid_iso() -> ReaderModel {
    ReaderModel {
        name: "Deskid ISO",
        manufacturer: MANUFACTURER,
        protocol: ProtocolDialect::Ascii,
        family: TagFamily::Hf,
        default_baud_rate: 115_200,
        default_tcp_port: None,
        antenna_count: 1,
        input_pins: 0,
        output_pins: 0,
        power_range: None,
        supports_heartbeat: false,
        input_events_since: None,
    }
}

pub fn dwarf15() -> ReaderModel {
    ReaderModel {
        name: "Dwarf15",
        manufacturer: MANUFACTURER,
        protocol: ProtocolDialect::Ascii,
        family: TagFamily::Hf,
        default_baud_rate: 115_200,
        default_tcp_port: None,
        antenna_count: 1,
        input_pins: 2,
        output_pins: 2,
        power_range: Some(100..=200),
        supports_heartbeat: false,
        input_events_since: None,
    }
}

/// Every ASCII-dialect model.
pub fn all_ascii_models() -> Vec<ReaderModel> {
    vec![quasar_mx(), deskid_iso(), dwarf15()]
}
