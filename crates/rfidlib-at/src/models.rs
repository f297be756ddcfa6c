//! UHF reader models spoken to over the AT-command dialect.
//!
//! Models are factory functions returning a populated [`ReaderModel`]:
//!
//! | Model       | Baud    | TCP port | Antennas | In/Out | Power (dBm) | Heartbeat |
//! |-------------|---------|----------|----------|--------|-------------|-----------|
//! | Pulsar LR   | 115200  | 10001    | 4        | 2 / 4  | 0..=31      | Yes       |
//! | QR G2       | 115200  | -        | 1        | 1 / 1  | 0..=27      | Yes       |
//! | Deskid UHF  | 115200  | -        | 1        | 0 / 0  | -           | No        |
//! | Dwarf G2    | 115200  | -        | 1        | 1 / 1  | 0..=27      | No        |
//!
//! Input-change notifications arrived with firmware 1.04 on the Pulsar LR.

use rfidlib_core::types::{FirmwareVersion, ProtocolDialect, ReaderModel, TagFamily};

const MANUFACTURER: &str = "Metratec";

/// Long-range four-port UHF reader with Ethernet and serial links.
pub fn pulsar_lr() -> ReaderModel {
    ReaderModel {
        name: "Pulsar LR",
        manufacturer: MANUFACTURER,
        protocol: ProtocolDialect::At,
        family: TagFamily::Uhf,
        default_baud_rate: 115_200,
        default_tcp_port: Some(10001),
        antenna_count: 4,
        input_pins: 2,
        output_pins: 4,
        power_range: Some(0..=31),
        supports_heartbeat: true,
        input_events_since: Some(FirmwareVersion::new(1, 4)),
    }
}

pub fn qr_g2() -> ReaderModel {
    ReaderModel {
        name: "QR G2",
        manufacturer: MANUFACTURER,
        protocol: ProtocolDialect::At,
        family: TagFamily::Uhf,
        default_baud_rate: 115_200,
        default_tcp_port: None,
        antenna_count: 1,
        input_pins: 1,
        output_pins: 1,
        power_range: Some(0..=27),
        supports_heartbeat: true,
        input_events_since: None,
    }
}

/// USB desktop reader; no IO pins.
pub fn deskid_uhf() -> ReaderModel {
    ReaderModel {
        name: "Deskid UHF",
        manufacturer: MANUFACTURER,
        protocol: ProtocolDialect::At,
        family: TagFamily::Uhf,
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

pub fn dwarf_g2() -> ReaderModel {
    ReaderModel {
        name: "Dwarf G2",
        manufacturer: MANUFACTURER,
        protocol: ProtocolDialect::At,
        family: TagFamily::Uhf,
        default_baud_rate: 115_200,
        default_tcp_port: None,
        antenna_count: 1,
        input_pins: 1,
        output_pins: 1,
        power_range: Some(0..=27),
        supports_heartbeat: false,
        input_events_since: None,
    }
}

/// Every AT-dialect model.
pub fn all_at_models() -> Vec<ReaderModel> {
    vec![pulsar_lr(), qr_g2(), deskid_uhf(), dwarf_g2()]
}
