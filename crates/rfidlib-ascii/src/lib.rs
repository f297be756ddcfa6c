//! ASCII dialect for HF readers.
//!
//! - **Dialect** ([`dialect`]) -- bare mnemonics terminated by `\r`, HF
//!   inventory records (generic, ISO 15693, ISO 14443-A) and three-letter
//!   error codes.
//! - **Model definitions** ([`models`]) -- capability records for the
//!   supported readers (QuasarMX, Deskid ISO, Dwarf15).

pub mod dialect;
pub mod models;

pub use dialect::AsciiDialect;
pub use models::all_ascii_models;
