//! Module state and SFP status codes.
//!
//! The platform reports each cage as a raw string: `"0"` removed, `"1"`
//! inserted, anything else a bitmap of error bits. The bits below form the
//! block-set: while any of them is set, diagnostic sampling of the module is
//! suppressed.

use std::fmt;
use tokio::sync::mpsc;

/// Status codes written to `TRANSCEIVER_STATUS.status`.
pub mod codes {
    pub const REMOVED: u32 = 0;
    pub const INSERTED: u32 = 1;
    pub const I2C_STUCK: u32 = 0x2;
    pub const BAD_EEPROM: u32 = 0x4;
    pub const UNSUPPORTED_CABLE: u32 = 0x8;
    pub const HIGH_TEMP: u32 = 0x10;
    pub const BAD_CABLE: u32 = 0x20;

    /// Errors that suppress diagnostic sampling.
    pub const BLOCK_MASK: u32 = I2C_STUCK | BAD_EEPROM | UNSUPPORTED_CABLE | HIGH_TEMP | BAD_CABLE;
}

const ERROR_NAMES: [(u32, &str); 5] = [
    (codes::I2C_STUCK, "Bus stuck (I2C data or clock shorted)"),
    (codes::BAD_EEPROM, "Bad or unsupported EEPROM"),
    (codes::UNSUPPORTED_CABLE, "Unsupported cable"),
    (codes::HIGH_TEMP, "High temperature"),
    (codes::BAD_CABLE, "Bad cable (module/cable is shorted)"),
];

/// Human-readable description of an error code.
pub fn error_description(code: u32) -> String {
    let names: Vec<&str> = ERROR_NAMES
        .iter()
        .filter(|(bit, _)| code & bit != 0)
        .map(|(_, name)| *name)
        .collect();
    if names.is_empty() {
        "Unknown error".to_string()
    } else {
        names.join("|")
    }
}

/// True if `code` carries any error bit of the block-set.
pub fn is_blocking(code: u32) -> bool {
    code >= 2 && code & codes::BLOCK_MASK != 0
}

/// True if a `TRANSCEIVER_STATUS.status` value suppresses sampling.
pub fn status_blocks_sampling(status: &str) -> bool {
    status.trim().parse::<u32>().map(is_blocking).unwrap_or(false)
}

/// State of one physical module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleState {
    Absent,
    Present,
    Error(u32),
}

impl ModuleState {
    /// Parses a raw state string from the change-event source.
    pub fn from_raw(raw: &str) -> Option<Self> {
        match raw.trim().parse::<u32>().ok()? {
            codes::REMOVED => Some(ModuleState::Absent),
            codes::INSERTED => Some(ModuleState::Present),
            code => Some(ModuleState::Error(code)),
        }
    }

    /// Numeric status code.
    pub fn code(&self) -> u32 {
        match self {
            ModuleState::Absent => codes::REMOVED,
            ModuleState::Present => codes::INSERTED,
            ModuleState::Error(code) => *code,
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleState::Absent => f.write_str("absent"),
            ModuleState::Present => f.write_str("present"),
            ModuleState::Error(code) => write!(f, "error({})", code),
        }
    }
}

/// A confirmed module transition on a physical port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortChangeEvent {
    pub physical: u32,
    pub state: ModuleState,
}

/// Receives confirmed module transitions from the state event loop.
///
/// Called from the state loop's own thread; implementations must not block.
pub trait ChangeEventSink: Send + Sync {
    fn notify(&self, event: PortChangeEvent);
}

impl ChangeEventSink for mpsc::UnboundedSender<PortChangeEvent> {
    fn notify(&self, event: PortChangeEvent) {
        // receiver gone means the controller already stopped
        let _ = self.send(event);
    }
}
