//! BLE Scanner Module
//!
//! Decides which advertising peripherals are wristbands worth connecting to.

use tracing::debug;

/// Advertised names of the supported wristband models.
pub const TRACKER_NAMES: [&str; 2] = ["PR102", "B002"];

/// Outcome of looking at one discovered peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    /// Supported model, connect to it
    Tracker { id: String, name: String },
    /// Anything else advertising our service
    Unknown { id: String, name: String },
}

pub fn is_tracker_name(name: &str) -> bool {
    TRACKER_NAMES.contains(&name)
}

/// Sort a discovered peripheral by its advertised name.
pub fn classify(id: &str, name: &str) -> Discovery {
    let (id, name) = (id.to_string(), name.to_string());
    if is_tracker_name(&name) {
        debug!("Tracker discovered: {} ({})", name, id);
        Discovery::Tracker { id, name }
    } else {
        debug!("Ignoring peripheral: {:?} ({})", name, id);
        Discovery::Unknown { id, name }
    }
}
