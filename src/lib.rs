//! # wristband_sync
//!
//! Step and settings sync with BLE fitness wristbands.
//!
//! The radio is injected through [`BleTransport`](infrastructure::bluetooth::BleTransport);
//! [`WristbandProtocol`](infrastructure::bluetooth::WristbandProtocol) drives the
//! wristband through its lifecycle and reports every step to
//! [`WristbandObserver`](domain::observer::WristbandObserver)s.
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`prelude`] | One-line glob import of the commonly needed types |
//! | [`domain`] | Profiles, events, step data, observers, settings and body metrics |
//! | [`infrastructure`] | Protocol state machine, BLE seam, simulator and logging |
//! | [`error`] | Error types returned to callers |

pub mod domain;
pub mod error;
pub mod infrastructure;

// ── Prelude ───────────────────────────────────────────────────────────────────

/// Convenience re-exports for downstream crates.
///
/// ```no_run
/// use wristband_sync::prelude::*;
///
/// # fn demo(transport: impl BleTransport) {
/// let mut protocol = WristbandProtocol::new(transport);
/// protocol.subscribe(std::sync::Arc::new(EventLog::new()));
/// protocol.initialize();
/// # }
/// ```
pub mod prelude {
    pub use crate::domain::models::{
        Characteristic, CharacteristicTag, ErrorCode, Profile, ProfileType, ProtocolStatus,
        StepsDay, WristbandEvent,
    };
    pub use crate::domain::observer::{ChannelObserver, EventLog, ObserverBus, WristbandObserver};
    pub use crate::domain::registry::{DeviceRegistry, ProfileTable};
    pub use crate::domain::settings::{ProtocolSettings, Settings, SettingsService, UserProfile};
    pub use crate::domain::steps::StepsData;
    pub use crate::error::{CalculationError, RegistryError, WristbandError};
    pub use crate::infrastructure::bluetooth::simulator::SimulatedWristband;
    pub use crate::infrastructure::bluetooth::{
        BleTransport, SyncService, TransportEvent, WristbandProtocol,
    };
}
