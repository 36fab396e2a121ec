//! BLE Connection State
//!
//! Link phase, protocol flags and the precondition checks guarding every
//! wristband operation.

use crate::domain::models::{Profile, ProtocolStatus};
use std::fmt;

/// Where the protocol is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Uninitialized,
    Initializing,
    /// Initialized, no link
    Idle,
    Scanning,
    /// Matching device found, waiting for its GATT table
    Connecting,
    Subscribing,
    /// Connected with a resolved profile
    Ready,
    ReadingToday,
    ReadingHistory {
        day: u8,
    },
    WritingSettings,
    ClearingHistory,
    Disconnecting,
    Deinitializing,
}

impl Phase {
    /// Phases that are waiting on the transport.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Uninitialized | Self::Idle | Self::Ready)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadingHistory { day } => write!(f, "ReadingHistory(day={})", day),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Mutable protocol state. Reset wholesale on disconnect.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    pub phase: Phase,
    pub initialized: bool,
    pub profile_found: bool,
    pub connected: bool,
    pub history_retrieved: bool,
    pub busy: bool,
    pub connected_profile: Option<Profile>,
    pub peripheral_id: Option<String>,
    pub peripheral_name: Option<String>,
    pub retry_count: u32,
    pub days_returned: u8,
    /// Characteristic whose read/write/notification is awaited
    pub expected_characteristic: Option<String>,
    /// A transport teardown is still to be confirmed
    pub deinit_pending: bool,
}

impl ConnectionState {
    pub fn has_profile(&self) -> bool {
        self.connected_profile.is_some()
    }

    /// Move to `phase` and keep `busy` in step with it.
    pub fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.busy = phase.is_transient();
    }

    /// Forget the current link but stay initialized. A pending
    /// (de)initialization keeps its phase.
    pub fn clear_link(&mut self) {
        self.profile_found = false;
        self.connected = false;
        self.history_retrieved = false;
        self.connected_profile = None;
        self.retry_count = 0;
        self.days_returned = 0;
        self.expected_characteristic = None;
        if matches!(self.phase, Phase::Initializing | Phase::Deinitializing) {
            return;
        }
        let phase = if self.initialized {
            Phase::Idle
        } else {
            Phase::Uninitialized
        };
        self.enter(phase);
    }

    pub fn is_met(&self, precondition: Precondition) -> bool {
        match precondition {
            Precondition::NotBusy => !self.busy,
            Precondition::Initialized => self.initialized,
            Precondition::HasProfile => self.has_profile(),
            Precondition::Discovered => self.profile_found,
            Precondition::Connected => self.connected,
            Precondition::HasHistory => self.history_retrieved,
        }
    }

    /// Fragments of every unmet precondition, concatenated in order.
    /// Empty when all are met.
    pub fn describe_unmet(&self, preconditions: &[Precondition]) -> String {
        preconditions
            .iter()
            .filter(|p| !self.is_met(**p))
            .map(|p| p.fragment())
            .collect()
    }

    pub fn status(&self) -> ProtocolStatus {
        ProtocolStatus {
            initialized: self.initialized,
            connected: self.connected,
            discovered: self.profile_found,
            has_profile: self.has_profile(),
            has_history: self.history_retrieved,
            busy: self.busy,
        }
    }
}

/// Condition an operation requires before it may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    NotBusy,
    Initialized,
    HasProfile,
    Discovered,
    Connected,
    HasHistory,
}

impl Precondition {
    /// Diagnostic text reported when the condition is not met.
    pub fn fragment(&self) -> &'static str {
        match self {
            Self::NotBusy => "Is busy at the moment!",
            Self::Initialized => "Not initialized! ",
            Self::HasProfile => "Has no matching profile! ",
            Self::Discovered => "Device is not discovered! ",
            Self::Connected => "Device is not connected! ",
            Self::HasHistory => "No available history! ",
        }
    }
}

/// Required by reading steps and by writing settings.
pub const LINK_PRECONDITIONS: [Precondition; 5] = [
    Precondition::NotBusy,
    Precondition::Initialized,
    Precondition::HasProfile,
    Precondition::Discovered,
    Precondition::Connected,
];

/// Required by clearing the stored history.
pub const CLEAR_HISTORY_PRECONDITIONS: [Precondition; 6] = [
    Precondition::NotBusy,
    Precondition::Initialized,
    Precondition::HasProfile,
    Precondition::Discovered,
    Precondition::Connected,
    Precondition::HasHistory,
];
