use crate::domain::steps::StepsData;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Product line of a supported wristband.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProfileType {
    Kids,
    Adults,
}

/// Role of a characteristic within a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharacteristicTag {
    /// Settings write (also carries history requests and the clear command)
    A,
    /// Steps read
    B,
    /// Reserved
    C,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Characteristic {
    pub tag: CharacteristicTag,
    pub id: String,
}

impl Characteristic {
    pub fn new(tag: CharacteristicTag, id: impl Into<String>) -> Self {
        Self { tag, id: id.into() }
    }
}

/// GATT layout of one supported wristband model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub peripheral_name: String,
    pub service_id: String,
    pub profile_type: ProfileType,
    pub characteristics: Vec<Characteristic>,
}

impl Profile {
    pub fn characteristic(&self, tag: CharacteristicTag) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.tag == tag)
    }
}

/// Error taxonomy reported through [`WristbandEvent::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InitializationFailed,
    ConnectionFailed,
    ReadStepsFailed,
    SetWristbandFailed,
    ClearHistoryFailed,
    InvalidNumberOfSteps,
    NotificationSubscriptionFailed,
    UnknownDeviceDetected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InitializationFailed => "INITIALIZATION_FAILED",
            Self::ConnectionFailed => "CONNECTION_FAILED",
            Self::ReadStepsFailed => "READ_STEPS_FAILED",
            Self::SetWristbandFailed => "SET_WRISTBAND_FAILED",
            Self::ClearHistoryFailed => "CLEAR_HISTORY_FAILED",
            Self::InvalidNumberOfSteps => "INVALID_NUMBER_OF_STEPS",
            Self::NotificationSubscriptionFailed => "NOTIFICATION_SUBSCRIPTION_FAILED",
            Self::UnknownDeviceDetected => "UNKNOWN_DEVICE_DETECTED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle notification broadcast by the wristband protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum WristbandEvent {
    BluetoothInitialized,
    BluetoothDeInitialized,
    Error {
        code: ErrorCode,
        message: String,
    },
    DebugMessage(String),
    Connected {
        peripheral_id: String,
        peripheral_name: String,
        profile: Profile,
    },
    Disconnected,
    ProfileFound {
        peripheral_id: String,
        peripheral_name: String,
    },
    UnknownProfile {
        peripheral_id: String,
        peripheral_name: String,
    },
    StepsCollected(StepsData),
    WriteComplete,
}

impl WristbandEvent {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Error { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for WristbandEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BluetoothInitialized => write!(f, "bluetooth initialized"),
            Self::BluetoothDeInitialized => write!(f, "bluetooth deinitialized"),
            Self::Error { code, message } => write!(f, "error [{}] > {}", code, message),
            Self::DebugMessage(msg) => write!(f, "debug > {}", msg),
            Self::Connected {
                peripheral_id,
                peripheral_name,
                profile,
            } => write!(
                f,
                "connected > name: {}, id: {}, profile: {:?}",
                peripheral_name, peripheral_id, profile.profile_type
            ),
            Self::Disconnected => write!(f, "disconnected"),
            Self::ProfileFound {
                peripheral_id,
                peripheral_name,
            } => write!(
                f,
                "profile found > name: {}, id: {}",
                peripheral_name, peripheral_id
            ),
            Self::UnknownProfile {
                peripheral_id,
                peripheral_name,
            } => write!(
                f,
                "unknown profile > name: {}, id: {}",
                peripheral_name, peripheral_id
            ),
            Self::StepsCollected(steps) => {
                write!(f, "steps collected > {}", steps.total_steps_walked())
            }
            Self::WriteComplete => write!(f, "write complete"),
        }
    }
}

/// One fully decoded day, used for reporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepsDay {
    pub steps: i64,
    /// "yyyy-mm-dd"
    pub day: String,
    /// Minutes
    pub exercise_time: i64,
    /// Meters
    pub distance: i64,
    pub calories_burned: f64,
}

impl StepsDay {
    pub fn new(steps: i64, day: impl Into<String>, exercise_time: i64) -> Self {
        Self {
            steps,
            day: day.into(),
            exercise_time,
            ..Default::default()
        }
    }

    pub fn format_compact(&self) -> String {
        format!(
            "[D{} S{} T{} A{} C{}]",
            self.day, self.steps, self.exercise_time, self.distance, self.calories_burned
        )
    }

    /// Subtracts another day's totals from this one. The date is kept.
    pub fn subtract(&mut self, other: &StepsDay) -> &mut Self {
        self.steps -= other.steps;
        self.exercise_time -= other.exercise_time;
        self.distance -= other.distance;
        self.calories_burned -= other.calories_burned;
        self
    }
}

pub fn find_by_date<'a>(day: &str, days: &'a [StepsDay]) -> Option<&'a StepsDay> {
    days.iter().find(|d| d.day == day)
}

pub fn index_of(day: &StepsDay, days: &[StepsDay]) -> Option<usize> {
    days.iter().position(|d| d.day == day.day)
}

/// Snapshot of the protocol flags, for status displays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtocolStatus {
    pub initialized: bool,
    pub connected: bool,
    pub discovered: bool,
    pub has_profile: bool,
    pub has_history: bool,
    pub busy: bool,
}
