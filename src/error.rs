use crate::domain::models::CharacteristicTag;
use thiserror::Error;

/// Lookup failure in the device registry.
///
/// The protocol only connects to allowlisted tracker names, so a miss here
/// means the allowlist and the configured profiles have drifted apart.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("profile '{0}' not found")]
    ProfileNotFound(String),

    #[error("characteristic {tag:?} not found for profile '{peripheral_name}'")]
    CharacteristicNotFound {
        peripheral_name: String,
        tag: CharacteristicTag,
    },
}

/// Error type for body-metric calculations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalculationError {
    #[error("invalid date of birth '{0}': expected yyyy-mm-dd")]
    InvalidDateOfBirth(String),

    #[error("date of birth {0} is after the reference date")]
    DateOfBirthInFuture(String),
}

/// Errors returned directly to the caller of a protocol operation.
///
/// Recoverable protocol failures are reported through
/// [`WristbandEvent::Error`](crate::domain::models::WristbandEvent::Error)
/// instead; these are contract violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WristbandError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Calculation(#[from] CalculationError),

    #[error("no connected profile")]
    NoConnectedProfile,
}
