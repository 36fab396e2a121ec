//! Catalog of supported wristband models and their GATT layout.

use crate::domain::models::{Characteristic, CharacteristicTag, Profile, ProfileType};
use crate::error::RegistryError;
use crate::infrastructure::bluetooth::protocol::{HISTORY_CHAR_UUID, SERVICE_UUID, STEPS_CHAR_UUID};
use std::collections::BTreeSet;

/// Lookup of wristband profiles by advertised peripheral name.
pub trait DeviceRegistry {
    /// Every service id of every known profile, de-duplicated.
    fn list_service_ids(&self) -> BTreeSet<String>;

    fn profile_by_name(&self, peripheral_name: &str) -> Result<Profile, RegistryError>;

    fn characteristic_by_tag(
        &self,
        peripheral_name: &str,
        tag: CharacteristicTag,
    ) -> Result<Characteristic, RegistryError> {
        let profile = self.profile_by_name(peripheral_name)?;
        profile
            .characteristic(tag)
            .cloned()
            .ok_or_else(|| RegistryError::CharacteristicNotFound {
                peripheral_name: peripheral_name.to_string(),
                tag,
            })
    }
}

/// Static table of profiles fixed at construction.
#[derive(Debug, Clone)]
pub struct ProfileTable {
    profiles: Vec<Profile>,
}

impl ProfileTable {
    pub fn new(profiles: Vec<Profile>) -> Self {
        Self { profiles }
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    fn wristband(name: &str, profile_type: ProfileType) -> Profile {
        Profile {
            peripheral_name: name.to_string(),
            service_id: SERVICE_UUID.to_string(),
            profile_type,
            characteristics: vec![
                Characteristic::new(CharacteristicTag::A, HISTORY_CHAR_UUID),
                Characteristic::new(CharacteristicTag::B, STEPS_CHAR_UUID),
            ],
        }
    }
}

impl Default for ProfileTable {
    /// The PR102 kids band and the B002 adults band.
    fn default() -> Self {
        Self::new(vec![
            Self::wristband("PR102", ProfileType::Kids),
            Self::wristband("B002", ProfileType::Adults),
        ])
    }
}

impl DeviceRegistry for ProfileTable {
    fn list_service_ids(&self) -> BTreeSet<String> {
        self.profiles
            .iter()
            .map(|p| p.service_id.clone())
            .collect()
    }

    fn profile_by_name(&self, peripheral_name: &str) -> Result<Profile, RegistryError> {
        self.profiles
            .iter()
            .find(|p| p.peripheral_name == peripheral_name)
            .cloned()
            .ok_or_else(|| RegistryError::ProfileNotFound(peripheral_name.to_string()))
    }
}
