//! Wristband Protocol
//!
//! Drives one wristband through initialize, scan, connect, subscribe, read or
//! write and disconnect on top of a [`BleTransport`]. Requests are issued
//! without waiting; every transport callback comes back as a
//! [`TransportEvent`] and is handled by a named transition below.
//!
//! At most one multi-step operation runs at a time. A request made while
//! another is in flight is rejected with an error event, never queued.

use crate::domain::calculations;
use crate::domain::models::{
    CharacteristicTag, ErrorCode, ProfileType, ProtocolStatus, WristbandEvent,
};
use crate::domain::observer::{ObserverBus, WristbandObserver};
use crate::domain::registry::{DeviceRegistry, ProfileTable};
use crate::domain::settings::{ProtocolSettings, UserProfile};
use crate::domain::steps::StepsData;
use crate::error::WristbandError;
use crate::infrastructure::bluetooth::connection::{
    ConnectionState, Phase, Precondition, CLEAR_HISTORY_PRECONDITIONS, LINK_PRECONDITIONS,
};
use crate::infrastructure::bluetooth::protocol::{
    self, uuid_eq, CLEAR_HISTORY_COMMAND, HISTORY_CHAR_UUID, SERVICE_UUID, SETTINGS_LEN,
};
use crate::infrastructure::bluetooth::scanner::{self, Discovery};
use crate::infrastructure::bluetooth::transport::{BleTransport, TransportEvent};
use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

const READ_STEPS_FAILED: &str =
    "read_steps_and_exercise_time :: couldn't read steps -> possible reason(s): ";
const SET_SETTINGS_FAILED: &str =
    "set_clock_and_user_settings :: couldn't write settings -> possible reason(s): ";
const CLEAR_HISTORY_FAILED: &str =
    "clear_history :: couldn't clear history -> possible reason(s): ";

/// Device, service and characteristic addressed by one request.
struct Link {
    device: String,
    service: String,
    characteristic: String,
}

/// Protocol state machine for a single wristband.
pub struct WristbandProtocol<T: BleTransport, R: DeviceRegistry = ProfileTable> {
    transport: T,
    registry: R,
    bus: Arc<ObserverBus>,
    settings: ProtocolSettings,
    state: ConnectionState,
    steps: StepsData,
}

impl<T: BleTransport> WristbandProtocol<T> {
    /// Protocol for the built-in wristband models with default tuning.
    pub fn new(transport: T) -> Self {
        Self::with_parts(transport, ProfileTable::default(), ProtocolSettings::default())
    }
}

impl<T: BleTransport, R: DeviceRegistry> WristbandProtocol<T, R> {
    pub fn with_parts(transport: T, registry: R, settings: ProtocolSettings) -> Self {
        Self {
            transport,
            registry,
            bus: Arc::new(ObserverBus::new()),
            settings,
            state: ConnectionState::default(),
            steps: StepsData::new(),
        }
    }

    /// Shared handle to the observer list.
    pub fn observers(&self) -> Arc<ObserverBus> {
        Arc::clone(&self.bus)
    }

    pub fn subscribe(&self, observer: Arc<dyn WristbandObserver>) {
        self.bus.subscribe(observer);
    }

    pub fn unsubscribe(&self, observer: &Arc<dyn WristbandObserver>) -> bool {
        self.bus.unsubscribe(observer)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    // ------------------------------------------------------------------
    // State queries
    // ------------------------------------------------------------------

    pub fn is_initialized(&self) -> bool {
        self.state.initialized
    }

    pub fn has_profile(&self) -> bool {
        self.state.has_profile()
    }

    pub fn has_discovered_device(&self) -> bool {
        self.state.profile_found
    }

    pub fn is_connected(&self) -> bool {
        self.state.connected
    }

    pub fn has_history(&self) -> bool {
        self.state.history_retrieved
    }

    pub fn is_busy(&self) -> bool {
        self.state.busy
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn status(&self) -> ProtocolStatus {
        self.state.status()
    }

    pub fn connected_profile_type(&self) -> Option<ProfileType> {
        self.state
            .connected_profile
            .as_ref()
            .map(|profile| profile.profile_type)
    }

    pub fn peripheral_id(&self) -> Option<&str> {
        self.state.peripheral_id.as_deref()
    }

    pub fn peripheral_name(&self) -> Option<&str> {
        self.state.peripheral_name.as_deref()
    }

    /// Data of the last read cycle.
    pub fn steps(&self) -> &StepsData {
        &self.steps
    }

    /// Peripherals known to the transport; empty until initialized.
    pub fn device_list(&self) -> Vec<String> {
        if self.state.initialized {
            self.transport.device_list()
        } else {
            Vec::new()
        }
    }

    // ------------------------------------------------------------------
    // Init / connect
    // ------------------------------------------------------------------

    /// Bring up the BLE central. Calling it again once initialized only
    /// repeats the `BluetoothInitialized` event.
    pub fn initialize(&mut self) {
        if self.state.initialized {
            debug!("BLE central already initialized");
            self.emit(WristbandEvent::BluetoothInitialized);
            return;
        }
        if self.state.phase == Phase::Initializing {
            debug!("BLE central initialization already pending");
            return;
        }

        info!("Initializing BLE central...");
        self.state.enter(Phase::Initializing);
        self.transport.initialize(true, false);
    }

    /// Tear down the BLE central.
    ///
    /// The protocol stops considering itself initialized right away, even
    /// while the transport teardown is still pending.
    pub fn deinitialize(&mut self) {
        let was_initialized = self.state.initialized;
        let deinit_pending = self.state.deinit_pending;
        self.state = ConnectionState {
            deinit_pending,
            ..ConnectionState::default()
        };

        if was_initialized {
            info!("Deinitializing BLE central...");
            self.state.deinit_pending = true;
            self.state.enter(Phase::Deinitializing);
            self.transport.deinitialize();
        } else {
            self.emit(WristbandEvent::BluetoothDeInitialized);
        }
    }

    /// Scan for a supported wristband and connect to the first one seen.
    pub fn scan_and_autoconnect(&mut self) {
        if !self.state.initialized {
            self.emit_error(
                ErrorCode::ConnectionFailed,
                "Bluetooth Central Error, Rebooting Central...",
            );
            return;
        }
        if self.state.busy {
            self.emit_error(
                ErrorCode::ConnectionFailed,
                format!(
                    "scan_and_autoconnect :: couldn't start scan -> possible reason(s): {}",
                    Precondition::NotBusy.fragment()
                ),
            );
            return;
        }

        self.state.clear_link();
        self.state.peripheral_id = None;
        self.state.peripheral_name = None;

        let service_ids: Vec<String> = self.registry.list_service_ids().into_iter().collect();
        info!("Scanning for wristbands: {:?}", service_ids);
        self.state.enter(Phase::Scanning);
        self.transport.scan_for_peripherals(&service_ids);
    }

    /// Stop a running scan. Only acts while initialized and busy.
    ///
    /// Clears `busy` without touching the found/connected flags. A handshake
    /// already under way keeps its phase and may still complete.
    pub fn stop_scan(&mut self) {
        if !(self.state.initialized && self.state.busy) {
            return;
        }
        info!("Stopping scan ({})", self.state.phase);
        if self.state.phase == Phase::Scanning {
            self.settle();
        } else {
            self.state.busy = false;
        }
        self.transport.stop_scan();
    }

    /// Disconnect from the wristband.
    ///
    /// The profile is dropped immediately. Without any known device the
    /// `Disconnected` event is emitted before returning.
    pub fn disconnect(&mut self) {
        self.state.connected_profile = None;

        match self.device_list().into_iter().next() {
            Some(device) => {
                info!("Disconnecting from {}", device);
                self.state.enter(Phase::Disconnecting);
                self.transport.disconnect_peripheral(&device);
            }
            None => {
                debug!("No known device, disconnected");
                self.state.clear_link();
                self.emit(WristbandEvent::Disconnected);
            }
        }
    }

    /// Stop scanning, then disconnect.
    pub fn abort(&mut self) {
        self.stop_scan();
        self.disconnect();
    }

    // ------------------------------------------------------------------
    // Read / write
    // ------------------------------------------------------------------

    /// Read today's totals and then walk the stored history day by day.
    ///
    /// Unmet preconditions are reported as a `ReadStepsFailed` event. An
    /// `Err` means the registry has no steps characteristic for the connected
    /// profile.
    pub fn read_steps_and_exercise_time(&mut self) -> Result<(), WristbandError> {
        let unmet = self.state.describe_unmet(&LINK_PRECONDITIONS);
        if !unmet.is_empty() {
            self.emit_error(ErrorCode::ReadStepsFailed, format!("{}{}", READ_STEPS_FAILED, unmet));
            return Ok(());
        }

        let link = self.link(CharacteristicTag::B)?;

        info!("Reading steps from {}", link.device);
        self.steps.clear();
        self.state.retry_count = 0;
        self.state.days_returned = 0;
        self.state.expected_characteristic = Some(link.characteristic.clone());
        self.state.enter(Phase::ReadingToday);
        self.transport
            .read_characteristic(&link.device, &link.service, &link.characteristic);
        Ok(())
    }

    /// Write a 16-byte clock and user settings command.
    pub fn set_clock_and_user_settings(
        &mut self,
        data: &[u8; SETTINGS_LEN],
    ) -> Result<(), WristbandError> {
        let unmet = self.state.describe_unmet(&LINK_PRECONDITIONS);
        if !unmet.is_empty() {
            self.emit_error(
                ErrorCode::SetWristbandFailed,
                format!("{}{}", SET_SETTINGS_FAILED, unmet),
            );
            return Ok(());
        }

        let link = self.link(CharacteristicTag::A)?;

        info!("Writing clock and user settings");
        self.state.expected_characteristic = Some(link.characteristic.clone());
        self.state.enter(Phase::WritingSettings);
        self.transport
            .write_characteristic(&link.device, &link.service, &link.characteristic, data, true);
        Ok(())
    }

    /// Build the settings for `user` at `now` and write them.
    ///
    /// Kids bands get their scaled goal.
    pub fn write_user_settings(
        &mut self,
        user: &UserProfile,
        now: NaiveDateTime,
    ) -> Result<(), WristbandError> {
        let is_kids = self.connected_profile_type() == Some(ProfileType::Kids);
        let data = calculations::create_wristband_settings(is_kids, user, now)?;
        self.set_clock_and_user_settings(&data)
    }

    /// Wipe the history stored on the wristband. Requires a completed read.
    pub fn clear_history(&mut self) -> Result<(), WristbandError> {
        let unmet = self.state.describe_unmet(&CLEAR_HISTORY_PRECONDITIONS);
        if !unmet.is_empty() {
            self.emit_error(
                ErrorCode::ClearHistoryFailed,
                format!("{}{}", CLEAR_HISTORY_FAILED, unmet),
            );
            return Ok(());
        }

        let link = self.link(CharacteristicTag::A)?;

        info!("Clearing wristband history");
        self.state.expected_characteristic = Some(link.characteristic.clone());
        self.state.enter(Phase::ClearingHistory);
        self.transport.write_characteristic(
            &link.device,
            &link.service,
            &link.characteristic,
            &[CLEAR_HISTORY_COMMAND],
            true,
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transport callbacks
    // ------------------------------------------------------------------

    /// Feed one transport callback into the state machine.
    ///
    /// Events that don't fit the current phase, peripheral or characteristic
    /// are dropped. An `Err` means a registry lookup failed mid-operation;
    /// the protocol is no longer busy when it is returned.
    pub fn handle_event(&mut self, event: TransportEvent) -> Result<(), WristbandError> {
        trace!("{} in phase {}", event.kind(), self.state.phase);

        let result = match event {
            TransportEvent::Initialized => {
                self.on_initialized();
                Ok(())
            }
            TransportEvent::InitializationFailed(message) => {
                self.on_initialization_failed(message);
                Ok(())
            }
            TransportEvent::Deinitialized => {
                self.on_deinitialized();
                Ok(())
            }
            TransportEvent::PeripheralDiscovered { id, name } => {
                self.on_peripheral_discovered(&id, &name);
                Ok(())
            }
            TransportEvent::PeripheralConnected { id } => {
                self.on_peripheral_connected(&id);
                Ok(())
            }
            TransportEvent::ServiceDiscovered { id, service } => {
                trace!("Service {} on {}", service, id);
                Ok(())
            }
            TransportEvent::CharacteristicDiscovered {
                id,
                service,
                characteristic,
            } => {
                self.on_characteristic_discovered(&id, &service, &characteristic);
                Ok(())
            }
            TransportEvent::PeripheralDisconnected { id } => {
                self.on_peripheral_disconnected(&id);
                Ok(())
            }
            TransportEvent::Subscribed { characteristic } => {
                self.on_subscribed(&characteristic);
                Ok(())
            }
            TransportEvent::CharacteristicRead {
                characteristic,
                data,
            } => self.on_characteristic_read(&characteristic, data),
            TransportEvent::CharacteristicWritten { characteristic } => {
                self.on_characteristic_written(&characteristic);
                Ok(())
            }
            TransportEvent::Notification {
                characteristic,
                data,
            } => self.on_notification(&characteristic, data),
        };

        if let Err(e) = &result {
            warn!("Aborting {}: {}", self.state.phase, e);
            self.state.expected_characteristic = None;
            self.settle();
        }
        result
    }

    fn on_initialized(&mut self) {
        if self.state.phase != Phase::Initializing {
            return self.ignore("initialized");
        }
        info!("BLE central initialized");
        self.state.initialized = true;
        self.state.enter(Phase::Idle);
        self.emit(WristbandEvent::BluetoothInitialized);
    }

    fn on_initialization_failed(&mut self, message: String) {
        if self.state.phase != Phase::Initializing {
            return self.ignore("initialization_failed");
        }
        self.state.enter(Phase::Uninitialized);
        self.emit_error(ErrorCode::InitializationFailed, message);
    }

    fn on_deinitialized(&mut self) {
        if !self.state.deinit_pending {
            return self.ignore("deinitialized");
        }
        info!("BLE central deinitialized");
        self.state.deinit_pending = false;
        // A re-initialization requested meanwhile keeps its phase
        if self.state.phase == Phase::Deinitializing {
            self.state.enter(Phase::Uninitialized);
        }
        self.emit(WristbandEvent::BluetoothDeInitialized);
    }

    fn on_peripheral_discovered(&mut self, id: &str, name: &str) {
        if self.state.phase != Phase::Scanning {
            return self.ignore("peripheral_discovered");
        }

        match scanner::classify(id, name) {
            Discovery::Tracker { id, name } => {
                info!("Wristband found: {} ({})", name, id);
                self.state.peripheral_id = Some(id.clone());
                self.state.peripheral_name = Some(name.clone());
                self.state.profile_found = true;
                self.emit(WristbandEvent::ProfileFound {
                    peripheral_id: id.clone(),
                    peripheral_name: name,
                });

                self.transport.stop_scan();
                self.state.expected_characteristic = Some(HISTORY_CHAR_UUID.to_string());
                self.state.enter(Phase::Connecting);
                self.transport.connect_to_peripheral(&id);
            }
            Discovery::Unknown { id, name } => {
                self.emit_error(
                    ErrorCode::UnknownDeviceDetected,
                    format!("Peripheral found but has the wrong -> ID: {}, name: {}", id, name),
                );
            }
        }
    }

    fn on_peripheral_connected(&mut self, id: &str) {
        if self.state.phase != Phase::Connecting || !self.is_current_peripheral(id) {
            return self.ignore("peripheral_connected");
        }
        debug!("Peripheral {} connected, waiting for GATT table", id);
    }

    fn on_characteristic_discovered(&mut self, id: &str, service: &str, characteristic: &str) {
        if self.state.phase != Phase::Connecting || !self.is_current_peripheral(id) {
            return self.ignore("characteristic_discovered");
        }
        if !(uuid_eq(service, SERVICE_UUID) && uuid_eq(characteristic, HISTORY_CHAR_UUID)) {
            trace!("Skipping characteristic {} / {}", service, characteristic);
            return;
        }

        info!("Subscribing to {}", HISTORY_CHAR_UUID);
        self.state.enter(Phase::Subscribing);
        self.transport
            .subscribe_characteristic(id, SERVICE_UUID, HISTORY_CHAR_UUID);
    }

    fn on_subscribed(&mut self, characteristic: &str) {
        if self.state.phase != Phase::Subscribing || !uuid_eq(characteristic, HISTORY_CHAR_UUID) {
            return self.ignore("subscribed");
        }
        self.emit(WristbandEvent::DebugMessage(format!(
            "Subscription successful @: {}",
            characteristic
        )));

        let id = self.state.peripheral_id.clone().unwrap_or_default();
        let name = self.state.peripheral_name.clone().unwrap_or_default();
        self.state.expected_characteristic = None;

        match self.registry.profile_by_name(&name) {
            Ok(profile) => {
                info!("Connected to {} as {:?}", name, profile.profile_type);
                self.state.connected_profile = Some(profile.clone());
                self.state.connected = true;
                self.state.enter(Phase::Ready);
                self.emit(WristbandEvent::Connected {
                    peripheral_id: id,
                    peripheral_name: name,
                    profile,
                });
            }
            Err(e) => {
                debug!("Profile lookup failed: {}", e);
                self.state.enter(Phase::Idle);
                self.emit_error(
                    ErrorCode::NotificationSubscriptionFailed,
                    format!(
                        "on_subscribed :: unknown profile -> device-id={}, device-name={}",
                        id, name
                    ),
                );
                self.emit(WristbandEvent::UnknownProfile {
                    peripheral_id: id,
                    peripheral_name: name,
                });
            }
        }
    }

    fn on_peripheral_disconnected(&mut self, id: &str) {
        if self.state.phase == Phase::Disconnecting {
            info!("Disconnected from {}", id);
        } else if self.is_current_peripheral(id)
            && (self.state.profile_found || self.state.connected)
        {
            warn!("Wristband {} dropped the connection", id);
        } else {
            return self.ignore("peripheral_disconnected");
        }

        self.state.clear_link();
        self.emit(WristbandEvent::Disconnected);
    }

    fn on_characteristic_read(
        &mut self,
        characteristic: &str,
        data: Vec<u8>,
    ) -> Result<(), WristbandError> {
        if self.state.phase != Phase::ReadingToday || !self.expects(characteristic) {
            self.ignore("characteristic_read");
            return Ok(());
        }

        self.steps.clear();
        self.steps.set_today_data(data);
        self.state.days_returned = 0;

        let steps_today = self.steps.steps_today();
        if steps_today > self.settings.steps_sanity_ceiling {
            if self.state.retry_count < self.settings.max_steps_retries {
                let link = self.link(CharacteristicTag::B)?;
                self.steps.clear();
                self.emit_error(
                    ErrorCode::InvalidNumberOfSteps,
                    "on_characteristic_read :: Invalid number of steps received from wristband -> All steps cleared!",
                );
                self.state.retry_count += 1;
                debug!(
                    "Re-reading steps ({}/{})",
                    self.state.retry_count, self.settings.max_steps_retries
                );
                self.transport.read_characteristic_after(
                    self.settings.steps_retry_delay(),
                    &link.device,
                    &link.service,
                    &link.characteristic,
                );
            } else {
                self.state.expected_characteristic = None;
                self.state.enter(Phase::Ready);
                self.emit_error(
                    ErrorCode::InvalidNumberOfSteps,
                    format!(
                        "on_characteristic_read :: maximum number of retries on 'invalid number of steps' reached, loop interrupted! {} steps",
                        steps_today
                    ),
                );
            }
            return Ok(());
        }

        self.emit(WristbandEvent::DebugMessage(
            "on_characteristic_read :: Start recursive history retrieval".to_string(),
        ));
        self.request_next_history_day()
    }

    fn on_characteristic_written(&mut self, characteristic: &str) {
        if !self.expects(characteristic) {
            return self.ignore("characteristic_written");
        }

        match self.state.phase {
            Phase::ReadingHistory { day } => {
                self.emit(WristbandEvent::DebugMessage(format!(
                    "History request {} successful @: {}",
                    day, characteristic
                )));
            }
            Phase::WritingSettings | Phase::ClearingHistory => {
                info!("Write to {} acknowledged", characteristic);
                self.state.expected_characteristic = None;
                self.state.enter(Phase::Ready);
                self.emit(WristbandEvent::WriteComplete);
            }
            _ => self.ignore("characteristic_written"),
        }
    }

    fn on_notification(
        &mut self,
        characteristic: &str,
        data: Vec<u8>,
    ) -> Result<(), WristbandError> {
        let Phase::ReadingHistory { day } = self.state.phase else {
            self.ignore("notification");
            return Ok(());
        };
        if !self.expects(characteristic) {
            self.ignore("notification");
            return Ok(());
        }

        self.steps.push_history_data(data);
        self.state.days_returned = day + 1;
        self.request_next_history_day()
    }

    /// Ask for the next history page, or finish the cycle once every day
    /// announced in today's payload has arrived.
    fn request_next_history_day(&mut self) -> Result<(), WristbandError> {
        let day = self.state.days_returned;
        let total = self.steps.nr_of_step_records();
        debug!("History day {}/{}", day, total);

        if day < total {
            let link = self.history_link()?;
            self.state.expected_characteristic = Some(link.characteristic.clone());
            self.state.enter(Phase::ReadingHistory { day });
            self.transport.write_characteristic(
                &link.device,
                &link.service,
                &link.characteristic,
                &protocol::history_request(day),
                true,
            );
        } else {
            info!(
                "Steps collected: {} today, {} history day(s)",
                self.steps.steps_today(),
                self.steps.history_len()
            );
            self.state.expected_characteristic = None;
            self.state.history_retrieved = true;
            self.state.enter(Phase::Ready);
            self.emit(WristbandEvent::StepsCollected(self.steps.clone()));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn link(&self, tag: CharacteristicTag) -> Result<Link, WristbandError> {
        let profile = self
            .state
            .connected_profile
            .as_ref()
            .ok_or(WristbandError::NoConnectedProfile)?;
        let characteristic = self
            .registry
            .characteristic_by_tag(&profile.peripheral_name, tag)?;
        self.link_to(characteristic.id)
    }

    /// History pages are requested and notified on the subscribed
    /// characteristic.
    fn history_link(&self) -> Result<Link, WristbandError> {
        self.link_to(HISTORY_CHAR_UUID.to_string())
    }

    fn link_to(&self, characteristic: String) -> Result<Link, WristbandError> {
        let profile = self
            .state
            .connected_profile
            .as_ref()
            .ok_or(WristbandError::NoConnectedProfile)?;
        let device = self
            .state
            .peripheral_id
            .clone()
            .ok_or(WristbandError::NoConnectedProfile)?;

        Ok(Link {
            device,
            service: profile.service_id.clone(),
            characteristic,
        })
    }

    /// Leave any transient phase for the closest resting one.
    fn settle(&mut self) {
        let phase = if self.state.connected {
            Phase::Ready
        } else if self.state.initialized {
            Phase::Idle
        } else {
            Phase::Uninitialized
        };
        self.state.enter(phase);
    }

    fn is_current_peripheral(&self, id: &str) -> bool {
        self.state.peripheral_id.as_deref() == Some(id)
    }

    fn expects(&self, characteristic: &str) -> bool {
        self.state
            .expected_characteristic
            .as_deref()
            .is_some_and(|expected| uuid_eq(expected, characteristic))
    }

    fn ignore(&self, kind: &str) {
        debug!("Ignoring stale {} event in phase {}", kind, self.state.phase);
    }

    fn emit(&self, event: WristbandEvent) {
        self.bus.emit(&event);
    }

    fn emit_error(&self, code: ErrorCode, message: impl Into<String>) {
        let message = message.into();
        warn!("[{}] {}", code, message);
        self.emit(WristbandEvent::Error { code, message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Characteristic, Profile};
    use crate::error::RegistryError;
    use crate::infrastructure::bluetooth::protocol::STEPS_CHAR_UUID;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Initialize,
        Deinitialize,
        Scan(Vec<String>),
        StopScan,
        Connect(String),
        Disconnect(String),
        Read(String),
        Write(String, Vec<u8>, bool),
        Subscribe(String),
    }

    #[derive(Default)]
    struct MockTransport {
        calls: Vec<Call>,
        devices: Vec<String>,
    }

    impl MockTransport {
        fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|c| pred(*c)).count()
        }
    }

    impl BleTransport for MockTransport {
        fn initialize(&mut self, as_central: bool, as_peripheral: bool) {
            assert!(as_central && !as_peripheral);
            self.calls.push(Call::Initialize);
        }
        fn deinitialize(&mut self) {
            self.calls.push(Call::Deinitialize);
        }
        fn scan_for_peripherals(&mut self, service_ids: &[String]) {
            self.calls.push(Call::Scan(service_ids.to_vec()));
        }
        fn stop_scan(&mut self) {
            self.calls.push(Call::StopScan);
        }
        fn connect_to_peripheral(&mut self, peripheral_id: &str) {
            self.calls.push(Call::Connect(peripheral_id.to_string()));
        }
        fn disconnect_peripheral(&mut self, peripheral_id: &str) {
            self.calls.push(Call::Disconnect(peripheral_id.to_string()));
        }
        fn read_characteristic(&mut self, _device: &str, _service: &str, characteristic: &str) {
            self.calls.push(Call::Read(characteristic.to_string()));
        }
        fn write_characteristic(
            &mut self,
            _device: &str,
            _service: &str,
            characteristic: &str,
            data: &[u8],
            with_response: bool,
        ) {
            self.calls.push(Call::Write(
                characteristic.to_string(),
                data.to_vec(),
                with_response,
            ));
        }
        fn subscribe_characteristic(&mut self, _device: &str, _service: &str, characteristic: &str) {
            self.calls.push(Call::Subscribe(characteristic.to_string()));
        }
        fn device_list(&self) -> Vec<String> {
            self.devices.clone()
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<WristbandEvent>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<WristbandEvent> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }

    impl WristbandObserver for Recorder {
        fn notify(&self, event: &WristbandEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    type Protocol = WristbandProtocol<MockTransport>;

    fn setup() -> (Protocol, Arc<Recorder>) {
        let protocol = WristbandProtocol::new(MockTransport::default());
        let recorder = Arc::new(Recorder::default());
        protocol.subscribe(recorder.clone());
        (protocol, recorder)
    }

    fn initialized() -> (Protocol, Arc<Recorder>) {
        let (mut protocol, recorder) = setup();
        protocol.initialize();
        protocol.handle_event(TransportEvent::Initialized).unwrap();
        protocol.transport_mut().calls.clear();
        recorder.take();
        (protocol, recorder)
    }

    fn discovered(id: &str, name: &str) -> TransportEvent {
        TransportEvent::PeripheralDiscovered {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    fn target_characteristic(id: &str) -> TransportEvent {
        TransportEvent::CharacteristicDiscovered {
            id: id.to_string(),
            service: SERVICE_UUID.to_lowercase(),
            characteristic: HISTORY_CHAR_UUID.to_lowercase(),
        }
    }

    fn subscribed() -> TransportEvent {
        TransportEvent::Subscribed {
            characteristic: HISTORY_CHAR_UUID.to_string(),
        }
    }

    fn drive_connect(protocol: &mut WristbandProtocol<MockTransport, impl DeviceRegistry>, name: &str) {
        protocol.scan_and_autoconnect();
        protocol.handle_event(discovered("AA", name)).unwrap();
        protocol.handle_event(target_characteristic("AA")).unwrap();
        protocol.handle_event(subscribed()).unwrap();
    }

    fn connected(name: &str) -> (Protocol, Arc<Recorder>) {
        let (mut protocol, recorder) = initialized();
        drive_connect(&mut protocol, name);
        assert!(protocol.is_connected());
        protocol.transport_mut().calls.clear();
        recorder.take();
        (protocol, recorder)
    }

    fn read(data: Vec<u8>) -> TransportEvent {
        TransportEvent::CharacteristicRead {
            characteristic: STEPS_CHAR_UUID.to_string(),
            data,
        }
    }

    fn written() -> TransportEvent {
        TransportEvent::CharacteristicWritten {
            characteristic: HISTORY_CHAR_UUID.to_string(),
        }
    }

    fn notification(data: Vec<u8>) -> TransportEvent {
        TransportEvent::Notification {
            characteristic: HISTORY_CHAR_UUID.to_string(),
            data,
        }
    }

    fn errors(events: &[WristbandEvent]) -> Vec<(ErrorCode, String)> {
        events
            .iter()
            .filter_map(|e| match e {
                WristbandEvent::Error { code, message } => Some((*code, message.clone())),
                _ => None,
            })
            .collect()
    }

    fn today(steps: u32, exercise: u16, days: u8) -> Vec<u8> {
        let s = steps.to_le_bytes();
        let t = exercise.to_le_bytes();
        vec![s[0], s[1], s[2], t[0], t[1], days, 0x00, 0x00]
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let (mut protocol, recorder) = setup();

        protocol.initialize();
        protocol.handle_event(TransportEvent::Initialized).unwrap();
        protocol.initialize();

        assert_eq!(protocol.transport().count(|c| *c == Call::Initialize), 1);
        assert_eq!(
            recorder.take(),
            vec![
                WristbandEvent::BluetoothInitialized,
                WristbandEvent::BluetoothInitialized
            ]
        );
        assert!(protocol.is_initialized());
        assert!(!protocol.is_busy());
    }

    #[test]
    fn test_initialize_failure_leaves_uninitialized() {
        let (mut protocol, recorder) = setup();

        protocol.initialize();
        assert!(protocol.is_busy());
        protocol
            .handle_event(TransportEvent::InitializationFailed("radio off".to_string()))
            .unwrap();

        assert_eq!(
            errors(&recorder.take()),
            vec![(ErrorCode::InitializationFailed, "radio off".to_string())]
        );
        assert!(!protocol.is_initialized());
        assert!(!protocol.is_busy());
        assert_eq!(protocol.phase(), Phase::Uninitialized);
    }

    #[test]
    fn test_deinitialize() {
        let (mut protocol, recorder) = initialized();

        protocol.deinitialize();
        assert!(!protocol.is_initialized());
        assert_eq!(protocol.transport().calls, vec![Call::Deinitialize]);
        assert!(recorder.take().is_empty());

        protocol.handle_event(TransportEvent::Deinitialized).unwrap();
        assert_eq!(recorder.take(), vec![WristbandEvent::BluetoothDeInitialized]);
        assert!(!protocol.is_busy());

        // Not initialized: confirmed at once
        protocol.deinitialize();
        assert_eq!(recorder.take(), vec![WristbandEvent::BluetoothDeInitialized]);
        assert_eq!(protocol.transport().count(|c| *c == Call::Deinitialize), 1);
    }

    #[test]
    fn test_scan_requires_initialization() {
        let (mut protocol, recorder) = setup();

        protocol.scan_and_autoconnect();

        assert_eq!(
            errors(&recorder.take()),
            vec![(
                ErrorCode::ConnectionFailed,
                "Bluetooth Central Error, Rebooting Central...".to_string()
            )]
        );
        assert!(protocol.transport().calls.is_empty());
    }

    #[test]
    fn test_unknown_device_keeps_scanning() {
        let (mut protocol, recorder) = initialized();

        protocol.scan_and_autoconnect();
        protocol.handle_event(discovered("BB", "Fitbit")).unwrap();

        let errs = errors(&recorder.take());
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].0, ErrorCode::UnknownDeviceDetected);
        assert!(errs[0].1.contains("BB"));
        assert_eq!(protocol.phase(), Phase::Scanning);
        assert!(!protocol.has_discovered_device());
        assert_eq!(protocol.transport().count(|c| matches!(c, Call::Connect(_))), 0);
    }

    #[test]
    fn test_end_to_end_pr102() {
        let (mut protocol, recorder) = initialized();

        protocol.scan_and_autoconnect();
        assert_eq!(
            protocol.transport().calls,
            vec![Call::Scan(vec![SERVICE_UUID.to_string()])]
        );

        protocol.handle_event(discovered("AA", "PR102")).unwrap();
        assert_eq!(
            recorder.take(),
            vec![WristbandEvent::ProfileFound {
                peripheral_id: "AA".to_string(),
                peripheral_name: "PR102".to_string(),
            }]
        );
        assert!(protocol.has_discovered_device());
        assert!(protocol.transport().calls.contains(&Call::Connect("AA".to_string())));

        protocol
            .handle_event(TransportEvent::PeripheralConnected {
                id: "AA".to_string(),
            })
            .unwrap();
        protocol
            .handle_event(TransportEvent::CharacteristicDiscovered {
                id: "AA".to_string(),
                service: SERVICE_UUID.to_string(),
                characteristic: STEPS_CHAR_UUID.to_string(),
            })
            .unwrap();
        assert_eq!(protocol.phase(), Phase::Connecting);

        protocol.handle_event(target_characteristic("AA")).unwrap();
        assert_eq!(
            protocol.transport().calls.last(),
            Some(&Call::Subscribe(HISTORY_CHAR_UUID.to_string()))
        );
        assert!(!protocol.is_connected());

        protocol.handle_event(subscribed()).unwrap();
        let events = recorder.take();
        assert!(matches!(events[0], WristbandEvent::DebugMessage(_)));
        match &events[1] {
            WristbandEvent::Connected {
                peripheral_id,
                peripheral_name,
                profile,
            } => {
                assert_eq!(peripheral_id, "AA");
                assert_eq!(peripheral_name, "PR102");
                assert_eq!(profile.profile_type, ProfileType::Kids);
            }
            other => panic!("expected Connected, got {:?}", other),
        }
        assert!(protocol.is_connected());
        assert!(!protocol.is_busy());
        assert_eq!(protocol.connected_profile_type(), Some(ProfileType::Kids));

        // Read cycle with two stored days
        protocol.transport_mut().calls.clear();
        protocol.read_steps_and_exercise_time().unwrap();
        assert_eq!(
            protocol.transport().calls,
            vec![Call::Read(STEPS_CHAR_UUID.to_string())]
        );

        protocol.handle_event(read(today(16, 5, 2))).unwrap();
        protocol.handle_event(written()).unwrap();
        protocol
            .handle_event(notification(vec![0x80, 0xE8, 0x03, 0x00, 0x0A, 0x00]))
            .unwrap();
        assert_eq!(protocol.phase(), Phase::ReadingHistory { day: 1 });
        protocol.handle_event(written()).unwrap();
        protocol
            .handle_event(notification(vec![0x80, 0xD0, 0x07, 0x00, 0x14, 0x00]))
            .unwrap();

        let writes: Vec<_> = protocol
            .transport()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Write(ch, data, with_response) => Some((ch.clone(), data.clone(), *with_response)),
                _ => None,
            })
            .collect();
        assert_eq!(
            writes,
            vec![
                (HISTORY_CHAR_UUID.to_string(), vec![0], true),
                (HISTORY_CHAR_UUID.to_string(), vec![1], true),
            ]
        );

        let events = recorder.take();
        assert!(errors(&events).is_empty());
        let collected: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                WristbandEvent::StepsCollected(steps) => Some(steps.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].history_len(), 2);
        assert_eq!(collected[0].steps_today(), 16);
        assert_eq!(collected[0].total_steps_walked(), 3016);

        assert!(protocol.has_history());
        assert!(!protocol.is_busy());
        assert_eq!(protocol.phase(), Phase::Ready);
    }

    #[test]
    fn test_read_while_busy_is_rejected() {
        let (mut protocol, recorder) = connected("B002");

        protocol.read_steps_and_exercise_time().unwrap();
        assert!(protocol.is_busy());
        protocol.transport_mut().calls.clear();

        protocol.read_steps_and_exercise_time().unwrap();

        assert!(protocol.transport().calls.is_empty());
        assert_eq!(
            errors(&recorder.take()),
            vec![(
                ErrorCode::ReadStepsFailed,
                format!("{}Is busy at the moment!", READ_STEPS_FAILED)
            )]
        );
    }

    #[test]
    fn test_corrupt_steps_retry_is_bounded() {
        let (mut protocol, recorder) = connected("PR102");

        protocol.read_steps_and_exercise_time().unwrap();
        for _ in 0..11 {
            protocol.handle_event(read(today(0xFF_FFFF, 0, 3))).unwrap();
        }
        // Stale once the loop gave up
        protocol.handle_event(read(today(0xFF_FFFF, 0, 3))).unwrap();

        assert_eq!(
            protocol.transport().count(|c| matches!(c, Call::Read(_))),
            11
        );
        let events = recorder.take();
        let errs = errors(&events);
        assert_eq!(errs.len(), 11);
        assert!(errs.iter().all(|(code, _)| *code == ErrorCode::InvalidNumberOfSteps));
        assert!(errs[9].1.contains("All steps cleared!"));
        assert!(errs[10].1.contains("maximum number of retries"));
        assert!(!events
            .iter()
            .any(|e| matches!(e, WristbandEvent::StepsCollected(_))));
        assert!(!protocol.is_busy());
        assert!(!protocol.has_history());
        assert_eq!(protocol.phase(), Phase::Ready);
    }

    #[test]
    fn test_corrupt_steps_recover_on_retry() {
        let (mut protocol, recorder) = connected("PR102");

        protocol.read_steps_and_exercise_time().unwrap();
        protocol.handle_event(read(today(0xFF_FFFF, 0, 0))).unwrap();
        protocol.handle_event(read(today(1234, 12, 0))).unwrap();

        let events = recorder.take();
        assert_eq!(errors(&events).len(), 1);
        assert!(matches!(
            events.last(),
            Some(WristbandEvent::StepsCollected(steps)) if steps.steps_today() == 1234
        ));
        assert!(protocol.has_history());
    }

    #[test]
    fn test_precondition_messages_are_combined() {
        let (mut protocol, recorder) = setup();

        protocol.read_steps_and_exercise_time().unwrap();
        protocol.set_clock_and_user_settings(&[0; SETTINGS_LEN]).unwrap();
        protocol.clear_history().unwrap();

        let errs = errors(&recorder.take());
        assert_eq!(
            errs,
            vec![
                (
                    ErrorCode::ReadStepsFailed,
                    format!(
                        "{}Not initialized! Has no matching profile! Device is not discovered! Device is not connected! ",
                        READ_STEPS_FAILED
                    )
                ),
                (
                    ErrorCode::SetWristbandFailed,
                    format!(
                        "{}Not initialized! Has no matching profile! Device is not discovered! Device is not connected! ",
                        SET_SETTINGS_FAILED
                    )
                ),
                (
                    ErrorCode::ClearHistoryFailed,
                    format!(
                        "{}Not initialized! Has no matching profile! Device is not discovered! Device is not connected! No available history! ",
                        CLEAR_HISTORY_FAILED
                    )
                ),
            ]
        );
        assert!(protocol.transport().calls.is_empty());
    }

    #[test]
    fn test_clear_history_requires_history() {
        let (mut protocol, recorder) = connected("B002");

        protocol.clear_history().unwrap();
        assert_eq!(
            errors(&recorder.take()),
            vec![(
                ErrorCode::ClearHistoryFailed,
                format!("{}No available history! ", CLEAR_HISTORY_FAILED)
            )]
        );

        protocol.read_steps_and_exercise_time().unwrap();
        protocol.handle_event(read(today(50, 1, 0))).unwrap();
        recorder.take();
        protocol.transport_mut().calls.clear();

        protocol.clear_history().unwrap();
        assert_eq!(
            protocol.transport().calls,
            vec![Call::Write(
                HISTORY_CHAR_UUID.to_string(),
                vec![CLEAR_HISTORY_COMMAND],
                true
            )]
        );
        protocol.handle_event(written()).unwrap();
        assert_eq!(recorder.take(), vec![WristbandEvent::WriteComplete]);
        assert!(!protocol.is_busy());
    }

    #[test]
    fn test_settings_write() {
        let (mut protocol, recorder) = connected("B002");
        let data = [0x8E, 0x1E, 0, 0x10, 0x27, 0, 0x20, 0xA1, 0xB0, 0x04, 0, 0x80, 0xF0, 0x49, 0x02, 0x80];

        protocol.set_clock_and_user_settings(&data).unwrap();
        assert!(protocol.is_busy());
        assert_eq!(
            protocol.transport().calls,
            vec![Call::Write(HISTORY_CHAR_UUID.to_string(), data.to_vec(), true)]
        );

        protocol.handle_event(written()).unwrap();
        assert_eq!(recorder.take(), vec![WristbandEvent::WriteComplete]);
        assert!(!protocol.is_busy());
        assert_eq!(protocol.phase(), Phase::Ready);
    }

    #[test]
    fn test_write_user_settings_scales_kids_goal() {
        let (mut protocol, _recorder) = connected("PR102");
        let now = chrono::NaiveDate::from_ymd_opt(2024, 7, 3)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap();

        protocol
            .write_user_settings(&UserProfile::default(), now)
            .unwrap();

        match protocol.transport().calls.as_slice() {
            [Call::Write(_, data, true)] => {
                assert_eq!(data[0], 0x89);
                // 11670 steps
                assert_eq!(&data[3..6], &[0x96, 0x2D, 0x00]);
            }
            other => panic!("unexpected calls {:?}", other),
        }

        let bad = UserProfile {
            date_of_birth: "tomorrow".to_string(),
            ..UserProfile::default()
        };
        assert!(matches!(
            protocol.write_user_settings(&bad, now),
            Err(WristbandError::Calculation(_))
        ));
    }

    #[test]
    fn test_unknown_profile_is_not_connected() {
        let registry = ProfileTable::new(vec![
            ProfileTable::default().profiles()[0].clone(), // PR102 only
        ]);
        let mut protocol = WristbandProtocol::with_parts(
            MockTransport::default(),
            registry,
            ProtocolSettings::default(),
        );
        let recorder = Arc::new(Recorder::default());
        protocol.subscribe(recorder.clone());
        protocol.initialize();
        protocol.handle_event(TransportEvent::Initialized).unwrap();
        recorder.take();

        drive_connect(&mut protocol, "B002");

        let events = recorder.take();
        let tail = &events[events.len() - 2..];
        assert_eq!(
            tail[0].error_code(),
            Some(ErrorCode::NotificationSubscriptionFailed)
        );
        assert_eq!(
            tail[1],
            WristbandEvent::UnknownProfile {
                peripheral_id: "AA".to_string(),
                peripheral_name: "B002".to_string(),
            }
        );
        assert!(!protocol.is_connected());
        assert!(!protocol.has_profile());
        assert!(!protocol.is_busy());
    }

    #[test]
    fn test_missing_characteristic_fails_loudly() {
        let profile = Profile {
            peripheral_name: "PR102".to_string(),
            service_id: SERVICE_UUID.to_string(),
            profile_type: ProfileType::Kids,
            characteristics: vec![Characteristic::new(CharacteristicTag::A, HISTORY_CHAR_UUID)],
        };
        let mut protocol = WristbandProtocol::with_parts(
            MockTransport::default(),
            ProfileTable::new(vec![profile]),
            ProtocolSettings::default(),
        );
        protocol.initialize();
        protocol.handle_event(TransportEvent::Initialized).unwrap();
        drive_connect(&mut protocol, "PR102");
        protocol.transport_mut().calls.clear();

        let result = protocol.read_steps_and_exercise_time();

        assert_eq!(
            result,
            Err(WristbandError::Registry(RegistryError::CharacteristicNotFound {
                peripheral_name: "PR102".to_string(),
                tag: CharacteristicTag::B,
            }))
        );
        assert!(!protocol.is_busy());
        assert!(protocol.transport().calls.is_empty());
    }

    #[test]
    fn test_disconnect_without_devices_is_synchronous() {
        let (mut protocol, recorder) = connected("PR102");

        protocol.disconnect();

        assert_eq!(recorder.take(), vec![WristbandEvent::Disconnected]);
        assert!(protocol.transport().calls.is_empty());
        assert!(!protocol.is_connected());
        assert!(!protocol.has_profile());
        assert_eq!(protocol.phase(), Phase::Idle);

        let (mut fresh, recorder) = setup();
        fresh.disconnect();
        assert_eq!(recorder.take(), vec![WristbandEvent::Disconnected]);
        assert!(fresh.transport().calls.is_empty());
    }

    #[test]
    fn test_disconnect_known_device() {
        let (mut protocol, recorder) = connected("PR102");
        protocol.transport_mut().devices = vec!["AA".to_string()];

        protocol.disconnect();
        assert!(!protocol.has_profile());
        assert!(protocol.is_busy());
        assert_eq!(protocol.transport().calls, vec![Call::Disconnect("AA".to_string())]);
        assert!(recorder.take().is_empty());

        protocol
            .handle_event(TransportEvent::PeripheralDisconnected {
                id: "AA".to_string(),
            })
            .unwrap();
        assert_eq!(recorder.take(), vec![WristbandEvent::Disconnected]);
        assert!(!protocol.is_connected());
        assert!(!protocol.has_discovered_device());
        assert!(!protocol.is_busy());
    }

    #[test]
    fn test_unsolicited_disconnect() {
        let (mut protocol, recorder) = connected("B002");

        protocol
            .handle_event(TransportEvent::PeripheralDisconnected {
                id: "ZZ".to_string(),
            })
            .unwrap();
        assert!(recorder.take().is_empty());

        protocol
            .handle_event(TransportEvent::PeripheralDisconnected {
                id: "AA".to_string(),
            })
            .unwrap();
        assert_eq!(recorder.take(), vec![WristbandEvent::Disconnected]);
        assert!(!protocol.is_connected());
    }

    #[test]
    fn test_abort_during_scan_drops_late_discovery() {
        let (mut protocol, recorder) = initialized();

        protocol.scan_and_autoconnect();
        protocol.abort();

        assert_eq!(
            protocol.transport().calls,
            vec![Call::Scan(vec![SERVICE_UUID.to_string()]), Call::StopScan]
        );
        assert_eq!(recorder.take(), vec![WristbandEvent::Disconnected]);
        assert!(!protocol.is_busy());

        protocol.handle_event(discovered("AA", "PR102")).unwrap();
        assert!(recorder.take().is_empty());
        assert!(!protocol.has_discovered_device());
    }

    #[test]
    fn test_stop_scan_is_noop_when_idle() {
        let (mut protocol, _recorder) = initialized();
        protocol.stop_scan();
        assert!(protocol.transport().calls.is_empty());
    }

    #[test]
    fn test_stop_scan_after_discovery_lets_handshake_finish() {
        let (mut protocol, recorder) = initialized();

        protocol.scan_and_autoconnect();
        protocol.handle_event(discovered("AA", "PR102")).unwrap();
        protocol.stop_scan();

        assert!(!protocol.is_busy());
        assert!(protocol.has_discovered_device());
        assert_eq!(protocol.phase(), Phase::Connecting);

        protocol.handle_event(target_characteristic("AA")).unwrap();
        protocol.handle_event(subscribed()).unwrap();

        assert!(protocol.is_connected());
        assert_eq!(protocol.connected_profile_type(), Some(ProfileType::Kids));
        assert!(recorder
            .take()
            .iter()
            .any(|e| matches!(e, WristbandEvent::Connected { .. })));
        // Once on discovery, once on request
        assert_eq!(protocol.transport().count(|c| *c == Call::StopScan), 2);
    }

    #[test]
    fn test_stop_scan_keeps_link_flags() {
        let (mut protocol, _recorder) = connected("PR102");

        protocol.read_steps_and_exercise_time().unwrap();
        protocol.stop_scan();

        assert!(!protocol.is_busy());
        assert!(protocol.is_connected());
        assert!(protocol.has_discovered_device());
        assert!(protocol.has_profile());
        assert_eq!(protocol.phase(), Phase::ReadingToday);
        assert_eq!(protocol.transport().calls.last(), Some(&Call::StopScan));

        // The read in flight still completes
        protocol.handle_event(read(today(20, 2, 0))).unwrap();
        assert!(protocol.has_history());
        assert_eq!(protocol.steps().steps_today(), 20);
    }

    #[test]
    fn test_rescan_resets_previous_link() {
        let (mut protocol, recorder) = connected("B002");
        protocol.read_steps_and_exercise_time().unwrap();
        protocol.handle_event(read(today(50, 1, 0))).unwrap();
        assert!(protocol.has_history());
        protocol.transport_mut().calls.clear();
        recorder.take();

        protocol.scan_and_autoconnect();

        assert!(!protocol.has_discovered_device());
        assert!(!protocol.is_connected());
        assert!(!protocol.has_history());
        assert!(!protocol.has_profile());
        assert!(protocol.is_busy());
        assert_eq!(protocol.phase(), Phase::Scanning);
        assert_eq!(
            protocol.transport().calls,
            vec![Call::Scan(vec![SERVICE_UUID.to_string()])]
        );
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn test_scan_while_busy_is_rejected() {
        let (mut protocol, recorder) = initialized();

        protocol.scan_and_autoconnect();
        protocol.transport_mut().calls.clear();
        protocol.scan_and_autoconnect();

        assert!(protocol.transport().calls.is_empty());
        assert_eq!(
            errors(&recorder.take()),
            vec![(
                ErrorCode::ConnectionFailed,
                "scan_and_autoconnect :: couldn't start scan -> possible reason(s): Is busy at the moment!"
                    .to_string()
            )]
        );
        assert_eq!(protocol.phase(), Phase::Scanning);
    }

    #[test]
    fn test_reinitialize_while_deinit_pending() {
        let (mut protocol, recorder) = initialized();

        protocol.deinitialize();
        protocol.initialize();
        protocol.handle_event(TransportEvent::Deinitialized).unwrap();
        protocol.handle_event(TransportEvent::Initialized).unwrap();

        assert_eq!(
            recorder.take(),
            vec![
                WristbandEvent::BluetoothDeInitialized,
                WristbandEvent::BluetoothInitialized
            ]
        );
        assert_eq!(
            protocol.transport().calls,
            vec![Call::Deinitialize, Call::Initialize]
        );
        assert!(protocol.is_initialized());
        assert!(!protocol.is_busy());

        // Confirmed once only
        protocol.handle_event(TransportEvent::Deinitialized).unwrap();
        assert!(recorder.take().is_empty());
        assert!(protocol.is_initialized());
    }

    #[test]
    fn test_history_walk_uses_subscribed_characteristic() {
        const SETTINGS_CHAR: &str = "0000FED3-494C-4F47-4943-544543480000";
        let profile = Profile {
            peripheral_name: "PR102".to_string(),
            service_id: SERVICE_UUID.to_string(),
            profile_type: ProfileType::Kids,
            characteristics: vec![
                Characteristic::new(CharacteristicTag::A, SETTINGS_CHAR),
                Characteristic::new(CharacteristicTag::B, STEPS_CHAR_UUID),
            ],
        };
        let mut protocol = WristbandProtocol::with_parts(
            MockTransport::default(),
            ProfileTable::new(vec![profile]),
            ProtocolSettings::default(),
        );
        let recorder = Arc::new(Recorder::default());
        protocol.subscribe(recorder.clone());
        protocol.initialize();
        protocol.handle_event(TransportEvent::Initialized).unwrap();
        drive_connect(&mut protocol, "PR102");
        protocol.transport_mut().calls.clear();
        recorder.take();

        protocol.read_steps_and_exercise_time().unwrap();
        protocol.handle_event(read(today(10, 1, 1))).unwrap();
        assert_eq!(
            protocol.transport().calls.last(),
            Some(&Call::Write(HISTORY_CHAR_UUID.to_string(), vec![0], true))
        );

        protocol.handle_event(written()).unwrap();
        protocol
            .handle_event(notification(vec![0x80, 0x01, 0x00, 0x00, 0x00, 0x00]))
            .unwrap();
        assert!(protocol.has_history());
        assert!(matches!(
            recorder.take().last(),
            Some(WristbandEvent::StepsCollected(steps)) if steps.history_len() == 1
        ));

        protocol.set_clock_and_user_settings(&[0; SETTINGS_LEN]).unwrap();
        assert_eq!(
            protocol.transport().calls.last(),
            Some(&Call::Write(SETTINGS_CHAR.to_string(), vec![0; SETTINGS_LEN], true))
        );
    }

    #[test]
    fn test_stale_events_are_ignored() {
        let (mut protocol, recorder) = connected("PR102");

        protocol.handle_event(notification(vec![1, 2, 3])).unwrap();
        protocol.handle_event(read(today(10, 0, 0))).unwrap();
        protocol.handle_event(written()).unwrap();
        protocol.handle_event(subscribed()).unwrap();
        protocol.handle_event(discovered("CC", "B002")).unwrap();
        protocol.handle_event(TransportEvent::Initialized).unwrap();

        assert!(recorder.take().is_empty());
        assert!(protocol.transport().calls.is_empty());
        assert_eq!(protocol.steps().history_len(), 0);
        assert_eq!(protocol.phase(), Phase::Ready);
    }

    #[test]
    fn test_notification_on_other_characteristic_is_ignored() {
        let (mut protocol, recorder) = connected("PR102");

        protocol.read_steps_and_exercise_time().unwrap();
        protocol.handle_event(read(today(10, 0, 1))).unwrap();
        recorder.take();

        protocol
            .handle_event(TransportEvent::Notification {
                characteristic: STEPS_CHAR_UUID.to_string(),
                data: vec![0x80, 0x01, 0x00, 0x00, 0x00, 0x00],
            })
            .unwrap();
        assert_eq!(protocol.phase(), Phase::ReadingHistory { day: 0 });
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn test_status_snapshot() {
        let (protocol, _recorder) = connected("B002");
        assert_eq!(
            protocol.status(),
            ProtocolStatus {
                initialized: true,
                connected: true,
                discovered: true,
                has_profile: true,
                has_history: false,
                busy: false,
            }
        );
    }
}
