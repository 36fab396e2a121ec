//! Simulated Wristband
//!
//! In-process [`BleTransport`] answering like a PR102/B002 band. Callbacks
//! are pushed into an unbounded channel, to be fed back into the protocol by
//! [`SyncService`](super::service::SyncService).

use crate::infrastructure::bluetooth::protocol::{
    uuid_eq, CLEAR_HISTORY_COMMAND, HISTORY_CHAR_UUID, SERVICE_UUID, SETTINGS_LEN,
    STEPS_CHAR_UUID,
};
use crate::infrastructure::bluetooth::transport::{BleTransport, TransportEvent};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Today's steps reported by a corrupt read
const CORRUPT_STEPS: u32 = 0xFF_FFFF;

/// An advertising peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedPeripheral {
    pub id: String,
    pub name: String,
}

/// One stored day on the simulated band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedDay {
    pub steps: u32,
    pub exercise_time: u16,
}

pub struct SimulatedWristband {
    events: mpsc::UnboundedSender<TransportEvent>,
    peripherals: Vec<SimulatedPeripheral>,
    connected: Vec<String>,
    steps_today: u32,
    exercise_today: u16,
    history: Vec<SimulatedDay>,
    corrupt_reads: u32,
    init_error: Option<String>,
    settings_written: Option<[u8; SETTINGS_LEN]>,
    history_cleared: bool,
}

impl SimulatedWristband {
    pub fn new(events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            events,
            peripherals: Vec::new(),
            connected: Vec::new(),
            steps_today: 0,
            exercise_today: 0,
            history: Vec::new(),
            corrupt_reads: 0,
            init_error: None,
            settings_written: None,
            history_cleared: false,
        }
    }

    /// A kids band with three stored days, next to an unrelated device.
    pub fn with_sample_data(events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self::new(events)
            .with_peripheral("C4:7C:8D:00:00:01", "HRM-Pro")
            .with_peripheral("C4:7C:8D:6A:12:F0", "PR102")
            .with_today(4_213, 37)
            .with_history_day(9_876, 61)
            .with_history_day(12_004, 83)
            .with_history_day(3_150, 12)
    }

    pub fn with_peripheral(mut self, id: &str, name: &str) -> Self {
        self.peripherals.push(SimulatedPeripheral {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn with_today(mut self, steps: u32, exercise_time: u16) -> Self {
        self.steps_today = steps;
        self.exercise_today = exercise_time;
        self
    }

    /// Append a stored day; the first one added is yesterday.
    pub fn with_history_day(mut self, steps: u32, exercise_time: u16) -> Self {
        self.history.push(SimulatedDay {
            steps,
            exercise_time,
        });
        self
    }

    /// Answer the next `count` steps reads with an out-of-range value.
    pub fn with_corrupt_reads(mut self, count: u32) -> Self {
        self.corrupt_reads = count;
        self
    }

    pub fn with_init_error(mut self, message: &str) -> Self {
        self.init_error = Some(message.to_string());
        self
    }

    pub fn settings_written(&self) -> Option<&[u8; SETTINGS_LEN]> {
        self.settings_written.as_ref()
    }

    pub fn history_cleared(&self) -> bool {
        self.history_cleared
    }

    pub fn stored_days(&self) -> usize {
        self.history.len()
    }

    fn send(&self, event: TransportEvent) {
        // The receiving side is gone once the session ends
        let _ = self.events.send(event);
    }

    fn today_payload(&mut self) -> Vec<u8> {
        let steps = if self.corrupt_reads > 0 {
            self.corrupt_reads -= 1;
            CORRUPT_STEPS
        } else {
            self.steps_today
        };
        let s = steps.to_le_bytes();
        let t = self.exercise_today.to_le_bytes();
        let days = u8::try_from(self.history.len()).unwrap_or(u8::MAX);
        vec![s[0], s[1], s[2], t[0], t[1], days, 0x00, 0x00]
    }

    fn history_page(day: &SimulatedDay) -> Vec<u8> {
        let s = day.steps.to_le_bytes();
        let t = day.exercise_time.to_le_bytes();
        vec![
            0x80, s[0], s[1], s[2], t[0], t[1], // flag, steps, minutes
            0x10, 0x27, 0x00, // goal 10000
            0x00, 0x00, // distance
            0x00, 0x00, 0x00, // calories per step
            0x00, 0x00, 0x00, // bmr
        ]
    }

    fn read_event(&mut self, characteristic: &str) -> TransportEvent {
        let data = if uuid_eq(characteristic, STEPS_CHAR_UUID) {
            self.today_payload()
        } else {
            Vec::new()
        };
        TransportEvent::CharacteristicRead {
            characteristic: characteristic.to_string(),
            data,
        }
    }
}

impl BleTransport for SimulatedWristband {
    fn initialize(&mut self, as_central: bool, as_peripheral: bool) {
        debug!(
            "Simulator initialize (central={}, peripheral={})",
            as_central, as_peripheral
        );
        match &self.init_error {
            Some(message) => self.send(TransportEvent::InitializationFailed(message.clone())),
            None => self.send(TransportEvent::Initialized),
        }
    }

    fn deinitialize(&mut self) {
        self.connected.clear();
        self.send(TransportEvent::Deinitialized);
    }

    fn scan_for_peripherals(&mut self, service_ids: &[String]) {
        info!("Simulator advertising {} peripheral(s)", self.peripherals.len());
        if !service_ids.iter().any(|s| uuid_eq(s, SERVICE_UUID)) {
            warn!("Scan does not include the wristband service");
            return;
        }
        for peripheral in &self.peripherals {
            self.send(TransportEvent::PeripheralDiscovered {
                id: peripheral.id.clone(),
                name: peripheral.name.clone(),
            });
        }
    }

    fn stop_scan(&mut self) {
        debug!("Simulator scan stopped");
    }

    fn connect_to_peripheral(&mut self, peripheral_id: &str) {
        if !self.peripherals.iter().any(|p| p.id == peripheral_id) {
            warn!("Simulator has no peripheral {}", peripheral_id);
            return;
        }
        if !self.connected.iter().any(|id| id == peripheral_id) {
            self.connected.push(peripheral_id.to_string());
        }

        let id = peripheral_id.to_string();
        self.send(TransportEvent::PeripheralConnected { id: id.clone() });
        self.send(TransportEvent::ServiceDiscovered {
            id: id.clone(),
            service: SERVICE_UUID.to_lowercase(),
        });
        for characteristic in [STEPS_CHAR_UUID, HISTORY_CHAR_UUID] {
            self.send(TransportEvent::CharacteristicDiscovered {
                id: id.clone(),
                service: SERVICE_UUID.to_lowercase(),
                characteristic: characteristic.to_lowercase(),
            });
        }
    }

    fn disconnect_peripheral(&mut self, peripheral_id: &str) {
        self.connected.retain(|id| id != peripheral_id);
        self.send(TransportEvent::PeripheralDisconnected {
            id: peripheral_id.to_string(),
        });
    }

    fn read_characteristic(&mut self, _device: &str, _service: &str, characteristic: &str) {
        let event = self.read_event(characteristic);
        self.send(event);
    }

    fn read_characteristic_after(
        &mut self,
        delay: Duration,
        device: &str,
        service: &str,
        characteristic: &str,
    ) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) if !delay.is_zero() => handle,
            _ => return self.read_characteristic(device, service, characteristic),
        };

        let event = self.read_event(characteristic);
        let sender = self.events.clone();
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = sender.send(event);
        });
    }

    fn write_characteristic(
        &mut self,
        _device: &str,
        _service: &str,
        characteristic: &str,
        data: &[u8],
        with_response: bool,
    ) {
        if !uuid_eq(characteristic, HISTORY_CHAR_UUID) {
            warn!("Simulator ignoring write to {}", characteristic);
            return;
        }

        let ack = |this: &Self| {
            if with_response {
                this.send(TransportEvent::CharacteristicWritten {
                    characteristic: characteristic.to_string(),
                });
            }
        };

        match data {
            [CLEAR_HISTORY_COMMAND] => {
                info!("Simulator history cleared");
                self.history.clear();
                self.history_cleared = true;
                ack(self);
            }
            [day] => {
                ack(self);
                let page = self
                    .history
                    .get(usize::from(*day))
                    .map(Self::history_page)
                    .unwrap_or_default();
                self.send(TransportEvent::Notification {
                    characteristic: characteristic.to_string(),
                    data: page,
                });
            }
            _ => match <[u8; SETTINGS_LEN]>::try_from(data) {
                Ok(settings) => {
                    info!("Simulator settings stored: {:02X?}", settings);
                    self.settings_written = Some(settings);
                    ack(self);
                }
                Err(_) => warn!("Simulator ignoring {}-byte write", data.len()),
            },
        }
    }

    fn subscribe_characteristic(&mut self, _device: &str, _service: &str, characteristic: &str) {
        self.send(TransportEvent::Subscribed {
            characteristic: characteristic.to_string(),
        });
    }

    fn device_list(&self) -> Vec<String> {
        self.connected.clone()
    }
}
