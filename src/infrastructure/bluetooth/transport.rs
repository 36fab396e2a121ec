//! BLE Transport Seam
//!
//! The radio is an injected capability. Requests go out through
//! [`BleTransport`] and never block; results come back later as
//! [`TransportEvent`] values fed into
//! [`WristbandProtocol::handle_event`](super::wristband::WristbandProtocol::handle_event).

use std::time::Duration;

/// Outgoing requests to a BLE central stack.
///
/// Every method is fire-and-forget. Completion, data and failures are reported
/// back as [`TransportEvent`]s in the order they happen.
pub trait BleTransport {
    /// Reports `Initialized` or `InitializationFailed`.
    fn initialize(&mut self, as_central: bool, as_peripheral: bool);

    /// Reports `Deinitialized`.
    fn deinitialize(&mut self);

    /// Reports one `PeripheralDiscovered` per advertising device.
    fn scan_for_peripherals(&mut self, service_ids: &[String]);

    fn stop_scan(&mut self);

    /// Reports `PeripheralConnected`, then a `ServiceDiscovered` and
    /// `CharacteristicDiscovered` for every entry of the GATT table.
    fn connect_to_peripheral(&mut self, peripheral_id: &str);

    /// Reports `PeripheralDisconnected`.
    fn disconnect_peripheral(&mut self, peripheral_id: &str);

    /// Reports `CharacteristicRead`.
    fn read_characteristic(&mut self, device: &str, service: &str, characteristic: &str);

    /// Same as [`read_characteristic`](Self::read_characteristic), issued
    /// after `delay`.
    ///
    /// Used for re-reads after a corrupt value. Transports without a timer
    /// read immediately.
    fn read_characteristic_after(
        &mut self,
        delay: Duration,
        device: &str,
        service: &str,
        characteristic: &str,
    ) {
        let _ = delay;
        self.read_characteristic(device, service, characteristic);
    }

    /// Reports `CharacteristicWritten` when `with_response` is set.
    fn write_characteristic(
        &mut self,
        device: &str,
        service: &str,
        characteristic: &str,
        data: &[u8],
        with_response: bool,
    );

    /// Reports `Subscribed`, then a `Notification` for every value pushed.
    fn subscribe_characteristic(&mut self, device: &str, service: &str, characteristic: &str);

    /// Ids of the peripherals the stack currently knows about.
    fn device_list(&self) -> Vec<String>;
}

/// Callback from the transport, one variant per completion kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Initialized,
    InitializationFailed(String),
    Deinitialized,
    PeripheralDiscovered {
        id: String,
        name: String,
    },
    PeripheralConnected {
        id: String,
    },
    ServiceDiscovered {
        id: String,
        service: String,
    },
    CharacteristicDiscovered {
        id: String,
        service: String,
        characteristic: String,
    },
    PeripheralDisconnected {
        id: String,
    },
    CharacteristicRead {
        characteristic: String,
        data: Vec<u8>,
    },
    CharacteristicWritten {
        characteristic: String,
    },
    /// Initial acknowledgement of a subscription
    Subscribed {
        characteristic: String,
    },
    Notification {
        characteristic: String,
        data: Vec<u8>,
    },
}

impl TransportEvent {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::InitializationFailed(_) => "initialization_failed",
            Self::Deinitialized => "deinitialized",
            Self::PeripheralDiscovered { .. } => "peripheral_discovered",
            Self::PeripheralConnected { .. } => "peripheral_connected",
            Self::ServiceDiscovered { .. } => "service_discovered",
            Self::CharacteristicDiscovered { .. } => "characteristic_discovered",
            Self::PeripheralDisconnected { .. } => "peripheral_disconnected",
            Self::CharacteristicRead { .. } => "characteristic_read",
            Self::CharacteristicWritten { .. } => "characteristic_written",
            Self::Subscribed { .. } => "subscribed",
            Self::Notification { .. } => "notification",
        }
    }
}
