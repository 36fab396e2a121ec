//! Observer interface and synchronous fan-out of wristband events.

use crate::domain::models::{ErrorCode, Profile, WristbandEvent};
use crate::domain::steps::StepsData;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Receiver of wristband lifecycle events.
///
/// Every callback defaults to a no-op, so observers only implement what they
/// care about. [`notify`](Self::notify) routes an event to its callback and
/// can itself be overridden to handle events generically.
pub trait WristbandObserver: Send + Sync {
    fn on_bluetooth_initialized(&self) {}
    fn on_bluetooth_deinitialized(&self) {}
    fn on_error(&self, _code: ErrorCode, _message: &str) {}
    fn on_debug_message(&self, _message: &str) {}
    fn on_connected(&self, _peripheral_id: &str, _peripheral_name: &str, _profile: &Profile) {}
    fn on_disconnected(&self) {}
    fn on_profile_found(&self, _peripheral_id: &str, _peripheral_name: &str) {}
    fn on_unknown_profile(&self, _peripheral_id: &str, _peripheral_name: &str) {}
    fn on_steps_collected(&self, _steps: &StepsData) {}
    fn on_write_complete(&self) {}

    fn notify(&self, event: &WristbandEvent) {
        match event {
            WristbandEvent::BluetoothInitialized => self.on_bluetooth_initialized(),
            WristbandEvent::BluetoothDeInitialized => self.on_bluetooth_deinitialized(),
            WristbandEvent::Error { code, message } => self.on_error(*code, message),
            WristbandEvent::DebugMessage(message) => self.on_debug_message(message),
            WristbandEvent::Connected {
                peripheral_id,
                peripheral_name,
                profile,
            } => self.on_connected(peripheral_id, peripheral_name, profile),
            WristbandEvent::Disconnected => self.on_disconnected(),
            WristbandEvent::ProfileFound {
                peripheral_id,
                peripheral_name,
            } => self.on_profile_found(peripheral_id, peripheral_name),
            WristbandEvent::UnknownProfile {
                peripheral_id,
                peripheral_name,
            } => self.on_unknown_profile(peripheral_id, peripheral_name),
            WristbandEvent::StepsCollected(steps) => self.on_steps_collected(steps),
            WristbandEvent::WriteComplete => self.on_write_complete(),
        }
    }
}

/// Ordered list of observers. The same observer may be subscribed twice and
/// is then notified twice.
#[derive(Default)]
pub struct ObserverBus {
    observers: Mutex<Vec<Arc<dyn WristbandObserver>>>,
}

impl ObserverBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<dyn WristbandObserver>>> {
        // A panicking observer must not take the whole bus down with it
        self.observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self, observer: Arc<dyn WristbandObserver>) {
        self.lock().push(observer);
    }

    /// Remove the first subscription of `observer`. Returns false if it was
    /// not subscribed.
    pub fn unsubscribe(&self, observer: &Arc<dyn WristbandObserver>) -> bool {
        let mut observers = self.lock();
        match observers.iter().position(|o| Arc::ptr_eq(o, observer)) {
            Some(index) => {
                observers.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Deliver `event` to every observer subscribed when the call starts.
    ///
    /// The list is snapshotted first, so observers may subscribe or
    /// unsubscribe from inside a callback.
    pub fn emit(&self, event: &WristbandEvent) {
        let snapshot: Vec<_> = self.lock().clone();
        for observer in snapshot {
            observer.notify(event);
        }
    }
}

/// One line of the event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub message: String,
    pub is_error: bool,
}

/// Observer keeping a readable history of every event.
#[derive(Default)]
pub struct EventLog {
    records: Mutex<Vec<EventRecord>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<EventRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.lock().clone()
    }

    /// The last `n` records, oldest first.
    pub fn recent(&self, n: usize) -> Vec<EventRecord> {
        let records = self.lock();
        let start = records.len().saturating_sub(n);
        records[start..].to_vec()
    }

    pub fn error_count(&self) -> usize {
        self.lock().iter().filter(|r| r.is_error).count()
    }
}

impl WristbandObserver for EventLog {
    fn notify(&self, event: &WristbandEvent) {
        self.lock().push(EventRecord {
            message: event.to_string(),
            is_error: event.is_error(),
        });
    }
}

/// Observer forwarding every event into an async channel.
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<WristbandEvent>,
}

impl ChannelObserver {
    pub fn new(sender: mpsc::UnboundedSender<WristbandEvent>) -> Self {
        Self { sender }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WristbandEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl WristbandObserver for ChannelObserver {
    fn notify(&self, event: &WristbandEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.sender.send(event.clone());
    }
}
