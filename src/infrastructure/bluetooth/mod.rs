//! Bluetooth Module
//!
//! Step sync with PR102 (kids) and B002 (adults) wristbands over BLE.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      SyncService                         │
//! │  (pumps transport events, runs a full sync session)      │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                   WristbandProtocol                      │
//! │  (state machine, preconditions, retries, events)         │
//! └───────┬─────────────┬─────────────┬─────────────┬───────┘
//!         │             │             │             │
//!         ▼             ▼             ▼             ▼
//! ┌───────────┐  ┌────────────┐  ┌──────────┐  ┌───────────┐
//! │  Scanner  │  │ Connection │  │ Protocol │  │ Transport │
//! │           │  │            │  │          │  │           │
//! │ - Tracker │  │ - Phase    │  │ - UUIDs  │  │ - Requests│
//! │ allowlist │  │ - Flags    │  │ - Codec  │  │ - Events  │
//! └───────────┘  └────────────┘  └──────────┘  └───────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - GATT UUIDs, command bytes and the byte layouts
//! - [`scanner`] - Which discovered peripherals are wristbands
//! - [`connection`] - Link phase, flags and operation preconditions
//! - [`transport`] - The injected BLE capability and its callbacks
//! - [`wristband`] - The protocol state machine
//! - [`simulator`] - In-process wristband for demos and tests
//! - [`service`] - Async event pump and sync session

pub mod connection;
pub mod protocol;
pub mod scanner;
pub mod service;
pub mod simulator;
pub mod transport;
pub mod wristband;

// Re-export main types for convenience
pub use service::SyncService;
pub use transport::{BleTransport, TransportEvent};
pub use wristband::WristbandProtocol;
