//! Sync Service Module
//!
//! Owns the protocol together with the channel its transport reports into,
//! and runs a complete sync session on top of it.

use crate::domain::registry::{DeviceRegistry, ProfileTable};
use crate::domain::settings::UserProfile;
use crate::domain::steps::StepsData;
use crate::error::WristbandError;
use crate::infrastructure::bluetooth::transport::{BleTransport, TransportEvent};
use crate::infrastructure::bluetooth::wristband::WristbandProtocol;
use anyhow::{bail, Result};
use chrono::NaiveDateTime;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Main service pumping transport events into the protocol
pub struct SyncService<T: BleTransport, R: DeviceRegistry = ProfileTable> {
    protocol: WristbandProtocol<T, R>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    step_timeout: Duration,
}

impl<T: BleTransport, R: DeviceRegistry> SyncService<T, R> {
    pub fn new(
        protocol: WristbandProtocol<T, R>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self {
            protocol,
            events,
            step_timeout: Duration::from_secs(10),
        }
    }

    /// Longest wait for the next transport event before a step is abandoned.
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn protocol(&self) -> &WristbandProtocol<T, R> {
        &self.protocol
    }

    pub fn protocol_mut(&mut self) -> &mut WristbandProtocol<T, R> {
        &mut self.protocol
    }

    /// Handle every event already queued. Returns how many were handled.
    pub fn drain(&mut self) -> Result<usize, WristbandError> {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.protocol.handle_event(event)?;
            handled += 1;
        }
        Ok(handled)
    }

    /// Wait for the next event and handle it. `None` once the transport side
    /// of the channel is gone.
    pub async fn process_next(&mut self) -> Option<Result<(), WristbandError>> {
        let event = self.events.recv().await?;
        Some(self.protocol.handle_event(event))
    }

    /// Handle events until the protocol is no longer busy and nothing is
    /// queued.
    pub async fn run_until_settled(&mut self) -> Result<()> {
        loop {
            self.drain()?;
            if !self.protocol.is_busy() {
                return Ok(());
            }

            match tokio::time::timeout(self.step_timeout, self.process_next()).await {
                Ok(Some(result)) => result?,
                Ok(None) => bail!("transport channel closed in phase {}", self.protocol.phase()),
                Err(_) => {
                    warn!("No transport event for {:?}", self.step_timeout);
                    bail!("timed out in phase {}", self.protocol.phase())
                }
            }
        }
    }

    /// Run one complete session: connect, collect steps, write the clock and
    /// user settings, clear the band's history and shut down again.
    pub async fn sync_once(&mut self, user: &UserProfile, now: NaiveDateTime) -> Result<StepsData> {
        self.protocol.initialize();
        self.run_until_settled().await?;
        if !self.protocol.is_initialized() {
            bail!("BLE central failed to initialize");
        }

        let result = self.collect_and_configure(user, now).await;
        if result.is_err() {
            self.protocol.abort();
        } else {
            self.protocol.disconnect();
        }
        self.run_until_settled().await?;
        self.protocol.deinitialize();
        self.run_until_settled().await?;

        result
    }

    async fn collect_and_configure(
        &mut self,
        user: &UserProfile,
        now: NaiveDateTime,
    ) -> Result<StepsData> {
        self.protocol.scan_and_autoconnect();
        self.run_until_settled().await?;
        if !self.protocol.is_connected() {
            bail!("no supported wristband connected");
        }
        info!(
            "Connected to {} ({:?})",
            self.protocol.peripheral_name().unwrap_or_default(),
            self.protocol.connected_profile_type()
        );

        self.protocol.read_steps_and_exercise_time()?;
        self.run_until_settled().await?;
        if !self.protocol.has_history() {
            bail!("steps could not be collected");
        }
        let steps = self.protocol.steps().clone();
        debug!("Collected {} step(s) in total", steps.total_steps_walked());

        self.protocol.write_user_settings(user, now)?;
        self.run_until_settled().await?;

        self.protocol.clear_history()?;
        self.run_until_settled().await?;

        Ok(steps)
    }
}
