//! Scripted in-memory control session for unit tests.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::channel::{Channel, DeliveryMode};
use crate::control::{AcquisitionControl, ControlConnector};
use crate::error::{AcqError, AcqResult};

#[derive(Debug)]
pub(crate) struct FakeState {
    pub running: bool,
    pub mode: DeliveryMode,
    pub port: u16,
    pub hostname: String,
    pub channels: Vec<Channel>,
    /// Toggling a halted acquisition leaves it halted.
    pub start_fails: bool,
    /// Polls answered `true` after a start before the acquisition ends by
    /// itself. The start check counts as one.
    pub polls_before_end: Option<usize>,
    pub remaining_polls: Option<usize>,
    /// Return code for hostname and port changes.
    pub change_code: i32,
    /// Endpoints that refuse connections.
    pub refused_ports: Vec<u16>,
    pub connected: bool,
    pub calls: Vec<&'static str>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            running: false,
            mode: DeliveryMode::Single,
            port: 0,
            hostname: String::new(),
            channels: Vec::new(),
            start_fails: false,
            polls_before_end: None,
            remaining_polls: None,
            change_code: 0,
            refused_ports: Vec::new(),
            connected: false,
            calls: Vec::new(),
        }
    }
}

/// Shared handle: the connector, every session, and the test see one state.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeAcq {
    state: Arc<Mutex<FakeState>>,
}

impl FakeAcq {
    pub fn with(f: impl FnOnce(&mut FakeState)) -> Self {
        let fake = Self::default();
        f(&mut fake.state());
        fake
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.state().calls.iter().filter(|c| **c == call).count()
    }

    fn record(&self, call: &'static str) -> AcqResult<MutexGuard<'_, FakeState>> {
        let mut state = self.state();
        if !state.connected {
            return Err(AcqError::NotConnected);
        }
        state.calls.push(call);
        Ok(state)
    }
}

impl AcquisitionControl for FakeAcq {
    async fn acquisition_in_progress(&self) -> AcqResult<bool> {
        let mut state = self.record("acquisition_in_progress")?;
        if state.running {
            match state.remaining_polls {
                Some(0) => state.running = false,
                Some(n) => state.remaining_polls = Some(n - 1),
                None => {}
            }
        }
        Ok(state.running)
    }

    async fn toggle_acquisition(&self) -> AcqResult<i32> {
        let mut state = self.record("toggle_acquisition")?;
        if state.running {
            state.running = false;
        } else if !state.start_fails {
            state.running = true;
            state.remaining_polls = state.polls_before_end;
        }
        Ok(0)
    }

    async fn data_connection_method(&self) -> AcqResult<DeliveryMode> {
        Ok(self.record("data_connection_method")?.mode)
    }

    async fn change_data_connection_method(&self, mode: DeliveryMode) -> AcqResult<i32> {
        self.record("change_data_connection_method")?.mode = mode;
        Ok(0)
    }

    async fn enabled_channels(&self) -> AcqResult<Vec<Channel>> {
        Ok(self.record("enabled_channels")?.channels.clone())
    }

    async fn enable_data_delivery(&self, _channel: Channel, _enabled: bool) -> AcqResult<i32> {
        drop(self.record("enable_data_delivery")?);
        Ok(0)
    }

    async fn single_connection_mode_port(&self) -> AcqResult<u16> {
        Ok(self.record("single_connection_mode_port")?.port)
    }

    async fn change_single_connection_mode_port(&self, port: u16) -> AcqResult<i32> {
        let mut state = self.record("change_single_connection_mode_port")?;
        if state.change_code == 0 {
            state.port = port;
        }
        Ok(state.change_code)
    }

    async fn change_data_connection_hostname(&self, host: &str) -> AcqResult<i32> {
        let mut state = self.record("change_data_connection_hostname")?;
        if state.change_code == 0 {
            state.hostname = host.to_string();
        }
        Ok(state.change_code)
    }

    async fn disconnect(&mut self) -> AcqResult<()> {
        self.state().connected = false;
        Ok(())
    }
}

impl ControlConnector for FakeAcq {
    type Control = FakeAcq;

    async fn connect(&self, host: &str, port: u16) -> AcqResult<FakeAcq> {
        let mut state = self.state();
        if state.refused_ports.contains(&port) {
            return Err(AcqError::ConnectionRefused {
                addr: format!("{host}:{port}"),
            });
        }
        state.connected = true;
        Ok(self.clone())
    }
}
