//! # Relay Lifecycle
//!
//! [`Lifecycle`] drives one run end to end:
//!
//! ```text
//! Idle ──► Configuring ──► Acquiring ──► Draining ──► Stopped
//!            │                 │            ▲
//!            │  (error)        └─ interrupt ┘
//!            └────────────────────────────────────────► Stopped
//! ```
//!
//! | Phase | Relay mode | Forward mode |
//! |-------|------------|--------------|
//! | Configuring | halt running acquisition, deliver all channels, single-connection mode, start the relay sink | same, then point AcqKnowledge at `data.host:data.port` |
//! | Acquiring | toggle acquisition on, poll until it ends | wait for interrupt |
//! | Draining | grace period (natural end) or halt (interrupt), stop the sink | halt if running |
//!
//! Interrupts arrive through a [`CancellationToken`]. Control-call failures
//! during shutdown are logged and never mask the run's result.

use std::fmt;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::channel::{DeliveryMode, SessionSnapshot};
use crate::config::RelayConfig;
use crate::control::{AcquisitionControl, ControlConnector, deliver_all_enabled_channels, discover};
use crate::error::{AcqError, AcqResult};
use crate::forward::NamedForwarder;
use crate::relay::RelaySink;

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Configuring,
    Acquiring,
    Draining,
    Stopped,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Configuring => "configuring",
            Phase::Acquiring => "acquiring",
            Phase::Draining => "draining",
            Phase::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a run does with the data connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Receive the data locally and forward it (console and/or OSC).
    Relay,
    /// Point AcqKnowledge at an external application and wait.
    Forward,
}

impl RunMode {
    /// [`RunMode::Relay`] when any relay target is enabled.
    pub fn from_config(config: &RelayConfig) -> Self {
        if config.relay_enabled() {
            RunMode::Relay
        } else {
            RunMode::Forward
        }
    }
}

/// How the acquiring phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// AcqKnowledge finished the acquisition by itself.
    Completed,
    /// The run was cancelled.
    Interrupted,
}

/// Result of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub outcome: Outcome,
    pub mode: RunMode,
    pub session: SessionSnapshot,
    pub frames_forwarded: u64,
    pub phase: Phase,
}

/// Drives connection, configuration, acquisition, and shutdown.
pub struct Lifecycle {
    config: RelayConfig,
    mode: RunMode,
    phase: watch::Sender<Phase>,
}

impl Lifecycle {
    pub fn new(config: RelayConfig) -> Self {
        let mode = RunMode::from_config(&config);
        let (phase, _) = watch::channel(Phase::Idle);
        Self {
            config,
            mode,
            phase,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Watch phase transitions.
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, next: Phase) {
        let previous = self.phase.send_replace(next);
        if previous != next {
            tracing::info!(from = %previous, to = %next, "Lifecycle phase changed");
        }
    }

    /// Run to completion or interruption.
    ///
    /// `forwarders` are registered on the relay sink in order; forward mode
    /// ignores them. Connection failures return before any control call
    /// beyond the connection probe.
    pub async fn run<K: ControlConnector>(
        &self,
        connector: &K,
        forwarders: Vec<NamedForwarder>,
        cancel: CancellationToken,
    ) -> AcqResult<RunSummary> {
        self.set_phase(Phase::Idle);
        let (mut control, host, port) = match self.connect(connector).await {
            Ok(connected) => connected,
            Err(e) => {
                self.set_phase(Phase::Stopped);
                return Err(e);
            }
        };

        self.set_phase(Phase::Configuring);
        let (session, mut sink) = match self.configure(&control, host, port, forwarders).await {
            Ok(configured) => configured,
            Err(e) => {
                tracing::error!(error = %e, "Configuration failed");
                release(&mut control).await;
                self.set_phase(Phase::Stopped);
                return Err(e);
            }
        };

        let result = if cancel.is_cancelled() {
            Ok(Outcome::Interrupted)
        } else if let Some(sink) = sink.as_mut() {
            match start_acquisition(&control).await {
                Ok(()) => {
                    self.set_phase(Phase::Acquiring);
                    self.wait_for_end(&control, &cancel).await
                }
                Err(e) => {
                    sink.stop().await;
                    release(&mut control).await;
                    self.set_phase(Phase::Stopped);
                    return Err(e);
                }
            }
        } else {
            self.set_phase(Phase::Acquiring);
            tracing::info!(
                host = %self.config.data.host,
                port = self.config.data.port,
                "AcqKnowledge will deliver data to the external application; waiting for interrupt",
            );
            cancel.cancelled().await;
            Ok(Outcome::Interrupted)
        };

        self.set_phase(Phase::Draining);
        match result {
            Ok(Outcome::Completed) => {
                let grace = self.config.lifecycle.drain();
                tracing::info!(seconds = grace.as_secs(), "Acquisition ended, draining");
                tokio::select! {
                    () = cancel.cancelled() => tracing::info!("Drain cut short by interrupt"),
                    () = tokio::time::sleep(grace) => {}
                }
            }
            _ => halt_if_running(&control).await,
        }

        let frames_forwarded = match sink.as_mut() {
            Some(sink) => {
                sink.stop().await;
                sink.frames_forwarded()
            }
            None => 0,
        };
        release(&mut control).await;
        self.set_phase(Phase::Stopped);

        let outcome = result?;
        tracing::info!(?outcome, frames_forwarded, "Run finished");
        Ok(RunSummary {
            outcome,
            mode: self.mode,
            session,
            frames_forwarded,
            phase: self.phase(),
        })
    }

    async fn connect<K: ControlConnector>(
        &self,
        connector: &K,
    ) -> AcqResult<(K::Control, String, u16)> {
        let control = &self.config.control;
        if control.discover {
            let candidates = control.candidate_endpoints()?;
            discover(connector, &candidates, control.discovery_timeout()).await
        } else {
            tracing::info!(addr = %control.addr(), "Connecting to AcqKnowledge");
            let session = connector.connect(&control.host, control.port).await?;
            Ok((session, control.host.clone(), control.port))
        }
    }

    async fn configure<C: AcquisitionControl>(
        &self,
        control: &C,
        host: String,
        port: u16,
        forwarders: Vec<NamedForwarder>,
    ) -> AcqResult<(SessionSnapshot, Option<RelaySink>)> {
        if control.acquisition_in_progress().await? {
            control.toggle_acquisition().await?;
            tracing::info!("Stopped the acquisition already in progress");
        }

        let channels = deliver_all_enabled_channels(control).await?;

        if control.data_connection_method().await? != DeliveryMode::Single {
            let code = control
                .change_data_connection_method(DeliveryMode::Single)
                .await?;
            AcqError::check_code("change data connection method", code)?;
            tracing::info!("Data connection method changed to single");
        }

        let data = &self.config.data;
        let (single_connection_port, sink) = match self.mode {
            RunMode::Relay => {
                if let Some(hostname) = &data.announce_hostname {
                    let code = control.change_data_connection_hostname(hostname).await?;
                    AcqError::check_code(format!("change data connection hostname to {hostname}"), code)?;
                }
                let port = control.single_connection_mode_port().await?;
                tracing::info!(
                    format = ?data.sample_format(),
                    "Decoding with the configured sample format; AcqKnowledge must send the same",
                );
                let mut sink =
                    RelaySink::new(port, channels.clone(), data.sample_format(), data.rate_policy)?;
                for (name, forwarder) in forwarders {
                    sink.register_forwarder(name, forwarder);
                }
                sink.start().await?;
                (port, Some(sink))
            }
            RunMode::Forward => {
                let code = control.change_data_connection_hostname(&data.host).await?;
                AcqError::check_code(format!("change data connection hostname to {}", data.host), code)?;
                let code = control.change_single_connection_mode_port(data.port).await?;
                AcqError::check_code(format!("change single connection port to {}", data.port), code)?;
                (data.port, None)
            }
        };

        let session = SessionSnapshot {
            host,
            port,
            delivery_mode: DeliveryMode::Single,
            single_connection_port,
            channels,
        };
        tracing::info!(
            channels = session.channels.len(),
            data_port = session.single_connection_port,
            "AcqKnowledge configured",
        );
        Ok((session, sink))
    }

    async fn wait_for_end<C: AcquisitionControl>(
        &self,
        control: &C,
        cancel: &CancellationToken,
    ) -> AcqResult<Outcome> {
        let mut ticker = tokio::time::interval(self.config.lifecycle.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Run interrupted");
                    return Ok(Outcome::Interrupted);
                }
                _ = ticker.tick() => {
                    if !control.acquisition_in_progress().await? {
                        return Ok(Outcome::Completed);
                    }
                }
            }
        }
    }
}

async fn start_acquisition<C: AcquisitionControl>(control: &C) -> AcqResult<()> {
    let code = control.toggle_acquisition().await?;
    if !control.acquisition_in_progress().await? {
        tracing::error!(code, "Acquisition did not start");
        return Err(AcqError::AcquisitionStartFailed);
    }
    tracing::info!("Acquisition started");
    Ok(())
}

async fn halt_if_running<C: AcquisitionControl>(control: &C) {
    match control.acquisition_in_progress().await {
        Ok(true) => match control.toggle_acquisition().await {
            Ok(code) => tracing::info!(code, "Acquisition halted"),
            Err(e) => tracing::warn!(error = %e, "Failed to halt acquisition"),
        },
        Ok(false) => tracing::info!("Acquisition already stopped"),
        Err(e) => tracing::warn!(error = %e, "Could not query acquisition state during shutdown"),
    }
}

async fn release<C: AcquisitionControl>(control: &mut C) {
    if let Err(e) = control.disconnect().await {
        tracing::warn!(error = %e, "Disconnect failed");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::channel::{Channel, ChannelKind};
    use crate::fake::FakeAcq;
    use crate::frame::SampleFrame;

    fn channels() -> Vec<Channel> {
        vec![
            Channel::new(ChannelKind::Analog, 0, 1),
            Channel::new(ChannelKind::Analog, 1, 2),
        ]
    }

    fn relay_config() -> RelayConfig {
        let mut config = RelayConfig::default();
        config.console.enabled = true;
        config.lifecycle.poll_interval_ms = 10;
        config.lifecycle.drain_secs = 0;
        config
    }

    fn noop_forwarders() -> Vec<NamedForwarder> {
        vec![(
            "noop".into(),
            Box::new(|_: &SampleFrame| Ok::<(), AcqError>(())) as Box<dyn crate::forward::Forwarder>,
        )]
    }

    fn cancel_when(lifecycle: &Lifecycle, phase: Phase) -> CancellationToken {
        let cancel = CancellationToken::new();
        let mut phases = lifecycle.subscribe();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            if phases.wait_for(|p| *p == phase).await.is_ok() {
                trigger.cancel();
            }
        });
        cancel
    }

    #[tokio::test]
    async fn test_interrupt_halts_acquisition_exactly_once() {
        let fake = FakeAcq::with(|s| s.channels = channels());
        let lifecycle = Lifecycle::new(relay_config());
        let cancel = cancel_when(&lifecycle, Phase::Acquiring);

        let summary = lifecycle
            .run(&fake, noop_forwarders(), cancel)
            .await
            .unwrap();

        assert_eq!(summary.outcome, Outcome::Interrupted);
        assert_eq!(summary.phase, Phase::Stopped);
        assert_eq!(summary.session.channels, channels());
        // One toggle to start, one to halt.
        assert_eq!(fake.count("toggle_acquisition"), 2);
        assert!(!fake.state().running);
        assert!(!fake.state().connected);
    }

    #[tokio::test]
    async fn test_natural_end_completes_without_halt() {
        let fake = FakeAcq::with(|s| {
            s.channels = channels();
            s.polls_before_end = Some(3);
        });
        let lifecycle = Lifecycle::new(relay_config());

        let summary = lifecycle
            .run(&fake, noop_forwarders(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.outcome, Outcome::Completed);
        assert_eq!(fake.count("toggle_acquisition"), 1);
        assert_eq!(lifecycle.phase(), Phase::Stopped);
    }

    #[tokio::test]
    async fn test_interrupt_cuts_drain_short() {
        let fake = FakeAcq::with(|s| {
            s.channels = channels();
            s.polls_before_end = Some(1);
        });
        let mut config = relay_config();
        config.lifecycle.drain_secs = 3600;
        let lifecycle = Lifecycle::new(config);
        let cancel = cancel_when(&lifecycle, Phase::Draining);

        let summary = tokio::time::timeout(
            Duration::from_secs(5),
            lifecycle.run(&fake, noop_forwarders(), cancel),
        )
        .await
        .expect("drain was not cut short")
        .unwrap();

        assert_eq!(summary.outcome, Outcome::Completed);
    }

    #[tokio::test]
    async fn test_connection_refused_makes_no_control_calls() {
        let fake = FakeAcq::with(|s| s.refused_ports = vec![15010]);
        let lifecycle = Lifecycle::new(relay_config());

        let err = lifecycle
            .run(&fake, noop_forwarders(), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AcqError::ConnectionRefused { .. }));
        assert!(fake.calls().is_empty());
        assert_eq!(lifecycle.phase(), Phase::Stopped);
    }

    #[tokio::test]
    async fn test_configuring_halts_running_acquisition_and_switches_mode() {
        let fake = FakeAcq::with(|s| {
            s.channels = channels();
            s.running = true;
            s.mode = DeliveryMode::Multiple;
        });
        let lifecycle = Lifecycle::new(relay_config());
        let cancel = cancel_when(&lifecycle, Phase::Acquiring);

        lifecycle
            .run(&fake, noop_forwarders(), cancel)
            .await
            .unwrap();

        let calls = fake.calls();
        assert_eq!(calls[0], "acquisition_in_progress");
        assert_eq!(calls[1], "toggle_acquisition");
        assert_eq!(fake.count("change_data_connection_method"), 1);
        assert_eq!(fake.state().mode, DeliveryMode::Single);
    }

    #[tokio::test]
    async fn test_start_failure_is_reported() {
        let fake = FakeAcq::with(|s| {
            s.channels = channels();
            s.start_fails = true;
        });
        let lifecycle = Lifecycle::new(relay_config());

        let err = lifecycle
            .run(&fake, noop_forwarders(), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AcqError::AcquisitionStartFailed));
        assert_eq!(lifecycle.phase(), Phase::Stopped);
        assert!(!fake.state().connected);
    }

    #[tokio::test]
    async fn test_relay_without_channels_fails() {
        let fake = FakeAcq::default();
        let lifecycle = Lifecycle::new(relay_config());

        let err = lifecycle
            .run(&fake, noop_forwarders(), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AcqError::NoEnabledChannels));
        assert_eq!(fake.count("toggle_acquisition"), 0);
    }

    #[tokio::test]
    async fn test_forward_mode_points_acqknowledge_at_target() {
        let fake = FakeAcq::with(|s| s.channels = channels());
        let mut config = RelayConfig::default();
        config.data.host = "192.168.0.5".into();
        config.data.port = 16000;
        let lifecycle = Lifecycle::new(config);
        assert_eq!(lifecycle.mode(), RunMode::Forward);
        let cancel = cancel_when(&lifecycle, Phase::Acquiring);

        let summary = lifecycle.run(&fake, Vec::new(), cancel).await.unwrap();

        assert_eq!(summary.outcome, Outcome::Interrupted);
        assert_eq!(summary.session.single_connection_port, 16000);
        assert_eq!(summary.frames_forwarded, 0);
        assert_eq!(fake.state().hostname, "192.168.0.5");
        assert_eq!(fake.state().port, 16000);
        assert_eq!(fake.count("toggle_acquisition"), 0);
    }

    #[tokio::test]
    async fn test_forward_mode_rejected_code_aborts() {
        let fake = FakeAcq::with(|s| {
            s.channels = channels();
            s.change_code = 1;
        });
        let lifecycle = Lifecycle::new(RelayConfig::default());

        let err = lifecycle
            .run(&fake, Vec::new(), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AcqError::Rejected { code: 1, .. }));
        assert_eq!(fake.count("change_single_connection_mode_port"), 0);
    }

    #[tokio::test]
    async fn test_discovery_mode_connects_to_answering_candidate() {
        let fake = FakeAcq::with(|s| {
            s.channels = channels();
            s.refused_ports = vec![15010];
        });
        let mut config = relay_config();
        config.control.discover = true;
        let lifecycle = Lifecycle::new(config);
        let cancel = cancel_when(&lifecycle, Phase::Acquiring);

        let summary = lifecycle
            .run(&fake, noop_forwarders(), cancel)
            .await
            .unwrap();
        assert_eq!(summary.session.port, 15020);
    }
}
