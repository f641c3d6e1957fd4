//! # Acquisition Control
//!
//! The capability set the rest of the crate needs from an AcqKnowledge
//! control session. [`AcqServer`](crate::client::AcqServer) implements it
//! over XML-RPC; tests implement it in memory.
//!
//! Configuration calls return the vendor status code untouched so callers
//! decide how to treat it. [`AcqError::check_code`] maps non-zero codes to
//! [`AcqError::Rejected`].

use std::future::Future;
use std::time::Duration;

use crate::channel::{Channel, DeliveryMode};
use crate::error::{AcqError, AcqResult};

/// Operations on one control session.
pub trait AcquisitionControl: Send + Sync {
    /// Whether an acquisition is currently running.
    fn acquisition_in_progress(&self) -> impl Future<Output = AcqResult<bool>> + Send;

    /// Start a halted acquisition or halt a running one. Returns the
    /// vendor status code.
    fn toggle_acquisition(&self) -> impl Future<Output = AcqResult<i32>> + Send;

    fn data_connection_method(&self) -> impl Future<Output = AcqResult<DeliveryMode>> + Send;

    fn change_data_connection_method(
        &self,
        mode: DeliveryMode,
    ) -> impl Future<Output = AcqResult<i32>> + Send;

    /// Enabled channels in acquisition order, dividers resolved.
    fn enabled_channels(&self) -> impl Future<Output = AcqResult<Vec<Channel>>> + Send;

    /// Enable or disable network delivery of one channel.
    fn enable_data_delivery(
        &self,
        channel: Channel,
        enabled: bool,
    ) -> impl Future<Output = AcqResult<i32>> + Send;

    fn single_connection_mode_port(&self) -> impl Future<Output = AcqResult<u16>> + Send;

    fn change_single_connection_mode_port(
        &self,
        port: u16,
    ) -> impl Future<Output = AcqResult<i32>> + Send;

    /// Host AcqKnowledge should connect to when delivering data.
    fn change_data_connection_hostname(
        &self,
        host: &str,
    ) -> impl Future<Output = AcqResult<i32>> + Send;

    /// Close the session. Later calls fail with [`AcqError::NotConnected`].
    fn disconnect(&mut self) -> impl Future<Output = AcqResult<()>> + Send;
}

/// Opens control sessions.
pub trait ControlConnector: Send + Sync {
    type Control: AcquisitionControl;

    /// Connect to the control endpoint at `host:port`.
    fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = AcqResult<Self::Control>> + Send;
}

/// Enumerate enabled channels and enable network delivery for each of them.
///
/// Returns the channel list in acquisition order. An empty list is not an
/// error here; the relay sink refuses it.
pub async fn deliver_all_enabled_channels<C: AcquisitionControl>(
    control: &C,
) -> AcqResult<Vec<Channel>> {
    let channels = control.enabled_channels().await?;
    for channel in &channels {
        let code = control.enable_data_delivery(*channel, true).await?;
        AcqError::check_code(format!("enable data delivery for {channel}"), code)?;
    }
    tracing::info!(count = channels.len(), "Enabled data delivery for all channels");
    Ok(channels)
}

/// Probe `candidates` in order and return the first session whose endpoint
/// answers an acquisition-state query within `timeout`.
pub async fn discover<K: ControlConnector>(
    connector: &K,
    candidates: &[(String, u16)],
    timeout: Duration,
) -> AcqResult<(K::Control, String, u16)> {
    for (host, port) in candidates {
        tracing::debug!(host = %host, port, "Probing for AcqKnowledge");

        let probe = async {
            let control = connector.connect(host, *port).await?;
            control.acquisition_in_progress().await?;
            Ok::<_, AcqError>(control)
        };

        match tokio::time::timeout(timeout, probe).await {
            Ok(Ok(control)) => {
                tracing::info!(host = %host, port, "Discovered AcqKnowledge server");
                return Ok((control, host.clone(), *port));
            }
            Ok(Err(e)) => tracing::debug!(host = %host, port, error = %e, "Probe failed"),
            Err(_) => tracing::debug!(host = %host, port, "Probe timed out"),
        }
    }

    Err(AcqError::NoServerFound {
        tried: candidates.len(),
    })
}
