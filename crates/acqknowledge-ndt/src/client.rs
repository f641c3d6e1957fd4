//! # AcqKnowledge XML-RPC Client
//!
//! [`AcqServer`] is the control session for one AcqKnowledge instance. Each
//! call is one HTTP POST of an XML-RPC `methodCall` to
//! `http://host:port/RPC2`; the reply is decoded by
//! [`protocol::xmlrpc`](crate::protocol::xmlrpc).
//!
//! ```text
//! AcqServer::call(method, params)
//!     encode_call ──► POST /RPC2 ──► decode_response ──► Value
//!                                          └─ <fault> ──► AcqError::Fault
//! ```
//!
//! Connecting probes the endpoint once with an acquisition-state query so a
//! refused connection is reported up front as
//! [`AcqError::ConnectionRefused`].

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;

use crate::channel::{Channel, DeliveryMode};
use crate::config::join_host_port;
use crate::control::{AcquisitionControl, ControlConnector};
use crate::error::{AcqError, AcqResult};
use crate::protocol::constants::{Methods, RPC_PATH};
use crate::protocol::xmlrpc::{Value, decode_response, encode_call};

/// Control session with an AcqKnowledge server.
#[derive(Debug)]
pub struct AcqServer {
    http: reqwest::Client,
    url: String,
    addr: String,
    rpc_timeout: Duration,
    connected: bool,
}

impl AcqServer {
    /// Connect to the control endpoint at `host:port`.
    pub async fn connect(host: &str, port: u16, rpc_timeout: Duration) -> AcqResult<Self> {
        let addr = join_host_port(host, port);
        let http = reqwest::Client::builder()
            .timeout(rpc_timeout)
            .build()
            .map_err(|e| AcqError::ConnectionFailed {
                addr: addr.clone(),
                reason: format!("HTTP client setup failed: {e}"),
            })?;

        let server = Self {
            http,
            url: format!("http://{addr}{RPC_PATH}"),
            addr,
            rpc_timeout,
            connected: true,
        };

        let running = server.acquisition_in_progress().await?;
        tracing::info!(addr = %server.addr, running, "Connected to AcqKnowledge");
        Ok(server)
    }

    /// `host:port` of the control endpoint.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    // ─── Core RPC ───────────────────────────────────────────────────────

    async fn call(&self, method: &'static str, params: &[Value]) -> AcqResult<Value> {
        if !self.connected {
            return Err(AcqError::NotConnected);
        }

        let body = encode_call(method, params);
        tracing::debug!(method, body = %body, "Sending AcqKnowledge request");

        let response = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AcqError::ProtocolError {
                reason: format!("{method} answered with HTTP status {status}"),
            });
        }

        let text = response.text().await.map_err(|e| self.transport_error(&e))?;
        let value = decode_response(&text).inspect_err(|e| {
            tracing::error!(method, error = %e, "AcqKnowledge call failed");
        })?;

        tracing::debug!(method, "AcqKnowledge call succeeded");
        Ok(value)
    }

    fn transport_error(&self, err: &reqwest::Error) -> AcqError {
        if err.is_timeout() {
            return AcqError::Timeout {
                seconds: self.rpc_timeout.as_secs(),
            };
        }
        if err.is_connect() {
            if is_refused(err) {
                return AcqError::ConnectionRefused {
                    addr: self.addr.clone(),
                };
            }
            return AcqError::ConnectionFailed {
                addr: self.addr.clone(),
                reason: err.to_string(),
            };
        }
        AcqError::Http(err.to_string())
    }

    async fn call_code(&self, method: &'static str, params: &[Value]) -> AcqResult<i32> {
        let value = self.call(method, params).await?;
        value
            .as_i64()
            .and_then(|c| i32::try_from(c).ok())
            .ok_or_else(|| unexpected(method, &value))
    }
}

fn is_refused(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            return io.kind() == std::io::ErrorKind::ConnectionRefused;
        }
        source = inner.source();
    }
    false
}

fn unexpected(method: &str, value: &Value) -> AcqError {
    AcqError::ProtocolError {
        reason: format!("unexpected {method} result: {value:?}"),
    }
}

impl AcquisitionControl for AcqServer {
    async fn acquisition_in_progress(&self) -> AcqResult<bool> {
        let value = self.call(Methods::GET_ACQUISITION_IN_PROGRESS, &[]).await?;
        value
            .as_bool()
            .ok_or_else(|| unexpected(Methods::GET_ACQUISITION_IN_PROGRESS, &value))
    }

    async fn toggle_acquisition(&self) -> AcqResult<i32> {
        let code = self.call_code(Methods::TOGGLE_ACQUISITION, &[]).await?;
        tracing::info!(code, "Toggled acquisition");
        Ok(code)
    }

    async fn data_connection_method(&self) -> AcqResult<DeliveryMode> {
        let value = self.call(Methods::GET_DATA_CONNECTION_METHOD, &[]).await?;
        value
            .as_str()
            .and_then(DeliveryMode::parse)
            .ok_or_else(|| unexpected(Methods::GET_DATA_CONNECTION_METHOD, &value))
    }

    async fn change_data_connection_method(&self, mode: DeliveryMode) -> AcqResult<i32> {
        self.call_code(
            Methods::CHANGE_DATA_CONNECTION_METHOD,
            &[Value::String(mode.as_str().into())],
        )
        .await
    }

    async fn enabled_channels(&self) -> AcqResult<Vec<Channel>> {
        let value = self.call(Methods::GET_ENABLED_CHANNELS, &[]).await?;
        let items: &[Value] = match &value {
            Value::Array(items) => items.as_slice(),
            Value::Nil => &[],
            other => return Err(unexpected(Methods::GET_ENABLED_CHANNELS, other)),
        };

        let mut channels = Vec::with_capacity(items.len());
        for item in items {
            let channel = Channel::from_value(item)?;
            let divider = self
                .call(Methods::GET_DOWNSAMPLING_DIVIDER, &[channel.to_value()])
                .await?;
            let divider = divider
                .as_i64()
                .and_then(|d| u32::try_from(d).ok())
                .ok_or_else(|| unexpected(Methods::GET_DOWNSAMPLING_DIVIDER, &divider))?;
            channels.push(Channel::new(channel.kind, channel.index, divider));
        }

        tracing::debug!(count = channels.len(), "Enumerated enabled channels");
        Ok(channels)
    }

    async fn enable_data_delivery(&self, channel: Channel, enabled: bool) -> AcqResult<i32> {
        self.call_code(
            Methods::CHANGE_DATA_DELIVERY_ENABLED,
            &[channel.to_value(), Value::Bool(enabled)],
        )
        .await
    }

    async fn single_connection_mode_port(&self) -> AcqResult<u16> {
        let value = self
            .call(Methods::GET_SINGLE_CONNECTION_MODE_PORT, &[])
            .await?;
        value
            .as_i64()
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| unexpected(Methods::GET_SINGLE_CONNECTION_MODE_PORT, &value))
    }

    async fn change_single_connection_mode_port(&self, port: u16) -> AcqResult<i32> {
        self.call_code(
            Methods::CHANGE_SINGLE_CONNECTION_MODE_PORT,
            &[Value::Int(i64::from(port))],
        )
        .await
    }

    async fn change_data_connection_hostname(&self, host: &str) -> AcqResult<i32> {
        self.call_code(
            Methods::CHANGE_DATA_CONNECTION_HOSTNAME,
            &[Value::String(host.into())],
        )
        .await
    }

    async fn disconnect(&mut self) -> AcqResult<()> {
        if self.connected {
            self.connected = false;
            tracing::info!(addr = %self.addr, "Disconnected from AcqKnowledge");
        }
        Ok(())
    }
}

/// Opens [`AcqServer`] sessions with a fixed per-call timeout.
#[derive(Debug, Clone)]
pub struct XmlRpcConnector {
    pub rpc_timeout: Duration,
}

impl XmlRpcConnector {
    pub fn new(rpc_timeout: Duration) -> Self {
        Self { rpc_timeout }
    }
}

impl ControlConnector for XmlRpcConnector {
    type Control = AcqServer;

    async fn connect(&self, host: &str, port: u16) -> AcqResult<AcqServer> {
        AcqServer::connect(host, port, self.rpc_timeout).await
    }
}
