//! # Relay Sink
//!
//! Local data server for single-connection mode. AcqKnowledge connects to
//! it once and streams binary samples; the sink decodes them into
//! [`SampleFrame`](crate::frame::SampleFrame)s and hands each frame to every registered
//! [`Forwarder`], in registration order.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     RelaySink                        │
//! │                                                      │
//! │  start() ──► TcpListener ──► accept (one peer)       │
//! │                                                      │
//! │  reception task:                                     │
//! │    socket bytes ─► FrameDecoder ─┬─► forwarder "osc" │
//! │                                  ├─► forwarder "..." │
//! │                                  └─► frame counter   │
//! │                                                      │
//! │  stop() ──► CancellationToken ──► task exits         │
//! └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channel::Channel;
use crate::error::{AcqError, AcqResult};
use crate::forward::{Forwarder, NamedForwarder};
use crate::frame::{FrameDecoder, RatePolicy, SampleFormat};

/// Socket read buffer size.
const READ_BUFFER: usize = 8192;

/// Default listen host: every interface, since AcqKnowledge may run on
/// another machine.
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    Ready,
    Running { port: u16 },
    Stopped,
}

/// TCP listener that relays AcqKnowledge sample frames to forwarders.
pub struct RelaySink {
    bind_host: String,
    port: u16,
    channels: Arc<[Channel]>,
    format: SampleFormat,
    policy: RatePolicy,
    forwarders: Vec<NamedForwarder>,
    state: SinkState,
    local_addr: Option<SocketAddr>,
    frames: Arc<AtomicU64>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl RelaySink {
    /// Create a sink for `channels` (acquisition order) listening on `port`.
    ///
    /// Fails with [`AcqError::NoEnabledChannels`] for an empty channel list.
    pub fn new(
        port: u16,
        channels: impl Into<Arc<[Channel]>>,
        format: SampleFormat,
        policy: RatePolicy,
    ) -> AcqResult<Self> {
        let channels: Arc<[Channel]> = channels.into();
        if channels.is_empty() {
            return Err(AcqError::NoEnabledChannels);
        }
        Ok(Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port,
            channels,
            format,
            policy,
            forwarders: Vec::new(),
            state: SinkState::Ready,
            local_addr: None,
            frames: Arc::new(AtomicU64::new(0)),
            cancel: CancellationToken::new(),
            handle: None,
        })
    }

    /// Listen on `host` instead of every interface.
    #[must_use]
    pub fn with_bind_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = host.into();
        self
    }

    /// Register a forwarder. Forwarders run in registration order.
    ///
    /// Forwarders registered after [`start`](Self::start) are ignored.
    pub fn register_forwarder(&mut self, name: impl Into<String>, forwarder: Box<dyn Forwarder>) {
        let name = name.into();
        if self.state != SinkState::Ready {
            tracing::warn!(forwarder = %name, "Ignoring forwarder registered after start");
            return;
        }
        tracing::debug!(forwarder = %name, "Registered forwarder");
        self.forwarders.push((name, forwarder));
    }

    pub fn forwarder_names(&self) -> Vec<&str> {
        self.forwarders.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Address actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Frames decoded and forwarded so far.
    pub fn frames_forwarded(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Whether the reception task is still alive.
    pub fn is_running(&self) -> bool {
        matches!(self.state, SinkState::Running { .. })
            && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Bind the listener and spawn the reception task.
    ///
    /// Fails with [`AcqError::RelayAlreadyRunning`] if the sink is already
    /// listening; a second listener is never bound.
    pub async fn start(&mut self) -> AcqResult<SocketAddr> {
        match self.state {
            SinkState::Running { port } => return Err(AcqError::RelayAlreadyRunning { port }),
            SinkState::Stopped => {
                return Err(AcqError::ProtocolError {
                    reason: "relay sink was stopped and cannot be restarted".into(),
                });
            }
            SinkState::Ready => {}
        }

        let decoder = FrameDecoder::new(Arc::clone(&self.channels), self.format, self.policy)?;
        let listener = TcpListener::bind((self.bind_host.as_str(), self.port)).await?;
        let local_addr = listener.local_addr()?;

        let forwarders = std::mem::take(&mut self.forwarders);
        tracing::info!(
            addr = %local_addr,
            channels = self.channels.len(),
            forwarders = forwarders.len(),
            "Relay sink listening",
        );

        self.handle = Some(tokio::spawn(receive(
            listener,
            decoder,
            forwarders,
            Arc::clone(&self.frames),
            self.cancel.clone(),
        )));
        self.local_addr = Some(local_addr);
        self.state = SinkState::Running {
            port: local_addr.port(),
        };
        Ok(local_addr)
    }

    /// Close the socket and end the reception task. Safe to call repeatedly.
    pub async fn stop(&mut self) {
        if self.state == SinkState::Ready {
            return;
        }
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Relay reception task panicked");
            }
            tracing::info!(frames = self.frames_forwarded(), "Relay sink stopped");
        }
        self.state = SinkState::Stopped;
    }
}

impl Drop for RelaySink {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn receive(
    listener: TcpListener,
    mut decoder: FrameDecoder,
    mut forwarders: Vec<NamedForwarder>,
    frames: Arc<AtomicU64>,
    cancel: CancellationToken,
) {
    let (mut stream, peer): (TcpStream, SocketAddr) = tokio::select! {
        () = cancel.cancelled() => return,
        accepted = listener.accept() => match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(error = %e, "Relay sink accept failed");
                return;
            }
        },
    };
    // One inbound connection only.
    drop(listener);
    tracing::info!(%peer, "AcqKnowledge connected to relay sink");

    let mut buf = vec![0u8; READ_BUFFER];
    loop {
        let n = tokio::select! {
            () = cancel.cancelled() => break,
            read = stream.read(&mut buf) => match read {
                Ok(0) => {
                    tracing::info!(%peer, "Data connection closed by AcqKnowledge");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "Data connection lost");
                    break;
                }
            },
        };

        for frame in decoder.push(&buf[..n]) {
            for (name, forwarder) in &mut forwarders {
                if let Err(e) = forwarder.forward(&frame) {
                    tracing::warn!(forwarder = %name, index = frame.index, error = %e, "Forwarder failed");
                }
            }
            frames.fetch_add(1, Ordering::Relaxed);
        }
    }

    if decoder.pending_bytes() > 0 {
        tracing::debug!(
            bytes = decoder.pending_bytes(),
            "Discarding incomplete trailing sample"
        );
    }
}
