//! # acqknowledge-ndt
//!
//! A Rust client for the network data transfer (NDT) feature of BIOPAC
//! AcqKnowledge, plus a relay that receives streamed samples and forwards
//! them to the console or as OSC messages.
//!
//! ## Quick Start
//!
//! ```no_run
//! use acqknowledge_ndt::{AcqServer, AcquisitionControl};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> acqknowledge_ndt::AcqResult<()> {
//!     let mut server = AcqServer::connect("127.0.0.1", 15010, Duration::from_secs(10)).await?;
//!
//!     for channel in server.enabled_channels().await? {
//!         println!("enabled: {channel}");
//!     }
//!     println!("acquiring: {}", server.acquisition_in_progress().await?);
//!
//!     server.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Layers
//!
//! | Layer | Type | Best for |
//! |-------|------|----------|
//! | Control | [`AcqServer`] via [`AcquisitionControl`] | Scripting AcqKnowledge directly |
//! | Relay | [`RelaySink`] + [`Forwarder`]s | Receiving single-connection data |
//! | Orchestration | [`Lifecycle`] | Full configure, acquire, drain runs |
//!
//! ## Configuration
//!
//! See [`RelayConfig`] for the full configuration reference. A minimal
//! `acq-ndt.toml`:
//!
//! ```toml
//! [control]
//! host = "127.0.0.1"
//! port = 15010
//!
//! [osc]
//! enabled = true
//! ```

pub mod channel;
pub mod client;
pub mod config;
pub mod control;
pub mod error;
pub mod forward;
pub mod frame;
pub mod lifecycle;
pub mod protocol;
pub mod relay;
pub mod streams;

#[cfg(test)]
pub(crate) mod fake;

// ─── Public re-exports ──────────────────────────────────────────────────

pub use channel::{Channel, ChannelKind, DeliveryMode, SessionSnapshot};
pub use client::{AcqServer, XmlRpcConnector};
pub use config::RelayConfig;
pub use control::{AcquisitionControl, ControlConnector};
pub use error::{AcqError, AcqResult};
pub use forward::{ConsoleForwarder, Forwarder, OscForwarder};
pub use frame::{RatePolicy, SampleFrame};
pub use lifecycle::{Lifecycle, Outcome, Phase, RunMode, RunSummary};
pub use relay::RelaySink;
pub use streams::FrameStream;
