//! # Channels & Delivery Modes
//!
//! [`Channel`] identifies one enabled acquisition channel together with its
//! sample-rate divider relative to the hardware base rate. A channel with
//! divider `d` is sampled at every hardware index `i` where `i % d == 0`.
//!
//! ```
//! use acqknowledge_ndt::channel::{Channel, ChannelKind};
//!
//! let ecg = Channel::new(ChannelKind::Analog, 0, 1);
//! let resp = Channel::new(ChannelKind::Analog, 1, 2);
//! assert!(ecg.is_sampled_at(3));
//! assert!(!resp.is_sampled_at(3));
//! assert!(resp.is_sampled_at(4));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AcqError, AcqResult};
use crate::protocol::xmlrpc::Value;

/// Kind of acquisition channel as reported by AcqKnowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Analog,
    Digital,
    Calculation,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Analog => "analog",
            ChannelKind::Digital => "digital",
            ChannelKind::Calculation => "calculation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "analog" => Some(ChannelKind::Analog),
            "digital" => Some(ChannelKind::Digital),
            "calculation" | "calc" => Some(ChannelKind::Calculation),
            _ => None,
        }
    }
}

/// One enabled sensor channel.
///
/// Immutable once enumerated; the relay sink shares the enumerated list
/// read-only between configuration and the reception task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
    pub kind: ChannelKind,
    pub index: u32,
    /// Sample-rate divider relative to the hardware base rate (>= 1).
    pub divider: u32,
}

impl Channel {
    /// Create a channel. A divider of `0` is treated as `1`.
    pub fn new(kind: ChannelKind, index: u32, divider: u32) -> Self {
        Self {
            kind,
            index,
            divider: divider.max(1),
        }
    }

    /// Whether this channel contributes a sample at the given hardware index.
    pub fn is_sampled_at(&self, hardware_index: u64) -> bool {
        hardware_index % u64::from(self.divider) == 0
    }

    /// Channel identifier struct as sent to the control endpoint.
    pub(crate) fn to_value(self) -> Value {
        Value::Struct(vec![
            ("type".into(), Value::String(self.kind.as_str().into())),
            ("index".into(), Value::Int(i64::from(self.index))),
        ])
    }

    /// Parse a channel identifier struct (`{type, index}`), divider unknown.
    pub(crate) fn from_value(value: &Value) -> AcqResult<Self> {
        let kind = value
            .member("type")
            .and_then(Value::as_str)
            .and_then(ChannelKind::parse)
            .ok_or_else(|| AcqError::ProtocolError {
                reason: format!("channel struct without a valid type: {value:?}"),
            })?;
        let index = value
            .member("index")
            .and_then(Value::as_i64)
            .and_then(|i| u32::try_from(i).ok())
            .ok_or_else(|| AcqError::ProtocolError {
                reason: format!("channel struct without a valid index: {value:?}"),
            })?;
        Ok(Self::new(kind, index, 1))
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (/{})", self.kind.as_str(), self.index, self.divider)
    }
}

/// How AcqKnowledge delivers channel data over the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// One TCP connection carries all channels.
    Single,
    /// One TCP connection per channel.
    Multiple,
}

impl DeliveryMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryMode::Single => "single",
            DeliveryMode::Multiple => "multiple",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Some(DeliveryMode::Single),
            "multiple" => Some(DeliveryMode::Multiple),
            _ => None,
        }
    }
}

/// Read-only view of what a control session negotiated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub host: String,
    pub port: u16,
    pub delivery_mode: DeliveryMode,
    pub single_connection_port: u16,
    pub channels: Vec<Channel>,
}
