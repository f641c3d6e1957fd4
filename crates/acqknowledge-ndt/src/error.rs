//! # Error Types
//!
//! Semantic error types for talking to an AcqKnowledge server and relaying
//! its data. Every variant carries enough context to tell the user what went
//! wrong without digging through logs.
//!
//! ## Vendor Return Codes
//!
//! The `change*` control methods answer with an integer status where `0`
//! means success. [`AcqError::check_code`] turns any other value into
//! [`AcqError::Rejected`].

use thiserror::Error;

/// Convenient Result alias for AcqKnowledge operations.
pub type AcqResult<T> = std::result::Result<T, AcqError>;

/// All errors that can occur when controlling AcqKnowledge or relaying data.
#[derive(Error, Debug)]
pub enum AcqError {
    // ─── Connection ─────────────────────────────────────────────────
    /// The control endpoint actively refused the connection.
    #[error("Connection to AcqKnowledge at {addr} refused. Is the networking feature enabled?")]
    ConnectionRefused { addr: String },

    /// Any other failure to reach the control endpoint.
    #[error("Failed to connect to AcqKnowledge at {addr}: {reason}")]
    ConnectionFailed { addr: String, reason: String },

    /// Autodiscovery found no answering server among the candidates.
    #[error("No AcqKnowledge servers found (tried {tried} endpoint(s))")]
    NoServerFound { tried: usize },

    /// The session was already closed.
    #[error("Not connected to AcqKnowledge")]
    NotConnected,

    // ─── Control ────────────────────────────────────────────────────
    /// The server answered with an XML-RPC fault.
    #[error("AcqKnowledge fault {code}: {message}")]
    Fault { code: i32, message: String },

    /// A configuration call returned a non-zero vendor status code.
    #[error("AcqKnowledge rejected {operation} (return code {code})")]
    Rejected { operation: String, code: i32 },

    /// AcqKnowledge reports no channels enabled for acquisition.
    #[error("No channels are enabled for acquisition. Enable channels in the AcqKnowledge template.")]
    NoEnabledChannels,

    /// Acquisition was toggled on but the server does not report it running.
    #[error("Unable to start data acquisition")]
    AcquisitionStartFailed,

    // ─── Relay ──────────────────────────────────────────────────────
    /// `start` was called on a relay sink that is already listening.
    #[error("Relay sink already running on port {port}")]
    RelayAlreadyRunning { port: u16 },

    /// OSC encoding or sending failed.
    #[error("OSC error: {0}")]
    Osc(String),

    // ─── Timeout ────────────────────────────────────────────────────
    /// A control call timed out waiting for a response.
    #[error("Operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    // ─── Protocol ───────────────────────────────────────────────────
    /// Malformed or unexpected data from the server.
    #[error("Protocol error: {reason}")]
    ProtocolError { reason: String },

    // ─── Config ─────────────────────────────────────────────────────
    /// Configuration file or value error.
    #[error("Configuration error: {reason}")]
    ConfigError { reason: String },

    // ─── Transport ──────────────────────────────────────────────────
    /// Low-level HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Socket or filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error (console JSON output).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AcqError {
    /// Map a vendor status code to `Ok(())` or [`AcqError::Rejected`].
    pub fn check_code(operation: impl Into<String>, code: i32) -> AcqResult<()> {
        if code == 0 {
            Ok(())
        } else {
            Err(AcqError::Rejected {
                operation: operation.into(),
                code,
            })
        }
    }

    /// Returns `true` if this error means the control endpoint is unreachable.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            AcqError::ConnectionRefused { .. }
                | AcqError::ConnectionFailed { .. }
                | AcqError::NotConnected
                | AcqError::Timeout { .. }
        )
    }
}

// ─── From impls for external error types ────────────────────────────────

impl From<reqwest::Error> for AcqError {
    fn from(err: reqwest::Error) -> Self {
        AcqError::Http(err.to_string())
    }
}

impl From<rosc::OscError> for AcqError {
    fn from(err: rosc::OscError) -> Self {
        AcqError::Osc(format!("{err:?}"))
    }
}

#[cfg(feature = "config-toml")]
impl From<toml::de::Error> for AcqError {
    fn from(err: toml::de::Error) -> Self {
        AcqError::ConfigError {
            reason: err.to_string(),
        }
    }
}
