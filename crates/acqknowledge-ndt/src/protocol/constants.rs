//! Protocol constants for method names, ports, and relay defaults.

/// AcqKnowledge control method names (XML-RPC).
pub struct Methods;

impl Methods {
    // ─── Acquisition ────────────────────────────────────────────────

    /// Whether an acquisition is currently running.
    pub const GET_ACQUISITION_IN_PROGRESS: &'static str = "acq.getAcquisitionInProgress";

    /// Start a halted acquisition, or halt a running one.
    pub const TOGGLE_ACQUISITION: &'static str = "acq.toggleAcquisition";

    // ─── Data connection ────────────────────────────────────────────

    /// Current delivery mode (`"single"` or `"multiple"`).
    pub const GET_DATA_CONNECTION_METHOD: &'static str = "acq.getDataConnectionMethod";

    /// Change the delivery mode.
    pub const CHANGE_DATA_CONNECTION_METHOD: &'static str = "acq.changeDataConnectionMethod";

    /// TCP port AcqKnowledge connects to in single-connection mode.
    pub const GET_SINGLE_CONNECTION_MODE_PORT: &'static str = "acq.getSingleConnectionModePort";

    /// Change the single-connection-mode TCP port.
    pub const CHANGE_SINGLE_CONNECTION_MODE_PORT: &'static str =
        "acq.changeSingleConnectionModePort";

    /// Change the hostname AcqKnowledge connects to when delivering data.
    pub const CHANGE_DATA_CONNECTION_HOSTNAME: &'static str = "acq.changeDataConnectionHostname";

    // ─── Channels ───────────────────────────────────────────────────

    /// List the channels enabled for acquisition.
    pub const GET_ENABLED_CHANNELS: &'static str = "acq.getEnabledChannels";

    /// Sample-rate divider of one channel relative to the base rate.
    pub const GET_DOWNSAMPLING_DIVIDER: &'static str = "acq.getDownsamplingDivider";

    /// Enable or disable network delivery of one channel.
    pub const CHANGE_DATA_DELIVERY_ENABLED: &'static str = "acq.changeDataDeliveryEnabled";
}

/// HTTP path of the XML-RPC endpoint.
pub const RPC_PATH: &str = "/RPC2";

/// Default control endpoint port.
pub const DEFAULT_CONTROL_PORT: u16 = 15010;

/// Default single-connection data port.
pub const DEFAULT_DATA_PORT: u16 = 15020;

/// Default OSC destination port.
pub const DEFAULT_OSC_PORT: u16 = 5005;

/// Default OSC address path for relayed frames.
pub const DEFAULT_OSC_ADDRESS: &str = "/BioHarness";

/// Default host for every endpoint.
pub const DEFAULT_HOST: &str = "127.0.0.1";
