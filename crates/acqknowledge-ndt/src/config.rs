//! # Configuration
//!
//! [`RelayConfig`] holds everything needed to reach AcqKnowledge and relay
//! its data.
//!
//! ## Loading Priority
//!
//! Configuration is loaded from the first source that provides a value:
//!
//! 1. TOML config file at an explicit path
//! 2. `ACQ_NDT_CONFIG` environment variable pointing at a file
//! 3. `./acq-ndt.toml` in the current directory
//! 4. `~/.config/acq-ndt/acq-ndt.toml`
//! 5. Built-in defaults
//!
//! Endpoint fields can always be overridden by environment variables
//! (`ACQ_CONTROL_HOST`, `ACQ_CONTROL_PORT`, `ACQ_OSC_HOST`, `ACQ_OSC_PORT`),
//! and the CLI overrides both.
//!
//! ## Example
//!
//! ```toml
//! [control]
//! host = "192.168.1.20"
//! port = 15010
//!
//! [osc]
//! enabled = true
//! port = 9000
//!
//! [lifecycle]
//! drain_secs = 5
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AcqError, AcqResult};
use crate::frame::{ByteOrder, RatePolicy, SampleFormat, SampleType};
use crate::protocol::constants::{
    DEFAULT_CONTROL_PORT, DEFAULT_DATA_PORT, DEFAULT_HOST, DEFAULT_OSC_ADDRESS, DEFAULT_OSC_PORT,
};

/// Default XML-RPC call timeout in seconds.
const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;

/// Default per-candidate probe timeout during autodiscovery, in milliseconds.
const DEFAULT_DISCOVERY_TIMEOUT_MS: u64 = 500;

/// Default grace period after acquisition ends, in seconds.
const DEFAULT_DRAIN_SECS: u64 = 10;

/// Default acquisition-state polling interval, in milliseconds.
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Complete configuration for a relay run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Control endpoint (XML-RPC) settings.
    #[serde(default)]
    pub control: ControlConfig,

    /// Streaming data connection settings.
    #[serde(default)]
    pub data: DataConfig,

    /// OSC forwarding settings.
    #[serde(default)]
    pub osc: OscConfig,

    /// Console forwarding settings.
    #[serde(default)]
    pub console: ConsoleConfig,

    /// Acquisition lifecycle timing.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

/// Where and how to reach the AcqKnowledge control endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_control_port")]
    pub port: u16,

    /// Locate the server by probing `candidates` instead of `host:port`.
    #[serde(default)]
    pub discover: bool,

    /// Endpoints probed in order during autodiscovery (`host:port`).
    #[serde(default = "default_candidates")]
    pub candidates: Vec<String>,

    /// Timeout for individual XML-RPC calls, in seconds.
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,

    /// Timeout for each autodiscovery probe, in milliseconds.
    #[serde(default = "default_discovery_timeout")]
    pub discovery_timeout_ms: u64,
}

/// Single-connection data delivery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Hostname AcqKnowledge should connect to in forward mode.
    #[serde(default = "default_host")]
    pub host: String,

    /// Single-connection port AcqKnowledge should use in forward mode.
    #[serde(default = "default_data_port")]
    pub port: u16,

    /// Hostname announced to AcqKnowledge before relaying, if any.
    #[serde(default)]
    pub announce_hostname: Option<String>,

    /// Binary type AcqKnowledge transmits each sample as. This is not
    /// negotiated: it must match the data-transfer format set in
    /// AcqKnowledge's preferences, or every decoded frame is garbage.
    #[serde(default)]
    pub sample_type: SampleType,

    /// Byte order of each sample. Same caveat as `sample_type`.
    #[serde(default)]
    pub byte_order: ByteOrder,

    #[serde(default)]
    pub rate_policy: RatePolicy,
}

/// OSC relay target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_osc_port")]
    pub port: u16,

    /// OSC address path of every relayed frame.
    #[serde(default = "default_osc_address")]
    pub address: String,
}

/// Console relay target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub format: ConsoleFormat,
}

/// Line format of the console forwarder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleFormat {
    /// `index | [a, b, ...]`
    #[default]
    Text,
    /// One JSON object per frame.
    Json,
}

/// Timing of the acquisition lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Grace period after acquisition ends before the relay sink stops.
    #[serde(default = "default_drain_secs")]
    pub drain_secs: u64,

    /// How often to poll the acquisition state while acquiring.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

// ─── Defaults ───────────────────────────────────────────────────────────

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_control_port() -> u16 {
    DEFAULT_CONTROL_PORT
}

fn default_data_port() -> u16 {
    DEFAULT_DATA_PORT
}

fn default_osc_port() -> u16 {
    DEFAULT_OSC_PORT
}

fn default_osc_address() -> String {
    DEFAULT_OSC_ADDRESS.to_string()
}

fn default_candidates() -> Vec<String> {
    vec![
        format!("{DEFAULT_HOST}:{DEFAULT_CONTROL_PORT}"),
        format!("{DEFAULT_HOST}:{DEFAULT_DATA_PORT}"),
    ]
}

fn default_rpc_timeout() -> u64 {
    DEFAULT_RPC_TIMEOUT_SECS
}

fn default_discovery_timeout() -> u64 {
    DEFAULT_DISCOVERY_TIMEOUT_MS
}

fn default_drain_secs() -> u64 {
    DEFAULT_DRAIN_SECS
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

// ─── Default impls ──────────────────────────────────────────────────────

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_CONTROL_PORT,
            discover: false,
            candidates: default_candidates(),
            rpc_timeout_secs: DEFAULT_RPC_TIMEOUT_SECS,
            discovery_timeout_ms: DEFAULT_DISCOVERY_TIMEOUT_MS,
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_DATA_PORT,
            announce_hostname: None,
            sample_type: SampleType::default(),
            byte_order: ByteOrder::default(),
            rate_policy: RatePolicy::default(),
        }
    }
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_host(),
            port: DEFAULT_OSC_PORT,
            address: default_osc_address(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            drain_secs: DEFAULT_DRAIN_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

// ─── Section helpers ────────────────────────────────────────────────────

impl ControlConfig {
    /// `host:port` of the fixed control endpoint.
    pub fn addr(&self) -> String {
        join_host_port(&self.host, self.port)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    /// Parse `candidates` into `(host, port)` pairs, in order.
    pub fn candidate_endpoints(&self) -> AcqResult<Vec<(String, u16)>> {
        self.candidates
            .iter()
            .map(|raw| {
                let (host, port) = raw.rsplit_once(':').ok_or_else(|| AcqError::ConfigError {
                    reason: format!("candidate '{raw}' is not host:port"),
                })?;
                let port = parse_port("candidate", port)?;
                Ok((host.trim_matches(['[', ']']).to_string(), port))
            })
            .collect()
    }
}

impl DataConfig {
    pub fn sample_format(&self) -> SampleFormat {
        SampleFormat {
            sample_type: self.sample_type,
            byte_order: self.byte_order,
        }
    }
}

impl OscConfig {
    /// `host:port` of the OSC destination.
    pub fn addr(&self) -> String {
        join_host_port(&self.host, self.port)
    }
}

impl LifecycleConfig {
    pub fn drain(&self) -> Duration {
        Duration::from_secs(self.drain_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ─── RelayConfig impl ───────────────────────────────────────────────────

impl RelayConfig {
    /// Load config from a TOML file, with environment variable overrides.
    #[cfg(feature = "config-toml")]
    pub fn from_file(path: impl AsRef<Path>) -> AcqResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| AcqError::ConfigError {
            reason: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;
        let mut config: Self = toml::from_str(&contents)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Discover and load config from the standard search path:
    ///
    /// 1. Explicit path (if `Some`)
    /// 2. `ACQ_NDT_CONFIG` environment variable
    /// 3. `./acq-ndt.toml`
    /// 4. `~/.config/acq-ndt/acq-ndt.toml`
    ///
    /// Falls back to defaults (plus environment overrides) if no file is found.
    pub fn discover(explicit_path: Option<&Path>) -> AcqResult<Self> {
        #[cfg(feature = "config-toml")]
        {
            if let Some(path) = explicit_path {
                return Self::from_file(path);
            }

            if let Ok(path) = std::env::var("ACQ_NDT_CONFIG") {
                let path = PathBuf::from(path);
                if path.exists() {
                    return Self::from_file(&path);
                }
            }

            let local_path = PathBuf::from("acq-ndt.toml");
            if local_path.exists() {
                return Self::from_file(&local_path);
            }

            if let Some(config_path) = dirs_config_path() {
                if config_path.exists() {
                    return Self::from_file(&config_path);
                }
            }
        }
        #[cfg(not(feature = "config-toml"))]
        if let Some(path) = explicit_path {
            return Err(AcqError::ConfigError {
                reason: format!(
                    "cannot read '{}': built without the `config-toml` feature",
                    path.display()
                ),
            });
        }

        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `ACQ_*` environment variable overrides in place.
    pub fn apply_env_overrides(&mut self) -> AcqResult<()> {
        if let Ok(host) = std::env::var("ACQ_CONTROL_HOST") {
            self.control.host = host;
        }
        if let Ok(port) = std::env::var("ACQ_CONTROL_PORT") {
            self.control.port = parse_port("ACQ_CONTROL_PORT", &port)?;
        }
        if let Ok(host) = std::env::var("ACQ_OSC_HOST") {
            self.osc.host = host;
        }
        if let Ok(port) = std::env::var("ACQ_OSC_PORT") {
            self.osc.port = parse_port("ACQ_OSC_PORT", &port)?;
        }
        Ok(())
    }

    /// Reject values that can never work.
    pub fn validate(&self) -> AcqResult<()> {
        if self.control.port == 0 && !self.control.discover {
            return Err(AcqError::ConfigError {
                reason: "control port must be non-zero".into(),
            });
        }
        if self.control.discover {
            if self.control.candidates.is_empty() {
                return Err(AcqError::ConfigError {
                    reason: "autodiscovery needs at least one candidate endpoint".into(),
                });
            }
            self.control.candidate_endpoints()?;
        }
        if self.osc.enabled && self.osc.port == 0 {
            return Err(AcqError::ConfigError {
                reason: "OSC port must be non-zero".into(),
            });
        }
        if self.osc.enabled && !self.osc.address.starts_with('/') {
            return Err(AcqError::ConfigError {
                reason: format!("OSC address '{}' must start with '/'", self.osc.address),
            });
        }
        if self.lifecycle.poll_interval_ms == 0 {
            return Err(AcqError::ConfigError {
                reason: "poll_interval_ms must be non-zero".into(),
            });
        }
        Ok(())
    }

    /// Whether any relay target (console or OSC) is enabled.
    pub fn relay_enabled(&self) -> bool {
        self.osc.enabled || self.console.enabled
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

/// `host:port`, with IPv6 literals bracketed (`[::1]:15010`).
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

fn parse_port(var: &str, raw: &str) -> AcqResult<u16> {
    raw.trim().parse::<u16>().map_err(|e| AcqError::ConfigError {
        reason: format!("{var}='{raw}' is not a valid port: {e}"),
    })
}

/// Platform-appropriate config file path.
#[cfg(feature = "config-toml")]
fn dirs_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA")
            .ok()
            .map(|dir| PathBuf::from(dir).join("acq-ndt").join("acq-ndt.toml"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok().map(|dir| {
            PathBuf::from(dir)
                .join(".config")
                .join("acq-ndt")
                .join("acq-ndt.toml")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::fs;
    use std::sync::Mutex;
    use std::time::{SystemTime, UNIX_EPOCH};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "ACQ_CONTROL_HOST",
        "ACQ_CONTROL_PORT",
        "ACQ_OSC_HOST",
        "ACQ_OSC_PORT",
        "ACQ_NDT_CONFIG",
    ];

    struct EnvGuard {
        saved: Vec<(&'static str, Option<OsString>)>,
    }

    impl EnvGuard {
        fn capture(keys: &[&'static str]) -> Self {
            let saved = keys.iter().map(|k| (*k, std::env::var_os(k))).collect();
            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.saved {
                // SAFETY: tests touching the environment hold ENV_LOCK.
                unsafe {
                    if let Some(value) = value {
                        std::env::set_var(key, value);
                    } else {
                        std::env::remove_var(key);
                    }
                }
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn clear_env() {
        for key in ENV_KEYS {
            // SAFETY: callers hold ENV_LOCK.
            unsafe { std::env::remove_var(key) };
        }
    }

    fn unique_temp_dir(label: &str) -> PathBuf {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "acq-ndt-config-tests-{}-{}-{}",
            label,
            std::process::id(),
            now
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.control.addr(), "127.0.0.1:15010");
        assert_eq!(config.data.port, 15020);
        assert_eq!(config.osc.addr(), "127.0.0.1:5005");
        assert_eq!(config.osc.address, "/BioHarness");
        assert!(!config.osc.enabled);
        assert!(!config.relay_enabled());
        assert_eq!(config.lifecycle.drain(), Duration::from_secs(10));
        assert_eq!(config.data.rate_policy, RatePolicy::Variable);
        assert!(config.validate().is_ok());
    }

    #[cfg(feature = "config-toml")]
    #[test]
    fn test_deserialize_toml() {
        let toml_str = r#"
            [control]
            host = "10.0.0.5"
            port = 15020
            rpc_timeout_secs = 3

            [data]
            sample_type = "float"
            byte_order = "big"
            rate_policy = "sample-and-hold"

            [osc]
            enabled = true
            port = 9000

            [console]
            enabled = true
            format = "json"

            [lifecycle]
            drain_secs = 2
        "#;

        let config: RelayConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.control.addr(), "10.0.0.5:15020");
        assert_eq!(config.control.rpc_timeout(), Duration::from_secs(3));
        assert_eq!(config.data.sample_type, SampleType::Float);
        assert_eq!(config.data.byte_order, ByteOrder::Big);
        assert_eq!(config.data.rate_policy, RatePolicy::SampleAndHold);
        assert!(config.osc.enabled);
        assert_eq!(config.osc.port, 9000);
        assert_eq!(config.osc.host, "127.0.0.1");
        assert_eq!(config.console.format, ConsoleFormat::Json);
        assert_eq!(config.lifecycle.drain_secs, 2);
        assert_eq!(config.lifecycle.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn test_env_overrides() {
        let _lock = env_lock();
        let _env = EnvGuard::capture(ENV_KEYS);
        clear_env();

        // SAFETY: ENV_LOCK is held.
        unsafe {
            std::env::set_var("ACQ_CONTROL_HOST", "acq.lab");
            std::env::set_var("ACQ_CONTROL_PORT", "15020");
            std::env::set_var("ACQ_OSC_PORT", "7000");
        }

        let mut config = RelayConfig::default();
        config.apply_env_overrides().unwrap();
        assert_eq!(config.control.addr(), "acq.lab:15020");
        assert_eq!(config.osc.port, 7000);
        assert_eq!(config.osc.host, "127.0.0.1");
    }

    #[test]
    fn test_env_override_rejects_bad_port() {
        let _lock = env_lock();
        let _env = EnvGuard::capture(ENV_KEYS);
        clear_env();

        // SAFETY: ENV_LOCK is held.
        unsafe { std::env::set_var("ACQ_OSC_PORT", "not-a-port") };

        let err = RelayConfig::default().apply_env_overrides().unwrap_err();
        assert!(matches!(err, AcqError::ConfigError { .. }));
        assert!(err.to_string().contains("ACQ_OSC_PORT"), "unexpected error: {err}");
    }

    #[cfg(feature = "config-toml")]
    #[test]
    fn test_discover_explicit_and_env_pointer() {
        let _lock = env_lock();
        let _env = EnvGuard::capture(ENV_KEYS);
        clear_env();

        let dir = unique_temp_dir("discover");
        let explicit = dir.join("explicit.toml");
        let pointed = dir.join("pointed.toml");
        fs::write(&explicit, "[control]\nhost = \"explicit\"\n").unwrap();
        fs::write(&pointed, "[control]\nhost = \"pointed\"\n").unwrap();

        let config = RelayConfig::discover(Some(&explicit)).unwrap();
        assert_eq!(config.control.host, "explicit");

        // SAFETY: ENV_LOCK is held.
        unsafe { std::env::set_var("ACQ_NDT_CONFIG", &pointed) };
        let config = RelayConfig::discover(None).unwrap();
        assert_eq!(config.control.host, "pointed");

        // Env overrides still win over the file.
        unsafe { std::env::set_var("ACQ_CONTROL_HOST", "from-env") };
        let config = RelayConfig::discover(None).unwrap();
        assert_eq!(config.control.host, "from-env");

        fs::remove_dir_all(dir).unwrap();
    }

    #[cfg(feature = "config-toml")]
    #[test]
    fn test_from_file_missing_and_invalid_errors() {
        let _lock = env_lock();
        let dir = unique_temp_dir("from-file-errors");

        let missing = RelayConfig::from_file(dir.join("missing.toml")).unwrap_err();
        assert!(matches!(missing, AcqError::ConfigError { .. }));
        assert!(
            missing.to_string().contains("Failed to read config file"),
            "unexpected error: {missing}"
        );

        let invalid_path = dir.join("invalid.toml");
        fs::write(&invalid_path, "[control]\nport = \"many\"").unwrap();
        let invalid = RelayConfig::from_file(&invalid_path).unwrap_err();
        assert!(matches!(invalid, AcqError::ConfigError { .. }));

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RelayConfig::default();
        config.osc.enabled = true;
        config.osc.address = "BioHarness".into();
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.control.discover = true;
        config.control.candidates.clear();
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.lifecycle.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_candidate_endpoints_parse_in_order() {
        let mut config = RelayConfig::default();
        assert_eq!(
            config.control.candidate_endpoints().unwrap(),
            vec![("127.0.0.1".to_string(), 15010), ("127.0.0.1".to_string(), 15020)]
        );

        config.control.candidates = vec!["[::1]:15010".into(), "lab-pc".into()];
        assert!(config.control.candidate_endpoints().is_err());

        config.control.candidates.truncate(1);
        let endpoints = config.control.candidate_endpoints().unwrap();
        assert_eq!(endpoints, vec![("::1".to_string(), 15010)]);
        let (host, port) = &endpoints[0];
        assert_eq!(join_host_port(host, *port), "[::1]:15010");
    }

    #[test]
    fn test_ipv6_hosts_are_bracketed() {
        let mut config = RelayConfig::default();
        config.control.host = "::1".into();
        config.osc.host = "fe80::1".into();
        assert_eq!(config.control.addr(), "[::1]:15010");
        assert_eq!(config.osc.addr(), "[fe80::1]:5005");

        assert_eq!(join_host_port("[::1]", 80), "[::1]:80");
        assert_eq!(join_host_port("lab-pc", 80), "lab-pc:80");
    }

    #[test]
    fn test_sample_format_follows_data_section() {
        let mut config = RelayConfig::default();
        assert_eq!(
            config.data.sample_format(),
            SampleFormat {
                sample_type: SampleType::Double,
                byte_order: ByteOrder::Little,
            }
        );

        config.data.sample_type = SampleType::Float;
        config.data.byte_order = ByteOrder::Big;
        assert_eq!(config.data.sample_format().sample_size(), 4);
        assert_eq!(config.data.sample_format().byte_order, ByteOrder::Big);
    }
}
