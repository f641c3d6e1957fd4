//! # acq-relay
//!
//! Command-line relay for BIOPAC AcqKnowledge network data transfer.
//! Configures AcqKnowledge for single-connection delivery, then either
//! relays the streamed samples to the console and/or OSC, or points
//! AcqKnowledge at an external application and waits.

use std::ffi::OsString;
use std::future::Future;
use std::path::Path;

use clap::Parser;
use colored::Colorize;
use tokio_util::sync::CancellationToken;

mod app;

use acqknowledge_ndt::forward::configured_forwarders;
use acqknowledge_ndt::{AcqError, Lifecycle, RatePolicy, RelayConfig, XmlRpcConnector};

/// Relay BIOPAC AcqKnowledge data to the console or OSC.
#[derive(Parser, Debug)]
#[command(name = "acq-relay", version, about)]
struct Cli {
    /// Path to acq-ndt.toml config file
    #[arg(short, long)]
    config: Option<String>,

    /// Host running AcqKnowledge
    #[arg(long = "controlHost", visible_alias = "hostname")]
    control_host: Option<String>,

    /// AcqKnowledge XML-RPC port
    #[arg(long = "controlPort", visible_alias = "port")]
    control_port: Option<u16>,

    /// Probe the configured candidate endpoints instead of a fixed address
    #[arg(long)]
    discover: bool,

    /// Host of the application that receives the data (forward mode)
    #[arg(long = "AcqHost")]
    acq_host: Option<String>,

    /// Port AcqKnowledge delivers data to (forward mode)
    #[arg(long = "AcqPort")]
    acq_port: Option<u16>,

    /// Relay frames as OSC messages
    #[arg(long = "oscActivated")]
    osc_activated: bool,

    /// OSC destination host
    #[arg(long = "OSCHost")]
    osc_host: Option<String>,

    /// OSC destination port
    #[arg(long = "OSCPort")]
    osc_port: Option<u16>,

    /// Print every frame to stdout
    #[arg(long)]
    console: bool,

    /// Grace period after the acquisition ends, in seconds
    #[arg(long)]
    drain_secs: Option<u64>,

    /// How frames represent channels not sampled at an index
    #[arg(long, value_enum)]
    rate_policy: Option<RatePolicyArg>,

    /// Enable verbose logging (set RUST_LOG for fine-grained control)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum RatePolicyArg {
    Variable,
    SampleAndHold,
}

impl From<RatePolicyArg> for RatePolicy {
    fn from(arg: RatePolicyArg) -> Self {
        match arg {
            RatePolicyArg::Variable => RatePolicy::Variable,
            RatePolicyArg::SampleAndHold => RatePolicy::SampleAndHold,
        }
    }
}

/// Single-dash spellings accepted by the older AcqKnowledge scripts.
const LEGACY_FLAGS: &[(&str, &str)] = &[
    ("-ch", "--controlHost"),
    ("-cp", "--controlPort"),
    ("-ah", "--AcqHost"),
    ("-ap", "--AcqPort"),
    ("-osc", "--oscActivated"),
    ("-oh", "--OSCHost"),
    ("-op", "--OSCPort"),
    ("-host", "--hostname"),
    ("-p", "--port"),
];

/// Rewrite legacy single-dash flags (`-ch`, `-cp=15010`, ...) to their long
/// forms. Everything else passes through untouched.
fn normalize_legacy_flags<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            let Some(text) = arg.to_str() else {
                return arg;
            };
            let (flag, value) = match text.split_once('=') {
                Some((flag, value)) => (flag, Some(value)),
                None => (text, None),
            };
            match LEGACY_FLAGS.iter().find(|(legacy, _)| *legacy == flag) {
                Some((_, long)) => match value {
                    Some(value) => OsString::from(format!("{long}={value}")),
                    None => OsString::from(*long),
                },
                None => arg,
            }
        })
        .collect()
}

/// Exit status after a forced second interrupt (128 + SIGINT).
const FORCED_EXIT_CODE: i32 = 130;

/// Cancel the run on the first interrupt. Returns `true` once a second
/// interrupt arrives, `false` if the signal source fails first.
async fn watch_interrupts<F, Fut>(mut next_signal: F, cancel: CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = next_signal().await {
        tracing::warn!(error = %e, "Could not listen for Ctrl+C");
        return false;
    }
    tracing::info!("Interrupt received, shutting down");
    cancel.cancel();

    match next_signal().await {
        Ok(()) => {
            tracing::warn!("Second interrupt received, exiting without finishing shutdown");
            true
        }
        Err(_) => false,
    }
}

/// Config file (or defaults) with environment and CLI overrides applied.
fn build_config(cli: &Cli) -> Result<RelayConfig, AcqError> {
    let mut config = RelayConfig::discover(cli.config.as_deref().map(Path::new))?;
    apply_cli_overrides(&mut config, cli);
    config.validate()?;
    Ok(config)
}

fn apply_cli_overrides(config: &mut RelayConfig, cli: &Cli) {
    if let Some(host) = &cli.control_host {
        config.control.host.clone_from(host);
    }
    if let Some(port) = cli.control_port {
        config.control.port = port;
    }
    if cli.discover {
        config.control.discover = true;
    }
    if let Some(host) = &cli.acq_host {
        config.data.host.clone_from(host);
    }
    if let Some(port) = cli.acq_port {
        config.data.port = port;
    }
    if cli.osc_activated {
        config.osc.enabled = true;
    }
    if let Some(host) = &cli.osc_host {
        config.osc.host.clone_from(host);
    }
    if let Some(port) = cli.osc_port {
        config.osc.port = port;
    }
    if cli.console {
        config.console.enabled = true;
    }
    if let Some(secs) = cli.drain_secs {
        config.lifecycle.drain_secs = secs;
    }
    if let Some(policy) = cli.rate_policy {
        config.data.rate_policy = policy.into();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_from(normalize_legacy_flags(std::env::args_os()));

    let default_filter = if cli.verbose {
        "acqknowledge_ndt=debug,acq_relay=debug"
    } else {
        "acqknowledge_ndt=warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "Configuration error:".red(), e);
            return Err(e.into());
        }
    };

    let lifecycle = Lifecycle::new(config);
    app::print_banner(&lifecycle);

    let forwarders = configured_forwarders(lifecycle.config())?;
    let connector = XmlRpcConnector::new(lifecycle.config().control.rpc_timeout());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        let interrupts = || async {
            let signal = tokio::signal::ctrl_c().await;
            if signal.is_ok() {
                println!("\n{}", "Interrupt received (press Ctrl+C again to force exit)...".yellow());
            }
            signal
        };
        if watch_interrupts(interrupts, trigger).await {
            eprintln!("{}", "Forced exit; AcqKnowledge may still be acquiring.".red());
            std::process::exit(FORCED_EXIT_CODE);
        }
    });

    let status = tokio::spawn(app::report_phases(lifecycle.subscribe()));

    let result = lifecycle.run(&connector, forwarders, cancel).await;
    status.abort();

    match result {
        Ok(summary) => {
            tracing::info!(
                outcome = ?summary.outcome,
                frames = summary.frames_forwarded,
                channels = summary.session.channels.len(),
                "Relay run finished",
            );
            app::print_summary(&summary);
            Ok(())
        }
        Err(e @ (AcqError::ConnectionRefused { .. } | AcqError::NoServerFound { .. })) => {
            eprintln!("{} {}", "Connection failed:".red(), e);
            eprintln!("Make sure AcqKnowledge is running with network data transfer enabled.");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Relay run failed");
            eprintln!("{} {}", "Run failed:".red(), e);
            Err(e.into())
        }
    }
}
