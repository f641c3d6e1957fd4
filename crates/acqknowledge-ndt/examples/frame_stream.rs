//! Start an acquisition and print every 100th relayed frame.
//!
//! ```bash
//! ACQ_CONTROL_HOST=192.168.1.20 cargo run --example frame_stream
//! ```

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use acqknowledge_ndt::forward::{NamedForwarder, frame_channel};
use acqknowledge_ndt::{Forwarder, Lifecycle, RelayConfig, RunMode, XmlRpcConnector};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = RelayConfig::discover(None)?;
    let connector = XmlRpcConnector::new(config.control.rpc_timeout());
    let lifecycle = Lifecycle::new(config).with_mode(RunMode::Relay);

    let (forwarder, mut frames) = frame_channel();
    let forwarders: Vec<NamedForwarder> =
        vec![("stream".into(), Box::new(forwarder) as Box<dyn Forwarder>)];

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(frame) = frames.next().await {
            if frame.index % 100 == 0 {
                let amplitudes: Vec<String> =
                    frame.amplitudes.iter().map(|v| format!("{v:.4}")).collect();
                println!("[{}] {}", frame.index, amplitudes.join(" "));
            }
        }
    });

    println!("Relaying. Press Ctrl+C to stop.");
    let summary = lifecycle.run(&connector, forwarders, cancel).await?;
    printer.await?;
    println!("{:?}: {} frames", summary.outcome, summary.frames_forwarded);
    Ok(())
}
