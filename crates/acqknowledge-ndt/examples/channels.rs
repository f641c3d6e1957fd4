//! Query AcqKnowledge's acquisition state and enabled channels.
//!
//! ```bash
//! ACQ_CONTROL_HOST=192.168.1.20 cargo run --example channels
//! ```

use acqknowledge_ndt::{AcqServer, AcquisitionControl, RelayConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = RelayConfig::discover(None)?;
    let control = &config.control;
    let mut server = AcqServer::connect(&control.host, control.port, control.rpc_timeout()).await?;

    println!("AcqKnowledge at {}", server.addr());
    println!("  acquiring:       {}", server.acquisition_in_progress().await?);
    println!("  delivery method: {}", server.data_connection_method().await?.as_str());
    println!("  data port:       {}", server.single_connection_mode_port().await?);

    let channels = server.enabled_channels().await?;
    println!("  {} enabled channel(s):", channels.len());
    for channel in &channels {
        println!("    {channel} (divider {})", channel.divider);
    }

    server.disconnect().await?;
    Ok(())
}
