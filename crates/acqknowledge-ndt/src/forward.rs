//! # Forwarders
//!
//! A [`Forwarder`] receives every [`SampleFrame`] the relay sink decodes.
//! Three targets ship with the crate:
//!
//! | Forwarder | Output |
//! |-----------|--------|
//! | [`ConsoleForwarder`] | `index \| [a, b, ...]` lines (or JSON lines) |
//! | [`OscForwarder`] | OSC message with one string argument `"index a b ..."` |
//! | [`ChannelForwarder`] | in-process [`FrameStream`] |
//!
//! Any `FnMut(&SampleFrame) -> AcqResult<()> + Send` closure is a forwarder
//! too.

use std::io::Write;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use rosc::{OscMessage, OscPacket, OscType, encoder};
use tokio::sync::mpsc;

use crate::config::{ConsoleFormat, RelayConfig};
use crate::error::{AcqError, AcqResult};
use crate::frame::SampleFrame;
use crate::streams::FrameStream;

/// Receives decoded frames, one call per frame, in hardware-index order.
pub trait Forwarder: Send {
    fn forward(&mut self, frame: &SampleFrame) -> AcqResult<()>;
}

/// A forwarder with the name it was registered under.
pub type NamedForwarder = (String, Box<dyn Forwarder>);

impl<F> Forwarder for F
where
    F: FnMut(&SampleFrame) -> AcqResult<()> + Send,
{
    fn forward(&mut self, frame: &SampleFrame) -> AcqResult<()> {
        self(frame)
    }
}

// ─── Formatting ─────────────────────────────────────────────────────────

/// Decimal exponents outside this range switch to scientific notation.
const PLAIN_EXPONENTS: std::ops::Range<i32> = -4..16;

/// Shortest round-trip text of an amplitude.
///
/// Integral values keep a trailing `.0`; magnitudes below `1e-4` or from
/// `1e16` up use a signed two-digit exponent (`1e-05`, `2.5e+16`);
/// non-finite values are `nan`, `inf`, `-inf`.
pub fn format_amplitude(value: f64) -> String {
    if value.is_nan() {
        return "nan".into();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.into();
    }

    let scientific = format!("{value:e}");
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if value != 0.0 && !PLAIN_EXPONENTS.contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs());
    }

    let plain = value.to_string();
    if plain.contains('.') {
        plain
    } else {
        format!("{plain}.0")
    }
}

/// OSC payload: index followed by every amplitude, single-space separated.
pub fn osc_payload(frame: &SampleFrame) -> String {
    let mut msg = frame.index.to_string();
    for amplitude in &frame.amplitudes {
        msg.push(' ');
        msg.push_str(&format_amplitude(*amplitude));
    }
    msg
}

/// Console line: `index | [a, b, ...]`.
pub fn console_line(frame: &SampleFrame) -> String {
    let amplitudes: Vec<String> = frame
        .amplitudes
        .iter()
        .map(|a| format_amplitude(*a))
        .collect();
    format!("{} | [{}]", frame.index, amplitudes.join(", "))
}

// ─── Console ────────────────────────────────────────────────────────────

/// Writes one line per frame.
pub struct ConsoleForwarder<W: Write + Send> {
    writer: W,
    format: ConsoleFormat,
}

impl ConsoleForwarder<std::io::Stdout> {
    pub fn stdout(format: ConsoleFormat) -> Self {
        Self::new(std::io::stdout(), format)
    }
}

impl<W: Write + Send> ConsoleForwarder<W> {
    pub fn new(writer: W, format: ConsoleFormat) -> Self {
        Self { writer, format }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> Forwarder for ConsoleForwarder<W> {
    fn forward(&mut self, frame: &SampleFrame) -> AcqResult<()> {
        match self.format {
            ConsoleFormat::Text => writeln!(self.writer, "{}", console_line(frame))?,
            ConsoleFormat::Json => {
                serde_json::to_writer(&mut self.writer, frame)?;
                self.writer.write_all(b"\n")?;
            }
        }
        Ok(())
    }
}

// ─── OSC ────────────────────────────────────────────────────────────────

/// Sends each frame as an OSC message over UDP.
pub struct OscForwarder {
    socket: UdpSocket,
    target: SocketAddr,
    address: String,
}

impl OscForwarder {
    /// Create a forwarder sending to `target` (`host:port`) at `address`.
    pub fn new(target: &str, address: impl Into<String>) -> AcqResult<Self> {
        let target = target
            .to_socket_addrs()
            .map_err(|e| AcqError::ConfigError {
                reason: format!("invalid OSC target '{target}': {e}"),
            })?
            .next()
            .ok_or_else(|| AcqError::ConfigError {
                reason: format!("OSC target '{target}' resolved to no address"),
            })?;

        let bind_addr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr)?;

        let address = address.into();
        tracing::info!(%target, address = %address, "OSC forwarder ready");
        Ok(Self {
            socket,
            target,
            address,
        })
    }

    /// Destination of the OSC datagrams.
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Encode a frame into an OSC packet.
    pub fn encode(&self, frame: &SampleFrame) -> AcqResult<Vec<u8>> {
        let packet = OscPacket::Message(OscMessage {
            addr: self.address.clone(),
            args: vec![OscType::String(osc_payload(frame))],
        });
        Ok(encoder::encode(&packet)?)
    }
}

impl Forwarder for OscForwarder {
    fn forward(&mut self, frame: &SampleFrame) -> AcqResult<()> {
        let buf = self.encode(frame)?;
        self.socket.send_to(&buf, self.target)?;
        Ok(())
    }
}

// ─── In-process channel ─────────────────────────────────────────────────

/// Hands frames to an in-process consumer through a [`FrameStream`].
pub struct ChannelForwarder {
    tx: mpsc::UnboundedSender<SampleFrame>,
}

/// Create a connected forwarder/stream pair.
///
/// The channel is unbounded so the reception task never drops frames for a
/// slow consumer.
pub fn frame_channel() -> (ChannelForwarder, FrameStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelForwarder { tx }, FrameStream::new(rx))
}

impl Forwarder for ChannelForwarder {
    fn forward(&mut self, frame: &SampleFrame) -> AcqResult<()> {
        self.tx
            .send(frame.clone())
            .map_err(|_| AcqError::ProtocolError {
                reason: "frame stream receiver dropped".into(),
            })
    }
}

/// Build the console and OSC forwarders `config` enables, console first.
pub fn configured_forwarders(config: &RelayConfig) -> AcqResult<Vec<NamedForwarder>> {
    let mut forwarders: Vec<NamedForwarder> = Vec::new();
    if config.console.enabled {
        forwarders.push((
            "console".into(),
            Box::new(ConsoleForwarder::stdout(config.console.format)) as Box<dyn Forwarder>,
        ));
    }
    if config.osc.enabled {
        let osc = OscForwarder::new(&config.osc.addr(), config.osc.address.clone())?;
        forwarders.push(("osc".into(), Box::new(osc) as Box<dyn Forwarder>));
    }
    Ok(forwarders)
}
