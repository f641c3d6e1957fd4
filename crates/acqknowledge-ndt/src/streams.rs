//! # Frame Streams
//!
//! [`FrameStream`] exposes relayed frames to in-process consumers as a
//! [`futures_core::Stream`]. Create one with
//! [`forward::frame_channel`](crate::forward::frame_channel) and register the
//! forwarder half on a [`RelaySink`](crate::relay::RelaySink).
//!
//! ```no_run
//! use acqknowledge_ndt::forward::frame_channel;
//! use acqknowledge_ndt::frame::{RatePolicy, SampleFormat};
//! use acqknowledge_ndt::relay::RelaySink;
//! use acqknowledge_ndt::{Channel, ChannelKind};
//! use futures_util::StreamExt;
//!
//! # async fn demo() -> acqknowledge_ndt::AcqResult<()> {
//! let channels = vec![Channel::new(ChannelKind::Analog, 0, 1)];
//! let mut sink = RelaySink::new(15020, channels, SampleFormat::default(), RatePolicy::Variable)?;
//! let (forwarder, mut frames) = frame_channel();
//! sink.register_forwarder("stream", Box::new(forwarder));
//! sink.start().await?;
//!
//! while let Some(frame) = frames.next().await {
//!     println!("{} -> {:?}", frame.index, frame.amplitudes);
//! }
//! # Ok(())
//! # }
//! ```

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::mpsc;

use crate::frame::SampleFrame;

/// Stream of frames in hardware-index order.
///
/// Ends once the relay sink stops and its forwarder is dropped.
pub struct FrameStream {
    rx: mpsc::UnboundedReceiver<SampleFrame>,
}

impl FrameStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<SampleFrame>) -> Self {
        Self { rx }
    }
}

impl Stream for FrameStream {
    type Item = SampleFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
