//! # Sample Frames
//!
//! In single-connection mode AcqKnowledge sends one continuous stream of
//! binary samples for all delivered channels. Samples are interleaved by
//! hardware sample index: for index `i` the stream carries one sample for
//! every channel whose divider divides `i`, in channel-list order. Indices
//! where no channel is sampled carry nothing and produce no frame.
//!
//! [`FrameDecoder`] turns arbitrary byte chunks from the socket back into
//! [`SampleFrame`]s.
//!
//! ```
//! use acqknowledge_ndt::channel::{Channel, ChannelKind};
//! use acqknowledge_ndt::frame::{FrameDecoder, RatePolicy, SampleFormat};
//!
//! let channels = vec![
//!     Channel::new(ChannelKind::Analog, 0, 1),
//!     Channel::new(ChannelKind::Analog, 1, 2),
//! ];
//! let mut decoder =
//!     FrameDecoder::new(channels, SampleFormat::default(), RatePolicy::Variable).unwrap();
//!
//! // index 0: A, B   index 1: A
//! let bytes: Vec<u8> = [1.0f64, 2.0, 3.0]
//!     .iter()
//!     .flat_map(|v| v.to_le_bytes())
//!     .collect();
//! let frames = decoder.push(&bytes);
//! assert_eq!(frames.len(), 2);
//! assert_eq!(frames[0].amplitudes, vec![1.0, 2.0]);
//! assert_eq!(frames[1].amplitudes, vec![3.0]);
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::channel::Channel;
use crate::error::{AcqError, AcqResult};

/// Binary type of each transmitted sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    /// 64-bit IEEE float.
    #[default]
    Double,
    /// 32-bit IEEE float.
    Float,
}

/// Byte order of each transmitted sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

/// Wire encoding of samples on the data connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleFormat {
    pub sample_type: SampleType,
    pub byte_order: ByteOrder,
}

impl SampleFormat {
    /// Bytes per sample.
    pub fn sample_size(self) -> usize {
        match self.sample_type {
            SampleType::Double => 8,
            SampleType::Float => 4,
        }
    }

    /// Decode one sample; `bytes` must be exactly [`sample_size`](Self::sample_size) long.
    fn decode(self, bytes: &[u8]) -> f64 {
        match (self.sample_type, self.byte_order) {
            (SampleType::Double, order) => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                match order {
                    ByteOrder::Little => f64::from_le_bytes(raw),
                    ByteOrder::Big => f64::from_be_bytes(raw),
                }
            }
            (SampleType::Float, order) => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(bytes);
                f64::from(match order {
                    ByteOrder::Little => f32::from_le_bytes(raw),
                    ByteOrder::Big => f32::from_be_bytes(raw),
                })
            }
        }
    }

    /// Encode one sample (used by tests and simulators).
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode(self, value: f64, out: &mut Vec<u8>) {
        match (self.sample_type, self.byte_order) {
            (SampleType::Double, ByteOrder::Little) => out.extend_from_slice(&value.to_le_bytes()),
            (SampleType::Double, ByteOrder::Big) => out.extend_from_slice(&value.to_be_bytes()),
            (SampleType::Float, ByteOrder::Little) => {
                out.extend_from_slice(&(value as f32).to_le_bytes());
            }
            (SampleType::Float, ByteOrder::Big) => {
                out.extend_from_slice(&(value as f32).to_be_bytes());
            }
        }
    }
}

/// How frames represent channels that are not sampled at an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RatePolicy {
    /// Frames carry only the channels sampled at their index.
    #[default]
    Variable,
    /// Frames carry every channel; unsampled channels repeat their last value.
    SampleAndHold,
}

/// One hardware-clock-indexed slice of data.
///
/// `amplitudes[k]` is the sample of `channels[k]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleFrame {
    /// Hardware sample index. Divide by a channel's divider to get its own
    /// sample number.
    pub index: u64,
    pub amplitudes: Vec<f64>,
    pub channels: Vec<Channel>,
}

/// Incremental decoder from raw data-connection bytes to frames.
#[derive(Debug)]
pub struct FrameDecoder {
    channels: Arc<[Channel]>,
    format: SampleFormat,
    policy: RatePolicy,
    next_index: u64,
    /// Trailing bytes of an incomplete sample.
    carry: Vec<u8>,
    /// Samples collected so far for `next_index`.
    slice: Vec<f64>,
    /// Last sample per channel, for [`RatePolicy::SampleAndHold`].
    held: Vec<f64>,
}

impl FrameDecoder {
    /// Create a decoder for the given channel order.
    ///
    /// Fails with [`AcqError::NoEnabledChannels`] for an empty channel list.
    pub fn new(
        channels: impl Into<Arc<[Channel]>>,
        format: SampleFormat,
        policy: RatePolicy,
    ) -> AcqResult<Self> {
        let channels: Arc<[Channel]> = channels.into();
        if channels.is_empty() {
            return Err(AcqError::NoEnabledChannels);
        }
        let held = vec![0.0; channels.len()];
        Ok(Self {
            channels,
            format,
            policy,
            next_index: 0,
            carry: Vec::new(),
            slice: Vec::new(),
            held,
        })
    }

    /// Hardware index the next completed frame will carry.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Bytes buffered that do not yet form a whole sample.
    pub fn pending_bytes(&self) -> usize {
        self.carry.len()
    }

    /// Feed bytes from the socket and return every frame they complete,
    /// in hardware-index order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SampleFrame> {
        let size = self.format.sample_size();
        let mut buf = std::mem::take(&mut self.carry);
        buf.extend_from_slice(bytes);

        let whole = buf.len() / size * size;
        let mut frames = Vec::new();
        for chunk in buf[..whole].chunks_exact(size) {
            let sample = self.format.decode(chunk);
            if let Some(frame) = self.accept(sample) {
                frames.push(frame);
            }
        }

        buf.drain(..whole);
        self.carry = buf;
        frames
    }

    fn sampled_at(&self, index: u64) -> impl Iterator<Item = (usize, &Channel)> {
        self.channels
            .iter()
            .enumerate()
            .filter(move |(_, ch)| ch.is_sampled_at(index))
    }

    fn accept(&mut self, sample: f64) -> Option<SampleFrame> {
        if self.slice.is_empty() {
            // Every index is a multiple of the smallest divider eventually,
            // so this terminates.
            while self.sampled_at(self.next_index).next().is_none() {
                self.next_index += 1;
            }
        }

        self.slice.push(sample);
        let expected = self.sampled_at(self.next_index).count();
        if self.slice.len() < expected {
            return None;
        }

        let index = self.next_index;
        let slice = std::mem::take(&mut self.slice);
        self.next_index += 1;

        let frame = match self.policy {
            RatePolicy::Variable => SampleFrame {
                index,
                amplitudes: slice,
                channels: self.sampled_at(index).map(|(_, ch)| *ch).collect(),
            },
            RatePolicy::SampleAndHold => {
                let positions: Vec<usize> = self.sampled_at(index).map(|(pos, _)| pos).collect();
                for (pos, value) in positions.into_iter().zip(slice) {
                    self.held[pos] = value;
                }
                SampleFrame {
                    index,
                    amplitudes: self.held.clone(),
                    channels: self.channels.to_vec(),
                }
            }
        };
        Some(frame)
    }
}
