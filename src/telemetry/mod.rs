//! Telemetry pipeline: producer queue, file format and writer

pub mod format;
pub mod queue;
pub mod writer;

pub use queue::{ActivityMasks, LogQueue, QueuePair};
pub use writer::LogWriter;

use crate::channel::ChannelId;

/// What a queued entry's payload means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Raw `f32` bits of one sample
    Value,
    /// Epoch seconds of the first sample of a block
    BlockHeaderTimestamp,
    /// Packed [`crate::config::ChannelConfig`]; always directly follows its timestamp
    BlockHeaderParams,
    /// Epoch seconds at which a block closed
    BlockFooter,
    /// Milliseconds of day of one event
    EventTimestamp,
    /// Epoch seconds starting a run of events
    EventHeader,
    /// Epoch seconds of a totaliser snapshot
    TotaliserTimestamp,
}

/// One producer record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEntry {
    pub channel: ChannelId,
    pub data_type: DataType,
    pub payload: u32,
}

impl LogEntry {
    pub const fn new(channel: ChannelId, data_type: DataType, payload: u32) -> Self {
        Self {
            channel,
            data_type,
            payload,
        }
    }

    pub fn value(channel: ChannelId, value: f32) -> Self {
        Self::new(channel, DataType::Value, value.to_bits())
    }

    pub fn as_f32(&self) -> f32 {
        f32::from_bits(self.payload)
    }
}

/// Outcome of one cooperative step of a multi-step operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// More work remains; call again on a later scheduler iteration
    Pending,
    /// Nothing left to do
    Done,
}
