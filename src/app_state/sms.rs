//! Deferred SMS retrieval and the outbound message queue

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Channel;
use thiserror_no_std::Error;

use crate::channel::ChannelId;
use crate::config::ADDRESS_CAPACITY;
use crate::pdu::PduError;
use crate::retrieval::RetrievalError;
use crate::time::DateTime;

use alloc::string::String;

/// Messages waiting for the modem
pub const OUTBOUND_CAPACITY: usize = 4;

pub type OutboundQueue = Channel<NoopRawMutex, OutboundMessage, OUTBOUND_CAPACITY>;

/// A message handed to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub destination: heapless::String<ADDRESS_CAPACITY>,
    /// Upper-case hex of PDU header and body
    pub hex: String,
}

/// What the SMS job has been asked to send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmsRequest {
    /// Data slot in the Sms or DerivedSms category
    pub channel: ChannelId,
    pub end: DateTime,
}

/// SMS job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmsJob {
    #[default]
    Idle,
    /// Waiting until no flush or drain is running and the outbound queue is empty
    WaitingForStorage(SmsRequest),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    #[error("Invalid channel")]
    InvalidChannel,
    #[error("File read failed")]
    FileRead,
    #[error("No data to send")]
    NoData,
    #[error("Invalid destination address")]
    Address,
    #[error("Busy")]
    Busy,
}

impl CommandError {
    /// Numeric code reported to the command layer
    pub const fn code(&self) -> u8 {
        match self {
            Self::InvalidChannel => 1,
            Self::FileRead => 2,
            Self::NoData => 3,
            Self::Address => 4,
            Self::Busy => 5,
        }
    }
}

impl From<RetrievalError> for CommandError {
    fn from(e: RetrievalError) -> Self {
        match e {
            RetrievalError::NoFile => Self::NoData,
            RetrievalError::Storage(_) => Self::FileRead,
        }
    }
}

impl From<PduError> for CommandError {
    fn from(e: PduError) -> Self {
        match e {
            PduError::HeaderTooLong | PduError::InvalidAddress => Self::Address,
            PduError::NoData | PduError::Truncated | PduError::UnknownType => Self::NoData,
        }
    }
}
