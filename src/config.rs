//! Logger configuration and its postcard persistence

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::channel::{ChannelCategory, ChannelId, MAX_CONTROL_OUTPUTS, MAX_DATA_CHANNELS};
use crate::storage::{FilePath, LogStorage, StorageError};

use alloc::vec::Vec;

/// File holding the serialized [`LoggerConfig`] at the volume root
pub const CONFIG_FILE: &str = "CONFIG.BIN";

/// Capacity of the SMS destination address (digits plus optional `+`)
pub const ADDRESS_CAPACITY: usize = 32;

/// SMS body type selected by a channel's message type
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// 10-bit single stream
    Single,
    /// 10-bit single stream with totaliser
    Totaliser,
    /// Dual stream flow/pressure
    FlowPressure,
}

impl MessageKind {
    /// Message type stored in headers: 0 and 1 both select [`MessageKind::Single`]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 | 1 => Some(Self::Single),
            2 => Some(Self::Totaliser),
            3 => Some(Self::FlowPressure),
            _ => None,
        }
    }
}

/// Per-channel logging parameters
///
/// These four fields are what a block header records; retrieval compares
/// them field-for-field against headers found on disk.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelConfig {
    /// Index into [`crate::time::INTERVAL_SECS`]
    pub interval_code: u8,
    /// Index into the host's description table
    pub description_index: u8,
    /// Index into the host's engineering units table
    pub units_index: u8,
    /// 0 = plain, see [`MessageKind::from_code`]
    pub message_type: u8,
}

impl ChannelConfig {
    pub const fn new(interval_code: u8, description_index: u8, units_index: u8) -> Self {
        Self {
            interval_code,
            description_index,
            units_index,
            message_type: 0,
        }
    }

    pub const fn with_message_type(mut self, message_type: u8) -> Self {
        self.message_type = message_type;
        self
    }

    /// Pack into a `BlockHeaderParams` payload, interval code in the top byte
    pub const fn pack(&self) -> u32 {
        (self.interval_code as u32) << 24
            | (self.description_index as u32) << 16
            | (self.units_index as u32) << 8
            | self.message_type as u32
    }

    pub const fn unpack(payload: u32) -> Self {
        Self {
            interval_code: (payload >> 24) as u8,
            description_index: (payload >> 16) as u8,
            units_index: (payload >> 8) as u8,
            message_type: payload as u8,
        }
    }
}

/// Whole-device logging configuration
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LoggerConfig {
    /// Configuration of each data channel slot
    pub channels: [ChannelConfig; MAX_DATA_CHANNELS],
    /// Configuration of each control output
    pub control_outputs: [ChannelConfig; MAX_CONTROL_OUTPUTS],
    /// Whether a data channel slot accumulates a totaliser
    pub totaliser_enabled: [bool; MAX_DATA_CHANNELS],
    /// Volume units code (4 bits) sent with totaliser messages
    pub volume_units: [u8; MAX_DATA_CHANNELS],
    /// Pressure slot paired with a flow slot for dual-stream messages
    pub pressure_pair: [Option<u8>; MAX_DATA_CHANNELS],
    /// SMS destination, digits with an optional leading `+`
    pub sms_destination: heapless::String<ADDRESS_CAPACITY>,
    /// Write footer min/max as codes (true) or plain decimals
    pub compress_footer: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            channels: [ChannelConfig::new(10, 0, 0); MAX_DATA_CHANNELS],
            control_outputs: [ChannelConfig::new(0, 0, 0); MAX_CONTROL_OUTPUTS],
            totaliser_enabled: [false; MAX_DATA_CHANNELS],
            volume_units: [0; MAX_DATA_CHANNELS],
            pressure_pair: [None; MAX_DATA_CHANNELS],
            sms_destination: heapless::String::new(),
            compress_footer: true,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Storage error: {0}")]
    Storage(StorageError),
    #[error("Config encoding failed")]
    Encode,
    #[error("Config decoding failed")]
    Decode,
    #[error("Destination address too long")]
    AddressTooLong,
}

impl From<StorageError> for ConfigError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl LoggerConfig {
    /// Configuration of one stream; every data category shares its slot's settings
    pub fn channel(&self, id: ChannelId) -> ChannelConfig {
        let table: &[ChannelConfig] = match id.category {
            ChannelCategory::ControlOutput => &self.control_outputs,
            _ => &self.channels,
        };
        table.get(id.index as usize).copied().unwrap_or_default()
    }

    /// Mutable slot for one stream, `None` when the index is out of range
    pub fn channel_mut(&mut self, id: ChannelId) -> Option<&mut ChannelConfig> {
        match id.category {
            ChannelCategory::ControlOutput => self.control_outputs.get_mut(id.index as usize),
            _ => self.channels.get_mut(id.index as usize),
        }
    }

    /// Whether footers of this stream carry the slot's totaliser
    pub fn has_totaliser(&self, id: ChannelId) -> bool {
        id.category != ChannelCategory::ControlOutput
            && self.totaliser_enabled.get(id.index as usize).copied().unwrap_or(false)
    }

    /// Set the SMS destination address
    pub fn set_destination(&mut self, address: &str) -> Result<(), ConfigError> {
        let mut dest = heapless::String::new();
        dest.push_str(address)
            .map_err(|_| ConfigError::AddressTooLong)?;
        self.sms_destination = dest;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(|_| ConfigError::Encode)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        postcard::from_bytes(bytes).map_err(|_| ConfigError::Decode)
    }
}

/// Persist the configuration, replacing any previous copy
pub fn save_config<S: LogStorage>(storage: &mut S, config: &LoggerConfig) -> Result<(), ConfigError> {
    let bytes = config.to_bytes()?;
    storage.write(&FilePath::root_file(CONFIG_FILE), &bytes)?;
    Ok(())
}

/// Load the stored configuration; `None` when none has been saved yet
pub fn load_config<S: LogStorage>(storage: &mut S) -> Result<Option<LoggerConfig>, ConfigError> {
    let mut bytes = Vec::new();
    if !storage.read(&FilePath::root_file(CONFIG_FILE), &mut bytes)? {
        return Ok(None);
    }
    LoggerConfig::from_bytes(&bytes).map(Some)
}
