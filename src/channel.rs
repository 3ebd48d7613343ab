//! Channel identity
//!
//! A logged stream is identified by a category and a slot index. Data
//! channels (`A1`..`A8` analogue, `D1`..`D8` digital) can be logged in four
//! categories; control outputs (`C1`..`C4`) have their own category.

use core::fmt::{self, Display};

/// Number of data channel slots (analogue + digital)
pub const MAX_DATA_CHANNELS: usize = 16;

/// Number of analogue channel slots, indices `0..MAX_ANALOG_CHANNELS`
pub const MAX_ANALOG_CHANNELS: usize = 8;

/// Number of control output slots
pub const MAX_CONTROL_OUTPUTS: usize = 4;

/// Number of distinct `{category, index}` streams
pub const TRACKED_STREAMS: usize = 4 * MAX_DATA_CHANNELS + MAX_CONTROL_OUTPUTS;

/// Which stream of a channel an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelCategory {
    /// Regular logging stream
    Normal,
    /// Fixed-interval stream kept for SMS summaries
    Sms,
    /// Derived quantity (e.g. flow computed from level)
    Derived,
    /// SMS stream of the derived quantity
    DerivedSms,
    /// Control output state changes
    ControlOutput,
}

impl ChannelCategory {
    /// Drain rotation order used by the log writer
    pub const ROTATION: [ChannelCategory; 5] = [
        Self::Normal,
        Self::Sms,
        Self::Derived,
        Self::DerivedSms,
        Self::ControlOutput,
    ];

    /// Root directory for this category's files
    pub const fn root_dir(self) -> &'static str {
        match self {
            Self::Normal => "LOG",
            Self::Sms => "SMS",
            Self::Derived => "DER",
            Self::DerivedSms => "DSMS",
            Self::ControlOutput => "CTRL",
        }
    }

    /// Number of slots addressable in this category
    pub const fn slots(self) -> usize {
        match self {
            Self::ControlOutput => MAX_CONTROL_OUTPUTS,
            _ => MAX_DATA_CHANNELS,
        }
    }

    pub const fn is_derived(self) -> bool {
        matches!(self, Self::Derived | Self::DerivedSms)
    }

    /// SMS category matching the derived flag
    pub const fn sms(derived: bool) -> Self {
        if derived { Self::DerivedSms } else { Self::Sms }
    }
}

/// A `{category, index}` pair naming one logged stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId {
    pub category: ChannelCategory,
    pub index: u8,
}

impl ChannelId {
    /// Returns `None` if `index` is out of range for the category
    pub fn new(category: ChannelCategory, index: u8) -> Option<Self> {
        ((index as usize) < category.slots()).then_some(Self { category, index })
    }

    pub const fn normal(index: u8) -> Self {
        Self {
            category: ChannelCategory::Normal,
            index,
        }
    }

    pub const fn sms(index: u8) -> Self {
        Self {
            category: ChannelCategory::Sms,
            index,
        }
    }

    /// Same slot, different category
    pub const fn with_category(self, category: ChannelCategory) -> Self {
        Self {
            category,
            index: self.index,
        }
    }

    pub const fn is_digital(&self) -> bool {
        !matches!(self.category, ChannelCategory::ControlOutput)
            && self.index as usize >= MAX_ANALOG_CHANNELS
    }

    /// Parse `A1`..`A8`, `D1`..`D8` or `C1`..`C4` into a slot in `category`.
    /// Control output names always produce the control output category.
    pub fn parse(name: &str, category: ChannelCategory) -> Option<Self> {
        let bytes = name.as_bytes();
        if bytes.len() != 2 || !bytes[1].is_ascii_digit() || bytes[1] == b'0' {
            return None;
        }
        let n = bytes[1] - b'1';
        match bytes[0].to_ascii_uppercase() {
            b'A' if category != ChannelCategory::ControlOutput => Self::new(category, n)
                .filter(|_| (n as usize) < MAX_ANALOG_CHANNELS),
            b'D' if category != ChannelCategory::ControlOutput => {
                Self::new(category, n + MAX_ANALOG_CHANNELS as u8)
            }
            b'C' => Self::new(ChannelCategory::ControlOutput, n),
            _ => None,
        }
    }

    /// Two-character name, e.g. `A1`
    pub fn name(&self) -> heapless::String<2> {
        let (letter, number) = match self.category {
            ChannelCategory::ControlOutput => (b'C', self.index),
            _ if (self.index as usize) < MAX_ANALOG_CHANNELS => (b'A', self.index),
            _ => (b'D', self.index - MAX_ANALOG_CHANNELS as u8),
        };
        let mut name = heapless::String::new();
        // Both pushes fit: capacity is exactly two ASCII characters
        let _ = name.push(letter as char);
        let _ = name.push((b'1' + number) as char);
        name
    }

    /// Bit in the category's activity mask
    pub const fn mask_bit(&self) -> u16 {
        1 << self.index
    }

    /// Dense index over every stream, `0..TRACKED_STREAMS`
    pub const fn stream_slot(&self) -> usize {
        let base = match self.category {
            ChannelCategory::Normal => 0,
            ChannelCategory::Sms => MAX_DATA_CHANNELS,
            ChannelCategory::Derived => 2 * MAX_DATA_CHANNELS,
            ChannelCategory::DerivedSms => 3 * MAX_DATA_CHANNELS,
            ChannelCategory::ControlOutput => 4 * MAX_DATA_CHANNELS,
        };
        base + self.index as usize
    }

    /// Channel code byte used in PDU bodies: slot index with bit 7 marking derived
    pub const fn pdu_code(&self) -> u8 {
        if self.category.is_derived() {
            self.index | 0x80
        } else {
            self.index
        }
    }
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.name(), self.category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!(
            ChannelId::parse("A1", ChannelCategory::Sms),
            Some(ChannelId::sms(0))
        );
        assert_eq!(
            ChannelId::parse("d3", ChannelCategory::Normal),
            Some(ChannelId::normal(10))
        );
        assert_eq!(
            ChannelId::parse("C2", ChannelCategory::Normal),
            ChannelId::new(ChannelCategory::ControlOutput, 1)
        );
        assert_eq!(ChannelId::parse("A9", ChannelCategory::Normal), None);
        assert_eq!(ChannelId::parse("C5", ChannelCategory::Normal), None);
        assert_eq!(ChannelId::parse("A0", ChannelCategory::Normal), None);
        assert_eq!(ChannelId::parse("X1", ChannelCategory::Normal), None);
    }

    #[test]
    fn test_name_roundtrip() {
        for index in 0..MAX_DATA_CHANNELS as u8 {
            let id = ChannelId::normal(index);
            assert_eq!(ChannelId::parse(&id.name(), ChannelCategory::Normal), Some(id));
        }
    }

    #[test]
    fn test_pdu_code_marks_derived() {
        let id = ChannelId::new(ChannelCategory::DerivedSms, 3).unwrap();
        assert_eq!(id.pdu_code(), 0x83);
        assert_eq!(ChannelId::sms(3).pdu_code(), 0x03);
    }
}
