//! SMS PDU construction
//!
//! A message is an SMS-SUBMIT header addressed to the configured
//! destination followed by a fixed 140-byte binary body (see [`body`]),
//! handed to the modem as upper-case hex.

pub mod body;

pub use body::{
    BODY_LEN, Body, DecodedBody, SAMPLES_PER_MESSAGE, SingleStream, decode_body,
    encode_flow_pressure, encode_single, encode_totaliser,
};

use thiserror_no_std::Error;

use crate::codec::bitbuffer::BitOverflow;
use crate::config::ADDRESS_CAPACITY;

use alloc::string::String;
use alloc::vec::Vec;

/// Longest SMS-SUBMIT header the modem buffer accepts
pub const HEADER_CAPACITY: usize = 24;

pub type PduHeader = heapless::Vec<u8, HEADER_CAPACITY>;

/// Use the SMSC stored in the SIM
const SMSC_DEFAULT: u8 = 0x00;
/// SMS-SUBMIT with a relative validity period
const FIRST_OCTET_SUBMIT: u8 = 0x11;
/// Let the modem assign the message reference
const MESSAGE_REF: u8 = 0x00;
const TOA_INTERNATIONAL: u8 = 0x91;
const TOA_UNKNOWN: u8 = 0x81;
const PROTOCOL_ID: u8 = 0x00;
/// 8-bit data coding
const DCS_8BIT: u8 = 0x04;
/// Relative validity of four days
const VALIDITY_4_DAYS: u8 = 0xAA;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduError {
    #[error("No samples to send")]
    NoData,
    #[error("PDU header exceeds buffer")]
    HeaderTooLong,
    #[error("Invalid destination address")]
    InvalidAddress,
    #[error("Message body truncated")]
    Truncated,
    #[error("Unknown message body type")]
    UnknownType,
}

impl From<BitOverflow> for PduError {
    fn from(_: BitOverflow) -> Self {
        Self::Truncated
    }
}

/// Build the SMS-SUBMIT header for `destination` (digits, optional leading `+`)
pub fn build_header(destination: &str) -> Result<PduHeader, PduError> {
    let (toa, digits) = match destination.strip_prefix('+') {
        Some(rest) => (TOA_INTERNATIONAL, rest),
        None => (TOA_UNKNOWN, destination),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PduError::InvalidAddress);
    }
    let digit_count = u8::try_from(digits.len()).map_err(|_| PduError::HeaderTooLong)?;

    let mut header = PduHeader::new();
    let push = |header: &mut PduHeader, byte: u8| {
        header.push(byte).map_err(|_| PduError::HeaderTooLong)
    };

    for byte in [SMSC_DEFAULT, FIRST_OCTET_SUBMIT, MESSAGE_REF, digit_count, toa] {
        push(&mut header, byte)?;
    }
    // Semi-octets, low nibble first, odd lengths padded with F
    for pair in digits.as_bytes().chunks(2) {
        let low = pair[0] - b'0';
        let high = pair.get(1).map_or(0x0F, |d| d - b'0');
        push(&mut header, high << 4 | low)?;
    }
    for byte in [PROTOCOL_ID, DCS_8BIT, VALIDITY_4_DAYS, BODY_LEN as u8] {
        push(&mut header, byte)?;
    }
    Ok(header)
}

/// One outbound message, ready for hex encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduMessage {
    pub destination: heapless::String<ADDRESS_CAPACITY>,
    pub header: PduHeader,
    pub body: Body,
}

impl PduMessage {
    pub fn new(destination: &str, body: Body) -> Result<Self, PduError> {
        let header = build_header(destination)?;
        let mut dest = heapless::String::new();
        dest.push_str(destination)
            .map_err(|_| PduError::InvalidAddress)?;
        Ok(Self {
            destination: dest,
            header,
            body,
        })
    }

    /// Octets counted by `AT+CMGS`: everything after the SMSC field
    pub fn tpdu_len(&self) -> usize {
        self.header.len() - 1 + BODY_LEN
    }

    /// Header and body as upper-case hex
    pub fn to_hex(&self) -> String {
        let mut bytes = Vec::with_capacity(self.header.len() + BODY_LEN);
        bytes.extend_from_slice(&self.header);
        bytes.extend_from_slice(&self.body);
        hex::encode_upper(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_international_header() {
        let header = build_header("+447700900123").unwrap();
        assert_eq!(hex::encode_upper(&header), "0011000C914477000910320004AA8C");
    }

    #[test]
    fn test_odd_digit_count_is_padded() {
        let header = build_header("12345").unwrap();
        assert_eq!(
            &header[..],
            &[0x00, 0x11, 0x00, 0x05, 0x81, 0x21, 0x43, 0xF5, 0x00, 0x04, 0xAA, 0x8C]
        );
    }

    #[test]
    fn test_header_limits() {
        // 15 address bytes plus 9 fixed bytes is exactly the capacity
        assert_eq!(build_header("+123456789012345678901234567890").unwrap().len(), 24);
        assert_eq!(
            build_header("+1234567890123456789012345678901"),
            Err(PduError::HeaderTooLong)
        );
        assert_eq!(build_header(""), Err(PduError::InvalidAddress));
        assert_eq!(build_header("+"), Err(PduError::InvalidAddress));
        assert_eq!(build_header("07700 900"), Err(PduError::InvalidAddress));
    }

    #[test]
    fn test_message_hex() {
        let mut body = [0u8; BODY_LEN];
        body[0] = 0xAB;
        let msg = PduMessage::new("12", body).unwrap();
        let text = msg.to_hex();
        assert!(text.starts_with("0011000281210004AA8CAB00"));
        assert_eq!(text.len(), 2 * (10 + BODY_LEN));
        assert_eq!(msg.tpdu_len(), 9 + BODY_LEN);
    }
}
