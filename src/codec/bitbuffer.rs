//! MSB-first bit packing over a byte slice
//!
//! Bit 7 of byte 0 is the first bit written. Fields wider than a byte are
//! written most significant bit first, so a run of fields reads as one
//! big-endian bit string regardless of where byte boundaries fall.

use thiserror_no_std::Error;

/// Returned when a write or read runs past the end of the buffer
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Bit buffer overflow")]
pub struct BitOverflow;

pub struct BitWriter<'a> {
    buf: &'a mut [u8],
    bit_pos: usize,
}

impl<'a> BitWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, bit_pos: 0 }
    }

    /// Write the low `width` bits of `value` (`width <= 64`)
    pub fn write_bits(&mut self, value: u64, width: u32) -> Result<(), BitOverflow> {
        if self.bit_pos + width as usize > self.buf.len() * 8 {
            return Err(BitOverflow);
        }
        for i in (0..width).rev() {
            let byte = self.bit_pos / 8;
            let mask = 0x80u8 >> (self.bit_pos % 8);
            if (value >> i) & 1 == 1 {
                self.buf[byte] |= mask;
            } else {
                self.buf[byte] &= !mask;
            }
            self.bit_pos += 1;
        }
        Ok(())
    }

    pub fn bit_position(&self) -> usize {
        self.bit_pos
    }
}

pub struct BitReader<'a> {
    buf: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, bit_pos: 0 }
    }

    pub fn read_bits(&mut self, width: u32) -> Result<u64, BitOverflow> {
        if self.bit_pos + width as usize > self.buf.len() * 8 {
            return Err(BitOverflow);
        }
        let mut value = 0u64;
        for _ in 0..width {
            let byte = self.buf[self.bit_pos / 8];
            let bit = (byte >> (7 - self.bit_pos % 8)) & 1;
            value = (value << 1) | bit as u64;
            self.bit_pos += 1;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seven_bit_fields_cross_bytes() {
        let mut buf = [0u8; 7];
        let mut w = BitWriter::new(&mut buf);
        for v in 0..8u64 {
            w.write_bits(0x7F - v, 7).unwrap();
        }
        assert_eq!(w.bit_position(), 56);
        // 1111111 1111110 11 ...
        assert_eq!(buf[0], 0xFF);
        assert_eq!(buf[1], 0xFB);

        let mut r = BitReader::new(&buf);
        for v in 0..8u64 {
            assert_eq!(r.read_bits(7).unwrap(), 0x7F - v);
        }
        assert_eq!(r.read_bits(1), Err(BitOverflow));
    }

    #[test]
    fn test_overwrite_clears_bits() {
        let mut buf = [0xFFu8; 1];
        BitWriter::new(&mut buf).write_bits(0b0101, 4).unwrap();
        assert_eq!(buf[0], 0x5F);
    }

    #[test]
    fn test_overflow_is_reported() {
        let mut buf = [0u8; 1];
        let mut w = BitWriter::new(&mut buf);
        w.write_bits(0, 6).unwrap();
        assert_eq!(w.write_bits(0, 3), Err(BitOverflow));
    }

    #[test]
    fn test_overflow_message() {
        use alloc::string::ToString;
        assert_eq!(BitOverflow.to_string(), "Bit buffer overflow");
    }
}
