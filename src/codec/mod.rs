//! Text-safe compression of samples and event times
//!
//! A sample is reduced from IEEE-754 single precision to a 21-bit float:
//!
//! ```text
//!  20  19..14      13..0
//! +---+----------+----------------+
//! | s | exponent | mantissa (14)  |   exponent bias 31
//! +---+----------+----------------+
//! ```
//!
//! Exponent 0 encodes (signed) zero and exponent 63 is reserved for
//! [`NO_DATA`]. The 21 bits are split into three 7-bit groups, most
//! significant first, and every group maps to one byte of a printable
//! alphabet that avoids the line sigils, separators and whitespace used by
//! the log file format.
//!
//! The alphabet is ASCII `'0'..='~'` without `'='` plus the Latin-1 letters
//! from `0xC0`. Log files are therefore Latin-1 text, not UTF-8, and must be
//! handled as bytes.

pub mod bitbuffer;

/// Reserved "sample not collected" value, distinct from zero
pub const NO_DATA: f32 = -9999.0;

/// Characters per encoded sample
pub const VALUE_CODE_LEN: usize = 3;

/// Characters per encoded event timestamp
pub const EVENT_CODE_LEN: usize = 4;

/// Largest value an event timestamp code can carry
pub const EVENT_MAX: u32 = (1 << 28) - 1;

const MANTISSA_BITS: u32 = 14;
const EXPONENT_BIAS: i32 = 31;
const EXPONENT_MAX: u32 = 62;
const EXPONENT_NO_DATA: u32 = 63;

const GROUP_MASK: u32 = 0x7F;

/// Groups `0..=77` map to `'0'..='~'`, stepping over `'='`
const LOW_BASE: u8 = 0x30;
const LOW_COUNT: u8 = 78;
/// The totaliser sigil, never part of a code
const LOW_SKIP: u8 = b'=';
const LOW_SPLIT: u8 = LOW_SKIP - LOW_BASE;
/// Groups `78..=127` map to Latin-1 letters from `0xC0`
const HIGH_BASE: u8 = 0xC0;

/// Map a 7-bit group to its text-safe byte
pub const fn group_to_byte(group: u8) -> u8 {
    if group < LOW_SPLIT {
        LOW_BASE + group
    } else if group < LOW_COUNT {
        LOW_BASE + group + 1
    } else {
        HIGH_BASE + (group - LOW_COUNT)
    }
}

/// Inverse of [`group_to_byte`]; `None` for bytes outside the alphabet
pub const fn byte_to_group(byte: u8) -> Option<u8> {
    if byte >= LOW_BASE && byte < LOW_SKIP {
        Some(byte - LOW_BASE)
    } else if byte > LOW_SKIP && byte <= LOW_BASE + LOW_COUNT {
        Some(byte - LOW_BASE - 1)
    } else if byte >= HIGH_BASE && byte < HIGH_BASE + (128 - LOW_COUNT) {
        Some(byte - HIGH_BASE + LOW_COUNT)
    } else {
        None
    }
}

/// Whether `byte` can appear inside an encoded value or timestamp
pub const fn is_code_byte(byte: u8) -> bool {
    byte_to_group(byte).is_some()
}

/// Reduce an `f32` to its 21-bit representation
pub fn float_to_bits21(x: f32) -> u32 {
    if x.is_nan() || x == NO_DATA {
        return EXPONENT_NO_DATA << MANTISSA_BITS;
    }

    let bits = x.to_bits();
    let sign = (bits >> 31) << 20;
    let exponent = ((bits >> 23) & 0xFF) as i32;
    let mantissa = bits & 0x7F_FFFF;

    if exponent == 0 {
        // Zero and subnormals
        return sign;
    }

    let field = exponent - 127 + EXPONENT_BIAS;
    if exponent == 0xFF || field > EXPONENT_MAX as i32 {
        // Saturate to the largest finite magnitude
        return sign | EXPONENT_MAX << MANTISSA_BITS | ((1 << MANTISSA_BITS) - 1);
    }
    if field < 1 {
        return sign;
    }

    sign | (field as u32) << MANTISSA_BITS | mantissa >> (23 - MANTISSA_BITS)
}

/// Expand a 21-bit representation back to `f32`
pub fn bits21_to_float(code: u32) -> f32 {
    let sign = (code >> 20) & 1;
    let field = (code >> MANTISSA_BITS) & 0x3F;
    let mantissa = code & ((1 << MANTISSA_BITS) - 1);

    match field {
        EXPONENT_NO_DATA => NO_DATA,
        0 => f32::from_bits(sign << 31),
        _ => {
            let exponent = (field as i32 - EXPONENT_BIAS + 127) as u32;
            f32::from_bits(sign << 31 | exponent << 23 | mantissa << (23 - MANTISSA_BITS))
        }
    }
}

fn split_groups<const N: usize>(value: u32) -> [u8; N] {
    let mut out = [0u8; N];
    for (i, byte) in out.iter_mut().enumerate() {
        let shift = 7 * (N - 1 - i) as u32;
        *byte = group_to_byte(((value >> shift) & GROUP_MASK) as u8);
    }
    out
}

fn join_groups(bytes: &[u8]) -> Option<u32> {
    bytes
        .iter()
        .try_fold(0u32, |acc, &b| Some(acc << 7 | byte_to_group(b)? as u32))
}

/// Encode a sample as three text-safe characters
pub fn encode_float(x: f32) -> [u8; VALUE_CODE_LEN] {
    split_groups(float_to_bits21(x))
}

/// Decode three characters produced by [`encode_float`]
pub fn decode_float(code: &[u8]) -> Option<f32> {
    if code.len() != VALUE_CODE_LEN {
        return None;
    }
    join_groups(code).map(bits21_to_float)
}

/// Encode a 28-bit event timestamp (milliseconds of day) as four characters.
/// Larger values saturate.
pub fn encode_event_timestamp(x: u32) -> [u8; EVENT_CODE_LEN] {
    split_groups(x.min(EVENT_MAX))
}

/// Decode four characters produced by [`encode_event_timestamp`]
pub fn decode_event_timestamp(code: &[u8]) -> Option<u32> {
    if code.len() != EVENT_CODE_LEN {
        return None;
    }
    join_groups(code)
}

/// Upper bound on `|decode(encode(x)) - x|` for an in-range `x`
pub fn resolution(x: f32) -> f32 {
    let exponent = ((x.to_bits() >> 23) & 0xFF) as i32 - 127;
    pow2(exponent - MANTISSA_BITS as i32)
}

fn pow2(power: i32) -> f32 {
    let biased = (power + 127).clamp(1, 254) as u32;
    f32::from_bits(biased << 23)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabet_is_text_safe() {
        for group in 0..128u8 {
            let byte = group_to_byte(group);
            assert!(byte > b' ', "group {group} maps to control/space");
            assert!(byte != 0x7F && !(0x80..0xA0).contains(&byte));
            assert!(!b"#*=$,\r\n".contains(&byte));
            assert_eq!(byte_to_group(byte), Some(group));
        }
        assert_eq!(byte_to_group(b'#'), None);
        assert_eq!(byte_to_group(b'='), None);
        assert_eq!(byte_to_group(0xFF), None);
        assert_eq!(group_to_byte(12), b'<');
        assert_eq!(group_to_byte(13), b'>');
        assert_eq!(group_to_byte(77), b'~');
    }

    #[test]
    fn test_value_error_bound() {
        let samples = [
            1.0f32, -1.0, 0.5, 3.14159, 12.345, -273.15, 1013.25, 65535.0, 0.000123, 1.0e9,
            -7.5e-8, 42.0,
        ];
        for x in samples {
            let decoded = decode_float(&encode_float(x)).unwrap();
            assert!(
                (decoded - x).abs() <= resolution(x),
                "x={x} decoded={decoded}"
            );
            assert!((decoded - x).abs() <= x.abs() / 16384.0);
        }
    }

    #[test]
    fn test_value_exact_for_short_mantissas() {
        for x in [0.0f32, 1.5, -2.25, 100.0, 0.125] {
            assert_eq!(decode_float(&encode_float(x)), Some(x));
        }
    }

    #[test]
    fn test_no_data_and_nan() {
        assert_eq!(decode_float(&encode_float(NO_DATA)), Some(NO_DATA));
        assert_eq!(decode_float(&encode_float(f32::NAN)), Some(NO_DATA));
    }

    #[test]
    fn test_out_of_range_clamps() {
        let big = decode_float(&encode_float(1.0e20)).unwrap();
        assert!(big > 4.0e9 && big.is_finite());
        let neg_inf = decode_float(&encode_float(f32::NEG_INFINITY)).unwrap();
        assert!(neg_inf < -4.0e9 && neg_inf.is_finite());
        assert_eq!(decode_float(&encode_float(1.0e-12)), Some(0.0));
    }

    #[test]
    fn test_event_timestamp() {
        for ms in [0u32, 1, 45_296_789, 86_399_999, EVENT_MAX] {
            let code = encode_event_timestamp(ms);
            assert!(code.iter().all(|&b| is_code_byte(b)));
            assert_eq!(decode_event_timestamp(&code), Some(ms));
        }
        assert_eq!(
            decode_event_timestamp(&encode_event_timestamp(u32::MAX)),
            Some(EVENT_MAX)
        );
    }

    #[test]
    fn test_decode_rejects_foreign_bytes() {
        assert_eq!(decode_float(b"0#0"), None);
        assert_eq!(decode_float(b"00"), None);
        assert_eq!(decode_event_timestamp(b"000"), None);
    }
}
