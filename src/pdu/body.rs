//! Fixed 140-byte message bodies
//!
//! All fields are MSB-first; multi-byte values are big-endian.
//!
//! ```text
//! Type A (single stream)
//!   [0] 'A'  [1] channel  [2..6] BCD DD MM hh mm  [6] interval
//!   [7] description  [8] units  [9..13] min f32  [13..17] max f32
//!   [17..137] 96 x 10-bit codes  [137..140] zero
//!
//! Type B (single stream with totaliser)
//!   [0] 'B'  [1] channel  [2..6] BCD DD MM hh mm  [6] interval
//!   [7..12] totaliser:34 (hundredths) | volume units:4 | 0:2
//!   [12..16] min f32  [16..20] max f32  [20..140] 96 x 10-bit codes
//!
//! Type C (flow and pressure)
//!   [0..3] BCD DD MM hh
//!   [3..8] flow exp:3 | pressure exp:3 | flow min:9 | flow max:9
//!          | pressure min:8 | pressure max:8
//!   [8..92] 96 x 7-bit flow codes  [92..140] 96 x 4-bit pressure codes
//! ```
//!
//! Ten-bit codes spread `0..=1022` linearly over `[min, max]`; `1023` marks
//! a missing sample. Type C ranges are a mantissa times a power-of-ten step
//! so both ends fit in a few bits; the top code of each stream marks a
//! missing sample.

use crate::channel::ChannelId;
use crate::codec::NO_DATA;
use crate::codec::bitbuffer::{BitReader, BitWriter};
use crate::config::ChannelConfig;
use crate::time::DateTime;
use crate::totaliser::Totaliser;

use super::PduError;

pub const BODY_LEN: usize = 140;

/// Samples carried by every body type
pub const SAMPLES_PER_MESSAGE: usize = 96;

pub type Body = [u8; BODY_LEN];

pub const TYPE_SINGLE: u8 = b'A';
pub const TYPE_TOTALISER: u8 = b'B';

const LINEAR_BITS: u32 = 10;
const LINEAR_MAX: u16 = 1022;
const LINEAR_NO_DATA: u16 = 1023;

const TOTALISER_BITS: u32 = 34;

/// Mantissa/exponent scale of one Type C stream
struct Scale {
    /// Step size for each exponent code
    steps: [f64; 8],
    mantissa_bits: u32,
    code_bits: u32,
    ceiling: f64,
}

impl Scale {
    const fn mantissa_max(&self) -> u64 {
        (1 << self.mantissa_bits) - 1
    }

    /// Highest code carrying data; the one above it marks a missing sample
    const fn code_max(&self) -> u8 {
        (1 << self.code_bits) as u8 - 2
    }
}

const FLOW: Scale = Scale {
    steps: [0.001, 0.01, 0.1, 1.0, 10.0, 100.0, 1_000.0, 10_000.0],
    mantissa_bits: 9,
    code_bits: 7,
    ceiling: 50_000.0,
};

const PRESSURE: Scale = Scale {
    steps: [0.01, 0.1, 1.0, 10.0, 100.0, 1_000.0, 10_000.0, 100_000.0],
    mantissa_bits: 8,
    code_bits: 4,
    ceiling: 1_000.0,
};

/// A single-stream window to send
#[derive(Debug, Clone, Copy)]
pub struct SingleStream<'a> {
    pub channel: ChannelId,
    /// Time of the last slot in the window
    pub end: DateTime,
    pub config: ChannelConfig,
    pub samples: &'a [f32; SAMPLES_PER_MESSAGE],
}

/// Day, month, hour and minute carried in BCD
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyTime {
    pub day: u8,
    pub month: u8,
    pub hour: u8,
    pub minute: u8,
}

impl From<DateTime> for BodyTime {
    fn from(dt: DateTime) -> Self {
        Self {
            day: dt.date.day,
            month: dt.date.month,
            hour: dt.hour,
            minute: dt.minute,
        }
    }
}

/// Receive-side view of a body
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedBody {
    Single {
        channel_code: u8,
        time: BodyTime,
        config: ChannelConfig,
        min: f32,
        max: f32,
        samples: [f32; SAMPLES_PER_MESSAGE],
    },
    Totaliser {
        channel_code: u8,
        time: BodyTime,
        interval_code: u8,
        /// Totaliser in hundredths of a volume unit
        total_hundredths: u64,
        volume_units: u8,
        min: f32,
        max: f32,
        samples: [f32; SAMPLES_PER_MESSAGE],
    },
    FlowPressure {
        /// Minute is always zero; the body carries the hour only
        time: BodyTime,
        flow_range: (f64, f64),
        pressure_range: (f64, f64),
        flow: [f32; SAMPLES_PER_MESSAGE],
        pressure: [f32; SAMPLES_PER_MESSAGE],
    },
}

const fn to_bcd(value: u8) -> u8 {
    (value / 10) << 4 | value % 10
}

const fn from_bcd(byte: u8) -> u8 {
    (byte >> 4) * 10 + (byte & 0x0F)
}

fn is_sample(x: f32) -> bool {
    !x.is_nan() && x != NO_DATA
}

/// Smallest and largest real sample, `None` if there are none
fn data_range(samples: &[f32]) -> Option<(f32, f32)> {
    samples
        .iter()
        .copied()
        .filter(|&x| is_sample(x))
        .fold(None, |acc, x| match acc {
            None => Some((x, x)),
            Some((lo, hi)) => Some((lo.min(x), hi.max(x))),
        })
}

/// Nearest code for a non-negative fraction of `code_max`
fn quantize(fraction: f64, code_max: u16) -> u16 {
    let scaled = fraction * code_max as f64 + 0.5;
    if scaled <= 0.0 {
        0
    } else {
        (scaled as u16).min(code_max)
    }
}

fn write_time(out: &mut [u8], time: BodyTime) {
    let fields = [time.day, time.month, time.hour, time.minute];
    for (byte, field) in out.iter_mut().zip(fields) {
        *byte = to_bcd(field);
    }
}

fn read_time(bytes: &[u8], with_minute: bool) -> BodyTime {
    BodyTime {
        day: from_bcd(bytes[0]),
        month: from_bcd(bytes[1]),
        hour: from_bcd(bytes[2]),
        minute: if with_minute { from_bcd(bytes[3]) } else { 0 },
    }
}

fn write_linear(out: &mut [u8], samples: &[f32], min: f32, max: f32) -> Result<(), PduError> {
    let span = max as f64 - min as f64;
    let mut w = BitWriter::new(out);
    for &x in samples {
        let code = if !is_sample(x) {
            LINEAR_NO_DATA
        } else if span <= 0.0 {
            0
        } else {
            quantize((x as f64 - min as f64) / span, LINEAR_MAX)
        };
        w.write_bits(code as u64, LINEAR_BITS)?;
    }
    Ok(())
}

fn read_linear(bytes: &[u8], min: f32, max: f32) -> Result<[f32; SAMPLES_PER_MESSAGE], PduError> {
    let span = max as f64 - min as f64;
    let mut r = BitReader::new(bytes);
    let mut samples = [NO_DATA; SAMPLES_PER_MESSAGE];
    for slot in samples.iter_mut() {
        let code = r.read_bits(LINEAR_BITS)? as u16;
        if code != LINEAR_NO_DATA {
            let value = min as f64 + span * code as f64 / LINEAR_MAX as f64;
            *slot = value.max(min as f64).min(max as f64) as f32;
        }
    }
    Ok(samples)
}

fn read_f32(bytes: &[u8]) -> f32 {
    f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Type A: one stream with configuration indices
pub fn encode_single(stream: &SingleStream<'_>) -> Result<Body, PduError> {
    let (min, max) = data_range(stream.samples).ok_or(PduError::NoData)?;
    let mut body = [0u8; BODY_LEN];
    body[0] = TYPE_SINGLE;
    body[1] = stream.channel.pdu_code();
    write_time(&mut body[2..6], stream.end.into());
    body[6] = stream.config.interval_code;
    body[7] = stream.config.description_index;
    body[8] = stream.config.units_index;
    body[9..13].copy_from_slice(&min.to_be_bytes());
    body[13..17].copy_from_slice(&max.to_be_bytes());
    write_linear(&mut body[17..137], stream.samples, min, max)?;
    Ok(body)
}

/// Type B: one stream plus the channel's totaliser
pub fn encode_totaliser(
    stream: &SingleStream<'_>,
    total: Totaliser,
    volume_units: u8,
) -> Result<Body, PduError> {
    let (min, max) = data_range(stream.samples).ok_or(PduError::NoData)?;
    let mut body = [0u8; BODY_LEN];
    body[0] = TYPE_TOTALISER;
    body[1] = stream.channel.pdu_code();
    write_time(&mut body[2..6], stream.end.into());
    body[6] = stream.config.interval_code;

    let mut w = BitWriter::new(&mut body[7..12]);
    w.write_bits(total.hundredths(TOTALISER_BITS), TOTALISER_BITS)?;
    w.write_bits((volume_units & 0x0F) as u64, 4)?;
    w.write_bits(0, 2)?;

    body[12..16].copy_from_slice(&min.to_be_bytes());
    body[16..20].copy_from_slice(&max.to_be_bytes());
    write_linear(&mut body[20..140], stream.samples, min, max)?;
    Ok(body)
}

/// Exponent and mantissas of a reconstructed Type C range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct ScaledRange {
    exponent: u8,
    min_m: u64,
    max_m: u64,
}

impl ScaledRange {
    /// Smallest exponent whose rounded-up maximum fits the mantissa field.
    /// The minimum rounds down, so the range always contains `[lo, hi]`.
    fn fit(scale: &Scale, lo: f64, hi: f64) -> Self {
        for (exponent, &step) in scale.steps.iter().enumerate() {
            let mut max_m = (hi / step) as u64;
            while (max_m as f64) * step < hi {
                max_m += 1;
            }
            if max_m > scale.mantissa_max() {
                continue;
            }
            let mut min_m = ((lo / step) as u64).min(max_m);
            while min_m > 0 && (min_m as f64) * step > lo {
                min_m -= 1;
            }
            return Self {
                exponent: exponent as u8,
                min_m,
                max_m,
            };
        }
        // The ceiling always fits the coarsest step
        Self {
            exponent: (scale.steps.len() - 1) as u8,
            min_m: 0,
            max_m: scale.mantissa_max(),
        }
    }

    fn bounds(&self, scale: &Scale) -> (f64, f64) {
        let step = scale.steps[self.exponent as usize & 0x07];
        (self.min_m as f64 * step, self.max_m as f64 * step)
    }
}

fn clamp_stream(samples: &[f32; SAMPLES_PER_MESSAGE], scale: &Scale) -> [Option<f64>; SAMPLES_PER_MESSAGE] {
    let mut out = [None; SAMPLES_PER_MESSAGE];
    for (slot, &x) in out.iter_mut().zip(samples) {
        if is_sample(x) {
            *slot = Some((x as f64).clamp(0.0, scale.ceiling));
        }
    }
    out
}

fn stream_range(values: &[Option<f64>], scale: &Scale) -> ScaledRange {
    let range = values.iter().flatten().fold(None, |acc: Option<(f64, f64)>, &x| match acc {
        None => Some((x, x)),
        Some((lo, hi)) => Some((lo.min(x), hi.max(x))),
    });
    match range {
        Some((lo, hi)) => ScaledRange::fit(scale, lo, hi),
        None => ScaledRange::default(),
    }
}

fn write_scaled(
    w: &mut BitWriter<'_>,
    values: &[Option<f64>],
    range: &ScaledRange,
    scale: &Scale,
) -> Result<(), PduError> {
    let (lo, hi) = range.bounds(scale);
    let code_max = scale.code_max() as u16;
    for value in values {
        let code = match value {
            None => code_max + 1,
            Some(_) if hi <= lo => 0,
            Some(x) => quantize((x - lo) / (hi - lo), code_max),
        };
        w.write_bits(code as u64, scale.code_bits)?;
    }
    Ok(())
}

fn read_scaled(
    r: &mut BitReader<'_>,
    range: &ScaledRange,
    scale: &Scale,
) -> Result<[f32; SAMPLES_PER_MESSAGE], PduError> {
    let (lo, hi) = range.bounds(scale);
    let code_max = scale.code_max() as u64;
    let mut out = [NO_DATA; SAMPLES_PER_MESSAGE];
    for slot in out.iter_mut() {
        let code = r.read_bits(scale.code_bits)?;
        if code <= code_max {
            *slot = (lo + (hi - lo) * code as f64 / code_max as f64) as f32;
        }
    }
    Ok(out)
}

/// Type C: paired flow and pressure streams
pub fn encode_flow_pressure(
    end: DateTime,
    flow: &[f32; SAMPLES_PER_MESSAGE],
    pressure: &[f32; SAMPLES_PER_MESSAGE],
) -> Result<Body, PduError> {
    let flow = clamp_stream(flow, &FLOW);
    let pressure = clamp_stream(pressure, &PRESSURE);
    if flow.iter().chain(&pressure).all(Option::is_none) {
        return Err(PduError::NoData);
    }
    let flow_range = stream_range(&flow, &FLOW);
    let pressure_range = stream_range(&pressure, &PRESSURE);

    let mut body = [0u8; BODY_LEN];
    write_time(&mut body[0..3], end.into());

    let mut w = BitWriter::new(&mut body[3..]);
    w.write_bits(flow_range.exponent as u64, 3)?;
    w.write_bits(pressure_range.exponent as u64, 3)?;
    w.write_bits(flow_range.min_m, FLOW.mantissa_bits)?;
    w.write_bits(flow_range.max_m, FLOW.mantissa_bits)?;
    w.write_bits(pressure_range.min_m, PRESSURE.mantissa_bits)?;
    w.write_bits(pressure_range.max_m, PRESSURE.mantissa_bits)?;
    write_scaled(&mut w, &flow, &flow_range, &FLOW)?;
    write_scaled(&mut w, &pressure, &pressure_range, &PRESSURE)?;
    Ok(body)
}

/// Decode any body type produced by this module
pub fn decode_body(body: &[u8]) -> Result<DecodedBody, PduError> {
    if body.len() != BODY_LEN {
        return Err(PduError::Truncated);
    }
    match body[0] {
        TYPE_SINGLE => {
            let (min, max) = (read_f32(&body[9..13]), read_f32(&body[13..17]));
            Ok(DecodedBody::Single {
                channel_code: body[1],
                time: read_time(&body[2..6], true),
                config: ChannelConfig::new(body[6], body[7], body[8]),
                min,
                max,
                samples: read_linear(&body[17..137], min, max)?,
            })
        }
        TYPE_TOTALISER => {
            let mut r = BitReader::new(&body[7..12]);
            let total_hundredths = r.read_bits(TOTALISER_BITS)?;
            let volume_units = r.read_bits(4)? as u8;
            let (min, max) = (read_f32(&body[12..16]), read_f32(&body[16..20]));
            Ok(DecodedBody::Totaliser {
                channel_code: body[1],
                time: read_time(&body[2..6], true),
                interval_code: body[6],
                total_hundredths,
                volume_units,
                min,
                max,
                samples: read_linear(&body[20..140], min, max)?,
            })
        }
        day if day <= 0x31 => {
            let mut r = BitReader::new(&body[3..]);
            let flow_exp = r.read_bits(3)? as u8;
            let pressure_exp = r.read_bits(3)? as u8;
            let flow_range = ScaledRange {
                exponent: flow_exp,
                min_m: r.read_bits(FLOW.mantissa_bits)?,
                max_m: r.read_bits(FLOW.mantissa_bits)?,
            };
            let pressure_range = ScaledRange {
                exponent: pressure_exp,
                min_m: r.read_bits(PRESSURE.mantissa_bits)?,
                max_m: r.read_bits(PRESSURE.mantissa_bits)?,
            };
            let flow = read_scaled(&mut r, &flow_range, &FLOW)?;
            let pressure = read_scaled(&mut r, &pressure_range, &PRESSURE)?;
            Ok(DecodedBody::FlowPressure {
                time: read_time(&body[0..3], false),
                flow_range: flow_range.bounds(&FLOW),
                pressure_range: pressure_range.bounds(&PRESSURE),
                flow,
                pressure,
            })
        }
        _ => Err(PduError::UnknownType),
    }
}
