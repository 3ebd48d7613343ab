//! Line-oriented log file format
//!
//! ```text
//! #A1,00:00:00,10,4,7,2          block header: channel, first sample, interval, description, units[, message type]
//! 0aC0aC0aD...                   value codes, 26 per line
//! $23:45:00,0aC,06:15:00,1Ö4,12480,21,T1234.500
//!                                footer: min time, min, max time, max, battery mV, CSQ[, totaliser]
//! *D1,08:00:00                   event run header
//! 0a0b0a0c...                    event timestamp codes, 20 per line
//! =0a0b,1234.500                 totaliser snapshot
//! ```
//!
//! Code characters never collide with the sigils, `,` or whitespace, so a
//! line's first byte identifies its kind.

use core::fmt::{self, Write};

use crate::channel::{ChannelCategory, ChannelId};
use crate::codec::{self, VALUE_CODE_LEN};
use crate::config::ChannelConfig;
use crate::time::{ClockTime, parse_clock_time};
use crate::totaliser::Totaliser;

pub const HEADER_SIGIL: u8 = b'#';
pub const FOOTER_SIGIL: u8 = b'$';
pub const EVENT_HEADER_SIGIL: u8 = b'*';
pub const TOTALISER_SIGIL: u8 = b'=';

/// Value codes per line before a line break
pub const VALUES_PER_LINE: u8 = 26;

/// Event codes per line before a line break
pub const EVENTS_PER_LINE: u8 = 20;

/// Longest non-value line the writer produces
pub const LINE_CAPACITY: usize = 96;

pub type Line = heapless::Vec<u8, LINE_CAPACITY>;

/// Marks a missing footer time
const NO_TIME: &str = "--:--:--";
/// Marks a missing footer value
const NO_VALUE: &str = "-";

struct LineWriter<'a>(&'a mut Line);

impl Write for LineWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.extend_from_slice(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

fn push_bytes(line: &mut Line, bytes: &[u8]) -> fmt::Result {
    line.extend_from_slice(bytes).map_err(|_| fmt::Error)
}

/// `#<Cn>,<HH:MM:SS>,<interval>,<description>,<units>[,<message type>]`
pub fn header_line(channel: ChannelId, first_sample_sod: u32, config: &ChannelConfig) -> Line {
    let mut line = Line::new();
    let mut w = LineWriter(&mut line);
    // Longest header is well under LINE_CAPACITY
    let _ = write!(
        w,
        "#{},{},{},{},{}",
        channel.name(),
        ClockTime(first_sample_sod),
        config.interval_code,
        config.description_index,
        config.units_index
    );
    if config.message_type != 0 {
        let _ = write!(w, ",{}", config.message_type);
    }
    let _ = w.write_str("\n");
    line
}

/// `*<Cn>,<HH:MM:SS>`
pub fn event_header_line(channel: ChannelId, first_event_sod: u32) -> Line {
    let mut line = Line::new();
    let _ = write!(
        LineWriter(&mut line),
        "*{},{}\n",
        channel.name(),
        ClockTime(first_event_sod)
    );
    line
}

/// `=<event code>,<totaliser>`
pub fn totaliser_line(ms_of_day: u32, total: Totaliser) -> Line {
    let mut line = Line::new();
    let _ = push_bytes(&mut line, &[TOTALISER_SIGIL]);
    let _ = push_bytes(&mut line, &codec::encode_event_timestamp(ms_of_day));
    let _ = write!(LineWriter(&mut line), ",{}\n", total);
    line
}

/// A block extreme and the time of day it occurred
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extreme {
    pub value: f32,
    pub secs_of_day: u32,
}

/// Block summary written when a block closes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FooterLine {
    pub min: Option<Extreme>,
    pub max: Option<Extreme>,
    pub battery_mv: u16,
    pub csq: u8,
    pub totaliser: Option<Totaliser>,
}

impl FooterLine {
    fn write_extreme(line: &mut Line, extreme: Option<Extreme>, compress: bool) -> fmt::Result {
        match extreme {
            None => write!(LineWriter(line), "{},{}", NO_TIME, NO_VALUE),
            Some(e) => {
                write!(LineWriter(line), "{},", ClockTime(e.secs_of_day))?;
                if compress {
                    push_bytes(line, &codec::encode_float(e.value))
                } else {
                    // Plain values always carry a decimal point, codes never do
                    write!(LineWriter(line), "{:.3}", e.value)
                }
            }
        }
    }

    pub fn render(&self, compress: bool) -> Line {
        let mut line = Line::new();
        let _ = push_bytes(&mut line, &[FOOTER_SIGIL]);
        let _ = Self::write_extreme(&mut line, self.min, compress);
        let _ = push_bytes(&mut line, b",");
        let _ = Self::write_extreme(&mut line, self.max, compress);
        let _ = write!(LineWriter(&mut line), ",{},{}", self.battery_mv, self.csq);
        if let Some(total) = self.totaliser {
            let _ = write!(LineWriter(&mut line), ",T{}", total);
        }
        let _ = push_bytes(&mut line, b"\n");
        line
    }

    fn parse_extreme(time: &[u8], value: &[u8]) -> Option<Option<Extreme>> {
        if time == NO_TIME.as_bytes() {
            return Some(None);
        }
        let secs_of_day = parse_clock_time(core::str::from_utf8(time).ok()?)?;
        let value = if value.contains(&b'.') {
            core::str::from_utf8(value).ok()?.parse().ok()?
        } else {
            codec::decode_float(value)?
        };
        Some(Some(Extreme { value, secs_of_day }))
    }

    pub fn parse(line: &[u8]) -> Option<Self> {
        let body = line.strip_prefix(&[FOOTER_SIGIL])?;
        let mut fields = body.split(|&b| b == b',');
        let min = Self::parse_extreme(fields.next()?, fields.next()?)?;
        let max = Self::parse_extreme(fields.next()?, fields.next()?)?;
        let battery_mv = parse_num(fields.next()?)?;
        let csq = parse_num(fields.next()?)?;
        let totaliser = fields.next().and_then(parse_totaliser_field);
        Some(Self {
            min,
            max,
            battery_mv,
            csq,
            totaliser,
        })
    }
}

fn parse_num<T: core::str::FromStr>(field: &[u8]) -> Option<T> {
    core::str::from_utf8(field).ok()?.parse().ok()
}

fn parse_totaliser_field(field: &[u8]) -> Option<Totaliser> {
    let text = core::str::from_utf8(field.strip_prefix(b"T")?).ok()?;
    Totaliser::parse(text)
}

/// Totaliser carried by a footer line. Anything unparsable is "absent".
pub fn footer_totaliser(line: &[u8]) -> Option<Totaliser> {
    let body = line.strip_prefix(&[FOOTER_SIGIL])?;
    body.split(|&b| b == b',').nth(6).and_then(parse_totaliser_field)
}

/// Block header fields as read back from a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmsFileHeader {
    /// Channel slot index
    pub channel: u8,
    /// Seconds of day of the first sample in the block
    pub first_sample: u32,
    pub config: ChannelConfig,
}

impl SmsFileHeader {
    pub fn parse(line: &[u8]) -> Option<Self> {
        let body = core::str::from_utf8(line.strip_prefix(&[HEADER_SIGIL])?).ok()?;
        let mut fields = body.split(',');
        let channel = ChannelId::parse(fields.next()?, ChannelCategory::Normal)?;
        let first_sample = parse_clock_time(fields.next()?)?;
        let interval_code = fields.next()?.parse().ok()?;
        let description_index = fields.next()?.parse().ok()?;
        let units_index = fields.next()?.parse().ok()?;
        let message_type = match fields.next() {
            Some(text) => text.parse().ok()?,
            None => 0,
        };
        if fields.next().is_some() {
            return None;
        }
        Some(Self {
            channel: channel.index,
            first_sample,
            config: ChannelConfig {
                interval_code,
                description_index,
                units_index,
                message_type,
            },
        })
    }

    /// Field-for-field comparison against a channel configuration
    pub fn matches(&self, config: &ChannelConfig) -> bool {
        self.config == *config
    }
}

/// What a single file line holds
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineKind<'a> {
    /// Well-formed block header
    Header(SmsFileHeader),
    /// Header sigil but unparsable fields
    BadHeader,
    Footer(&'a [u8]),
    EventHeader(&'a [u8]),
    Totaliser(&'a [u8]),
    Values(&'a [u8]),
    Empty,
}

pub fn classify(line: &[u8]) -> LineKind<'_> {
    match line.first() {
        None => LineKind::Empty,
        Some(&HEADER_SIGIL) => match SmsFileHeader::parse(line) {
            Some(header) => LineKind::Header(header),
            None => LineKind::BadHeader,
        },
        Some(&FOOTER_SIGIL) => LineKind::Footer(line),
        Some(&EVENT_HEADER_SIGIL) => LineKind::EventHeader(line),
        Some(&TOTALISER_SIGIL) => LineKind::Totaliser(line),
        Some(_) => LineKind::Values(line),
    }
}

/// Split file contents into lines without terminators
pub fn lines(bytes: &[u8]) -> impl Iterator<Item = &[u8]> {
    bytes
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
}

/// Decode a run of value codes. Undecodable codes yield [`codec::NO_DATA`]
/// so sample positions stay aligned.
pub fn values(line: &[u8]) -> impl Iterator<Item = f32> + '_ {
    line.chunks_exact(VALUE_CODE_LEN)
        .map(|code| codec::decode_float(code).unwrap_or(codec::NO_DATA))
}
