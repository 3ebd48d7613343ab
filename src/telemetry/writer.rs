//! Drains the inactive queue into per-channel daily files
//!
//! Each [`LogWriter::step`] handles every queued entry of one channel, in
//! [`ActivityMasks::next_pending`] order. Text is staged in a fixed working
//! buffer and appended to the file when the buffer would overflow, when the
//! target file changes, and at the end of the step.
//!
//! The writer remembers how many of the channel's entries have reached the
//! medium. When an append fails, the next step for that channel resumes
//! after the last committed entry instead of writing them twice.
//!
//! [`ActivityMasks::next_pending`]: super::ActivityMasks::next_pending

use log::{debug, warn};

use super::format::{self, Extreme, FooterLine, EVENTS_PER_LINE, VALUES_PER_LINE};
use super::{DataType, LogEntry, LogQueue, Step};
use crate::channel::{ChannelId, MAX_DATA_CHANNELS, TRACKED_STREAMS};
use crate::codec;
use crate::config::{ChannelConfig, LoggerConfig};
use crate::storage::{FilePath, LogStorage, StorageError};
use crate::time::{Date, DateTime, DeviceStatus, EpochSecs, SECS_PER_DAY, interval_secs};
use crate::totaliser::Totaliser;

/// Size of the staging buffer between the queue and the file
pub const WORK_BUFFER_SIZE: usize = 512;

/// Interval assumed when a header carries an unknown interval code
const FALLBACK_INTERVAL: u32 = 900;

/// Everything a drain step reads besides the queue
pub struct DrainContext<'a, S, D> {
    pub storage: &'a mut S,
    pub config: &'a LoggerConfig,
    pub status: &'a D,
    pub totalisers: &'a [Totaliser; MAX_DATA_CHANNELS],
    /// File date for entries that arrive before any header
    pub today: Date,
}

/// Per-stream state carried between drains
#[derive(Debug, Clone, Copy, Default)]
struct ChannelTrack {
    /// Epoch seconds of the first sample of the open block
    block_start: EpochSecs,
    interval: u32,
    /// Samples written since the header
    samples: u32,
    codes_on_line: u8,
    events_on_line: u8,
    min: Option<Extreme>,
    max: Option<Extreme>,
    /// Date of the file the stream is currently writing
    day: Option<Date>,
}

impl ChannelTrack {
    fn record(&mut self, value: f32, at: EpochSecs) {
        if value.is_nan() || value == codec::NO_DATA {
            return;
        }
        let extreme = Extreme {
            value,
            secs_of_day: at % SECS_PER_DAY,
        };
        if self.min.is_none_or(|m| value < m.value) {
            self.min = Some(extreme);
        }
        if self.max.is_none_or(|m| value > m.value) {
            self.max = Some(extreme);
        }
    }

    fn line_open(&self) -> bool {
        self.codes_on_line > 0 || self.events_on_line > 0
    }
}

/// How far into one channel's queued entries the writer has got
#[derive(Debug, Clone, Copy, Default)]
struct Progress {
    /// Channel entries handled, header params included
    entries: usize,
    /// Stream state after those entries
    track: ChannelTrack,
}

pub struct LogWriter {
    tracks: [ChannelTrack; TRACKED_STREAMS],
    work: heapless::Vec<u8, WORK_BUFFER_SIZE>,
    current: Option<FilePath>,
    /// Entries whose text is fully in `work` or already on the medium
    staged: Progress,
    /// Entries whose text is on the medium
    committed: Progress,
    /// Channel interrupted by a failed append and where to pick it up
    resume: Option<(ChannelId, usize)>,
}

impl Default for LogWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl LogWriter {
    pub fn new() -> Self {
        Self {
            tracks: [ChannelTrack::default(); TRACKED_STREAMS],
            work: heapless::Vec::new(),
            current: None,
            staged: Progress::default(),
            committed: Progress::default(),
            resume: None,
        }
    }

    /// Forget every open block (device reset)
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Drain one channel from `queue`.
    ///
    /// Returns `Done` once the queue is empty. On error the channel's
    /// entries stay queued and the next step resumes after the last one
    /// that reached the medium.
    pub fn step<S, D>(
        &mut self,
        queue: &mut LogQueue,
        ctx: &mut DrainContext<'_, S, D>,
    ) -> Result<Step, StorageError>
    where
        S: LogStorage,
        D: DeviceStatus,
    {
        let Some(channel) = queue.masks().next_pending() else {
            queue.clear();
            return Ok(Step::Done);
        };
        if !ctx.storage.is_ready() {
            debug!(" Storage not ready, postponing drain of {}", channel);
            return Err(StorageError::NotReady);
        }

        self.work.clear();
        self.current = None;

        let slot = channel.stream_slot();
        let skip = match self.resume {
            Some((resumed, done)) if resumed == channel => done,
            _ => 0,
        };
        let mut track = self.tracks[slot];
        self.committed = Progress {
            entries: skip,
            track,
        };
        self.staged = self.committed;

        let result = self
            .drain_channel(queue.entries(), channel, skip, &mut track, ctx)
            .and_then(|()| self.flush(ctx.storage));
        self.work.clear();

        if let Err(e) = result {
            warn!(
                " Drain of {} failed after {} entries, will retry: {:?}",
                channel, self.committed.entries, e
            );
            self.tracks[slot] = self.committed.track;
            self.resume = Some((channel, self.committed.entries));
            return Err(e);
        }

        self.tracks[slot] = track;
        self.resume = None;
        queue.mark_drained(channel);

        if queue.masks().is_empty() {
            debug!(" Drain complete, {} entries written", queue.len());
            queue.clear();
            Ok(Step::Done)
        } else {
            Ok(Step::Pending)
        }
    }

    fn drain_channel<S, D>(
        &mut self,
        entries: &[LogEntry],
        channel: ChannelId,
        skip: usize,
        track: &mut ChannelTrack,
        ctx: &mut DrainContext<'_, S, D>,
    ) -> Result<(), StorageError>
    where
        S: LogStorage,
        D: DeviceStatus,
    {
        let mut pending = entries
            .iter()
            .filter(|e| e.channel == channel)
            .skip(skip)
            .peekable();
        let mut handled = skip;

        while let Some(entry) = pending.next() {
            handled += 1;
            match entry.data_type {
                DataType::Value => {
                    let path = FilePath::log_file(channel, track.day.unwrap_or(ctx.today))?;
                    let value = entry.as_f32();
                    let at = track.block_start + track.samples * track.interval;
                    track.record(value, at);
                    track.samples += 1;
                    track.codes_on_line += 1;
                    let ends_line = track.codes_on_line >= VALUES_PER_LINE;
                    if ends_line {
                        track.codes_on_line = 0;
                    }
                    let code = codec::encode_float(value);
                    self.emit(ctx.storage, &path, &line_piece(&code, ends_line))?;
                }
                DataType::BlockHeaderTimestamp => {
                    let params = match pending.peek() {
                        Some(next) if next.data_type == DataType::BlockHeaderParams => {
                            let packed = next.payload;
                            pending.next();
                            handled += 1;
                            ChannelConfig::unpack(packed)
                        }
                        _ => {
                            warn!(" Header of {} without params, using current config", channel);
                            ctx.config.channel(channel)
                        }
                    };
                    self.close_line(ctx.storage, channel, track)?;

                    let start = DateTime::from_epoch_secs(entry.payload);
                    track.day = Some(start.date);
                    track.block_start = entry.payload;
                    track.interval = interval_secs(params.interval_code).unwrap_or(FALLBACK_INTERVAL);
                    track.samples = 0;
                    track.min = None;
                    track.max = None;

                    let path = FilePath::log_file(channel, start.date)?;
                    let line = format::header_line(channel, start.secs_of_day(), &params);
                    self.emit(ctx.storage, &path, &line)?;
                }
                DataType::BlockHeaderParams => {
                    warn!(" Stray header params for {}", channel);
                }
                DataType::BlockFooter => {
                    self.close_line(ctx.storage, channel, track)?;
                    let date = track
                        .day
                        .unwrap_or_else(|| DateTime::from_epoch_secs(entry.payload).date);
                    let footer = FooterLine {
                        min: track.min.take(),
                        max: track.max.take(),
                        battery_mv: ctx.status.battery_millivolts(),
                        csq: ctx.status.signal_quality(),
                        totaliser: ctx
                            .config
                            .has_totaliser(channel)
                            .then(|| ctx.totalisers[channel.index as usize]),
                    };
                    let path = FilePath::log_file(channel, date)?;
                    self.emit(ctx.storage, &path, &footer.render(ctx.config.compress_footer))?;
                }
                DataType::EventHeader => {
                    self.close_line(ctx.storage, channel, track)?;
                    let start = DateTime::from_epoch_secs(entry.payload);
                    track.day = Some(start.date);
                    let path = FilePath::log_file(channel, start.date)?;
                    let line = format::event_header_line(channel, start.secs_of_day());
                    self.emit(ctx.storage, &path, &line)?;
                }
                DataType::EventTimestamp => {
                    let path = FilePath::log_file(channel, track.day.unwrap_or(ctx.today))?;
                    track.events_on_line += 1;
                    let ends_line = track.events_on_line >= EVENTS_PER_LINE;
                    if ends_line {
                        track.events_on_line = 0;
                    }
                    let code = codec::encode_event_timestamp(entry.payload);
                    self.emit(ctx.storage, &path, &line_piece(&code, ends_line))?;
                }
                DataType::TotaliserTimestamp => {
                    self.close_line(ctx.storage, channel, track)?;
                    let at = DateTime::from_epoch_secs(entry.payload);
                    let total = ctx
                        .totalisers
                        .get(channel.index as usize)
                        .copied()
                        .unwrap_or_default();
                    let path = FilePath::log_file(channel, at.date)?;
                    let line = format::totaliser_line(at.secs_of_day() * 1000, total);
                    self.emit(ctx.storage, &path, &line)?;
                }
            }
            self.staged = Progress {
                entries: handled,
                track: *track,
            };
        }
        Ok(())
    }

    /// Terminate a partly filled value or event line in the stream's current file
    fn close_line<S: LogStorage>(
        &mut self,
        storage: &mut S,
        channel: ChannelId,
        track: &mut ChannelTrack,
    ) -> Result<(), StorageError> {
        if let (true, Some(day)) = (track.line_open(), track.day) {
            self.emit(storage, &FilePath::log_file(channel, day)?, b"\n")?;
            // Once the break is staged a resumed drain must not repeat it
            self.staged.track.codes_on_line = 0;
            self.staged.track.events_on_line = 0;
        }
        track.codes_on_line = 0;
        track.events_on_line = 0;
        Ok(())
    }

    fn emit<S: LogStorage>(
        &mut self,
        storage: &mut S,
        path: &FilePath,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        if self.current.as_ref() != Some(path) {
            self.flush(storage)?;
            self.current = Some(path.clone());
        }
        if self.work.len() + bytes.len() > WORK_BUFFER_SIZE {
            self.flush(storage)?;
        }
        // Fragments are far smaller than the buffer, which is now known to have room
        let _ = self.work.extend_from_slice(bytes);
        Ok(())
    }

    fn flush<S: LogStorage>(&mut self, storage: &mut S) -> Result<(), StorageError> {
        let Some(path) = &self.current else {
            return Ok(());
        };
        if self.work.is_empty() {
            return Ok(());
        }
        storage.append(path, &self.work)?;
        debug!(" Appended {} bytes to {}", self.work.len(), path);
        self.work.clear();
        self.committed = self.staged;
        Ok(())
    }
}

/// A value or event code, with the line break when it fills its line
fn line_piece(code: &[u8], ends_line: bool) -> heapless::Vec<u8, 8> {
    let mut piece = heapless::Vec::new();
    let _ = piece.extend_from_slice(code);
    if ends_line {
        let _ = piece.push(b'\n');
    }
    piece
}
