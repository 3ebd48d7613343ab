//! Reconstruction of the last 96 fixed-interval samples of a channel
//!
//! The window ends at the requested time rounded down to the channel
//! interval. Slots after midnight come from today's SMS file and the rest
//! from yesterday's. Values are aligned to slot times using the block
//! headers in each file; anything that cannot be placed stays
//! [`NO_DATA`].

use log::{debug, info};
use thiserror_no_std::Error;

use crate::channel::{ChannelCategory, ChannelId};
use crate::codec::NO_DATA;
use crate::config::ChannelConfig;
use crate::pdu::SAMPLES_PER_MESSAGE;
use crate::storage::{FilePath, LogStorage, StorageError};
use crate::telemetry::format::{self, LineKind, SmsFileHeader};
use crate::time::{DateTime, SECS_PER_DAY, interval_secs};
use crate::totaliser::Totaliser;

use alloc::vec::Vec;

/// Slots in a retrieval window
pub const WINDOW_LEN: usize = SAMPLES_PER_MESSAGE;

/// Interval assumed for an unknown interval code
const FALLBACK_INTERVAL: u32 = 900;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetrievalError {
    #[error("No file for today or yesterday")]
    NoFile,
    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for RetrievalError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

/// A reconstructed window, oldest slot first
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalWindow {
    pub channel: ChannelId,
    /// Time of the last slot
    pub end: DateTime,
    /// Configuration the samples were matched against
    pub config: ChannelConfig,
    pub interval: u32,
    pub samples: [f32; WINDOW_LEN],
    /// Totaliser from the footer closing the window, today's preferred
    pub totaliser: Option<Totaliser>,
    /// Last header in today's file
    pub header: Option<SmsFileHeader>,
    pub found_today: bool,
    pub found_yesterday: bool,
}

impl RetrievalWindow {
    /// Slots holding a real sample
    pub fn filled(&self) -> usize {
        self.samples.iter().filter(|&&x| x != NO_DATA).count()
    }
}

/// One file's share of the window
struct Portion<'a> {
    /// Seconds of day of the first slot; negative slots fall before the file's day
    first_target: i64,
    interval: i64,
    slots: &'a mut [f32],
}

impl Portion<'_> {
    /// Place the values of `bytes` into the slots. Returns the totaliser of
    /// the first footer after the portion is full.
    fn fill(&mut self, bytes: &[u8], expected: &ChannelConfig) -> Option<Totaliser> {
        let count = self.slots.len();
        let mut slot = 0usize;
        let mut accepting = false;
        let mut sample_time = 0i64;

        for line in format::lines(bytes) {
            match format::classify(line) {
                LineKind::Header(header) => {
                    accepting = header.matches(expected);
                    sample_time = header.first_sample as i64;
                }
                LineKind::BadHeader => accepting = false,
                LineKind::Footer(footer) if slot >= count => {
                    return format::footer_totaliser(footer);
                }
                LineKind::Values(codes) if accepting && slot < count => {
                    for value in format::values(codes) {
                        slot = self.place(slot, sample_time, value);
                        sample_time += self.interval;
                        if slot >= count {
                            break;
                        }
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Put a value taken at `at` into the first slot it aligns with
    fn place(&mut self, mut slot: usize, at: i64, value: f32) -> usize {
        while slot < self.slots.len() {
            let target = self.first_target + slot as i64 * self.interval;
            if at >= target + self.interval {
                // Target missed; leave it empty
                slot += 1;
            } else if at <= target - self.interval {
                // Value older than the target
                return slot;
            } else {
                self.slots[slot] = value;
                return slot + 1;
            }
        }
        slot
    }
}

/// Reads SMS files back through a storage backend
pub struct RetrievalEngine<'a, S> {
    storage: &'a mut S,
}

impl<'a, S: LogStorage> RetrievalEngine<'a, S> {
    pub fn new(storage: &'a mut S) -> Self {
        Self { storage }
    }

    /// Rebuild the window of slot `index` ending at `end`.
    ///
    /// The last header in today's file decides which blocks count. Without
    /// one, `current` is assumed to have been in force yesterday too.
    pub fn retrieve(
        &mut self,
        index: u8,
        end: DateTime,
        derived: bool,
        current: ChannelConfig,
    ) -> Result<RetrievalWindow, RetrievalError> {
        let channel = ChannelId {
            category: ChannelCategory::sms(derived),
            index,
        };

        let mut today = Vec::new();
        let found_today = self
            .storage
            .read(&FilePath::log_file(channel, end.date)?, &mut today)?;

        let header = format::lines(&today)
            .filter_map(|line| match format::classify(line) {
                LineKind::Header(h) => Some(h),
                _ => None,
            })
            .last();
        let config = match header {
            Some(h) => h.config,
            None => {
                debug!(" No header for {} today, assuming current config", channel);
                current
            }
        };

        let interval = interval_secs(config.interval_code).unwrap_or(FALLBACK_INTERVAL);
        let end_sod = end.secs_of_day() - end.secs_of_day() % interval;
        let today_count = ((end_sod / interval) as usize + 1).min(WINDOW_LEN);
        let yesterday_count = WINDOW_LEN - today_count;

        let mut samples = [NO_DATA; WINDOW_LEN];
        let (older, newer) = samples.split_at_mut(yesterday_count);

        let mut today_portion = Portion {
            first_target: end_sod as i64 - (today_count as i64 - 1) * interval as i64,
            interval: interval as i64,
            slots: newer,
        };
        let mut totaliser = if found_today {
            today_portion.fill(&today, &config)
        } else {
            None
        };

        let mut found_yesterday = false;
        if yesterday_count > 0 {
            let mut yesterday = Vec::new();
            let path = FilePath::log_file(channel, end.date.previous())?;
            found_yesterday = self.storage.read(&path, &mut yesterday)?;
            if found_yesterday {
                let mut portion = Portion {
                    first_target: SECS_PER_DAY as i64 + end_sod as i64
                        - (WINDOW_LEN as i64 - 1) * interval as i64,
                    interval: interval as i64,
                    slots: older,
                };
                let closing = portion.fill(&yesterday, &config);
                totaliser = totaliser.or(closing);
            }
        }

        if !found_today && !found_yesterday {
            return Err(RetrievalError::NoFile);
        }

        let window = RetrievalWindow {
            channel,
            end: DateTime::from_epoch_secs(end.date.midnight() + end_sod),
            config,
            interval,
            samples,
            totaliser,
            header,
            found_today,
            found_yesterday,
        };
        info!(
            " Retrieved {} of {} samples for {} ending {}",
            window.filled(),
            WINDOW_LEN,
            channel,
            window.end
        );
        Ok(window)
    }
}
