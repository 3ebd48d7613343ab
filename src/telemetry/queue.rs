//! Double-buffered producer queue
//!
//! Producers append to the active [`LogQueue`]; the writer drains the
//! inactive one. The two swap roles only when the inactive queue has been
//! fully drained, so a queue is never touched by both roles at once.

use log::{debug, warn};

use super::LogEntry;
use crate::channel::{ChannelCategory, ChannelId, TRACKED_STREAMS};

/// Entries per queue instance
pub const QUEUE_CAPACITY: usize = 128;

/// Reaching this length requests a flush on the next scheduler tick
pub const DEFERRED_FLUSH_LEVEL: usize = QUEUE_CAPACITY - 32;

/// Reaching this length forces a flush before the entry is admitted
pub const FORCED_FLUSH_LEVEL: usize = QUEUE_CAPACITY - 2;

/// Which channels have entries waiting in a queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityMasks {
    pub normal: u16,
    pub sms: u16,
    pub derived: u16,
    pub derived_sms: u16,
    pub control: u8,
}

impl ActivityMasks {
    pub fn mask(&self, category: ChannelCategory) -> u16 {
        match category {
            ChannelCategory::Normal => self.normal,
            ChannelCategory::Sms => self.sms,
            ChannelCategory::Derived => self.derived,
            ChannelCategory::DerivedSms => self.derived_sms,
            ChannelCategory::ControlOutput => self.control as u16,
        }
    }

    pub fn set(&mut self, channel: ChannelId) {
        let bit = channel.mask_bit();
        match channel.category {
            ChannelCategory::Normal => self.normal |= bit,
            ChannelCategory::Sms => self.sms |= bit,
            ChannelCategory::Derived => self.derived |= bit,
            ChannelCategory::DerivedSms => self.derived_sms |= bit,
            ChannelCategory::ControlOutput => self.control |= bit as u8,
        }
    }

    pub fn clear(&mut self, channel: ChannelId) {
        let bit = !channel.mask_bit();
        match channel.category {
            ChannelCategory::Normal => self.normal &= bit,
            ChannelCategory::Sms => self.sms &= bit,
            ChannelCategory::Derived => self.derived &= bit,
            ChannelCategory::DerivedSms => self.derived_sms &= bit,
            ChannelCategory::ControlOutput => self.control &= bit as u8,
        }
    }

    pub fn is_set(&self, channel: ChannelId) -> bool {
        self.mask(channel.category) & channel.mask_bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// First pending channel in writer rotation order: every normal channel,
    /// then SMS, derived, derived SMS, and finally control outputs
    pub fn next_pending(&self) -> Option<ChannelId> {
        ChannelCategory::ROTATION.iter().find_map(|&category| {
            let mask = self.mask(category);
            (mask != 0).then(|| ChannelId {
                category,
                index: mask.trailing_zeros() as u8,
            })
        })
    }
}

/// One bounded buffer of producer entries
#[derive(Debug, Default)]
pub struct LogQueue {
    entries: heapless::Vec<LogEntry, QUEUE_CAPACITY>,
    masks: ActivityMasks,
}

impl LogQueue {
    pub const fn new() -> Self {
        Self {
            entries: heapless::Vec::new(),
            masks: ActivityMasks {
                normal: 0,
                sms: 0,
                derived: 0,
                derived_sms: 0,
                control: 0,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn masks(&self) -> &ActivityMasks {
        &self.masks
    }

    /// Mark a channel as fully drained
    pub fn mark_drained(&mut self, channel: ChannelId) {
        self.masks.clear(channel);
    }

    /// Append all of `batch` or none of it
    fn push_all(&mut self, batch: &[LogEntry]) -> bool {
        if self.entries.len() + batch.len() > QUEUE_CAPACITY {
            return false;
        }
        for entry in batch {
            // Capacity was checked above
            let _ = self.entries.push(*entry);
            self.masks.set(entry.channel);
        }
        true
    }

    /// Reset to length zero once every channel has been drained
    pub fn clear(&mut self) {
        self.entries.clear();
        self.masks = ActivityMasks::default();
    }
}

/// The two queue instances plus flush and overflow bookkeeping
#[derive(Debug)]
pub struct QueuePair {
    queues: [LogQueue; 2],
    active: usize,
    flush_pending: bool,
    overflow: bool,
    lost: [u16; TRACKED_STREAMS],
}

impl Default for QueuePair {
    fn default() -> Self {
        Self::new()
    }
}

impl QueuePair {
    pub const fn new() -> Self {
        Self {
            queues: [LogQueue::new(), LogQueue::new()],
            active: 0,
            flush_pending: false,
            overflow: false,
            lost: [0; TRACKED_STREAMS],
        }
    }

    pub fn active(&self) -> &LogQueue {
        &self.queues[self.active]
    }

    pub fn inactive(&self) -> &LogQueue {
        &self.queues[1 - self.active]
    }

    pub fn inactive_mut(&mut self) -> &mut LogQueue {
        &mut self.queues[1 - self.active]
    }

    /// Append a batch (a single entry, or a header timestamp/params pair) to
    /// the active queue. A batch that does not fit is dropped and recorded.
    pub fn push_active(&mut self, batch: &[LogEntry]) -> bool {
        if self.queues[self.active].push_all(batch) {
            if self.active().len() >= DEFERRED_FLUSH_LEVEL && !self.flush_pending {
                debug!(" Queue at {} entries, flush requested", self.active().len());
                self.flush_pending = true;
            }
            return true;
        }

        self.overflow = true;
        if let Some(first) = batch.first() {
            let slot = first.channel.stream_slot();
            self.lost[slot] = self.lost[slot].saturating_add(batch.len() as u16);
            warn!(" Log queue overflow, dropped {} entries for {}", batch.len(), first.channel);
        }
        false
    }

    /// Whether a batch of `needed` entries reaches the forced flush level
    pub fn needs_forced_flush(&self, needed: usize) -> bool {
        self.active().len() + needed >= FORCED_FLUSH_LEVEL
    }

    pub fn request_flush(&mut self) {
        self.flush_pending = true;
    }

    pub fn flush_pending(&self) -> bool {
        self.flush_pending
    }

    /// A flush is pending or the previous drain has not finished
    pub fn is_busy(&self) -> bool {
        self.flush_pending || !self.inactive().is_empty()
    }

    /// Hand the active queue to the writer. Only possible once the previous
    /// drain has finished; swapping an empty active queue just clears the
    /// pending request. Returns whether a swap happened.
    pub fn swap(&mut self) -> bool {
        if !self.inactive().is_empty() {
            return false;
        }
        self.flush_pending = false;
        if self.active().is_empty() {
            return false;
        }
        self.active = 1 - self.active;
        debug!(" Swapped log queues, {} entries to drain", self.inactive().len());
        true
    }

    pub fn overflowed(&self) -> bool {
        self.overflow
    }

    pub fn clear_overflow(&mut self) {
        self.overflow = false;
    }

    /// Entries dropped for one stream since start-up
    pub fn lost(&self, channel: ChannelId) -> u16 {
        self.lost[channel.stream_slot()]
    }

    /// Discard both queues (device reset)
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::DataType;

    fn value(index: u8) -> LogEntry {
        LogEntry::value(ChannelId::normal(index), 1.0)
    }

    #[test]
    fn test_masks_rotation_order() {
        let mut masks = ActivityMasks::default();
        masks.set(ChannelId::new(ChannelCategory::ControlOutput, 1).unwrap());
        masks.set(ChannelId::sms(4));
        masks.set(ChannelId::new(ChannelCategory::Derived, 0).unwrap());
        masks.set(ChannelId::normal(9));

        let mut order = alloc::vec::Vec::new();
        while let Some(ch) = masks.next_pending() {
            order.push(ch);
            masks.clear(ch);
        }
        assert_eq!(
            order,
            [
                ChannelId::normal(9),
                ChannelId::sms(4),
                ChannelId::new(ChannelCategory::Derived, 0).unwrap(),
                ChannelId::new(ChannelCategory::ControlOutput, 1).unwrap(),
            ]
        );
        assert!(masks.is_empty());
    }

    #[test]
    fn test_deferred_flush_threshold() {
        let mut pair = QueuePair::new();
        for _ in 0..DEFERRED_FLUSH_LEVEL - 1 {
            assert!(pair.push_active(&[value(0)]));
        }
        assert!(!pair.flush_pending());
        assert!(pair.push_active(&[value(0)]));
        assert!(pair.flush_pending());
        assert!(pair.is_busy());
    }

    #[test]
    fn test_overflow_drops_and_records() {
        let mut pair = QueuePair::new();
        for _ in 0..QUEUE_CAPACITY {
            assert!(pair.push_active(&[value(2)]));
        }
        assert!(!pair.overflowed());
        assert!(!pair.push_active(&[value(2)]));
        assert!(pair.overflowed());
        assert_eq!(pair.active().len(), QUEUE_CAPACITY);
        assert_eq!(pair.lost(ChannelId::normal(2)), 1);
        assert_eq!(pair.lost(ChannelId::normal(3)), 0);
    }

    #[test]
    fn test_pair_is_admitted_atomically() {
        let mut pair = QueuePair::new();
        for _ in 0..QUEUE_CAPACITY - 1 {
            pair.push_active(&[value(0)]);
        }
        let ch = ChannelId::sms(0);
        let header = [
            LogEntry::new(ch, DataType::BlockHeaderTimestamp, 0),
            LogEntry::new(ch, DataType::BlockHeaderParams, 0),
        ];
        assert!(!pair.push_active(&header));
        assert_eq!(pair.active().len(), QUEUE_CAPACITY - 1);
        assert_eq!(pair.lost(ch), 2);
    }

    #[test]
    fn test_swap_requires_drained_inactive() {
        let mut pair = QueuePair::new();
        pair.push_active(&[value(1)]);
        assert!(pair.swap());
        assert_eq!(pair.inactive().len(), 1);
        assert!(pair.active().is_empty());

        pair.push_active(&[value(1)]);
        pair.request_flush();
        assert!(!pair.swap());
        assert!(pair.flush_pending());

        pair.inactive_mut().clear();
        assert!(pair.swap());
        assert!(!pair.flush_pending());
    }

    #[test]
    fn test_swap_of_empty_queue_is_noop() {
        let mut pair = QueuePair::new();
        pair.request_flush();
        assert!(!pair.swap());
        assert!(!pair.flush_pending());
        assert!(!pair.is_busy());
        assert!(pair.active().is_empty() && pair.inactive().is_empty());
    }
}
