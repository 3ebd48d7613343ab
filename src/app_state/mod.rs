//! Logger context: queues, writer, totalisers and the SMS job
//!
//! Everything the logging core mutates lives in one [`Logger`] owned by the
//! main loop. Producers call the `log_*` helpers (or [`Logger::enqueue`]
//! directly); the scheduler calls [`Logger::tick`] once per iteration.

mod sms;

pub use sms::*;

use log::{debug, info, warn};

use crate::channel::{ChannelCategory, ChannelId, MAX_DATA_CHANNELS, TRACKED_STREAMS};
use crate::codec::NO_DATA;
use crate::config::{self, ChannelConfig, ConfigError, LoggerConfig, MessageKind};
use crate::pdu::{self, PduMessage, SAMPLES_PER_MESSAGE, SingleStream};
use crate::retrieval::{RetrievalEngine, RetrievalError, RetrievalWindow};
use crate::storage::{LogStorage, StorageError};
use crate::telemetry::writer::DrainContext;
use crate::telemetry::{DataType, LogEntry, LogWriter, QueuePair, Step};
use crate::time::{ClockTime, Date, DateTime, DeviceStatus, EpochSecs, TimeBase};
use crate::totaliser::Totaliser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerRunState {
    Stopped,
    Logging,
}

/// Which streams have an open block or event run, and since which day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderState {
    blocks: [Option<Date>; TRACKED_STREAMS],
    event_runs: [Option<Date>; TRACKED_STREAMS],
}

impl Default for HeaderState {
    fn default() -> Self {
        Self {
            blocks: [None; TRACKED_STREAMS],
            event_runs: [None; TRACKED_STREAMS],
        }
    }
}

impl HeaderState {
    /// Day of the open block, `None` if no header has been emitted
    pub fn block_day(&self, channel: ChannelId) -> Option<Date> {
        self.blocks[channel.stream_slot()]
    }

    pub fn open_block(&mut self, channel: ChannelId, day: Date) {
        self.blocks[channel.stream_slot()] = Some(day);
    }

    pub fn close_block(&mut self, channel: ChannelId) {
        self.blocks[channel.stream_slot()] = None;
    }

    pub fn event_day(&self, channel: ChannelId) -> Option<Date> {
        self.event_runs[channel.stream_slot()]
    }

    pub fn open_event_run(&mut self, channel: ChannelId, day: Date) {
        self.event_runs[channel.stream_slot()] = Some(day);
    }

    /// Forget every stream sharing `channel`'s configuration slot
    pub fn clear_slot(&mut self, channel: ChannelId) {
        let categories: &[ChannelCategory] = match channel.category {
            ChannelCategory::ControlOutput => &[ChannelCategory::ControlOutput],
            _ => &[
                ChannelCategory::Normal,
                ChannelCategory::Sms,
                ChannelCategory::Derived,
                ChannelCategory::DerivedSms,
            ],
        };
        for &category in categories {
            let slot = channel.with_category(category).stream_slot();
            self.blocks[slot] = None;
            self.event_runs[slot] = None;
        }
    }
}

/// Main logging context
pub struct Logger<S, C, D> {
    pub run_state: LoggerRunState,
    storage: S,
    clock: C,
    status: D,
    config: LoggerConfig,
    queues: QueuePair,
    writer: LogWriter,
    headers: HeaderState,
    totalisers: [Totaliser; MAX_DATA_CHANNELS],
    sms_job: SmsJob,
    last_sms_error: Option<CommandError>,
    outbound: OutboundQueue,
}

impl<S, C, D> Logger<S, C, D>
where
    S: LogStorage,
    C: TimeBase,
    D: DeviceStatus,
{
    pub fn new(storage: S, clock: C, status: D, config: LoggerConfig) -> Self {
        Self {
            run_state: LoggerRunState::Stopped,
            storage,
            clock,
            status,
            config,
            queues: QueuePair::new(),
            writer: LogWriter::new(),
            headers: HeaderState::default(),
            totalisers: [Totaliser::default(); MAX_DATA_CHANNELS],
            sms_job: SmsJob::Idle,
            last_sms_error: None,
            outbound: OutboundQueue::new(),
        }
    }

    /// Build a logger from the stored configuration, falling back to defaults
    pub fn from_storage(mut storage: S, clock: C, status: D) -> Self {
        let config = match config::load_config(&mut storage) {
            Ok(Some(config)) => config,
            Ok(None) => LoggerConfig::default(),
            Err(e) => {
                warn!(" Failed to load config, using defaults: {:?}", e);
                LoggerConfig::default()
            }
        };
        Self::new(storage, clock, status, config)
    }

    pub fn save_config(&mut self) -> Result<(), ConfigError> {
        config::save_config(&mut self.storage, &self.config)?;
        info!(" Saved logger configuration");
        Ok(())
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut LoggerConfig {
        &mut self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn queues(&self) -> &QueuePair {
        &self.queues
    }

    pub fn headers(&self) -> &HeaderState {
        &self.headers
    }

    pub fn start_logging(&mut self) {
        info!(" Logging started");
        self.run_state = LoggerRunState::Logging;
    }

    pub fn stop_logging(&mut self) {
        info!(" Logging stopped");
        self.run_state = LoggerRunState::Stopped;
    }

    pub fn is_logging(&self) -> bool {
        self.run_state == LoggerRunState::Logging
    }

    /// Replace one stream's configuration. Its next sample starts a new block.
    pub fn configure_channel(
        &mut self,
        channel: ChannelId,
        config: ChannelConfig,
    ) -> Result<(), CommandError> {
        let slot = self
            .config
            .channel_mut(channel)
            .ok_or(CommandError::InvalidChannel)?;
        *slot = config;
        self.headers.clear_slot(channel);
        debug!(" Configured {}: {:?}", channel, config);
        Ok(())
    }

    /// Queue one entry. A block header timestamp is queued together with its
    /// params. Returns `false` when not logging or when the entry was dropped.
    pub fn enqueue(&mut self, channel: ChannelId, data_type: DataType, value: u32) -> bool {
        if data_type == DataType::BlockHeaderTimestamp {
            return self.queue_header(channel, value, false);
        }
        self.admit(&[LogEntry::new(channel, data_type, value)])
    }

    /// Queue a block header and its params, preceded by the footer of the
    /// open block when `close_open` is set. All of it is queued or none.
    fn queue_header(&mut self, channel: ChannelId, at: EpochSecs, close_open: bool) -> bool {
        let mut batch = heapless::Vec::<LogEntry, 3>::new();
        if close_open {
            let _ = batch.push(LogEntry::new(channel, DataType::BlockFooter, at));
        }
        let params = self.config.channel(channel).pack();
        let _ = batch.push(LogEntry::new(channel, DataType::BlockHeaderTimestamp, at));
        let _ = batch.push(LogEntry::new(channel, DataType::BlockHeaderParams, params));
        self.admit(&batch)
    }

    /// Push a batch of one stream's entries as a unit
    fn admit(&mut self, batch: &[LogEntry]) -> bool {
        let Some(first) = batch.first() else {
            return false;
        };
        if !self.is_logging() || !is_known(first.channel) {
            return false;
        }
        if self.queues.needs_forced_flush(batch.len()) {
            self.forced_flush();
        }
        self.queues.push_active(batch)
    }

    /// Drain the inactive queue as far as storage allows, then swap
    fn forced_flush(&mut self) {
        debug!(" Forced flush at {} entries", self.queues.active().len());
        while !self.queues.inactive().is_empty() {
            match self.drain_step() {
                Ok(Step::Pending) => {}
                Ok(Step::Done) => break,
                Err(e) => {
                    warn!(" Forced flush stopped: {:?}", e);
                    return;
                }
            }
        }
        self.queues.swap();
    }

    fn drain_step(&mut self) -> Result<Step, StorageError> {
        let today = self.clock.now().date;
        let mut ctx = DrainContext {
            storage: &mut self.storage,
            config: &self.config,
            status: &self.status,
            totalisers: &self.totalisers,
            today,
        };
        self.writer.step(self.queues.inactive_mut(), &mut ctx)
    }

    pub fn request_flush(&mut self) {
        self.queues.request_flush();
    }

    /// A flush is pending or a drain is in progress
    pub fn is_busy(&self) -> bool {
        self.queues.is_busy()
    }

    /// One scheduler iteration: start a pending flush, run one writer step,
    /// then advance the SMS job
    pub fn tick(&mut self) -> Step {
        if self.queues.flush_pending() && self.queues.inactive().is_empty() {
            self.queues.swap();
        }

        let writer = if self.queues.inactive().is_empty() {
            Step::Done
        } else {
            match self.drain_step() {
                Ok(step) => step,
                Err(StorageError::NotReady) => Step::Pending,
                Err(e) => {
                    warn!(" Log drain failed: {:?}", e);
                    Step::Pending
                }
            }
        };

        let sms = self.advance_sms_job();

        if writer == Step::Done && sms == Step::Done && !self.queues.is_busy() {
            Step::Done
        } else {
            Step::Pending
        }
    }

    /// Log one sample. A new block is started on the first sample after
    /// (re)configuration and at the first sample of each day. `None` records
    /// a missed sample.
    pub fn log_sample(&mut self, channel: ChannelId, value: Option<f32>) -> bool {
        if !self.is_logging() || !is_known(channel) {
            return false;
        }
        let now = self.clock.now();
        match self.headers.block_day(channel) {
            Some(day) if day == now.date => {}
            open => {
                if !self.queue_header(channel, now.epoch_secs(), open.is_some()) {
                    return false;
                }
                self.headers.open_block(channel, now.date);
            }
        }
        let value = value.unwrap_or(NO_DATA);
        self.enqueue(channel, DataType::Value, value.to_bits())
    }

    /// Close the stream's block with a footer
    pub fn close_block(&mut self, channel: ChannelId) -> bool {
        if !is_known(channel) || self.headers.block_day(channel).is_none() {
            return false;
        }
        let now = self.clock.now();
        let queued = self.enqueue(channel, DataType::BlockFooter, now.epoch_secs());
        if queued {
            self.headers.close_block(channel);
        }
        queued
    }

    /// Record an event (pulse, output change) at the current time
    pub fn log_event(&mut self, channel: ChannelId) -> bool {
        if !self.is_logging() || !is_known(channel) {
            return false;
        }
        let now = self.clock.now();
        if self.headers.event_day(channel) != Some(now.date) {
            if !self.enqueue(channel, DataType::EventHeader, now.epoch_secs()) {
                return false;
            }
            self.headers.open_event_run(channel, now.date);
        }
        self.enqueue(channel, DataType::EventTimestamp, now.secs_of_day() * 1000)
    }

    /// Queue a snapshot line of a slot's totaliser
    pub fn log_totaliser(&mut self, index: u8) -> bool {
        let now = self.clock.now();
        self.enqueue(
            ChannelId::normal(index),
            DataType::TotaliserTimestamp,
            now.epoch_secs(),
        )
    }

    pub fn add_to_totaliser(&mut self, index: u8, amount: f64) {
        if let Some(total) = self.totalisers.get_mut(index as usize) {
            total.add(amount);
        }
    }

    pub fn totaliser(&self, index: u8) -> Option<Totaliser> {
        self.totalisers.get(index as usize).copied()
    }

    pub fn reset_totaliser(&mut self, index: u8) {
        if let Some(total) = self.totalisers.get_mut(index as usize) {
            *total = Totaliser::default();
        }
    }

    /// Synchronous window retrieval over the stream's SMS files
    pub fn retrieve(
        &mut self,
        index: u8,
        end: DateTime,
        derived: bool,
    ) -> Result<RetrievalWindow, RetrievalError> {
        let current = self.config.channel(ChannelId::sms(index));
        RetrievalEngine::new(&mut self.storage).retrieve(index, end, derived, current)
    }

    /// Retrieve the window ending at `date`/`time` for channel `name` (`A1`,
    /// `D3`, ...) and build the SMS for it. The body type follows the
    /// message type recorded in the channel's file.
    pub fn retrieve_for_sms(
        &mut self,
        name: &str,
        derived: bool,
        date: Date,
        time: ClockTime,
    ) -> Result<PduMessage, CommandError> {
        let channel = ChannelId::parse(name, ChannelCategory::sms(derived))
            .filter(|c| c.category != ChannelCategory::ControlOutput)
            .ok_or(CommandError::InvalidChannel)?;
        let end = DateTime::from_epoch_secs(date.midnight() + time.0);
        self.build_sms(channel, end)
    }

    fn build_sms(&mut self, channel: ChannelId, end: DateTime) -> Result<PduMessage, CommandError> {
        let derived = channel.category.is_derived();
        let window = self.retrieve(channel.index, end, derived)?;
        let slot = channel.index as usize;
        let kind = MessageKind::from_code(window.config.message_type).unwrap_or(MessageKind::Single);

        let body = match kind {
            MessageKind::Single => pdu::encode_single(&SingleStream {
                channel,
                end: window.end,
                config: window.config,
                samples: &window.samples,
            })?,
            MessageKind::Totaliser => {
                let total = window.totaliser.unwrap_or(self.totalisers[slot]);
                pdu::encode_totaliser(
                    &SingleStream {
                        channel,
                        end: window.end,
                        config: window.config,
                        samples: &window.samples,
                    },
                    total,
                    self.config.volume_units[slot],
                )?
            }
            MessageKind::FlowPressure => {
                let pair = self.config.pressure_pair[slot];
                let pressure = match pair {
                    Some(pair) => match self.retrieve(pair, window.end, derived) {
                        Ok(w) => w.samples,
                        Err(RetrievalError::NoFile) => [NO_DATA; SAMPLES_PER_MESSAGE],
                        Err(e) => return Err(e.into()),
                    },
                    None => [NO_DATA; SAMPLES_PER_MESSAGE],
                };
                pdu::encode_flow_pressure(window.end, &window.samples, &pressure)?
            }
        };

        let message = PduMessage::new(&self.config.sms_destination, body)?;
        info!(" Built {:?} SMS for {} ending {}", kind, channel, window.end);
        Ok(message)
    }

    /// Schedule an SMS once pending log data has reached storage
    pub fn request_sms(&mut self, name: &str, derived: bool, end: DateTime) -> Result<(), CommandError> {
        if self.sms_job != SmsJob::Idle {
            return Err(CommandError::Busy);
        }
        let channel = ChannelId::parse(name, ChannelCategory::sms(derived))
            .filter(|c| c.category != ChannelCategory::ControlOutput)
            .ok_or(CommandError::InvalidChannel)?;
        self.sms_job = SmsJob::WaitingForStorage(SmsRequest { channel, end });
        self.request_flush();
        Ok(())
    }

    pub fn sms_job(&self) -> SmsJob {
        self.sms_job
    }

    /// Error of the most recent SMS job, if it failed
    pub fn last_sms_error(&self) -> Option<CommandError> {
        self.last_sms_error
    }

    fn advance_sms_job(&mut self) -> Step {
        let SmsJob::WaitingForStorage(request) = self.sms_job else {
            return Step::Done;
        };
        if self.queues.is_busy() || !self.outbound.is_empty() {
            return Step::Pending;
        }

        self.sms_job = SmsJob::Idle;
        let result = self.build_sms(request.channel, request.end).and_then(|message| {
            let outbound = OutboundMessage {
                destination: message.destination.clone(),
                hex: message.to_hex(),
            };
            self.outbound.try_send(outbound).map_err(|_| CommandError::Busy)
        });
        match result {
            Ok(()) => self.last_sms_error = None,
            Err(e) => {
                warn!(" SMS for {} failed: {:?} (code {})", request.channel, e, e.code());
                self.last_sms_error = Some(e);
            }
        }
        Step::Done
    }

    /// Next message for the transport
    pub fn next_outbound(&self) -> Option<OutboundMessage> {
        self.outbound.try_receive().ok()
    }

    /// Device reset: drop queued entries, open blocks and any pending SMS
    pub fn reset(&mut self) {
        warn!(" Logger reset, {} queued entries discarded", self.queues.active().len() + self.queues.inactive().len());
        self.queues.reset();
        self.writer.reset();
        self.headers = HeaderState::default();
        self.sms_job = SmsJob::Idle;
        self.last_sms_error = None;
        self.outbound.clear();
        self.run_state = LoggerRunState::Stopped;
    }
}

/// Index within its category's range; hand-built ids may not be
fn is_known(channel: ChannelId) -> bool {
    ChannelId::new(channel.category, channel.index).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FilePath, MemoryStorage};
    use crate::telemetry::queue::{DEFERRED_FLUSH_LEVEL, QUEUE_CAPACITY};
    use crate::time::{FixedStatus, ManualClock};

    const STATUS: FixedStatus = FixedStatus {
        battery_mv: 3700,
        csq: 18,
    };

    fn day() -> Date {
        Date::new(2026, 10, 16)
    }

    fn logger(clock: &ManualClock) -> Logger<MemoryStorage, &ManualClock, FixedStatus> {
        let mut config = LoggerConfig::default();
        config.set_destination("+447700900123").unwrap();
        let mut logger = Logger::new(MemoryStorage::new(), clock, STATUS, config);
        logger.start_logging();
        logger
    }

    fn run_until_idle<S: LogStorage, C: TimeBase, D: DeviceStatus>(logger: &mut Logger<S, C, D>) {
        for _ in 0..200 {
            if logger.tick() == Step::Done {
                return;
            }
        }
        panic!("logger never went idle");
    }

    #[test]
    fn test_enqueue_requires_logging() {
        let clock = ManualClock::new(DateTime::new(day(), 0, 0, 0));
        let mut logger = logger(&clock);
        logger.stop_logging();
        assert!(!logger.enqueue(ChannelId::sms(0), DataType::Value, 0));
        assert!(logger.queues().active().is_empty());
    }

    #[test]
    fn test_header_enqueues_params() {
        let clock = ManualClock::new(DateTime::new(day(), 0, 0, 0));
        let mut logger = logger(&clock);
        let cfg = ChannelConfig::new(6, 2, 3);
        logger.configure_channel(ChannelId::sms(1), cfg).unwrap();
        assert!(logger.enqueue(ChannelId::sms(1), DataType::BlockHeaderTimestamp, 42));

        let entries = logger.queues().active().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].data_type, DataType::BlockHeaderParams);
        assert_eq!(entries[1].payload, cfg.pack());
    }

    #[test]
    fn test_invalid_channel_rejected() {
        let clock = ManualClock::new(DateTime::new(day(), 0, 0, 0));
        let mut logger = logger(&clock);
        let bogus = ChannelId {
            category: ChannelCategory::ControlOutput,
            index: 9,
        };
        assert!(!logger.enqueue(bogus, DataType::Value, 0));
        assert_eq!(
            logger.configure_channel(bogus, ChannelConfig::default()),
            Err(CommandError::InvalidChannel)
        );
    }

    #[test]
    fn test_out_of_range_stream_is_refused() {
        let clock = ManualClock::new(DateTime::new(day(), 0, 0, 0));
        let mut logger = logger(&clock);
        let bogus = ChannelId::sms(60);
        assert!(!logger.log_sample(bogus, Some(1.0)));
        assert!(!logger.log_event(bogus));
        assert!(!logger.close_block(bogus));
        let output = ChannelId {
            category: ChannelCategory::ControlOutput,
            index: 4,
        };
        assert!(!logger.log_event(output));
        assert!(logger.queues().active().is_empty());
    }

    #[test]
    fn test_day_change_footer_dropped_with_its_header() {
        let clock = ManualClock::new(DateTime::new(day(), 23, 45, 0));
        let mut logger = logger(&clock);
        logger.storage_mut().set_ready(false);
        let ch = ChannelId::sms(0);
        let filler = ChannelId::normal(5);
        assert!(logger.log_sample(ch, Some(1.0)));

        // Leave room for exactly one entry while the first drain is stuck
        while logger.queues().inactive().is_empty()
            || logger.queues().active().len() < QUEUE_CAPACITY - 1
        {
            assert!(logger.enqueue(filler, DataType::Value, 0));
        }

        clock.advance(900);
        assert!(!logger.log_sample(ch, Some(2.0)));
        assert!(logger.queues().active().entries().iter().all(|e| e.channel != ch));
        assert_eq!(logger.headers().block_day(ch), Some(day()));

        logger.storage_mut().set_ready(true);
        logger.request_flush();
        run_until_idle(&mut logger);
        logger.request_flush();
        run_until_idle(&mut logger);

        clock.advance(900);
        assert!(logger.log_sample(ch, Some(3.0)));
        logger.request_flush();
        run_until_idle(&mut logger);

        let path = FilePath::log_file(ch, day()).unwrap();
        let file = logger.storage().file_bytes(&path).unwrap();
        let footers = crate::telemetry::format::lines(file)
            .filter(|line| line.first() == Some(&b'$'))
            .count();
        assert_eq!(footers, 1);
        let next = FilePath::log_file(ch, Date::new(2026, 10, 17)).unwrap();
        assert!(logger.storage().file_bytes(&next).is_some());
    }

    #[test]
    fn test_samples_reach_storage_after_tick() {
        let clock = ManualClock::new(DateTime::new(day(), 0, 0, 0));
        let mut logger = logger(&clock);
        let ch = ChannelId::sms(0);
        for v in [1.0, 2.0, 3.0] {
            assert!(logger.log_sample(ch, Some(v)));
            clock.advance(900);
        }
        assert!(logger.close_block(ch));
        assert!(!logger.is_busy());

        logger.request_flush();
        run_until_idle(&mut logger);

        let path = FilePath::log_file(ch, day()).unwrap();
        let text = logger.storage().file_bytes(&path).unwrap();
        assert!(text.starts_with(b"#A1,00:00:00,10,0,0\n"));
        assert!(text.ends_with(b",3700,18\n"));
    }

    #[test]
    fn test_day_change_starts_new_block() {
        let clock = ManualClock::new(DateTime::new(day(), 23, 45, 0));
        let mut logger = logger(&clock);
        let ch = ChannelId::sms(0);
        logger.log_sample(ch, Some(1.0));
        clock.advance(900);
        logger.log_sample(ch, None);

        let kinds: alloc::vec::Vec<DataType> = logger
            .queues()
            .active()
            .entries()
            .iter()
            .map(|e| e.data_type)
            .collect();
        assert_eq!(
            kinds,
            [
                DataType::BlockHeaderTimestamp,
                DataType::BlockHeaderParams,
                DataType::Value,
                DataType::BlockFooter,
                DataType::BlockHeaderTimestamp,
                DataType::BlockHeaderParams,
                DataType::Value,
            ]
        );
        assert_eq!(logger.headers().block_day(ch), Some(Date::new(2026, 10, 17)));
        let last = logger.queues().active().entries()[6];
        assert_eq!(last.as_f32(), NO_DATA);
    }

    #[test]
    fn test_configure_restarts_block() {
        let clock = ManualClock::new(DateTime::new(day(), 8, 0, 0));
        let mut logger = logger(&clock);
        logger.log_sample(ChannelId::sms(2), Some(1.0));
        assert!(logger.headers().block_day(ChannelId::sms(2)).is_some());
        logger
            .configure_channel(ChannelId::normal(2), ChannelConfig::new(9, 0, 0))
            .unwrap();
        assert!(logger.headers().block_day(ChannelId::sms(2)).is_none());
    }

    #[test]
    fn test_deferred_flush_requested_at_threshold() {
        let clock = ManualClock::new(DateTime::new(day(), 0, 0, 0));
        let mut logger = logger(&clock);
        let ch = ChannelId::normal(0);
        for _ in 0..DEFERRED_FLUSH_LEVEL - 1 {
            logger.enqueue(ch, DataType::Value, 0);
        }
        assert!(!logger.is_busy());
        logger.enqueue(ch, DataType::Value, 0);
        assert!(logger.is_busy());

        logger.tick();
        assert!(logger.queues().active().is_empty());
        assert!(logger.enqueue(ch, DataType::Value, 0));
        assert_eq!(logger.queues().active().len(), 1);
    }

    #[test]
    fn test_forced_flush_then_overflow_when_storage_missing() {
        let clock = ManualClock::new(DateTime::new(day(), 0, 0, 0));
        let mut logger = logger(&clock);
        logger.storage_mut().set_ready(false);
        let ch = ChannelId::normal(0);

        // First forced flush swaps into the empty inactive queue
        for _ in 0..126 {
            assert!(logger.enqueue(ch, DataType::Value, 0));
        }
        assert!(!logger.queues().inactive().is_empty());

        // The inactive queue cannot drain, so the active one fills and drops
        let mut accepted = 0;
        for _ in 0..QUEUE_CAPACITY + 4 {
            if logger.enqueue(ch, DataType::Value, 0) {
                accepted += 1;
            }
        }
        assert!(logger.queues().overflowed());
        assert!(logger.queues().active().len() <= QUEUE_CAPACITY);
        assert_eq!(accepted + logger.queues().lost(ch) as usize, QUEUE_CAPACITY + 4);
    }

    #[test]
    fn test_sms_job_waits_for_drain() {
        let clock = ManualClock::new(DateTime::new(day(), 0, 0, 0));
        let mut logger = logger(&clock);
        let ch = ChannelId::sms(0);
        for i in 0..8 {
            logger.log_sample(ch, Some(i as f32));
            clock.advance(900);
        }
        let end = DateTime::new(day(), 1, 45, 0);
        logger.request_sms("A1", false, end).unwrap();
        assert_eq!(logger.request_sms("A1", false, end), Err(CommandError::Busy));
        assert!(logger.is_busy());

        run_until_idle(&mut logger);
        assert_eq!(logger.sms_job(), SmsJob::Idle);
        assert_eq!(logger.last_sms_error(), None);
        let msg = logger.next_outbound().unwrap();
        assert!(msg.hex.starts_with("0011000C914477000910320004AA8C41"));
        assert!(logger.next_outbound().is_none());
    }

    #[test]
    fn test_retrieve_for_sms_errors() {
        let clock = ManualClock::new(DateTime::new(day(), 0, 0, 0));
        let mut logger = logger(&clock);
        assert_eq!(
            logger.retrieve_for_sms("Q7", false, day(), ClockTime(0)),
            Err(CommandError::InvalidChannel)
        );
        assert_eq!(
            logger.retrieve_for_sms("C1", false, day(), ClockTime(0)),
            Err(CommandError::InvalidChannel)
        );
        assert_eq!(
            logger.retrieve_for_sms("A1", false, day(), ClockTime(0)),
            Err(CommandError::NoData)
        );
    }

    #[test]
    fn test_totalisers() {
        let clock = ManualClock::new(DateTime::new(day(), 0, 0, 0));
        let mut logger = logger(&clock);
        logger.add_to_totaliser(8, 1.5);
        logger.add_to_totaliser(8, 2.25);
        logger.add_to_totaliser(99, 1.0);
        assert_eq!(logger.totaliser(8), Some(Totaliser(3750)));
        assert_eq!(logger.totaliser(99), None);
        assert!(logger.log_totaliser(8));
        logger.reset_totaliser(8);
        assert_eq!(logger.totaliser(8), Some(Totaliser(0)));
    }

    #[test]
    fn test_config_survives_restart() {
        let clock = ManualClock::new(DateTime::new(day(), 0, 0, 0));
        let mut logger = logger(&clock);
        logger
            .configure_channel(ChannelId::normal(4), ChannelConfig::new(8, 1, 1))
            .unwrap();
        logger.save_config().unwrap();

        let storage = core::mem::take(logger.storage_mut());
        let restored = Logger::from_storage(storage, &clock, STATUS);
        assert_eq!(restored.config(), logger.config());
        assert!(!restored.is_logging());
    }

    #[test]
    fn test_reset_discards_everything() {
        let clock = ManualClock::new(DateTime::new(day(), 0, 0, 0));
        let mut logger = logger(&clock);
        logger.log_sample(ChannelId::sms(0), Some(1.0));
        logger.log_event(ChannelId::normal(9));
        logger.request_sms("A1", false, DateTime::new(day(), 0, 0, 0)).unwrap();
        logger.reset();
        assert!(!logger.is_busy());
        assert!(!logger.is_logging());
        assert_eq!(logger.sms_job(), SmsJob::Idle);
        assert!(logger.headers().block_day(ChannelId::sms(0)).is_none());
    }
}
