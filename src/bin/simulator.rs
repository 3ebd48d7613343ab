//! Desktop simulator for the fieldlog logging core.
//!
//! Runs a logger against in-memory storage with a hand-driven clock, logs a
//! day and a half of synthetic samples on a few channels, then asks for an
//! SMS summary of each and decodes the bodies that come out.
//!
//! Set `RUST_LOG=debug` to watch the queue swaps and drains.

use log::{info, warn};

use fieldlog::app_state::Logger;
use fieldlog::channel::ChannelId;
use fieldlog::codec::NO_DATA;
use fieldlog::config::{ChannelConfig, LoggerConfig};
use fieldlog::pdu::{BODY_LEN, DecodedBody, decode_body};
use fieldlog::storage::MemoryStorage;
use fieldlog::telemetry::Step;
use fieldlog::time::{Date, DateTime, FixedStatus, ManualClock};

// ---------------------------------------------------------------------------
// Scenario constants
// ---------------------------------------------------------------------------

/// Interval code 10 is 15 minutes
const INTERVAL_CODE: u8 = 10;
const INTERVAL_SECS: u32 = 900;

/// Samples logged before the summaries are requested
const SAMPLE_COUNT: u32 = 144;

/// Level stream, Type A summary
const LEVEL: u8 = 0;
/// Flow stream with a totaliser, Type B summary
const FLOW: u8 = 1;
/// Pressure stream paired with `FLOW_PAIRED` for Type C
const PRESSURE: u8 = 2;
const FLOW_PAIRED: u8 = 3;

const DESTINATION: &str = "+447700900123";

/// Upper bound on scheduler iterations spent waiting for one SMS
const MAX_TICKS: usize = 1000;

// ---------------------------------------------------------------------------
// Mock data generation
// ---------------------------------------------------------------------------

/// Synthetic reading for `channel` at sample `n`. A short outage on the
/// level sensor shows up as missing samples.
fn mock_reading(channel: u8, n: u32) -> Option<f32> {
    let phase = (n % 96) as f32 / 96.0;
    let tri = if phase < 0.5 { phase * 2.0 } else { 2.0 - phase * 2.0 };
    match channel {
        LEVEL if (40..44).contains(&n) => None,
        LEVEL => Some(1.25 + tri * 0.8),
        FLOW | FLOW_PAIRED => Some(12.0 + tri * 30.0),
        PRESSURE => Some(2.5 + tri * 1.5),
        _ => None,
    }
}

fn build_config() -> LoggerConfig {
    let mut config = LoggerConfig::default();
    if let Err(e) = config.set_destination(DESTINATION) {
        warn!("Bad destination {}: {}", DESTINATION, e);
    }
    config.channels[LEVEL as usize] = ChannelConfig::new(INTERVAL_CODE, 1, 2);
    config.channels[FLOW as usize] = ChannelConfig::new(INTERVAL_CODE, 3, 4).with_message_type(2);
    config.channels[PRESSURE as usize] = ChannelConfig::new(INTERVAL_CODE, 5, 6);
    config.channels[FLOW_PAIRED as usize] =
        ChannelConfig::new(INTERVAL_CODE, 3, 4).with_message_type(3);
    config.totaliser_enabled[FLOW as usize] = true;
    config.volume_units[FLOW as usize] = 2;
    config.pressure_pair[FLOW_PAIRED as usize] = Some(PRESSURE);
    config
}

fn describe(name: &str, body: &[u8]) {
    match decode_body(body) {
        Ok(DecodedBody::Single { samples, .. }) => {
            let missing = samples.iter().filter(|&&s| s == NO_DATA).count();
            info!("{}: Type A, {} samples, {} missing", name, samples.len(), missing);
        }
        Ok(DecodedBody::Totaliser {
            total_hundredths,
            volume_units,
            ..
        }) => {
            info!(
                "{}: Type B, totaliser {}.{:02} (units {})",
                name,
                total_hundredths / 100,
                total_hundredths % 100,
                volume_units
            );
        }
        Ok(DecodedBody::FlowPressure {
            flow_range,
            pressure_range,
            ..
        }) => {
            info!(
                "{}: Type C, flow {:?}, pressure {:?}",
                name, flow_range, pressure_range
            );
        }
        Err(e) => warn!("{}: body did not decode: {}", name, e),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let start = DateTime::new(Date::new(2026, 10, 15), 0, 0, 0);
    let clock = ManualClock::new(start);
    let status = FixedStatus {
        battery_mv: 3650,
        csq: 21,
    };
    let mut logger = Logger::new(MemoryStorage::new(), &clock, status, build_config());
    logger.start_logging();

    for n in 0..SAMPLE_COUNT {
        for channel in [LEVEL, FLOW, PRESSURE, FLOW_PAIRED] {
            let id = ChannelId::sms(channel);
            logger.log_sample(id, mock_reading(channel, n));
            if let Some(value) = mock_reading(channel, n).filter(|_| channel == FLOW) {
                logger.add_to_totaliser(channel, value as f64 * INTERVAL_SECS as f64 / 3600.0);
            }
        }
        logger.tick();
        clock.advance(INTERVAL_SECS);
    }
    for channel in [LEVEL, FLOW, PRESSURE, FLOW_PAIRED] {
        logger.close_block(ChannelId::sms(channel));
    }

    let end = DateTime::from_epoch_secs(start.epoch_secs() + (SAMPLE_COUNT - 1) * INTERVAL_SECS);
    for name in ["A1", "A2", "A4"] {
        if let Err(e) = logger.request_sms(name, false, end) {
            warn!("{}: request refused, code {}", name, e.code());
            continue;
        }

        let mut ticks = 0;
        while logger.tick() == Step::Pending && ticks < MAX_TICKS {
            ticks += 1;
        }
        if let Some(e) = logger.last_sms_error() {
            warn!("{}: SMS failed, code {}", name, e.code());
            continue;
        }

        while let Some(message) = logger.next_outbound() {
            info!("{}: {} hex chars to {}", name, message.hex.len(), message.destination);
            let Ok(bytes) = hex::decode(&message.hex) else {
                warn!("{}: outbound hex did not decode", name);
                continue;
            };
            // The body is the last BODY_LEN bytes
            let Some(body) = bytes.len().checked_sub(BODY_LEN).map(|start| &bytes[start..]) else {
                warn!("{}: message shorter than a body", name);
                continue;
            };
            describe(name, body);
        }
    }

    let queues = logger.queues();
    info!(
        "Done. Overflow: {}, files written: {}",
        queues.overflowed(),
        logger.storage().write_count()
    );
}
