//! Logging core of a battery-powered field data logger
//!
//! This crate contains the platform-agnostic part of the logger: the
//! double-buffered telemetry queue and the writer that drains it into daily
//! text files, the compact value and event codecs used in those files, the
//! fixed 140-byte SMS body encoders, and the engine that rebuilds the last
//! 96 samples of a stream from its files for an SMS summary.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod app_state;
pub mod channel;
pub mod codec;
pub mod config;
pub mod pdu;
pub mod retrieval;
pub mod storage;
pub mod telemetry;
pub mod time;
pub mod totaliser;
