//! Multiplexed output streams
//!
//! A [`Broadcaster`] fans one byte stream out to a dynamic set of sinks;
//! a [`RegexScanner`] is a sink that turns the stream into discrete
//! regex-match events, safe across chunk boundaries.

mod broadcast;
mod matcher;

pub use broadcast::{Broadcaster, CaptureSink, Sink, SinkId, StderrSink};
pub use matcher::{Captures, RegexScanner, DEFAULT_GUARANTEE_SIZE};
