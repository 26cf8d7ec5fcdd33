//! Event broadcasting
//!
//! Classified events leave the process through a [`Broadcaster`], which
//! rate-limits and forwards them to a [`BroadcastSink`]:
//!
//! - [`RealtimeSink`] posts to a realtime broadcast channel over HTTP
//! - [`StdoutSink`] prints JSON lines, used when no channel is configured
//! - [`MemorySink`] keeps events in memory

mod broadcaster;
mod realtime;
mod sink;

pub use broadcaster::{BroadcastStats, Broadcaster, PublishOutcome};
pub use realtime::RealtimeSink;
pub use sink::{BroadcastSink, MemorySink, StdoutSink};

use crate::config::BroadcastConfig;
use crate::error::Result;

/// Build the sink described by `config`.
///
/// Returns a [`RealtimeSink`] when broadcasting is enabled and configured,
/// otherwise a [`StdoutSink`].
pub fn sink_from_config(config: &BroadcastConfig) -> Result<Box<dyn BroadcastSink>> {
    if config.is_ready() {
        Ok(Box::new(RealtimeSink::new(config)?))
    } else {
        if config.enabled {
            tracing::warn!("Broadcast enabled but not fully configured, writing to stdout");
        }
        Ok(Box::new(StdoutSink))
    }
}
