//! Broadcast sink trait and local sinks

use crate::error::{Error, Result};
use crate::types::ActivityEvent;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;

/// Destination for published activity events
#[async_trait]
pub trait BroadcastSink: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Establish or verify connectivity.
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    /// Deliver one event.
    async fn publish(&self, event: &ActivityEvent) -> Result<()>;
}

/// Writes each event as one JSON line on stdout
#[derive(Debug, Default)]
pub struct StdoutSink;

#[async_trait]
impl BroadcastSink for StdoutSink {
    fn name(&self) -> &'static str {
        "stdout"
    }

    async fn publish(&self, event: &ActivityEvent) -> Result<()> {
        let line = serde_json::to_string(event)?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", line)?;
        stdout.flush().map_err(Error::from)
    }
}

/// Keeps published events in memory.
///
/// Clones share the same buffer, so one clone can be handed to a
/// [`Broadcaster`](super::Broadcaster) while another inspects what was sent.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<ActivityEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event published so far
    pub fn events(&self) -> Vec<ActivityEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[async_trait]
impl BroadcastSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn publish(&self, event: &ActivityEvent) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
