//! Rate-limited event publishing
//!
//! The [`Broadcaster`] sits between the event producers (tailers, sweeper,
//! summary task) and a [`BroadcastSink`]. Events arriving too soon after the
//! previous send attempt are dropped, never queued, so a burst of transcript
//! activity cannot flood the downstream channel.
//!
//! Events that must not be lost (idle transitions, summaries) go through
//! [`Broadcaster::publish_paced`], which reserves the next free slot and
//! waits for it instead of dropping.
//!
//! Timestamps are assigned while the slot is taken, so any two attempts carry
//! timestamps at least `min_interval` apart.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::types::ActivityEvent;

use super::sink::BroadcastSink;

/// What happened to a published event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Delivered to the sink
    Sent,
    /// Discarded by the rate limiter
    Dropped,
    /// The sink returned an error
    Failed,
}

/// Publishing statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastStats {
    /// Events delivered successfully
    pub sent: usize,
    /// Events discarded by the rate limiter
    pub dropped: usize,
    /// Events the sink failed to deliver
    pub failed: usize,
}

/// A taken send slot
#[derive(Debug, Clone, Copy)]
struct Slot {
    /// When the send may start
    at: Instant,
    /// Wall-clock timestamp given to the event
    stamped: DateTime<Utc>,
}

/// Publishes events to a sink, at most one per `min_interval`
pub struct Broadcaster {
    sink: Box<dyn BroadcastSink>,
    min_interval: Duration,
    /// The most recently taken slot
    last_attempt: Mutex<Option<Slot>>,
    online: AtomicBool,
    sent: AtomicUsize,
    dropped: AtomicUsize,
    failed: AtomicUsize,
}

impl Broadcaster {
    pub fn new(sink: Box<dyn BroadcastSink>, min_interval: Duration) -> Self {
        Self {
            sink,
            min_interval,
            last_attempt: Mutex::new(None),
            online: AtomicBool::new(false),
            sent: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// Name of the underlying sink
    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Publish one event, or drop it if the previous attempt was less than
    /// `min_interval` ago.
    ///
    /// Failures are logged and counted; they are never retried.
    pub async fn publish(&self, event: ActivityEvent) -> PublishOutcome {
        let Some(stamped) = self.try_acquire_slot() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(kind = %event.kind, "Event dropped by rate limiter");
            return PublishOutcome::Dropped;
        };

        self.deliver(event, stamped).await
    }

    /// Publish one event, waiting for the next free slot instead of dropping.
    pub async fn publish_paced(&self, event: ActivityEvent) -> PublishOutcome {
        let slot = self.reserve_slot();
        tokio::time::sleep_until(slot.at).await;
        self.deliver(event, slot.stamped).await
    }

    async fn deliver(&self, mut event: ActivityEvent, stamped: DateTime<Utc>) -> PublishOutcome {
        event.timestamp = Some(stamped);

        match self.sink.publish(&event).await {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    kind = %event.kind,
                    action = event.action.as_deref().unwrap_or_default(),
                    detail = event.detail.as_deref().unwrap_or_default(),
                    "Published event"
                );
                PublishOutcome::Sent
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    sink = self.sink.name(),
                    kind = %event.kind,
                    error = %e,
                    "Failed to publish event"
                );
                PublishOutcome::Failed
            }
        }
    }

    /// Connect the sink and announce the streamer once.
    ///
    /// Returns true once the announcement has gone out; later calls are
    /// no-ops that also return true. On failure the next call tries again.
    pub async fn announce_online(&self) -> bool {
        if self.is_online() {
            return true;
        }

        if let Err(e) = self.sink.connect().await {
            tracing::warn!(sink = self.sink.name(), error = %e, "Sink not reachable yet");
            return false;
        }

        match self.publish(ActivityEvent::streamer_online()).await {
            PublishOutcome::Sent => {
                // Only one caller may log the transition
                if !self.online.swap(true, Ordering::SeqCst) {
                    tracing::info!(sink = self.sink.name(), "Streamer online");
                }
                true
            }
            _ => false,
        }
    }

    /// Whether the online announcement has been delivered
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Get current publishing statistics
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            sent: self.sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Take the slot now if it is free. Check, stamp and set under one lock.
    fn try_acquire_slot(&self) -> Option<DateTime<Utc>> {
        let mut last = self.last_attempt.lock();
        let now = Instant::now();
        if let Some(prev) = *last {
            if now < prev.at || now.duration_since(prev.at) < self.min_interval {
                return None;
            }
        }

        let stamped = self.stamp(last.as_ref(), Duration::ZERO);
        *last = Some(Slot { at: now, stamped });
        Some(stamped)
    }

    /// Reserve the earliest free slot, which may lie in the future.
    fn reserve_slot(&self) -> Slot {
        let mut last = self.last_attempt.lock();
        let now = Instant::now();
        let at = match *last {
            Some(prev) => (prev.at + self.min_interval).max(now),
            None => now,
        };

        let slot = Slot {
            at,
            stamped: self.stamp(last.as_ref(), at - now),
        };
        *last = Some(slot);
        slot
    }

    /// Wall-clock time `wait` from now, never closer than `min_interval`
    /// to the previous slot's timestamp.
    fn stamp(&self, prev: Option<&Slot>, wait: Duration) -> DateTime<Utc> {
        let stamped = Utc::now() + to_chrono(wait);
        match prev {
            Some(prev) => stamped.max(prev.stamped + to_chrono(self.min_interval)),
            None => stamped,
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::sink::MemorySink;
    use crate::error::{Error, Result};
    use crate::types::EventKind;
    use async_trait::async_trait;

    /// Fails `connect` and `publish` a fixed number of times, then succeeds
    struct FlakySink {
        failures_left: AtomicUsize,
        inner: MemorySink,
    }

    #[async_trait]
    impl BroadcastSink for FlakySink {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn connect(&self) -> Result<()> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(Error::Broadcast("connection refused".to_string()));
            }
            Ok(())
        }

        async fn publish(&self, event: &ActivityEvent) -> Result<()> {
            self.inner.publish(event).await
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl BroadcastSink for BrokenSink {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn publish(&self, _event: &ActivityEvent) -> Result<()> {
            Err(Error::Broadcast("API error (500): boom".to_string()))
        }
    }

    #[tokio::test]
    async fn test_publish_stamps_timestamp() {
        let sink = MemorySink::new();
        let broadcaster = Broadcaster::new(Box::new(sink.clone()), Duration::from_millis(1));

        let outcome = broadcaster.publish(ActivityEvent::streamer_online()).await;

        assert_eq!(outcome, PublishOutcome::Sent);
        assert!(sink.events()[0].timestamp.is_some());
    }

    #[tokio::test]
    async fn test_events_within_interval_are_dropped() {
        let sink = MemorySink::new();
        let broadcaster = Broadcaster::new(Box::new(sink.clone()), Duration::from_secs(60));

        assert_eq!(
            broadcaster.publish(ActivityEvent::streamer_online()).await,
            PublishOutcome::Sent
        );
        assert_eq!(
            broadcaster.publish(ActivityEvent::fleet_summary(&[])).await,
            PublishOutcome::Dropped
        );

        assert_eq!(sink.len(), 1);
        assert_eq!(
            broadcaster.stats(),
            BroadcastStats {
                sent: 1,
                dropped: 1,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_events_after_interval_are_sent() {
        let sink = MemorySink::new();
        let broadcaster = Broadcaster::new(Box::new(sink.clone()), Duration::from_millis(20));

        broadcaster.publish(ActivityEvent::streamer_online()).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        let outcome = broadcaster.publish(ActivityEvent::fleet_summary(&[])).await;

        assert_eq!(outcome, PublishOutcome::Sent);
        assert_eq!(sink.len(), 2);
    }

    #[tokio::test]
    async fn test_sent_timestamps_respect_interval() {
        let sink = MemorySink::new();
        let interval = Duration::from_millis(30);
        let broadcaster = Broadcaster::new(Box::new(sink.clone()), interval);

        broadcaster.publish(ActivityEvent::streamer_online()).await;
        tokio::time::sleep(Duration::from_millis(35)).await;
        broadcaster.publish(ActivityEvent::fleet_summary(&[])).await;

        let events = sink.events();
        assert_eq!(events.len(), 2);
        let gap = events[1].timestamp.unwrap() - events[0].timestamp.unwrap();
        assert!(gap >= chrono::Duration::milliseconds(30), "gap was {}", gap);
    }

    #[tokio::test]
    async fn test_paced_publish_waits_instead_of_dropping() {
        let sink = MemorySink::new();
        let interval = Duration::from_millis(50);
        let broadcaster = Broadcaster::new(Box::new(sink.clone()), interval);

        let started = Instant::now();
        for _ in 0..3 {
            assert_eq!(
                broadcaster.publish_paced(ActivityEvent::fleet_summary(&[])).await,
                PublishOutcome::Sent
            );
        }

        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(broadcaster.stats().dropped, 0);

        let events = sink.events();
        assert_eq!(events.len(), 3);
        for pair in events.windows(2) {
            let gap = pair[1].timestamp.unwrap() - pair[0].timestamp.unwrap();
            assert!(gap >= chrono::Duration::milliseconds(50), "gap was {}", gap);
        }
    }

    #[tokio::test]
    async fn test_reserved_slot_blocks_immediate_publish() {
        let sink = MemorySink::new();
        let broadcaster = Broadcaster::new(Box::new(sink.clone()), Duration::from_secs(60));

        broadcaster.publish(ActivityEvent::streamer_online()).await;
        let paced = broadcaster.reserve_slot();
        assert!(paced.at > Instant::now());

        assert_eq!(
            broadcaster.publish(ActivityEvent::fleet_summary(&[])).await,
            PublishOutcome::Dropped
        );
    }

    #[tokio::test]
    async fn test_sink_failure_is_counted_not_retried() {
        let broadcaster = Broadcaster::new(Box::new(BrokenSink), Duration::from_millis(1));

        let outcome = broadcaster.publish(ActivityEvent::streamer_online()).await;

        assert_eq!(outcome, PublishOutcome::Failed);
        assert_eq!(broadcaster.stats().failed, 1);
        assert_eq!(broadcaster.stats().sent, 0);
    }

    #[tokio::test]
    async fn test_announce_online_retries_until_connected() {
        let memory = MemorySink::new();
        let sink = FlakySink {
            failures_left: AtomicUsize::new(1),
            inner: memory.clone(),
        };
        let broadcaster = Broadcaster::new(Box::new(sink), Duration::from_millis(1));

        assert!(!broadcaster.announce_online().await);
        assert!(!broadcaster.is_online());
        assert!(memory.is_empty());

        assert!(broadcaster.announce_online().await);
        assert!(broadcaster.is_online());

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(broadcaster.announce_online().await);

        let events = memory.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::StreamerOnline);
        assert_eq!(events[0].icon.as_deref(), Some("🚀"));
    }
}
