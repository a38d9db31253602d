use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use tokio::time::Instant;
use tracing::debug;
use wave_core::protocol::classify;
use wave_core::{AlertEntry, AlertId, MonitorSnapshot, MonitorUpdate, TelemetryEvent};

use crate::journal::Acknowledgement;
use crate::tracker::{Tracker, TrackerConfig};

const UPDATE_CAPACITY: usize = 256;

/// Shared tracker plus the update feed subscribers listen on.
///
/// Updates are published while the tracker lock is held, so every
/// subscriber sees them in the order they were produced.
pub struct MonitorState {
    inner: Arc<Mutex<Tracker>>,
    updates: broadcast::Sender<MonitorUpdate>,
}

impl MonitorState {
    pub fn new(config: TrackerConfig) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(Tracker::new(config))),
            updates,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorUpdate> {
        self.updates.subscribe()
    }

    /// Publish an update that does not come from the tracker (link status).
    pub fn publish(&self, update: MonitorUpdate) {
        // no subscribers is fine
        let _ = self.updates.send(update);
    }

    /// Classify one line of device output and apply it.
    pub async fn ingest_line(&self, line: &str) -> TelemetryEvent {
        let event = classify(line);
        if event.is_fallback() {
            debug!(line, "Unmatched line");
        } else {
            debug!(?event, "Classified line");
        }
        self.ingest(event.clone()).await;
        event
    }

    pub async fn ingest(&self, event: TelemetryEvent) {
        let mut tracker = self.inner.lock().await;
        let updates = tracker.apply(event, Instant::now(), jiff::Timestamp::now());
        self.publish_all(updates);
    }

    /// Fire deadlines that have passed.
    pub async fn expire(&self) {
        let mut tracker = self.inner.lock().await;
        let updates = tracker.expire(Instant::now());
        self.publish_all(updates);
    }

    pub async fn next_deadline(&self) -> Option<Instant> {
        let tracker = self.inner.lock().await;
        tracker.next_deadline()
    }

    pub async fn acknowledge(&self, id: AlertId) -> Acknowledgement {
        let mut tracker = self.inner.lock().await;
        let ack = tracker.acknowledge(id);
        if ack == Acknowledgement::Acknowledged {
            self.publish(MonitorUpdate::AlertAcknowledged(id));
        }
        ack
    }

    pub async fn snapshot(&self) -> MonitorSnapshot {
        let tracker = self.inner.lock().await;
        tracker.snapshot()
    }

    /// Journal entries, oldest first.
    pub async fn alerts(&self) -> Vec<AlertEntry> {
        let tracker = self.inner.lock().await;
        tracker.journal().entries().cloned().collect()
    }

    pub async fn alert(&self, id: AlertId) -> Option<AlertEntry> {
        let tracker = self.inner.lock().await;
        tracker.journal().get(id).cloned()
    }

    pub async fn clear_journal(&self) -> usize {
        let mut tracker = self.inner.lock().await;
        let removed = tracker.clear_journal();
        self.publish(MonitorUpdate::JournalCleared { removed });
        removed
    }

    fn publish_all(&self, updates: Vec<MonitorUpdate>) {
        for update in updates {
            self.publish(update);
        }
    }
}

impl Default for MonitorState {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl Clone for MonitorState {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            updates: self.updates.clone(),
        }
    }
}
