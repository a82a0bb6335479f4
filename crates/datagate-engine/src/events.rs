//! Domain event emission
//!
//! Events are emitted after the owning storage transaction commits and must
//! never be able to fail the caller: a sink with no subscribers, a full
//! channel, or a panicking consumer loses the event, not the transition.
//! Durable fan-out uses notification records enqueued inside the
//! transaction instead.

use datagate_types::ApprovalEventEnvelope;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Channel capacity for the broadcast event stream
const EVENT_CHANNEL_CAPACITY: usize = 4096;

/// Fire-and-forget consumer of execution events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ApprovalEventEnvelope);
}

/// Broadcast-backed sink feeding any number of subscribers.
pub struct BroadcastSink {
    tx: broadcast::Sender<ApprovalEventEnvelope>,
}

impl BroadcastSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ApprovalEventEnvelope> {
        self.tx.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: ApprovalEventEnvelope) {
        // No subscribers is fine; the event is simply dropped.
        let _ = self.tx.send(event);
    }
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ApprovalEventEnvelope) {}
}

/// Sink that records events in memory, for assertions in tests.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ApprovalEventEnvelope>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<ApprovalEventEnvelope> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: ApprovalEventEnvelope) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl<T: EventSink> EventSink for std::sync::Arc<T> {
    fn emit(&self, event: ApprovalEventEnvelope) {
        self.as_ref().emit(event);
    }
}
