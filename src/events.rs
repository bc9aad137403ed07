//! In-process Event Bus: fire-and-forget publish with a bounded log ring and
//! concurrent handler fan-out. Built on `tokio::sync::broadcast` rather than
//! a hand-rolled observer list.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

/// One published occurrence. `payload` is opaque JSON so callers across
/// component boundaries don't need a shared Rust type for every event kind.
/// Every event carries `event_id`/`timestamp`/`aggregate_type`/`aggregate_id`
/// alongside its `kind` and `payload`.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub event_id: String,
    pub kind: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub payload: Value,
    pub emitted_at: DateTime<Utc>,
}

const DEFAULT_LOG_CAPACITY: usize = 1000;
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

struct RingLog {
    capacity: usize,
    entries: VecDeque<Event>,
}

impl RingLog {
    fn new(capacity: usize) -> Self {
        Self { capacity, entries: VecDeque::with_capacity(capacity.min(64)) }
    }

    fn push(&mut self, event: Event) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(event);
    }
}

/// Owned, explicitly constructed event bus — never an ambient global
/// singleton.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    log: Arc<parking_lot::Mutex<RingLog>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacities(DEFAULT_CHANNEL_CAPACITY, DEFAULT_LOG_CAPACITY)
    }

    pub fn with_capacities(channel_capacity: usize, log_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity);
        Self { sender, log: Arc::new(parking_lot::Mutex::new(RingLog::new(log_capacity))) }
    }

    /// Publish an event. Never blocks and never fails the caller: a publish
    /// with no live subscribers is a normal occurrence, so a `SendError` is logged, not
    /// propagated.
    pub fn publish(&self, kind: impl Into<String>, aggregate_type: impl Into<String>, aggregate_id: impl Into<String>, payload: Value) {
        let event = Event {
            event_id: Uuid::new_v4().to_string(),
            kind: kind.into(),
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
            payload,
            emitted_at: Utc::now(),
        };
        self.log.lock().push(event.clone());
        if self.sender.send(event).is_err() {
            // no active subscribers; the ring log still has it.
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Recent events, oldest first, up to the ring log's capacity.
    pub fn recent(&self, kind_filter: Option<&str>) -> Vec<Event> {
        let log = self.log.lock();
        match kind_filter {
            Some(kind) => log.entries.iter().filter(|e| e.kind == kind).cloned().collect(),
            None => log.entries.iter().cloned().collect(),
        }
    }

    /// Spawn a handler that consumes every event until the bus (and every
    /// other subscriber/sender) is dropped. One handler's panic is isolated
    /// from the others by `tokio::spawn`'s own task boundary, matching
    /// "handler error does not affect other handlers".
    pub fn spawn_handler<F>(&self, mut handler: F) -> tokio::task::JoinHandle<()>
    where
        F: FnMut(Event) + Send + 'static,
    {
        let mut receiver = self.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => handler(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event bus handler lagged; events were dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub const EVT_OPTIMIZATION_STARTED: &str = "optimization.started";
pub const EVT_OPTIMIZATION_PROGRESS: &str = "optimization.progress";
pub const EVT_OPTIMIZATION_COMPLETED: &str = "optimization.completed";
pub const EVT_OPTIMIZATION_FAILED: &str = "optimization.failed";
pub const EVT_PLAN_CREATED: &str = "plan.created";
pub const EVT_PLAN_APPROVED: &str = "plan.approved";
pub const EVT_PLAN_REJECTED: &str = "plan.rejected";
pub const EVT_PRODUCTION_STARTED: &str = "production.started";
pub const EVT_PRODUCTION_COMPLETED: &str = "production.completed";
pub const EVT_STOCK_CONSUMED: &str = "stock.consumed";
pub const EVT_STOCK_LOW_ALERT: &str = "stock.low-alert";

// `cutting-job.*` and `order.*` events belong to collaborating modules
// (production tracking, order management) outside this crate's scope; the
// bus carries whatever `kind` a caller publishes, so those namespaces need
// no dedicated constants here.

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(EVT_OPTIMIZATION_PROGRESS, "scenario", "scn-1", json!({"taskId": "t1", "progress": 50}));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EVT_OPTIMIZATION_PROGRESS);
        assert_eq!(event.aggregate_id, "scn-1");
        assert!(!event.event_id.is_empty());
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(EVT_STOCK_LOW_ALERT, "stock", "s1", json!({"name": "cache"}));
        assert_eq!(bus.recent(None).len(), 1);
    }

    #[test]
    fn ring_log_evicts_oldest_beyond_capacity() {
        let bus = EventBus::with_capacities(16, 2);
        bus.publish("a", "t", "1", json!(1));
        bus.publish("b", "t", "2", json!(2));
        bus.publish("c", "t", "3", json!(3));
        let recent = bus.recent(None);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].kind, "b");
        assert_eq!(recent[1].kind, "c");
    }

    #[test]
    fn recent_filters_by_kind() {
        let bus = EventBus::new();
        bus.publish(EVT_OPTIMIZATION_PROGRESS, "scenario", "scn-1", json!(1));
        bus.publish(EVT_OPTIMIZATION_COMPLETED, "scenario", "scn-1", json!(2));
        assert_eq!(bus.recent(Some(EVT_OPTIMIZATION_COMPLETED)).len(), 1);
    }

    #[tokio::test]
    async fn spawn_handler_sees_published_events() {
        let bus = EventBus::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _handle = bus.spawn_handler(move |event| {
            seen_clone.lock().push(event.kind);
        });
        bus.publish(EVT_PLAN_CREATED, "plan", "plan-1", json!({"modelId": "m2"}));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(seen.lock().as_slice(), [EVT_PLAN_CREATED]);
    }
}
