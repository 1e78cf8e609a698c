//! Stage-boundary events.
//!
//! The controller publishes one [`PipelineEvent`] per stage boundary.
//! Events are ephemeral: subscribers see them in publish order while
//! subscribed, and nothing is replayed.
//!
//! Patterns: `"*"` matches everything, `"prefix*"` matches by prefix, any
//! other pattern must equal the step name.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Capacity of the broadcast stream before slow receivers lag.
const STREAM_CAPACITY: usize = 256;

/// One stage-boundary notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Stage name, e.g. `legal_gate` or `complete`
    pub step: String,
    pub tip_id: String,
    /// Stage-specific summary
    pub payload: serde_json::Value,
    pub emitted_at: DateTime<Utc>,
}

impl PipelineEvent {
    pub fn new(step: impl Into<String>, tip_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            step: step.into(),
            tip_id: tip_id.into(),
            payload,
            emitted_at: Utc::now(),
        }
    }
}

/// Anything the controller can publish events to.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: PipelineEvent);
}

type Handler = Arc<dyn Fn(&PipelineEvent) + Send + Sync>;

struct Subscriber {
    pattern: String,
    handler: Handler,
}

fn pattern_matches(pattern: &str, step: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => step.starts_with(prefix),
        None => pattern == step,
    }
}

struct BusInner {
    next_id: AtomicU64,
    subscribers: DashMap<u64, Subscriber>,
    stream: broadcast::Sender<PipelineEvent>,
}

/// In-process publish/subscribe bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        let (stream, _) = broadcast::channel(STREAM_CAPACITY);
        Self {
            inner: Arc::new(BusInner {
                next_id: AtomicU64::new(1),
                subscribers: DashMap::new(),
                stream,
            }),
        }
    }

    /// Register a callback for steps matching `pattern`.
    ///
    /// The callback runs synchronously inside `publish`; a panicking
    /// callback is logged and skipped.
    pub fn subscribe<F>(&self, pattern: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let pattern = pattern.into();
        debug!(subscription = id, pattern = %pattern, "Subscribed");
        self.inner.subscribers.insert(
            id,
            Subscriber {
                pattern,
                handler: Arc::new(handler),
            },
        );
        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Receive every event as an async stream.
    pub fn stream(&self) -> broadcast::Receiver<PipelineEvent> {
        self.inner.stream.subscribe()
    }

    /// Number of callback subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    fn dispatch(&self, event: &PipelineEvent) {
        // Collect first so handlers may subscribe or unsubscribe without
        // deadlocking on the map.
        let mut matching: Vec<(u64, Handler)> = self
            .inner
            .subscribers
            .iter()
            .filter(|s| pattern_matches(&s.pattern, &event.step))
            .map(|s| (*s.key(), Arc::clone(&s.handler)))
            .collect();
        matching.sort_by_key(|(id, _)| *id);

        for (id, handler) in matching {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                warn!(subscription = id, step = %event.step, "Event handler panicked");
            }
        }

        // No receivers is not an error.
        let _ = self.inner.stream.send(event.clone());
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for EventBus {
    async fn publish(&self, event: PipelineEvent) {
        self.dispatch(&event);
    }
}

/// Handle for a callback subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stop receiving events.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.subscribers.remove(&self.id);
            debug!(subscription = self.id, "Unsubscribed");
        }
    }
}
