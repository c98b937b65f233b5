//! Panel event envelope and the synchronous host/panel event bus.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event envelope (timestamp in epoch milliseconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub timestamp: i64,
    #[serde(default)]
    pub payload: Value,
}

impl PanelEvent {
    pub fn new(event_type: impl Into<String>, source: impl Into<String>, payload: Value) -> Self {
        Self::at(
            event_type,
            source,
            chrono::Utc::now().timestamp_millis(),
            payload,
        )
    }

    pub fn at(
        event_type: impl Into<String>,
        source: impl Into<String>,
        timestamp: i64,
        payload: Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            source: source.into(),
            timestamp,
            payload,
        }
    }

    /// Build an event from any serializable payload.
    pub fn from_serialize<T: Serialize>(
        event_type: impl Into<String>,
        source: impl Into<String>,
        payload: &T,
    ) -> Self {
        let val =
            serde_json::to_value(payload).unwrap_or_else(|_| serde_json::json!({"_ser":"error"}));
        Self::new(event_type, source, val)
    }

    /// Decode the payload into a typed structure.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

/// Identifier of one handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

pub type Handler = Arc<dyn Fn(&PanelEvent) -> anyhow::Result<()> + Send + Sync>;

struct Entry {
    id: SubscriptionId,
    active: AtomicBool,
    handler: Handler,
}

struct BusInner {
    handlers: Mutex<HashMap<String, Vec<Arc<Entry>>>>,
    next_id: AtomicU64,
    strict_names: bool,
}

impl BusInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Arc<Entry>>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, event_type: &str, id: SubscriptionId) -> bool {
        let mut map = self.lock();
        let Some(list) = map.get_mut(event_type) else {
            return false;
        };
        let Some(pos) = list.iter().position(|e| e.id == id) else {
            return false;
        };
        let entry = list.remove(pos);
        entry.active.store(false, Ordering::SeqCst);
        if list.is_empty() {
            map.remove(event_type);
        }
        tracing::debug!(event_type, id = id.0, "handler removed");
        true
    }
}

/// Outcome of one [`EventBus::emit`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Handlers that ran to completion.
    pub delivered: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

/// Synchronous publish/subscribe channel between the host and its panels.
///
/// Handlers for one event type run in registration order on the emitting
/// thread. The handler list is snapshotted at the start of each pass and no
/// lock is held while a handler runs, so handlers may emit, subscribe or
/// unsubscribe re-entrantly. A handler removed during a pass is not invoked
/// afterwards in that pass; handlers added during a pass first see the next
/// emit.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_strict_names(false)
    }

    /// With `strict` set, emitting or subscribing to a type that does not
    /// follow `<owner>:<action>` is logged at warn level.
    pub fn with_strict_names(strict: bool) -> Self {
        Self {
            inner: Arc::new(BusInner {
                handlers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                strict_names: strict,
            }),
        }
    }

    /// Register `handler` for events of exactly `event_type`.
    pub fn on<F>(&self, event_type: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&PanelEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_handler(event_type, Arc::new(handler))
    }

    pub fn on_handler(&self, event_type: impl Into<String>, handler: Handler) -> Subscription {
        let event_type = event_type.into();
        self.check_name(&event_type);
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = Arc::new(Entry {
            id,
            active: AtomicBool::new(true),
            handler,
        });
        self.inner
            .lock()
            .entry(event_type.clone())
            .or_default()
            .push(entry);
        tracing::debug!(event_type = %event_type, id = id.0, "handler registered");
        Subscription {
            id,
            event_type,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Remove one registration. Returns false when it was already gone.
    pub fn off(&self, event_type: &str, id: SubscriptionId) -> bool {
        self.inner.remove(event_type, id)
    }

    /// Deliver `event` to every current subscriber of its type.
    pub fn emit(&self, event: &PanelEvent) -> Delivery {
        self.check_name(&event.event_type);
        let snapshot: Vec<Arc<Entry>> = match self.inner.lock().get(&event.event_type) {
            Some(list) => list.clone(),
            None => Vec::new(),
        };
        tracing::debug!(
            event_type = %event.event_type,
            source = %event.source,
            subscribers = snapshot.len(),
            "emit"
        );

        let mut delivery = Delivery::default();
        for entry in snapshot {
            if !entry.active.load(Ordering::SeqCst) {
                continue;
            }
            let handler = entry.handler.clone();
            match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => delivery.delivered += 1,
                Ok(Err(err)) => {
                    delivery.failed += 1;
                    tracing::warn!(
                        event_type = %event.event_type,
                        id = entry.id.0,
                        error = %err,
                        "event handler failed"
                    );
                }
                Err(panic_payload) => {
                    delivery.failed += 1;
                    tracing::warn!(
                        event_type = %event.event_type,
                        id = entry.id.0,
                        panic = %panic_message(panic_payload.as_ref()),
                        "event handler panicked"
                    );
                }
            }
        }
        delivery
    }

    /// Serialize `payload` and emit it as a fresh event.
    pub fn publish<T: Serialize>(&self, event_type: &str, source: &str, payload: &T) -> Delivery {
        self.emit(&PanelEvent::from_serialize(event_type, source, payload))
    }

    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.inner.lock().get(event_type).map_or(0, Vec::len)
    }

    /// Drop every registration. Outstanding [`Subscription`]s become no-ops.
    pub fn clear(&self) {
        let mut map = self.inner.lock();
        for entry in map.values().flatten() {
            entry.active.store(false, Ordering::SeqCst);
        }
        map.clear();
    }

    fn check_name(&self, event_type: &str) {
        if self.inner.strict_names && !markpane_topics::is_namespaced(event_type) {
            tracing::warn!(event_type, "event type is not namespaced as <owner>:<action>");
        }
    }
}

/// Capability that removes exactly one handler registration.
///
/// Dropping it does not unsubscribe. Calling [`Subscription::unsubscribe`]
/// twice, or after the bus itself is gone, is a no-op.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: SubscriptionId,
    event_type: String,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Returns true when this call removed the registration.
    pub fn unsubscribe(&self) -> bool {
        match self.bus.upgrade() {
            Some(inner) => inner.remove(&self.event_type, self.id),
            None => false,
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
