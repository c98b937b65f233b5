use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use markpane_events::{Delivery, EventBus, PanelEvent, Subscription};
use markpane_protocol::PanelMetadata;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::actions::PanelActions;
use crate::slices::SliceReader;

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("mount hook failed: {0}")]
    Mount(String),
    #[error("unmount hook failed: {0}")]
    Unmount(String),
    #[error("attach failed: {0}")]
    Attach(String),
    #[error("invalid lifecycle transition from {from} to {to}")]
    Lifecycle {
        from: &'static str,
        to: &'static str,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Read access to host data, scoped to one panel instance.
#[derive(Clone)]
pub struct PanelContext {
    panel_id: String,
    instance_id: Uuid,
    slices: SliceReader,
    settings: Arc<Value>,
}

impl PanelContext {
    pub fn new(panel_id: impl Into<String>, slices: SliceReader, settings: Value) -> Self {
        Self {
            panel_id: panel_id.into(),
            instance_id: Uuid::new_v4(),
            slices,
            settings: Arc::new(settings),
        }
    }

    pub fn panel_id(&self) -> &str {
        &self.panel_id
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn slices(&self) -> &SliceReader {
        &self.slices
    }

    /// Host-supplied settings for this panel (`[panels.<id>]` in config).
    pub fn settings(&self) -> &Value {
        &self.settings
    }

    /// Typed lookup of one settings key; `None` when absent or mistyped.
    pub fn setting<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.settings
            .get(key)
            .and_then(|v| T::deserialize(v).ok())
    }
}

/// Panel-facing side of the event bus.
///
/// Emits are stamped with the panel id as source. Every subscription made
/// through it is remembered so the runtime can drop them all at unmount.
#[derive(Clone)]
pub struct PanelEvents {
    bus: EventBus,
    source: String,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
}

impl PanelEvents {
    pub fn new(bus: EventBus, source: impl Into<String>) -> Self {
        Self {
            bus,
            source: source.into(),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn on<F>(&self, event_type: &str, handler: F) -> Subscription
    where
        F: Fn(&PanelEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let sub = self.bus.on(event_type, handler);
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sub.clone());
        sub
    }

    pub fn emit(&self, event_type: &str, payload: Value) -> Delivery {
        self.bus
            .emit(&PanelEvent::new(event_type, self.source.clone(), payload))
    }

    pub fn emit_event(&self, event: &PanelEvent) -> Delivery {
        self.bus.emit(event)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Remove every subscription made through this handle.
    pub fn unsubscribe_all(&self) -> usize {
        let subs: Vec<Subscription> = std::mem::take(
            &mut *self
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        subs.iter().filter(|s| s.unsubscribe()).count()
    }
}

/// Invalidation counter shared between a panel and its runtime.
#[derive(Clone, Default)]
pub struct RenderSignal {
    generation: Arc<AtomicU64>,
}

impl RenderSignal {
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

/// The injected inputs of one panel instance.
#[derive(Clone)]
pub struct PanelInputs {
    pub context: PanelContext,
    pub actions: PanelActions,
    pub events: PanelEvents,
    render: RenderSignal,
}

impl PanelInputs {
    pub fn new(context: PanelContext, actions: PanelActions, events: PanelEvents) -> Self {
        Self {
            context,
            actions,
            events,
            render: RenderSignal::default(),
        }
    }

    /// Ask the runtime to re-render on its next pass.
    pub fn invalidate(&self) {
        self.render.invalidate();
    }

    pub fn render_signal(&self) -> &RenderSignal {
        &self.render
    }
}

/// Optional controlling props supplied by whoever embeds the panel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelProps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport_width: Option<u32>,
}

/// Serializable view model produced by a render pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PanelView(pub Value);

impl PanelView {
    pub fn from_serialize<T: Serialize>(view: &T) -> Self {
        PanelView(serde_json::to_value(view).unwrap_or(Value::Null))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.0)
    }
}

/// A host-loaded panel.
///
/// `render` must be a pure projection of the inputs, props and the panel's
/// own view state. Side effects belong in the hooks, in `attach`, which runs
/// once after a successful mount, and in `on_props`.
#[async_trait::async_trait]
pub trait Panel: Send {
    async fn on_mount(&mut self, _ctx: &PanelContext) -> Result<(), PanelError> {
        Ok(())
    }

    /// Also called after a failed mount, so it must not assume mount
    /// resources exist.
    async fn on_unmount(&mut self, _ctx: &PanelContext) -> Result<(), PanelError> {
        Ok(())
    }

    fn attach(&mut self, _inputs: &PanelInputs) -> Result<(), PanelError> {
        Ok(())
    }

    /// Called before a render whenever the props differ from the previous
    /// render's props (and before the first render).
    fn on_props(&mut self, _inputs: &PanelInputs, _props: &PanelProps) {}

    fn render(&self, inputs: &PanelInputs, props: &PanelProps) -> PanelView;
}

pub type PanelFactory = Arc<dyn Fn() -> Box<dyn Panel> + Send + Sync>;

/// Registration unit: metadata plus a factory for fresh instances.
#[derive(Clone)]
pub struct PanelDefinition {
    pub metadata: PanelMetadata,
    factory: PanelFactory,
}

impl fmt::Debug for PanelDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PanelDefinition")
            .field("id", &self.metadata.id)
            .field("version", &self.metadata.version)
            .finish_non_exhaustive()
    }
}

impl PanelDefinition {
    pub fn new<F, P>(metadata: PanelMetadata, factory: F) -> Self
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: Panel + 'static,
    {
        Self {
            metadata,
            factory: Arc::new(move || Box::new(factory()) as Box<dyn Panel>),
        }
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn instantiate(&self) -> Box<dyn Panel> {
        (self.factory)()
    }
}

/// Hooks run when a package of panels is loaded or unloaded.
#[async_trait::async_trait]
pub trait PackageHooks: Send + Sync {
    async fn on_package_load(&self) -> Result<(), PanelError> {
        Ok(())
    }

    async fn on_package_unload(&self) -> Result<(), PanelError> {
        Ok(())
    }
}

/// An ordered list of panel definitions shipped together.
#[derive(Clone)]
pub struct PanelPackage {
    pub name: String,
    pub definitions: Vec<PanelDefinition>,
    pub(crate) hooks: Option<Arc<dyn PackageHooks>>,
}

impl PanelPackage {
    pub fn new(name: impl Into<String>, definitions: Vec<PanelDefinition>) -> Self {
        Self {
            name: name.into(),
            definitions,
            hooks: None,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn PackageHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slices::DataSliceStore;
    use serde_json::json;

    fn context(settings: Value) -> PanelContext {
        PanelContext::new(
            "demo",
            SliceReader::new(Arc::new(DataSliceStore::new())),
            settings,
        )
    }

    #[test]
    fn typed_settings_lookup() {
        let ctx = context(json!({"breakpoint": 600, "label": "x"}));
        assert_eq!(ctx.setting::<u32>("breakpoint"), Some(600));
        assert_eq!(ctx.setting::<u32>("label"), None);
        assert_eq!(ctx.setting::<u32>("missing"), None);
    }

    #[test]
    fn panel_events_stamp_source_and_track_subscriptions() {
        let bus = EventBus::new();
        let events = PanelEvents::new(bus.clone(), "demo");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        events.on("demo:ping", move |ev| {
            sink.lock().unwrap().push(ev.source.clone());
            Ok(())
        });
        events.on("demo:other", |_| Ok(()));
        events.emit("demo:ping", json!({}));
        assert_eq!(*seen.lock().unwrap(), vec!["demo".to_string()]);
        assert_eq!(events.subscription_count(), 2);
        assert_eq!(events.unsubscribe_all(), 2);
        assert_eq!(bus.subscriber_count("demo:ping"), 0);
        assert_eq!(events.unsubscribe_all(), 0);
    }

    #[test]
    fn render_signal_counts_invalidations() {
        let signal = RenderSignal::default();
        let clone = signal.clone();
        clone.invalidate();
        clone.invalidate();
        assert_eq!(signal.generation(), 2);
    }
}
