//! Binding of one panel instance to its injected inputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::panel::{Panel, PanelError, PanelInputs, PanelProps, PanelView};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Unregistered,
    Mounted,
    Unmounted,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Unregistered => "unregistered",
            LifecycleState::Mounted => "mounted",
            LifecycleState::Unmounted => "unmounted",
        }
    }
}

/// One live panel instance.
///
/// Mount and unmount each happen at most once; `Unmounted` is terminal and a
/// new instance needs a new runtime.
pub struct PanelRuntime {
    panel: Box<dyn Panel>,
    inputs: PanelInputs,
    state: LifecycleState,
    rendered: Option<(u64, PanelProps)>,
    render_count: u64,
    mounted_at: Option<DateTime<Utc>>,
}

impl PanelRuntime {
    pub fn new(panel: Box<dyn Panel>, inputs: PanelInputs) -> Self {
        Self {
            panel,
            inputs,
            state: LifecycleState::Unregistered,
            rendered: None,
            render_count: 0,
            mounted_at: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn panel_id(&self) -> &str {
        self.inputs.context.panel_id()
    }

    pub fn instance_id(&self) -> Uuid {
        self.inputs.context.instance_id()
    }

    pub fn inputs(&self) -> &PanelInputs {
        &self.inputs
    }

    pub fn render_count(&self) -> u64 {
        self.render_count
    }

    pub fn mounted_at(&self) -> Option<DateTime<Utc>> {
        self.mounted_at
    }

    fn transition(&self, expected: LifecycleState, to: LifecycleState) -> Result<(), PanelError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(PanelError::Lifecycle {
                from: self.state.as_str(),
                to: to.as_str(),
            })
        }
    }

    /// Run `on_mount`, wire host invalidation, then `attach`.
    ///
    /// On failure the instance is torn down through `on_unmount` and left
    /// `Unmounted`; it is never rendered.
    pub async fn mount(&mut self) -> Result<(), PanelError> {
        self.transition(LifecycleState::Unregistered, LifecycleState::Mounted)?;
        let ctx = self.inputs.context.clone();

        if let Err(err) = self.panel.on_mount(&ctx).await {
            tracing::error!(panel = ctx.panel_id(), error = %err, "on_mount failed");
            self.teardown().await;
            return Err(err);
        }

        let signal = self.inputs.render_signal().clone();
        self.inputs
            .events
            .on(markpane_topics::TOPIC_SLICE_CHANGED, move |_| {
                signal.invalidate();
                Ok(())
            });

        if let Err(err) = self.panel.attach(&self.inputs) {
            tracing::error!(panel = ctx.panel_id(), error = %err, "attach failed");
            self.teardown().await;
            return Err(err);
        }

        self.state = LifecycleState::Mounted;
        self.mounted_at = Some(Utc::now());
        tracing::info!(
            panel = ctx.panel_id(),
            instance = %ctx.instance_id(),
            "panel mounted"
        );
        Ok(())
    }

    pub fn render(&mut self, props: &PanelProps) -> Result<PanelView, PanelError> {
        if self.state != LifecycleState::Mounted {
            return Err(PanelError::Lifecycle {
                from: self.state.as_str(),
                to: "rendered",
            });
        }
        let props_changed = self.rendered.as_ref().map_or(true, |(_, last)| last != props);
        if props_changed {
            self.panel.on_props(&self.inputs, props);
        }
        let generation = self.inputs.render_signal().generation();
        let view = self.panel.render(&self.inputs, props);
        self.rendered = Some((generation, props.clone()));
        self.render_count += 1;
        tracing::trace!(panel = self.panel_id(), generation, "panel rendered");
        Ok(view)
    }

    /// Whether inputs or props changed since the last render.
    pub fn is_stale(&self, props: &PanelProps) -> bool {
        match &self.rendered {
            Some((generation, last)) => {
                *generation != self.inputs.render_signal().generation() || last != props
            }
            None => true,
        }
    }

    pub fn render_if_stale(&mut self, props: &PanelProps) -> Result<Option<PanelView>, PanelError> {
        if !self.is_stale(props) {
            return Ok(None);
        }
        self.render(props).map(Some)
    }

    /// Run `on_unmount` and drop every subscription. Hook errors are logged
    /// and do not stop the teardown.
    pub async fn unmount(&mut self) -> Result<(), PanelError> {
        self.transition(LifecycleState::Mounted, LifecycleState::Unmounted)?;
        self.teardown().await;
        tracing::info!(
            panel = self.panel_id(),
            renders = self.render_count,
            "panel unmounted"
        );
        Ok(())
    }

    async fn teardown(&mut self) {
        let ctx = self.inputs.context.clone();
        if let Err(err) = self.panel.on_unmount(&ctx).await {
            tracing::error!(panel = ctx.panel_id(), error = %err, "on_unmount failed");
        }
        let dropped = self.inputs.events.unsubscribe_all();
        tracing::debug!(panel = ctx.panel_id(), dropped, "subscriptions released");
        self.state = LifecycleState::Unmounted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::PanelActions;
    use crate::panel::{PanelContext, PanelEvents};
    use crate::slices::{DataSliceStore, SliceReader};
    use markpane_events::EventBus;
    use markpane_protocol::SliceScope;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counters {
        mounts: AtomicU32,
        unmounts: AtomicU32,
        attaches: AtomicU32,
    }

    struct Counting {
        counters: Arc<Counters>,
        fail_mount: bool,
    }

    #[async_trait::async_trait]
    impl Panel for Counting {
        async fn on_mount(&mut self, _ctx: &PanelContext) -> Result<(), PanelError> {
            self.counters.mounts.fetch_add(1, Ordering::SeqCst);
            if self.fail_mount {
                return Err(PanelError::Mount("backend offline".into()));
            }
            Ok(())
        }

        async fn on_unmount(&mut self, _ctx: &PanelContext) -> Result<(), PanelError> {
            self.counters.unmounts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn attach(&mut self, inputs: &PanelInputs) -> Result<(), PanelError> {
            self.counters.attaches.fetch_add(1, Ordering::SeqCst);
            inputs.events.on("counting:poke", |_| Ok(()));
            Ok(())
        }

        fn render(&self, inputs: &PanelInputs, props: &PanelProps) -> PanelView {
            PanelView(json!({
                "panel": inputs.context.panel_id(),
                "file": props.file_path,
            }))
        }
    }

    fn runtime(fail_mount: bool) -> (PanelRuntime, Arc<Counters>, EventBus, Arc<DataSliceStore>) {
        let bus = EventBus::new();
        let store = Arc::new(DataSliceStore::with_bus(bus.clone()));
        let counters = Arc::new(Counters::default());
        let inputs = PanelInputs::new(
            PanelContext::new("counting", SliceReader::new(store.clone()), json!({})),
            PanelActions::none(),
            PanelEvents::new(bus.clone(), "counting"),
        );
        let panel = Counting {
            counters: counters.clone(),
            fail_mount,
        };
        (PanelRuntime::new(Box::new(panel), inputs), counters, bus, store)
    }

    #[tokio::test]
    async fn render_requires_mount() {
        let (mut rt, counters, _, _) = runtime(false);
        assert!(rt.render(&PanelProps::default()).is_err());
        rt.mount().await.unwrap();
        let view = rt.render(&PanelProps::default()).unwrap();
        assert_eq!(view.0["panel"], "counting");
        assert_eq!(counters.mounts.load(Ordering::SeqCst), 1);
        assert_eq!(counters.attaches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lifecycle_names_match_serde() {
        for state in [
            LifecycleState::Unregistered,
            LifecycleState::Mounted,
            LifecycleState::Unmounted,
        ] {
            assert_eq!(
                serde_json::to_value(state).unwrap(),
                json!(state.as_str())
            );
        }
    }

    #[tokio::test]
    async fn unmounted_is_terminal() {
        let (mut rt, counters, bus, _) = runtime(false);
        rt.mount().await.unwrap();
        rt.unmount().await.unwrap();
        assert_eq!(rt.state(), LifecycleState::Unmounted);
        assert!(matches!(
            rt.mount().await,
            Err(PanelError::Lifecycle { from: "unmounted", .. })
        ));
        assert!(rt.unmount().await.is_err());
        assert!(rt.render(&PanelProps::default()).is_err());
        assert_eq!(counters.mounts.load(Ordering::SeqCst), 1);
        assert_eq!(counters.unmounts.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count("counting:poke"), 0);
        assert_eq!(bus.subscriber_count(markpane_topics::TOPIC_SLICE_CHANGED), 0);
    }

    #[tokio::test]
    async fn failed_mount_runs_cleanup_and_skips_attach() {
        let (mut rt, counters, bus, _) = runtime(true);
        assert!(matches!(rt.mount().await, Err(PanelError::Mount(_))));
        assert_eq!(rt.state(), LifecycleState::Unmounted);
        assert_eq!(counters.unmounts.load(Ordering::SeqCst), 1);
        assert_eq!(counters.attaches.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscriber_count(markpane_topics::TOPIC_SLICE_CHANGED), 0);
        assert!(rt.render(&PanelProps::default()).is_err());
    }

    #[tokio::test]
    async fn slice_changes_and_props_mark_stale() {
        let (mut rt, _, _, store) = runtime(false);
        rt.mount().await.unwrap();
        let props = PanelProps::default();
        assert!(rt.render_if_stale(&props).unwrap().is_some());
        assert!(rt.render_if_stale(&props).unwrap().is_none());

        store.set(SliceScope::Workspace, "active-file", json!({"path": "a.md"}));
        assert!(rt.render_if_stale(&props).unwrap().is_some());
        assert!(rt.render_if_stale(&props).unwrap().is_none());

        let controlled = PanelProps {
            file_path: Some("b.md".into()),
            ..PanelProps::default()
        };
        let view = rt.render_if_stale(&controlled).unwrap().unwrap();
        assert_eq!(view.0["file"], "b.md");

        rt.inputs().invalidate();
        assert!(rt.is_stale(&controlled));
        assert_eq!(rt.render_count(), 3);
    }
}
