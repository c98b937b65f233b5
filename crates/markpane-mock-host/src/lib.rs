//! In-process host for panel tests and demos.
//!
//! Wraps a [`PanelHost`] whose actions are recorded instead of performed,
//! records selected bus traffic, and plays the host side of the preference
//! handshake with an in-memory store.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use markpane_core::{
    Config, GitFileStatus, HostError, Invocation, PanelActions, PanelDefinition, PanelHost,
    PanelPackage, PanelProps, PanelReport, PanelView, SliceScope, ToolInvokeError,
};
use markpane_events::PanelEvent;
use markpane_topics::{
    ACTIVE_FILE_SLICE, SOURCE_HOST, TOPIC_FILE_CLOSED, TOPIC_FILE_OPENED,
    TOPIC_MARKDOWN_PREFERENCES_CHANGED, TOPIC_MARKDOWN_REQUEST_PREFERENCES,
    TOPIC_MARKDOWN_SET_PREFERENCES, TOPIC_VIEWPORT_RESIZED,
};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// One host command a panel requested.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionRecord {
    OpenFile { path: String },
    OpenGitDiff { path: String, status: GitFileStatus },
    NavigateToPanel { panel_id: String },
    NotifyPanels { event_type: String },
}

#[derive(Default)]
struct Recorder {
    actions: Mutex<Vec<ActionRecord>>,
    events: Mutex<Vec<PanelEvent>>,
    preferences: Mutex<Option<Value>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct MockHost {
    host: PanelHost,
    recorder: Arc<Recorder>,
    recorded: HashSet<String>,
    props: PanelProps,
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHost {
    /// Host with every action available and recorded.
    pub fn new() -> Self {
        Self::build(Config::default(), true)
    }

    /// Host that offers no actions at all.
    pub fn without_actions() -> Self {
        Self::build(Config::default(), false)
    }

    pub fn with_config(config: Config) -> Self {
        Self::build(config, true)
    }

    fn build(config: Config, with_actions: bool) -> Self {
        let recorder = Arc::new(Recorder::default());
        let host = PanelHost::with_config(config);
        let actions = if with_actions {
            recording_actions(&recorder, host.bus().clone())
        } else {
            PanelActions::none()
        };
        let host = host.with_actions(actions);

        let store = recorder.clone();
        host.bus().on(TOPIC_MARKDOWN_PREFERENCES_CHANGED, move |event| {
            *lock(&store.preferences) = Some(event.payload.clone());
            Ok(())
        });
        let store = recorder.clone();
        let bus = host.bus().clone();
        host.bus().on(TOPIC_MARKDOWN_REQUEST_PREFERENCES, move |_| {
            let stored = lock(&store.preferences).clone();
            if let Some(prefs) = stored {
                bus.emit(&PanelEvent::new(
                    TOPIC_MARKDOWN_SET_PREFERENCES,
                    SOURCE_HOST,
                    prefs,
                ));
            }
            Ok(())
        });

        let mut mock = Self {
            host,
            recorder,
            recorded: HashSet::new(),
            props: PanelProps::default(),
        };
        mock.record(TOPIC_MARKDOWN_REQUEST_PREFERENCES);
        mock.record(TOPIC_MARKDOWN_PREFERENCES_CHANGED);
        mock
    }

    /// Seed the preference store answered on `request-preferences`.
    pub fn with_preferences(self, prefs: Value) -> Self {
        *lock(&self.recorder.preferences) = Some(prefs);
        self
    }

    pub fn with_slice(self, scope: SliceScope, name: &str, data: Value) -> Self {
        self.host.slices().set(scope, name, data);
        self
    }

    /// Start recording every event of `event_type`.
    pub fn record(&mut self, event_type: &str) {
        if !self.recorded.insert(event_type.to_string()) {
            return;
        }
        let recorder = self.recorder.clone();
        self.host.bus().on(event_type, move |event| {
            lock(&recorder.events).push(event.clone());
            Ok(())
        });
    }

    pub fn host(&self) -> &PanelHost {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut PanelHost {
        &mut self.host
    }

    /// Register and mount one panel.
    pub async fn load(&mut self, definition: PanelDefinition) -> Result<Uuid, HostError> {
        let id = definition.id().to_string();
        self.host.register(definition)?;
        self.host.mount(&id).await
    }

    /// Load a package and mount everything in it.
    pub async fn load_package(&mut self, package: PanelPackage) -> Result<PanelReport, HostError> {
        let mut report = self.host.load_package(package).await?;
        let mounted = self.host.mount_all().await;
        report.failed.extend(mounted.failed);
        Ok(report)
    }

    pub fn set_props(&mut self, props: PanelProps) {
        self.props = props;
    }

    pub fn props(&self) -> &PanelProps {
        &self.props
    }

    pub fn render(&mut self, id: &str) -> Result<PanelView, HostError> {
        let props = self.props.clone();
        self.host.render(id, &props)
    }

    pub fn render_if_stale(&mut self, id: &str) -> Result<Option<PanelView>, HostError> {
        let props = self.props.clone();
        self.host.render_if_stale(id, &props)
    }

    pub fn emit(&self, event_type: &str, payload: Value) {
        self.host
            .bus()
            .emit(&PanelEvent::new(event_type, SOURCE_HOST, payload));
    }

    /// Make `path` the active file and announce it.
    pub fn open_file(&self, path: &str, content: &str) {
        self.host.slices().set(
            SliceScope::Workspace,
            ACTIVE_FILE_SLICE,
            json!({ "path": path, "content": content }),
        );
        self.emit(TOPIC_FILE_OPENED, json!({ "path": path }));
    }

    pub fn close_file(&self) {
        let path = self
            .host
            .slices()
            .get_workspace_slice(ACTIVE_FILE_SLICE)
            .and_then(|s| s.data.as_ref()?.get("path").cloned());
        self.host
            .slices()
            .remove(SliceScope::Workspace, ACTIVE_FILE_SLICE);
        self.emit(TOPIC_FILE_CLOSED, json!({ "path": path }));
    }

    pub fn resize(&mut self, width: u32) {
        self.props.viewport_width = Some(width);
        self.emit(TOPIC_VIEWPORT_RESIZED, json!({ "width": width }));
    }

    pub fn invoke(&self, tool: &str, args: Value) -> Result<Invocation, ToolInvokeError> {
        self.host.tool_invoker().invoke(tool, args)
    }

    pub fn actions(&self) -> Vec<ActionRecord> {
        lock(&self.recorder.actions).clone()
    }

    /// Recorded events, optionally filtered by type.
    pub fn events(&self, event_type: Option<&str>) -> Vec<PanelEvent> {
        lock(&self.recorder.events)
            .iter()
            .filter(|e| event_type.is_none_or(|t| e.event_type == t))
            .cloned()
            .collect()
    }

    pub fn stored_preferences(&self) -> Option<Value> {
        lock(&self.recorder.preferences).clone()
    }

    pub async fn shutdown(&mut self) -> PanelReport {
        self.host.shutdown().await
    }
}

fn recording_actions(recorder: &Arc<Recorder>, bus: markpane_events::EventBus) -> PanelActions {
    let r1 = recorder.clone();
    let r2 = recorder.clone();
    let r3 = recorder.clone();
    let r4 = recorder.clone();
    PanelActions::builder()
        .open_file(move |path| {
            tracing::debug!(path, "mock host open_file");
            lock(&r1.actions).push(ActionRecord::OpenFile {
                path: path.to_string(),
            });
            Ok(())
        })
        .open_git_diff(move |path, status| {
            lock(&r2.actions).push(ActionRecord::OpenGitDiff {
                path: path.to_string(),
                status,
            });
            Ok(())
        })
        .navigate_to_panel(move |panel_id| {
            lock(&r3.actions).push(ActionRecord::NavigateToPanel {
                panel_id: panel_id.to_string(),
            });
            Ok(())
        })
        .notify_panels(move |event| {
            lock(&r4.actions).push(ActionRecord::NotifyPanels {
                event_type: event.event_type.clone(),
            });
            bus.emit(&event);
            Ok(())
        })
        .build()
}
