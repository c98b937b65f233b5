//! Host commands a panel may request.
//!
//! Every command is optional. A host that cannot open git diffs simply leaves
//! that field empty; panels check with [`PanelActions::supports`] and hide
//! the dependent control, and a call to an absent action returns
//! [`ActionError::Unsupported`] instead of panicking.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use markpane_events::{EventBus, PanelEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("action not supported by host: {0}")]
    Unsupported(String),
    #[error("invalid argument: {0}")]
    Invalid(String),
    #[error("action failed: {0}")]
    Failed(String),
}

pub type ActionResult<T = ()> = Result<T, ActionError>;

type PathAction = Arc<dyn Fn(&str) -> ActionResult + Send + Sync>;
type DiffAction = Arc<dyn Fn(&str, GitFileStatus) -> ActionResult + Send + Sync>;
type EventAction = Arc<dyn Fn(PanelEvent) -> ActionResult + Send + Sync>;
pub type ExtensionAction = Arc<dyn Fn(Value) -> ActionResult<Value> + Send + Sync>;

/// Fixed host commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    OpenFile,
    OpenGitDiff,
    NavigateToPanel,
    NotifyPanels,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::OpenFile => "open_file",
            ActionKind::OpenGitDiff => "open_git_diff",
            ActionKind::NavigateToPanel => "navigate_to_panel",
            ActionKind::NotifyPanels => "notify_panels",
        }
    }
}

/// Working-tree status passed along with a diff request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GitFileStatus {
    Modified,
    Added,
    Deleted,
    Renamed,
    Untracked,
    Conflicted,
}

/// Capability struct of host commands injected into a panel.
#[derive(Clone, Default)]
pub struct PanelActions {
    open_file: Option<PathAction>,
    open_git_diff: Option<DiffAction>,
    navigate_to_panel: Option<PathAction>,
    notify_panels: Option<EventAction>,
    extensions: BTreeMap<String, ExtensionAction>,
}

impl fmt::Debug for PanelActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PanelActions")
            .field("open_file", &self.open_file.is_some())
            .field("open_git_diff", &self.open_git_diff.is_some())
            .field("navigate_to_panel", &self.navigate_to_panel.is_some())
            .field("notify_panels", &self.notify_panels.is_some())
            .field("extensions", &self.extensions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PanelActions {
    /// No host commands at all.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn builder() -> PanelActionsBuilder {
        PanelActionsBuilder::default()
    }

    pub fn supports(&self, kind: ActionKind) -> bool {
        match kind {
            ActionKind::OpenFile => self.open_file.is_some(),
            ActionKind::OpenGitDiff => self.open_git_diff.is_some(),
            ActionKind::NavigateToPanel => self.navigate_to_panel.is_some(),
            ActionKind::NotifyPanels => self.notify_panels.is_some(),
        }
    }

    pub fn open_file(&self, path: &str) -> ActionResult {
        match &self.open_file {
            Some(f) => f(path),
            None => Err(unsupported(ActionKind::OpenFile)),
        }
    }

    pub fn open_git_diff(&self, path: &str, status: GitFileStatus) -> ActionResult {
        match &self.open_git_diff {
            Some(f) => f(path, status),
            None => Err(unsupported(ActionKind::OpenGitDiff)),
        }
    }

    pub fn navigate_to_panel(&self, panel_id: &str) -> ActionResult {
        match &self.navigate_to_panel {
            Some(f) => f(panel_id),
            None => Err(unsupported(ActionKind::NavigateToPanel)),
        }
    }

    pub fn notify_panels(&self, event: PanelEvent) -> ActionResult {
        match &self.notify_panels {
            Some(f) => f(event),
            None => Err(unsupported(ActionKind::NotifyPanels)),
        }
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.contains_key(name)
    }

    pub fn extension_names(&self) -> impl Iterator<Item = &str> {
        self.extensions.keys().map(String::as_str)
    }

    /// Call a host-specific extension action by name.
    pub fn invoke_extension(&self, name: &str, args: Value) -> ActionResult<Value> {
        match self.extensions.get(name) {
            Some(f) => f(args),
            None => Err(ActionError::Unsupported(name.to_string())),
        }
    }
}

fn unsupported(kind: ActionKind) -> ActionError {
    ActionError::Unsupported(kind.as_str().to_string())
}

#[derive(Default)]
pub struct PanelActionsBuilder {
    inner: PanelActions,
}

impl PanelActionsBuilder {
    pub fn open_file<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> ActionResult + Send + Sync + 'static,
    {
        self.inner.open_file = Some(Arc::new(f));
        self
    }

    pub fn open_git_diff<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, GitFileStatus) -> ActionResult + Send + Sync + 'static,
    {
        self.inner.open_git_diff = Some(Arc::new(f));
        self
    }

    pub fn navigate_to_panel<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> ActionResult + Send + Sync + 'static,
    {
        self.inner.navigate_to_panel = Some(Arc::new(f));
        self
    }

    pub fn notify_panels<F>(mut self, f: F) -> Self
    where
        F: Fn(PanelEvent) -> ActionResult + Send + Sync + 'static,
    {
        self.inner.notify_panels = Some(Arc::new(f));
        self
    }

    /// `notify_panels` re-emits the event on `bus`.
    pub fn notify_via(self, bus: EventBus) -> Self {
        self.notify_panels(move |event| {
            bus.emit(&event);
            Ok(())
        })
    }

    pub fn extension<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> ActionResult<Value> + Send + Sync + 'static,
    {
        self.inner.extensions.insert(name.into(), Arc::new(f));
        self
    }

    pub fn build(self) -> PanelActions {
        self.inner
    }
}
