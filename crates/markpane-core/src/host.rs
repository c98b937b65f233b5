//! Panel registry and lifecycle driver.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use markpane_events::EventBus;
use markpane_protocol::ToolsMetadata;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::actions::PanelActions;
use crate::config::Config;
use crate::panel::{
    PackageHooks, PanelContext, PanelDefinition, PanelError, PanelEvents, PanelInputs,
    PanelPackage, PanelProps, PanelView,
};
use crate::runtime::{LifecycleState, PanelRuntime};
use crate::slices::{DataSliceStore, SliceReader};
use crate::tools::ToolInvoker;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("panel id already registered: {0}")]
    DuplicatePanel(String),
    #[error("invalid metadata for panel {id}: {report}")]
    InvalidMetadata { id: String, report: String },
    #[error("panel limit reached ({max})")]
    CapacityExceeded { max: usize },
    #[error("unknown panel: {0}")]
    UnknownPanel(String),
    #[error("panel already mounted: {0}")]
    AlreadyMounted(String),
    #[error("panel not mounted: {0}")]
    NotMounted(String),
    #[error("mount failed for panel {id}: {source}")]
    MountFailed {
        id: String,
        #[source]
        source: PanelError,
    },
    #[error("package already loaded: {0}")]
    DuplicatePackage(String),
    #[error("unknown package: {0}")]
    UnknownPackage(String),
    #[error("package {package} load hook failed: {source}")]
    PackageHook {
        package: String,
        #[source]
        source: PanelError,
    },
    #[error(transparent)]
    Panel(#[from] PanelError),
}

/// Per-panel outcome of a bulk operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PanelReport {
    pub ok: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl PanelReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn fail(&mut self, id: &str, err: impl std::fmt::Display) {
        self.failed.push((id.to_string(), err.to_string()));
    }
}

struct LoadedPackage {
    panel_ids: Vec<String>,
    hooks: Option<Arc<dyn PackageHooks>>,
}

/// Owns the shared host resources and the registered panels.
///
/// Resources are handed to panels explicitly through [`PanelInputs`]; nothing
/// is reachable through globals.
pub struct PanelHost {
    config: Config,
    bus: EventBus,
    slices: Arc<DataSliceStore>,
    actions: PanelActions,
    order: Vec<String>,
    definitions: HashMap<String, PanelDefinition>,
    packages: BTreeMap<String, LoadedPackage>,
    runtimes: HashMap<String, PanelRuntime>,
}

impl Default for PanelHost {
    fn default() -> Self {
        Self::new()
    }
}

impl PanelHost {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Host whose `notify_panels` action re-emits on the host bus.
    pub fn with_config(config: Config) -> Self {
        let bus = EventBus::with_strict_names(config.strict_event_names());
        let slices = Arc::new(DataSliceStore::with_bus(bus.clone()));
        let actions = PanelActions::builder().notify_via(bus.clone()).build();
        Self {
            config,
            bus,
            slices,
            actions,
            order: Vec::new(),
            definitions: HashMap::new(),
            packages: BTreeMap::new(),
            runtimes: HashMap::new(),
        }
    }

    /// Replace the actions injected into panels mounted from now on.
    pub fn with_actions(mut self, actions: PanelActions) -> Self {
        self.actions = actions;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn slices(&self) -> &Arc<DataSliceStore> {
        &self.slices
    }

    pub fn actions(&self) -> &PanelActions {
        &self.actions
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.definitions.contains_key(id)
    }

    /// Registered ids in registration order.
    pub fn registered_ids(&self) -> &[String] {
        &self.order
    }

    pub fn mounted_ids(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| self.runtimes.contains_key(id.as_str()))
            .cloned()
            .collect()
    }

    pub fn runtime(&self, id: &str) -> Option<&PanelRuntime> {
        self.runtimes.get(id)
    }

    /// Lifecycle of the live instance; `Unregistered` when registered but
    /// not mounted, `None` for unknown ids.
    pub fn state(&self, id: &str) -> Option<LifecycleState> {
        if let Some(rt) = self.runtimes.get(id) {
            return Some(rt.state());
        }
        self.definitions
            .contains_key(id)
            .then_some(LifecycleState::Unregistered)
    }

    pub fn register(&mut self, definition: PanelDefinition) -> Result<(), HostError> {
        let id = definition.id().to_string();
        if self.definitions.contains_key(&id) {
            tracing::warn!(panel = %id, "duplicate panel registration rejected");
            return Err(HostError::DuplicatePanel(id));
        }
        let report = definition.metadata.validate();
        for warning in &report.warnings {
            tracing::warn!(panel = %id, field = %warning.field, "{}", warning.message);
        }
        if !report.is_success() {
            return Err(HostError::InvalidMetadata {
                id,
                report: report.to_string(),
            });
        }
        if let Some(max) = self.config.host.max_panels {
            if self.definitions.len() >= max {
                return Err(HostError::CapacityExceeded { max });
            }
        }
        tracing::info!(
            panel = %id,
            version = %definition.metadata.version,
            tools = definition.metadata.tools.len(),
            "panel registered"
        );
        self.order.push(id.clone());
        self.definitions.insert(id, definition);
        Ok(())
    }

    /// Remove a definition, unmounting its live instance first.
    pub async fn unregister(&mut self, id: &str) -> Result<(), HostError> {
        if !self.definitions.contains_key(id) {
            return Err(HostError::UnknownPanel(id.to_string()));
        }
        if self.runtimes.contains_key(id) {
            self.unmount(id).await?;
        }
        self.definitions.remove(id);
        self.order.retain(|known| known != id);
        tracing::info!(panel = id, "panel unregistered");
        Ok(())
    }

    /// Run the package load hook, then register each definition in order.
    /// A failing hook aborts the load; a failing definition only skips that
    /// panel.
    pub async fn load_package(&mut self, package: PanelPackage) -> Result<PanelReport, HostError> {
        let PanelPackage {
            name,
            definitions,
            hooks,
        } = package;
        if self.packages.contains_key(&name) {
            return Err(HostError::DuplicatePackage(name));
        }
        if let Some(hooks) = &hooks {
            if let Err(source) = hooks.on_package_load().await {
                tracing::error!(package = %name, error = %source, "package load hook failed");
                return Err(HostError::PackageHook {
                    package: name,
                    source,
                });
            }
        }

        let mut report = PanelReport::default();
        for definition in definitions {
            let id = definition.id().to_string();
            match self.register(definition) {
                Ok(()) => report.ok.push(id),
                Err(err) => {
                    tracing::warn!(package = %name, panel = %id, error = %err, "panel skipped");
                    report.fail(&id, err);
                }
            }
        }
        tracing::info!(
            package = %name,
            registered = report.ok.len(),
            failed = report.failed.len(),
            "package loaded"
        );
        self.packages.insert(
            name,
            LoadedPackage {
                panel_ids: report.ok.clone(),
                hooks,
            },
        );
        Ok(report)
    }

    /// Unregister every panel of the package, then run its unload hook.
    /// Failures are isolated per panel and reported.
    pub async fn unload_package(&mut self, name: &str) -> Result<PanelReport, HostError> {
        let package = self
            .packages
            .remove(name)
            .ok_or_else(|| HostError::UnknownPackage(name.to_string()))?;

        let mut report = PanelReport::default();
        for id in &package.panel_ids {
            match self.unregister(id).await {
                Ok(()) => report.ok.push(id.clone()),
                Err(err) => report.fail(id, err),
            }
        }
        if let Some(hooks) = &package.hooks {
            if let Err(err) = hooks.on_package_unload().await {
                tracing::error!(package = name, error = %err, "package unload hook failed");
                report.fail(name, err);
            }
        }
        tracing::info!(package = name, "package unloaded");
        Ok(report)
    }

    pub fn package_names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    fn inputs_for(&self, id: &str) -> PanelInputs {
        let context = PanelContext::new(
            id,
            SliceReader::new(self.slices.clone()),
            self.config.panel_settings(id),
        );
        PanelInputs::new(
            context,
            self.actions.clone(),
            PanelEvents::new(self.bus.clone(), id),
        )
    }

    /// Mount a fresh instance of a registered panel.
    pub async fn mount(&mut self, id: &str) -> Result<Uuid, HostError> {
        let definition = self
            .definitions
            .get(id)
            .ok_or_else(|| HostError::UnknownPanel(id.to_string()))?;
        if self.runtimes.contains_key(id) {
            return Err(HostError::AlreadyMounted(id.to_string()));
        }
        let mut runtime = PanelRuntime::new(definition.instantiate(), self.inputs_for(id));
        runtime
            .mount()
            .await
            .map_err(|source| HostError::MountFailed {
                id: id.to_string(),
                source,
            })?;
        let instance = runtime.instance_id();
        self.runtimes.insert(id.to_string(), runtime);
        Ok(instance)
    }

    /// Mount every registered panel without a live instance.
    pub async fn mount_all(&mut self) -> PanelReport {
        let pending: Vec<String> = self
            .order
            .iter()
            .filter(|id| !self.runtimes.contains_key(id.as_str()))
            .cloned()
            .collect();
        let mut report = PanelReport::default();
        for id in pending {
            match self.mount(&id).await {
                Ok(_) => report.ok.push(id),
                Err(err) => report.fail(&id, err),
            }
        }
        report
    }

    pub async fn unmount(&mut self, id: &str) -> Result<(), HostError> {
        let mut runtime = self
            .runtimes
            .remove(id)
            .ok_or_else(|| HostError::NotMounted(id.to_string()))?;
        runtime.unmount().await?;
        Ok(())
    }

    pub fn render(&mut self, id: &str, props: &PanelProps) -> Result<PanelView, HostError> {
        let runtime = self
            .runtimes
            .get_mut(id)
            .ok_or_else(|| HostError::NotMounted(id.to_string()))?;
        Ok(runtime.render(props)?)
    }

    /// Render only when the panel was invalidated or `props` changed.
    pub fn render_if_stale(
        &mut self,
        id: &str,
        props: &PanelProps,
    ) -> Result<Option<PanelView>, HostError> {
        let runtime = self
            .runtimes
            .get_mut(id)
            .ok_or_else(|| HostError::NotMounted(id.to_string()))?;
        Ok(runtime.render_if_stale(props)?)
    }

    /// Tell panels which one has focus.
    pub fn focus(&self, id: &str) -> Result<(), HostError> {
        if !self.runtimes.contains_key(id) {
            return Err(HostError::NotMounted(id.to_string()));
        }
        self.bus.publish(
            markpane_topics::TOPIC_PANEL_FOCUSED,
            markpane_topics::SOURCE_HOST,
            &json!({ "id": id }),
        );
        Ok(())
    }

    /// Tool listings of every registered panel, in registration order.
    pub fn tool_catalog(&self) -> Vec<ToolsMetadata> {
        self.order
            .iter()
            .filter_map(|id| self.definitions.get(id))
            .map(|def| def.metadata.tools_metadata())
            .collect()
    }

    pub fn tool_invoker(&self) -> ToolInvoker {
        ToolInvoker::new(self.bus.clone(), self.tool_catalog())
    }

    /// Unload all packages, then unmount whatever is still live.
    pub async fn shutdown(&mut self) -> PanelReport {
        let mut report = PanelReport::default();
        let packages: Vec<String> = self.packages.keys().cloned().collect();
        for name in packages {
            match self.unload_package(&name).await {
                Ok(sub) => {
                    report.ok.extend(sub.ok);
                    report.failed.extend(sub.failed);
                }
                Err(err) => report.fail(&name, err),
            }
        }
        for id in self.mounted_ids() {
            match self.unmount(&id).await {
                Ok(()) => report.ok.push(id),
                Err(err) => report.fail(&id, err),
            }
        }
        tracing::info!(failed = report.failed.len(), "host shut down");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::Panel;
    use markpane_protocol::PanelMetadata;

    struct Blank;

    #[async_trait::async_trait]
    impl Panel for Blank {
        fn render(&self, inputs: &PanelInputs, _props: &PanelProps) -> PanelView {
            PanelView(json!({ "panel": inputs.context.panel_id() }))
        }
    }

    fn definition(id: &str) -> PanelDefinition {
        PanelDefinition::new(
            PanelMetadata::new(id, id, "1.0.0").with_description("test panel"),
            || Blank,
        )
    }

    #[test]
    fn rejects_invalid_metadata() {
        let mut host = PanelHost::new();
        let bad = PanelDefinition::new(PanelMetadata::new("bad id", "Bad", "one"), || Blank);
        assert!(matches!(
            host.register(bad),
            Err(HostError::InvalidMetadata { .. })
        ));
        assert!(host.registered_ids().is_empty());
    }

    #[test]
    fn enforces_panel_limit() {
        let mut cfg = Config::default();
        cfg.host.max_panels = Some(1);
        let mut host = PanelHost::with_config(cfg);
        host.register(definition("one")).unwrap();
        assert!(matches!(
            host.register(definition("two")),
            Err(HostError::CapacityExceeded { max: 1 })
        ));
    }

    #[tokio::test]
    async fn state_tracks_instances() {
        let mut host = PanelHost::new();
        assert_eq!(host.state("one"), None);
        host.register(definition("one")).unwrap();
        assert_eq!(host.state("one"), Some(LifecycleState::Unregistered));
        host.mount("one").await.unwrap();
        assert_eq!(host.state("one"), Some(LifecycleState::Mounted));
        assert!(matches!(
            host.mount("one").await,
            Err(HostError::AlreadyMounted(_))
        ));
        host.unmount("one").await.unwrap();
        assert!(matches!(
            host.render("one", &PanelProps::default()),
            Err(HostError::NotMounted(_))
        ));
        host.unregister("one").await.unwrap();
        assert_eq!(host.state("one"), None);
    }
}
