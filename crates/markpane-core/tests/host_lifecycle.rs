use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use markpane_core::{
    HostError, LifecycleState, PackageHooks, Panel, PanelContext, PanelDefinition, PanelError,
    PanelHost, PanelInputs, PanelMetadata, PanelPackage, PanelProps, PanelView, SliceScope,
    ToolSchema, ToolSpec,
};
use markpane_protocol::PropertySchema;
use serde_json::json;

#[derive(Default)]
struct Journal {
    entries: Mutex<Vec<String>>,
}

impl Journal {
    fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }
}

struct Recorder {
    journal: Arc<Journal>,
    fail_mount: bool,
}

#[async_trait::async_trait]
impl Panel for Recorder {
    async fn on_mount(&mut self, ctx: &PanelContext) -> Result<(), PanelError> {
        self.journal.push(format!("mount:{}", ctx.panel_id()));
        if self.fail_mount {
            return Err(PanelError::Mount("prefetch failed".into()));
        }
        Ok(())
    }

    async fn on_unmount(&mut self, ctx: &PanelContext) -> Result<(), PanelError> {
        self.journal.push(format!("unmount:{}", ctx.panel_id()));
        Ok(())
    }

    fn render(&self, inputs: &PanelInputs, _props: &PanelProps) -> PanelView {
        self.journal
            .push(format!("render:{}", inputs.context.panel_id()));
        let file = inputs
            .context
            .slices()
            .get_slice("active-file")
            .and_then(|s| s.data.clone());
        PanelView(json!({ "file": file }))
    }
}

fn recorder(id: &str, journal: &Arc<Journal>, fail_mount: bool) -> PanelDefinition {
    let journal = journal.clone();
    PanelDefinition::new(
        PanelMetadata::new(id, id, "0.1.0").with_description("records lifecycle calls"),
        move || Recorder {
            journal: journal.clone(),
            fail_mount,
        },
    )
}

#[tokio::test]
async fn duplicate_ids_are_rejected() {
    let journal = Arc::new(Journal::default());
    let mut host = PanelHost::new();
    host.register(recorder("notes", &journal, false)).unwrap();
    let err = host
        .register(recorder("notes", &journal, false))
        .unwrap_err();
    assert!(matches!(err, HostError::DuplicatePanel(ref id) if id == "notes"));
    assert_eq!(host.registered_ids(), ["notes".to_string()]);
}

#[tokio::test]
async fn mount_runs_once_before_render_and_unmount_after() {
    let journal = Arc::new(Journal::default());
    let mut host = PanelHost::new();
    host.register(recorder("notes", &journal, false)).unwrap();

    let first = host.mount("notes").await.unwrap();
    host.render("notes", &PanelProps::default()).unwrap();
    host.render("notes", &PanelProps::default()).unwrap();
    host.unmount("notes").await.unwrap();

    assert_eq!(
        journal.entries(),
        vec![
            "mount:notes",
            "render:notes",
            "render:notes",
            "unmount:notes"
        ]
    );

    // A new mount is a new instance, never the old one revived.
    let second = host.mount("notes").await.unwrap();
    assert_ne!(first, second);
    assert_eq!(host.state("notes"), Some(LifecycleState::Mounted));
}

#[tokio::test]
async fn failed_mount_is_isolated() {
    let journal = Arc::new(Journal::default());
    let mut host = PanelHost::new();
    host.register(recorder("broken", &journal, true)).unwrap();
    host.register(recorder("healthy", &journal, false)).unwrap();

    let report = host.mount_all().await;
    assert_eq!(report.ok, vec!["healthy".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "broken");

    assert!(matches!(
        host.render("broken", &PanelProps::default()),
        Err(HostError::NotMounted(_))
    ));
    host.render("healthy", &PanelProps::default()).unwrap();

    let entries = journal.entries();
    assert!(entries.contains(&"unmount:broken".to_string()));
    assert!(!entries.contains(&"render:broken".to_string()));
}

#[tokio::test]
async fn slice_updates_trigger_rerender() {
    let journal = Arc::new(Journal::default());
    let mut host = PanelHost::new();
    host.register(recorder("notes", &journal, false)).unwrap();
    host.mount("notes").await.unwrap();

    let props = PanelProps::default();
    let view = host.render_if_stale("notes", &props).unwrap().unwrap();
    assert_eq!(view.0["file"], json!(null));
    assert!(host.render_if_stale("notes", &props).unwrap().is_none());

    host.slices()
        .set(SliceScope::Workspace, "active-file", json!({"path": "a.md"}));
    let view = host.render_if_stale("notes", &props).unwrap().unwrap();
    assert_eq!(view.0["file"]["path"], "a.md");
}

struct CountingHooks {
    loads: AtomicU32,
    unloads: AtomicU32,
}

#[async_trait::async_trait]
impl PackageHooks for CountingHooks {
    async fn on_package_load(&self) -> Result<(), PanelError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_package_unload(&self) -> Result<(), PanelError> {
        self.unloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn packages_load_and_unload_as_a_unit() {
    let journal = Arc::new(Journal::default());
    let hooks = Arc::new(CountingHooks {
        loads: AtomicU32::new(0),
        unloads: AtomicU32::new(0),
    });
    let package = PanelPackage::new(
        "writing",
        vec![
            recorder("notes", &journal, false),
            recorder("outline", &journal, false),
            recorder("notes", &journal, false),
        ],
    )
    .with_hooks(hooks.clone());

    let mut host = PanelHost::new();
    let report = host.load_package(package).await.unwrap();
    assert_eq!(report.ok, vec!["notes".to_string(), "outline".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(hooks.loads.load(Ordering::SeqCst), 1);

    host.mount_all().await;
    let report = host.unload_package("writing").await.unwrap();
    assert!(report.is_success());
    assert_eq!(hooks.unloads.load(Ordering::SeqCst), 1);
    assert!(host.registered_ids().is_empty());
    assert_eq!(
        journal
            .entries()
            .iter()
            .filter(|e| e.starts_with("unmount:"))
            .count(),
        2
    );
    assert!(matches!(
        host.unload_package("writing").await,
        Err(HostError::UnknownPackage(_))
    ));
}

#[tokio::test]
async fn tool_event_reaches_exact_type_subscriber() {
    let mut host = PanelHost::new();
    let metadata = PanelMetadata::new("viewer", "Viewer", "1.0.0")
        .with_description("font tools")
        .with_tools(vec![ToolSpec::panel_event(
            "change_font_size",
            "Change the font size",
            "markdown-panel:change-font-size",
        )
        .with_inputs(ToolSchema::object().required_property(
            "size",
            PropertySchema::string_enum(["small", "medium", "large", "xlarge"]),
        ))
        .with_tags(["display"])]);
    let journal = Arc::new(Journal::default());
    let j = journal.clone();
    host.register(PanelDefinition::new(metadata, move || Recorder {
        journal: j.clone(),
        fail_mount: false,
    }))
    .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    host.bus().on("markdown-panel:change-font-size", move |ev| {
        sink.lock().unwrap().push(ev.payload.clone());
        Ok(())
    });
    host.bus().on("markdown-panel:change-font", |_| {
        panic!("prefix types must not match")
    });

    let invocation = host
        .tool_invoker()
        .invoke("change_font_size", json!({"size": "large"}))
        .unwrap();
    assert_eq!(invocation.delivered, 1);
    assert_eq!(*seen.lock().unwrap(), vec![json!({"size": "large"})]);
}

#[tokio::test]
async fn shutdown_unmounts_everything() {
    let journal = Arc::new(Journal::default());
    let mut host = PanelHost::new();
    host.register(recorder("a", &journal, false)).unwrap();
    host.register(recorder("b", &journal, false)).unwrap();
    host.mount_all().await;
    let report = host.shutdown().await;
    assert_eq!(report.ok, vec!["a".to_string(), "b".to_string()]);
    assert!(host.mounted_ids().is_empty());
}
