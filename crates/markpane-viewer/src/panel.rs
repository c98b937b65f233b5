use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use markpane_core::{
    ActionKind, Panel, PanelContext, PanelError, PanelInputs, PanelProps, PanelView, SliceReader,
};
use markpane_events::PanelEvent;
use markpane_topics::{
    ACTIVE_FILE_SLICE, TOPIC_FILE_CLOSED, TOPIC_FILE_OPENED, TOPIC_MARKDOWN_CHANGE_FONT_SIZE,
    TOPIC_MARKDOWN_NAVIGATE_SLIDE, TOPIC_MARKDOWN_OPEN_DOCUMENT,
    TOPIC_MARKDOWN_PREFERENCES_CHANGED, TOPIC_MARKDOWN_REQUEST_PREFERENCES,
    TOPIC_MARKDOWN_SET_PREFERENCES, TOPIC_MARKDOWN_VIEW_MODE_CHANGE, TOPIC_VIEWPORT_RESIZED,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::content::{split_slides, ActiveFile};
use crate::state::{Preferences, ViewerSettings, ViewerState};
use crate::tools::{ChangeFontSizeArgs, NavigateSlideArgs, OpenDocumentArgs, SetViewModeArgs, ViewMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewStatus {
    Empty,
    Loading,
    Error,
    Document,
    Slide,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideView {
    pub index: usize,
    pub count: usize,
    pub content: String,
    pub has_previous: bool,
    pub has_next: bool,
}

/// View model handed to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerView {
    pub status: ViewStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub view_mode: ViewMode,
    pub font_scale: f64,
    pub is_mobile: bool,
    /// Whether the host can open files; the open control is hidden otherwise.
    pub can_open_files: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide: Option<SlideView>,
    /// Inline error. Set together with stale content after a failed refresh.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub refreshing: bool,
}

enum Source {
    Empty,
    Loading {
        path: Option<String>,
    },
    Failed {
        path: Option<String>,
        message: String,
    },
    Ready {
        path: Option<String>,
        content: String,
        refreshing: bool,
        error: Option<String>,
    },
}

/// Controlled content wins; otherwise the `active-file` workspace slice.
fn resolve_source(path: Option<&str>, content: Option<&str>, slices: &SliceReader) -> Source {
    if let Some(content) = content {
        return Source::Ready {
            path: path.map(str::to_string),
            content: content.to_string(),
            refreshing: false,
            error: None,
        };
    }
    let wanted = path.map(str::to_string);
    let Some(slice) = slices.get_workspace_slice(ACTIVE_FILE_SLICE) else {
        return match wanted {
            Some(path) => Source::Loading { path: Some(path) },
            None => Source::Empty,
        };
    };
    let error = slice.error.as_ref().map(|e| e.message.clone());
    match slice.decode::<ActiveFile>() {
        Ok(Some(file)) => {
            if wanted.as_ref().is_some_and(|p| *p != file.path) {
                return Source::Loading { path: wanted };
            }
            Source::Ready {
                path: Some(file.path),
                content: file.content,
                refreshing: slice.loading,
                error,
            }
        }
        Ok(None) => match (error, slice.loading) {
            (Some(message), _) => Source::Failed {
                path: wanted,
                message,
            },
            (None, true) => Source::Loading { path: wanted },
            (None, false) if wanted.is_some() => Source::Loading { path: wanted },
            (None, false) => Source::Empty,
        },
        Err(err) => Source::Failed {
            path: wanted,
            message: format!("unreadable active file: {err}"),
        },
    }
}

/// Markdown viewer panel with document and slide modes.
///
/// View state lives behind a mutex shared with the bus handlers installed by
/// `attach`; `render` only reads it.
pub struct MarkdownViewer {
    state: Arc<Mutex<ViewerState>>,
    settings: ViewerSettings,
}

impl Default for MarkdownViewer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownViewer {
    pub fn new() -> Self {
        let settings = ViewerSettings::default();
        Self {
            state: Arc::new(Mutex::new(ViewerState::new(&settings))),
            settings,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ViewerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handlers(&self, inputs: &PanelInputs) -> Handlers {
        Handlers {
            state: self.state.clone(),
            inputs: inputs.clone(),
        }
    }
}

/// Shared pieces captured by every bus handler.
#[derive(Clone)]
struct Handlers {
    state: Arc<Mutex<ViewerState>>,
    inputs: PanelInputs,
}

impl Handlers {
    fn lock(&self) -> MutexGuard<'_, ViewerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe<F>(&self, event_type: &'static str, handle: F)
    where
        F: Fn(&Handlers, &PanelEvent) + Send + Sync + 'static,
    {
        let this = self.clone();
        self.inputs.events.on(event_type, move |event| {
            handle(&this, event);
            Ok(())
        });
    }

    /// Typed payload, or `None` after logging a malformed one.
    fn decode<T: DeserializeOwned>(event: &PanelEvent) -> Option<T> {
        match event.payload_as::<T>() {
            Ok(args) => Some(args),
            Err(err) => {
                tracing::warn!(
                    event_type = %event.event_type,
                    error = %err,
                    "ignoring malformed payload"
                );
                None
            }
        }
    }

    fn slide_count(&self) -> usize {
        let (path, content) = {
            let state = self.lock();
            (state.controlled_path.clone(), state.controlled_content.clone())
        };
        match resolve_source(
            path.as_deref(),
            content.as_deref(),
            self.inputs.context.slices(),
        ) {
            Source::Ready { content, .. } => split_slides(&content).len(),
            _ => 0,
        }
    }

    fn persist(&self, prefs: Preferences) {
        let payload = serde_json::to_value(&prefs).unwrap_or_else(|_| json!({}));
        self.inputs
            .events
            .emit(TOPIC_MARKDOWN_PREFERENCES_CHANGED, payload);
    }

    fn file_opened(&self, event: &PanelEvent) {
        self.lock().reset_position();
        tracing::debug!(path = ?event.payload.get("path"), "document opened");
        self.inputs.invalidate();
    }

    fn file_closed(&self, _event: &PanelEvent) {
        self.lock().reset_position();
        self.inputs.invalidate();
    }

    fn viewport_resized(&self, event: &PanelEvent) {
        #[derive(Deserialize)]
        struct Resized {
            width: u32,
        }
        if let Some(resized) = Self::decode::<Resized>(event) {
            self.lock().viewport_width = Some(resized.width);
            self.inputs.invalidate();
        }
    }

    fn change_font_size(&self, event: &PanelEvent) {
        let Some(args) = Self::decode::<ChangeFontSizeArgs>(event) else {
            return;
        };
        let changed = {
            let mut state = self.lock();
            state.set_font_scale(args.size.scale()).then(|| state.preferences())
        };
        if let Some(prefs) = changed {
            self.persist(prefs);
            self.inputs.invalidate();
        }
    }

    fn set_view_mode(&self, event: &PanelEvent) {
        let Some(args) = Self::decode::<SetViewModeArgs>(event) else {
            return;
        };
        let changed = {
            let mut state = self.lock();
            state.set_view_mode(args.mode).then(|| state.preferences())
        };
        if let Some(prefs) = changed {
            self.persist(prefs);
            self.inputs.invalidate();
        }
    }

    fn navigate_slide(&self, event: &PanelEvent) {
        let Some(args) = Self::decode::<NavigateSlideArgs>(event) else {
            return;
        };
        let count = self.slide_count();
        {
            let mut state = self.lock();
            match (args.index, args.direction) {
                (Some(index), _) => state.go_to(index, count),
                (None, Some(direction)) => state.navigate(direction, count),
                (None, None) => {
                    tracing::warn!("navigate_slide needs a direction or an index");
                    return;
                }
            }
        }
        self.inputs.invalidate();
    }

    fn open_document(&self, event: &PanelEvent) {
        let Some(args) = Self::decode::<OpenDocumentArgs>(event) else {
            return;
        };
        if !self.inputs.actions.supports(ActionKind::OpenFile) {
            tracing::debug!(path = %args.path, "host cannot open files");
            return;
        }
        if let Err(err) = self.inputs.actions.open_file(&args.path) {
            tracing::warn!(path = %args.path, error = %err, "open_file failed");
        }
    }

    fn set_preferences(&self, event: &PanelEvent) {
        let Some(prefs) = Self::decode::<Preferences>(event) else {
            return;
        };
        if self.lock().apply_preferences(&prefs) {
            self.inputs.invalidate();
        } else {
            tracing::debug!(source = %event.source, "ignoring late preferences");
        }
    }

    /// Ask the host for stored preferences, at most once per instance.
    fn request_preferences(&self) {
        let first = {
            let mut state = self.lock();
            !std::mem::replace(&mut state.preferences_requested, true)
        };
        if first {
            let panel = self.inputs.context.panel_id().to_string();
            self.inputs
                .events
                .emit(TOPIC_MARKDOWN_REQUEST_PREFERENCES, json!({ "panel": panel }));
        }
    }
}

#[async_trait::async_trait]
impl Panel for MarkdownViewer {
    async fn on_mount(&mut self, ctx: &PanelContext) -> Result<(), PanelError> {
        self.settings = ViewerSettings::from_value(ctx.settings());
        *self.lock() = ViewerState::new(&self.settings);
        tracing::info!(
            panel = ctx.panel_id(),
            breakpoint = self.settings.mobile_breakpoint,
            "markdown viewer ready"
        );
        Ok(())
    }

    fn attach(&mut self, inputs: &PanelInputs) -> Result<(), PanelError> {
        let h = self.handlers(inputs);
        h.subscribe(TOPIC_FILE_OPENED, Handlers::file_opened);
        h.subscribe(TOPIC_FILE_CLOSED, Handlers::file_closed);
        h.subscribe(TOPIC_VIEWPORT_RESIZED, Handlers::viewport_resized);
        h.subscribe(TOPIC_MARKDOWN_CHANGE_FONT_SIZE, Handlers::change_font_size);
        h.subscribe(TOPIC_MARKDOWN_VIEW_MODE_CHANGE, Handlers::set_view_mode);
        h.subscribe(TOPIC_MARKDOWN_NAVIGATE_SLIDE, Handlers::navigate_slide);
        h.subscribe(TOPIC_MARKDOWN_OPEN_DOCUMENT, Handlers::open_document);
        h.subscribe(TOPIC_MARKDOWN_SET_PREFERENCES, Handlers::set_preferences);
        h.request_preferences();
        Ok(())
    }

    fn on_props(&mut self, _inputs: &PanelInputs, props: &PanelProps) {
        let mut state = self.lock();
        if state.controlled_path != props.file_path {
            state.reset_position();
        }
        state.controlled_path = props.file_path.clone();
        state.controlled_content = props.content.clone();
    }

    fn render(&self, inputs: &PanelInputs, props: &PanelProps) -> PanelView {
        let state = self.lock().clone();
        let source = resolve_source(
            props.file_path.as_deref(),
            props.content.as_deref(),
            inputs.context.slices(),
        );
        let mut view = ViewerView {
            status: ViewStatus::Empty,
            file_path: None,
            view_mode: state.view_mode,
            font_scale: state.font_scale,
            is_mobile: state.is_mobile(props.viewport_width, self.settings.mobile_breakpoint),
            can_open_files: inputs.actions.supports(ActionKind::OpenFile),
            document: None,
            slide: None,
            error: None,
            refreshing: false,
        };
        match source {
            Source::Empty => {}
            Source::Loading { path } => {
                view.status = ViewStatus::Loading;
                view.file_path = path;
            }
            Source::Failed { path, message } => {
                view.status = ViewStatus::Error;
                view.file_path = path;
                view.error = Some(message);
            }
            Source::Ready {
                path,
                content,
                refreshing,
                error,
            } => {
                view.file_path = path;
                view.refreshing = refreshing;
                view.error = error;
                match state.view_mode {
                    ViewMode::Document => {
                        view.status = ViewStatus::Document;
                        view.document = Some(content);
                    }
                    ViewMode::Slide => {
                        let slides = split_slides(&content);
                        let count = slides.len();
                        let index = state.slide_index.min(count - 1);
                        view.status = ViewStatus::Slide;
                        view.slide = Some(SlideView {
                            index,
                            count,
                            has_previous: index > 0,
                            has_next: index + 1 < count,
                            content: slides.into_iter().nth(index).unwrap_or_default(),
                        });
                    }
                }
            }
        }
        PanelView::from_serialize(&view)
    }
}
