//! Markdown viewer panel.
//!
//! The `tools` module and [`metadata`] are always available. The panel
//! itself, its view-state model and slide splitting sit behind the default
//! `panel` feature.

pub mod tools;

#[cfg(feature = "panel")]
mod content;
#[cfg(feature = "panel")]
mod panel;
#[cfg(feature = "panel")]
mod state;

use markpane_protocol::PanelMetadata;

pub use markpane_topics::ACTIVE_FILE_SLICE;
pub use tools::{tools, tools_metadata, FontSize, SlideDirection, ViewMode};

#[cfg(feature = "panel")]
pub use content::{split_slides, ActiveFile};
#[cfg(feature = "panel")]
pub use panel::{MarkdownViewer, SlideView, ViewStatus, ViewerView};
#[cfg(feature = "panel")]
pub use state::{Preferences, ViewerSettings, ViewerState, FONT_SCALE_MAX, FONT_SCALE_MIN, FONT_SCALE_STEP};

pub const PANEL_ID: &str = "markdown-viewer";
pub const PANEL_NAME: &str = "Markdown Viewer";
pub const PANEL_DESCRIPTION: &str =
    "Reads markdown documents as a continuous page or as a slide deck";
pub const PACKAGE_NAME: &str = "markpane-viewer";

pub fn metadata() -> PanelMetadata {
    PanelMetadata::new(PANEL_ID, PANEL_NAME, env!("CARGO_PKG_VERSION"))
        .with_icon("file-text")
        .with_description(PANEL_DESCRIPTION)
        .with_tools(tools())
}

#[cfg(feature = "panel")]
pub fn definition() -> markpane_core::PanelDefinition {
    markpane_core::PanelDefinition::new(metadata(), MarkdownViewer::new)
}

#[cfg(feature = "panel")]
pub fn package() -> markpane_core::PanelPackage {
    markpane_core::PanelPackage::new(PACKAGE_NAME, vec![definition()])
}
