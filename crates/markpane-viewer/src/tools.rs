//! Tool metadata of the markdown viewer.
//!
//! Compiled without the `panel` feature so agents can discover the tools
//! without pulling in the host runtime.

use markpane_protocol::{PropertySchema, ToolSchema, ToolSpec, ToolsMetadata};
use markpane_topics::{
    TOPIC_MARKDOWN_CHANGE_FONT_SIZE, TOPIC_MARKDOWN_NAVIGATE_SLIDE, TOPIC_MARKDOWN_OPEN_DOCUMENT,
    TOPIC_MARKDOWN_VIEW_MODE_CHANGE,
};
use serde::{Deserialize, Serialize};

use crate::{PANEL_DESCRIPTION, PANEL_ID, PANEL_NAME};

pub const TOOL_CHANGE_FONT_SIZE: &str = "change_font_size";
pub const TOOL_SET_VIEW_MODE: &str = "set_view_mode";
pub const TOOL_NAVIGATE_SLIDE: &str = "navigate_slide";
pub const TOOL_OPEN_DOCUMENT: &str = "open_document";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Document,
    Slide,
}

impl ViewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::Document => "document",
            ViewMode::Slide => "slide",
        }
    }
}

/// Named font sizes accepted by `change_font_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontSize {
    Small,
    Medium,
    Large,
    Xlarge,
}

impl FontSize {
    pub const ALL: [FontSize; 4] = [
        FontSize::Small,
        FontSize::Medium,
        FontSize::Large,
        FontSize::Xlarge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FontSize::Small => "small",
            FontSize::Medium => "medium",
            FontSize::Large => "large",
            FontSize::Xlarge => "xlarge",
        }
    }

    pub fn scale(&self) -> f64 {
        match self {
            FontSize::Small => 0.85,
            FontSize::Medium => 1.0,
            FontSize::Large => 1.25,
            FontSize::Xlarge => 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlideDirection {
    Next,
    Previous,
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFontSizeArgs {
    pub size: FontSize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetViewModeArgs {
    pub mode: ViewMode,
}

/// Either a relative move or an absolute zero-based index.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NavigateSlideArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<SlideDirection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenDocumentArgs {
    pub path: String,
}

/// The viewer's tools, in publication order.
pub fn tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec::panel_event(
            TOOL_CHANGE_FONT_SIZE,
            "Change the reading font size of the markdown viewer",
            TOPIC_MARKDOWN_CHANGE_FONT_SIZE,
        )
        .with_inputs(ToolSchema::object().required_property(
            "size",
            PropertySchema::string_enum(FontSize::ALL.iter().map(FontSize::as_str))
                .describe("Target font size"),
        ))
        .with_tags(["display", "accessibility"]),
        ToolSpec::panel_event(
            TOOL_SET_VIEW_MODE,
            "Switch between continuous document and slide presentation",
            TOPIC_MARKDOWN_VIEW_MODE_CHANGE,
        )
        .with_inputs(ToolSchema::object().required_property(
            "mode",
            PropertySchema::string_enum([ViewMode::Document.as_str(), ViewMode::Slide.as_str()])
                .describe("View mode"),
        ))
        .with_tags(["display", "presentation"]),
        ToolSpec::panel_event(
            TOOL_NAVIGATE_SLIDE,
            "Move to another slide while presenting",
            TOPIC_MARKDOWN_NAVIGATE_SLIDE,
        )
        .with_inputs(
            ToolSchema::object()
                .property(
                    "direction",
                    PropertySchema::string_enum(["next", "previous", "first", "last"])
                        .describe("Relative move"),
                )
                .property(
                    "index",
                    PropertySchema::integer()
                        .describe("Zero-based slide index")
                        .with_range(Some(0.0), None),
                ),
        )
        .with_tags(["navigation", "presentation"]),
        ToolSpec::panel_event(
            TOOL_OPEN_DOCUMENT,
            "Open a markdown document in the viewer",
            TOPIC_MARKDOWN_OPEN_DOCUMENT,
        )
        .with_inputs(ToolSchema::object().required_property(
            "path",
            PropertySchema::string().describe("Workspace-relative file path"),
        ))
        .with_tags(["navigation", "files"]),
    ]
}

pub fn tools_metadata() -> ToolsMetadata {
    ToolsMetadata {
        id: PANEL_ID.to_string(),
        name: PANEL_NAME.to_string(),
        description: PANEL_DESCRIPTION.to_string(),
        tools: tools(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn font_tool_matches_contract() {
        let meta = tools_metadata();
        let tool = meta.find(TOOL_CHANGE_FONT_SIZE).unwrap();
        assert_eq!(tool.inputs.required, vec!["size".to_string()]);
        let template = serde_json::to_value(&tool.tool_call_template).unwrap();
        assert_eq!(
            template,
            json!({
                "call_template_type": "panel_event",
                "event_type": "markdown-panel:change-font-size"
            })
        );
    }

    #[test]
    fn every_tool_is_namespaced_and_tagged() {
        for tool in tools() {
            assert!(markpane_topics::is_namespaced(tool.event_type()), "{}", tool.name);
            assert!(!tool.tags.is_empty(), "{}", tool.name);
            assert!(tool.inputs.dangling_required().is_empty());
        }
    }

    #[test]
    fn args_decode_from_payloads() {
        let args: ChangeFontSizeArgs = serde_json::from_value(json!({"size": "xlarge"})).unwrap();
        assert_eq!(args.size.scale(), 1.5);
        let nav: NavigateSlideArgs = serde_json::from_value(json!({"index": 3})).unwrap();
        assert_eq!(nav.index, Some(3));
        assert!(serde_json::from_value::<SetViewModeArgs>(json!({"mode": "grid"})).is_err());
    }
}
