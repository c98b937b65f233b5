//! Headless contract types for markpane.
//!
//! Everything in this crate is plain serializable data: tool descriptions,
//! panel metadata and the slice vocabulary. Agents and server processes can
//! depend on it to discover panel capabilities without pulling in any host or
//! rendering code.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub mod manifest;
pub mod tool;

pub use manifest::{
    ManifestFormat, ManifestLoadError, PanelMetadata, ValidationIssue, ValidationReport,
    PANEL_API_VERSION,
};
pub use tool::{
    PropertySchema, SchemaType, ToolCallTemplate, ToolSchema, ToolSpec, ToolsMetadata,
};

/// Lifetime/visibility domain of a data slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SliceScope {
    Workspace,
    Repository,
}

impl SliceScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SliceScope::Workspace => "workspace",
            SliceScope::Repository => "repository",
        }
    }
}

/// Structured failure recorded on a slice after a fetch fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SliceError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl SliceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl std::fmt::Display for SliceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}
