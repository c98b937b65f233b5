use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use schemars::JsonSchema;
use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tool::{ToolSpec, ToolsMetadata};

/// Version of the panel metadata layout. Version 2 is the nested
/// `metadata { .. tools }` form; the flat version 1 layout is not accepted.
pub const PANEL_API_VERSION: u32 = 2;

/// On-disk encodings a panel manifest may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Json,
    Toml,
}

impl ManifestFormat {
    /// Format implied by the file extension, if it names one.
    pub fn for_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(ManifestFormat::Json),
            "toml" => Some(ManifestFormat::Toml),
            _ => None,
        }
    }
}

/// Registration metadata a panel publishes to its host.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct PanelMetadata {
    #[serde(default = "PanelMetadata::default_api_version")]
    pub api_version: u32,
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,
}

impl PanelMetadata {
    const fn default_api_version() -> u32 {
        PANEL_API_VERSION
    }

    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            api_version: PANEL_API_VERSION,
            id: id.into(),
            name: name.into(),
            icon: None,
            version: version.into(),
            author: None,
            description: String::new(),
            tools: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    /// Aggregate tool listing used for discovery.
    pub fn tools_metadata(&self) -> ToolsMetadata {
        ToolsMetadata {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            tools: self.tools.clone(),
        }
    }

    /// Decode a manifest in a known format. Validation is separate; see
    /// [`PanelMetadata::validate`].
    pub fn parse(input: &str, format: ManifestFormat) -> Result<Self, ManifestLoadError> {
        let metadata = match format {
            ManifestFormat::Json => serde_json::from_str(input)?,
            ManifestFormat::Toml => toml::from_str(input)?,
        };
        Ok(metadata)
    }

    /// Read a `.json` or `.toml` manifest from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestLoadError> {
        let path = path.as_ref();
        let format = ManifestFormat::for_path(path)
            .ok_or_else(|| ManifestLoadError::UnknownFormat(path.to_path_buf()))?;
        let raw = fs::read_to_string(path).map_err(|source| ManifestLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, format)
    }

    /// Check metadata fields and tool declarations.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        if self.api_version != PANEL_API_VERSION {
            report.push_error(
                "api_version".to_string(),
                format!(
                    "unsupported api_version {} (expected {})",
                    self.api_version, PANEL_API_VERSION
                ),
            );
        }

        if self.id.trim().is_empty() {
            report.push_error("id", "identifier is required");
        } else if !is_valid_id(&self.id) {
            report.push_error(
                "id",
                "identifier must contain only ASCII letters, digits, '.', '-', or '_'",
            );
        }

        if self.name.trim().is_empty() {
            report.push_error("name", "display name is required");
        }

        if self.version.trim().is_empty() {
            report.push_error("version", "version is required");
        } else if Version::parse(self.version.trim()).is_err() {
            report.push_error(
                "version",
                "version must use semantic versioning (eg. 0.1.0)",
            );
        }

        if self.description.trim().is_empty() {
            report.push_warning("description", "description helps agents pick the right panel");
        }

        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for (idx, tool) in self.tools.iter().enumerate() {
            let field = format!("tools[{}]", idx);
            if tool.name.trim().is_empty() {
                report.push_error(format!("{field}.name"), "tool name is required".to_string());
            } else if !seen.insert(tool.name.as_str()) {
                report.push_error(
                    format!("{field}.name"),
                    format!("duplicate tool name: {}", tool.name),
                );
            }
            let event_type = tool.event_type();
            if !markpane_topics::is_namespaced(event_type) {
                report.push_error(
                    format!("{field}.tool_call_template.event_type"),
                    format!("event type '{}' must follow <owner>:<action>", event_type),
                );
            }
            for missing in tool.inputs.dangling_required() {
                report.push_error(
                    format!("{field}.inputs.required"),
                    format!("required input '{}' has no property schema", missing),
                );
            }
            if tool.description.trim().is_empty() {
                report.push_warning(
                    format!("{field}.description"),
                    "tool description is empty".to_string(),
                );
            }
            if tool.tags.is_empty() {
                report.push_warning(
                    format!("{field}.tags"),
                    "untagged tools are only discoverable by name".to_string(),
                );
            }
        }

        report
    }
}

/// Report emitted by [`PanelMetadata::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationReport {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ValidationIssue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn push_error<S: Into<String>>(&mut self, field: S, message: S) {
        self.errors.push(ValidationIssue::new(field, message));
    }

    pub fn push_warning<S: Into<String>>(&mut self, field: S, message: S) {
        self.warnings.push(ValidationIssue::new(field, message));
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined: Vec<String> = self
            .errors
            .iter()
            .map(|issue| format!("{}: {}", issue.field, issue.message))
            .collect();
        f.write_str(&joined.join("; "))
    }
}

/// Individual validation issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new<S: Into<String>>(field: S, message: S) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ManifestLoadError {
    #[error("panel manifest {} must end in .json or .toml", .0.display())]
    UnknownFormat(PathBuf),
    #[error("cannot read panel manifest {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON panel manifest: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid TOML panel manifest: {0}")]
    Toml(#[from] toml::de::Error),
}

fn is_valid_id(value: &str) -> bool {
    value
        .chars()
        .all(|c| matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{PropertySchema, ToolSchema};
    use once_cell::sync::Lazy;

    static SAMPLE_MANIFEST: Lazy<String> = Lazy::new(|| {
        let tool = ToolSpec::panel_event(
            "change_font_size",
            "Change the document font size",
            "markdown-panel:change-font-size",
        )
        .with_inputs(
            ToolSchema::object()
                .required_property("size", PropertySchema::string_enum(["small", "large"])),
        )
        .with_tags(["display"]);
        serde_json::to_string_pretty(
            &PanelMetadata::new("markdown-viewer", "Markdown Viewer", "0.1.0")
                .with_description("Renders markdown as a document or slides")
                .with_icon("file-text")
                .with_tools(vec![tool]),
        )
        .unwrap()
    });

    #[test]
    fn manifest_parses_and_validates() {
        let manifest =
            PanelMetadata::parse(&SAMPLE_MANIFEST, ManifestFormat::Json).expect("manifest parse");
        let report = manifest.validate();
        assert!(report.is_success(), "unexpected errors: {report}");
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn api_version_defaults_when_absent() {
        let manifest = PanelMetadata::parse(
            r#"id = "git-changes"
name = "Git Changes"
version = "1.2.3"
"#,
            ManifestFormat::Toml,
        )
        .unwrap();
        assert_eq!(manifest.api_version, PANEL_API_VERSION);
        assert!(manifest.tools.is_empty());
    }

    #[test]
    fn manifest_detects_invalid_id_and_version() {
        let mut manifest = PanelMetadata::parse(&SAMPLE_MANIFEST, ManifestFormat::Json).unwrap();
        manifest.id = "spaces not allowed".into();
        manifest.version = "one".into();
        let report = manifest.validate();
        assert!(report.errors.iter().any(|issue| issue.field == "id"));
        assert!(report.errors.iter().any(|issue| issue.field == "version"));
    }

    #[test]
    fn legacy_api_version_is_an_error() {
        let mut manifest = PanelMetadata::parse(&SAMPLE_MANIFEST, ManifestFormat::Json).unwrap();
        manifest.api_version = 1;
        assert!(manifest
            .validate()
            .errors
            .iter()
            .any(|issue| issue.field == "api_version"));
    }

    #[test]
    fn duplicate_tools_and_bad_event_types_are_errors() {
        let mut manifest = PanelMetadata::parse(&SAMPLE_MANIFEST, ManifestFormat::Json).unwrap();
        let mut dup = manifest.tools[0].clone();
        dup.tool_call_template = crate::ToolCallTemplate::panel_event("changeFontSize");
        manifest.tools.push(dup);
        let report = manifest.validate();
        assert!(report
            .errors
            .iter()
            .any(|issue| issue.message.contains("duplicate tool name")));
        assert!(report
            .errors
            .iter()
            .any(|issue| issue.field == "tools[1].tool_call_template.event_type"));
    }

    #[test]
    fn untagged_tool_is_a_warning() {
        let mut manifest = PanelMetadata::parse(&SAMPLE_MANIFEST, ManifestFormat::Json).unwrap();
        manifest.tools[0].tags.clear();
        let report = manifest.validate();
        assert!(report.is_success());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].field, "tools[0].tags");
    }

    #[test]
    fn load_picks_format_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("viewer.JSON");
        fs::write(&path, SAMPLE_MANIFEST.as_bytes()).unwrap();
        let manifest = PanelMetadata::load(&path).unwrap();
        assert_eq!(manifest.id, "markdown-viewer");
        assert_eq!(manifest.tools_metadata().tools.len(), 1);
    }

    #[test]
    fn load_errors_name_the_manifest() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("viewer.yaml");
        fs::write(&yaml, "id: x").unwrap();
        let err = PanelMetadata::load(&yaml).unwrap_err();
        assert!(matches!(err, ManifestLoadError::UnknownFormat(_)));
        assert!(err.to_string().contains("viewer.yaml"));

        let missing = dir.path().join("absent.toml");
        let err = PanelMetadata::load(&missing).unwrap_err();
        assert!(matches!(err, ManifestLoadError::Read { .. }));
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn malformed_input_reports_its_format() {
        let err = PanelMetadata::parse("{{ not valid", ManifestFormat::Json).unwrap_err();
        assert!(matches!(err, ManifestLoadError::Json(_)));
        let err = PanelMetadata::parse("id = ", ManifestFormat::Toml).unwrap_err();
        assert!(err.to_string().starts_with("invalid TOML"));
    }
}
