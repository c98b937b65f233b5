use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use jsonschema::{validator_for, Validator};
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
pub struct HostConfig {
    /// Warn when an event type does not follow `<owner>:<action>`.
    #[serde(default)]
    pub strict_event_names: Option<bool>,
    /// Upper bound on registered panel definitions.
    #[serde(default)]
    pub max_panels: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset (eg. "info,markpane_core=debug").
    #[serde(default)]
    pub filter: Option<String>,
    /// Directory for rolling log files; console only when absent.
    #[serde(default)]
    pub log_dir: Option<String>,
    /// Rotation for file logs: "hourly", "daily" (default) or "never".
    #[serde(default)]
    pub rotation: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Free-form settings per panel id, handed to panels through their context.
    #[serde(default)]
    pub panels: BTreeMap<String, Value>,
}

impl Config {
    pub fn strict_event_names(&self) -> bool {
        self.host.strict_event_names.unwrap_or(false)
    }

    pub fn panel_settings(&self, panel_id: &str) -> Value {
        self.panels
            .get(panel_id)
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()))
    }

    /// Overlay `MARKPANE_STRICT_EVENTS` and `MARKPANE_LOG_DIR` from the environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Overlay overrides read through `lookup`. Unparseable or blank values are skipped.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(strict) = lookup("MARKPANE_STRICT_EVENTS").and_then(|raw| switch(&raw)) {
            self.host.strict_event_names = Some(strict);
        }
        if let Some(dir) = lookup("MARKPANE_LOG_DIR").filter(|d| !d.trim().is_empty()) {
            self.logging.log_dir = Some(dir);
        }
    }
}

/// On/off switch values accepted in `MARKPANE_*` variables.
fn switch(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        other => {
            tracing::warn!(value = other, "ignoring unrecognised switch value");
            None
        }
    }
}

static CONFIG_SCHEMA: Lazy<Validator> = Lazy::new(|| {
    let schema = schemars::schema_for!(Config);
    let schema_value = serde_json::to_value(&schema).expect("schema value");
    validator_for(&schema_value).expect("valid schema")
});

/// Returns the JSON schema describing the configuration structure.
///
/// # Panics
///
/// Panics if schema generation fails; this indicates a programming error.
pub fn config_schema_json() -> serde_json::Value {
    let schema = schemars::schema_for!(Config);
    serde_json::to_value(&schema).expect("schema json")
}

pub fn write_schema_file(path: &str) -> std::io::Result<()> {
    let schema_json = config_schema_json();
    std::fs::write(path, serde_json::to_string_pretty(&schema_json)?)
}

/// Parse and schema-check TOML configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let raw: toml::Value = toml::from_str(content)?;
    let json_value = serde_json::to_value(&raw)?;
    let validation_errors: Vec<_> = CONFIG_SCHEMA
        .iter_errors(&json_value)
        .map(|e| e.to_string())
        .collect();
    if !validation_errors.is_empty() {
        return Err(anyhow::anyhow!(validation_errors.join(", ")));
    }
    let cfg: Config = toml::from_str(content)?;
    Ok(cfg)
}

pub fn load_config(path: &str) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Config path from `MARKPANE_CONFIG`, else `markpane.toml` in the working
/// directory when it exists.
pub fn resolve_config_path() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    config_path_in(std::env::var("MARKPANE_CONFIG").ok(), &cwd)
}

fn config_path_in(explicit: Option<String>, cwd: &Path) -> Option<PathBuf> {
    if let Some(explicit) = explicit.filter(|p| !p.trim().is_empty()) {
        return Some(PathBuf::from(explicit));
    }
    let local = cwd.join("markpane.toml");
    local.exists().then_some(local)
}

/// Load the effective configuration: resolved file (if any) plus env overrides.
/// An invalid file is logged and replaced by defaults.
pub fn load_effective_config() -> Config {
    let mut cfg = match resolve_config_path() {
        Some(path) => match load_config(&path.to_string_lossy()) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::error!("invalid config {}: {}", path.display(), e);
                Config::default()
            }
        },
        None => Config::default(),
    };
    cfg.apply_env_overrides();
    cfg
}
