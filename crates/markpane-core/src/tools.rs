//! Agent-side tool discovery and invocation.
//!
//! Tool metadata is plain data; this layer matches a tool by name or tag,
//! checks the arguments against its input schema and turns the call into an
//! emit of the tool's event type.

use jsonschema::validator_for;
use markpane_events::{Delivery, EventBus, PanelEvent};
use markpane_protocol::{ToolSpec, ToolsMetadata};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolInvokeError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("unknown panel: {0}")]
    UnknownPanel(String),
    #[error("tool {name} is offered by several panels: {}", panels.join(", "))]
    Ambiguous { name: String, panels: Vec<String> },
    #[error("tool {tool} has an unusable input schema: {message}")]
    InvalidSchema { tool: String, message: String },
    #[error("invalid arguments for {tool}: {}", errors.join("; "))]
    InvalidArguments { tool: String, errors: Vec<String> },
}

/// Record of one dispatched tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub panel_id: String,
    pub tool: String,
    pub event_type: String,
    pub delivered: usize,
    pub failed: usize,
}

impl Invocation {
    /// True when no handler listened for the event.
    pub fn is_noop(&self) -> bool {
        self.delivered == 0 && self.failed == 0
    }
}

#[derive(Clone)]
pub struct ToolInvoker {
    bus: EventBus,
    catalog: Vec<ToolsMetadata>,
}

impl ToolInvoker {
    pub fn new(bus: EventBus, catalog: Vec<ToolsMetadata>) -> Self {
        Self { bus, catalog }
    }

    pub fn catalog(&self) -> &[ToolsMetadata] {
        &self.catalog
    }

    /// Every tool as `(panel id, spec)`, in catalog order.
    pub fn tools(&self) -> impl Iterator<Item = (&str, &ToolSpec)> {
        self.catalog
            .iter()
            .flat_map(|meta| meta.tools.iter().map(move |t| (meta.id.as_str(), t)))
    }

    /// First tool named `name` across all panels.
    pub fn find(&self, name: &str) -> Option<(&str, &ToolSpec)> {
        self.tools().find(|(_, t)| t.name == name)
    }

    pub fn find_in(&self, panel_id: &str, name: &str) -> Option<&ToolSpec> {
        self.catalog
            .iter()
            .find(|meta| meta.id == panel_id)
            .and_then(|meta| meta.find(name))
    }

    pub fn find_by_tag(&self, tag: &str) -> Vec<(&str, &ToolSpec)> {
        self.tools().filter(|(_, t)| t.has_tag(tag)).collect()
    }

    /// Check `args` against the tool's input schema.
    pub fn validate(spec: &ToolSpec, args: &Value) -> Result<(), ToolInvokeError> {
        let schema = spec.inputs.to_json_schema();
        let validator = validator_for(&schema).map_err(|e| ToolInvokeError::InvalidSchema {
            tool: spec.name.clone(),
            message: e.to_string(),
        })?;
        let errors: Vec<String> = validator.iter_errors(args).map(|e| e.to_string()).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ToolInvokeError::InvalidArguments {
                tool: spec.name.clone(),
                errors,
            })
        }
    }

    /// Invoke a tool by name. Fails when more than one panel offers it.
    pub fn invoke(&self, name: &str, args: Value) -> Result<Invocation, ToolInvokeError> {
        let owners: Vec<&str> = self
            .tools()
            .filter(|(_, t)| t.name == name)
            .map(|(panel, _)| panel)
            .collect();
        match owners.as_slice() {
            [] => Err(ToolInvokeError::UnknownTool(name.to_string())),
            [panel] => self.invoke_on(panel, name, args),
            many => Err(ToolInvokeError::Ambiguous {
                name: name.to_string(),
                panels: many.iter().map(|p| p.to_string()).collect(),
            }),
        }
    }

    pub fn invoke_on(
        &self,
        panel_id: &str,
        name: &str,
        args: Value,
    ) -> Result<Invocation, ToolInvokeError> {
        if !self.catalog.iter().any(|meta| meta.id == panel_id) {
            return Err(ToolInvokeError::UnknownPanel(panel_id.to_string()));
        }
        let spec = self
            .find_in(panel_id, name)
            .ok_or_else(|| ToolInvokeError::UnknownTool(name.to_string()))?;
        Self::validate(spec, &args)?;

        let event_type = spec.event_type().to_string();
        let Delivery { delivered, failed } = self.bus.emit(&PanelEvent::new(
            event_type.clone(),
            markpane_topics::SOURCE_AGENT,
            args,
        ));
        if delivered == 0 && failed == 0 {
            tracing::debug!(tool = name, event_type = %event_type, "tool event had no listeners");
        }
        Ok(Invocation {
            panel_id: panel_id.to_string(),
            tool: name.to_string(),
            event_type,
            delivered,
            failed,
        })
    }
}
