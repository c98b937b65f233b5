//! Host side of the markpane panel contract.
//!
//! [`PanelHost`] owns the shared resources (slice store, event bus, actions)
//! and drives each panel through `Unregistered -> Mounted -> Unmounted`.
//! Panels only ever see what is injected through [`PanelInputs`].

pub mod actions;
mod config;
pub mod host;
pub mod panel;
pub mod runtime;
pub mod slices;
pub mod tools;

pub use actions::{ActionError, ActionKind, ActionResult, GitFileStatus, PanelActions};
pub use config::{
    config_schema_json, load_config, load_effective_config, parse_config, resolve_config_path,
    write_schema_file, Config, HostConfig, LoggingConfig,
};
pub use host::{HostError, PanelHost, PanelReport};
pub use panel::{
    PackageHooks, Panel, PanelContext, PanelDefinition, PanelError, PanelEvents, PanelInputs,
    PanelPackage, PanelProps, PanelView, RenderSignal,
};
pub use runtime::{LifecycleState, PanelRuntime};
pub use slices::{fetcher_fn, DataSlice, DataSliceStore, SliceFetcher, SliceReader, SliceStoreError};
pub use tools::{Invocation, ToolInvokeError, ToolInvoker};

pub use markpane_events::{Delivery, EventBus, PanelEvent, Subscription, SubscriptionId};
pub use markpane_protocol::{
    PanelMetadata, SliceError, SliceScope, ToolSchema, ToolSpec, ToolsMetadata,
};
