//! Canonical event type constants shared between the host and its panels.
//!
//! Every event type is namespaced as `<owner>:<action>` so panels sharing one
//! bus cannot collide. Keep this list grouped by owner and favor kebab-case
//! actions.

// Host → panels
pub const TOPIC_FILE_OPENED: &str = "file:opened";
pub const TOPIC_FILE_CLOSED: &str = "file:closed";
pub const TOPIC_SLICE_CHANGED: &str = "host:slice-changed";
pub const TOPIC_VIEWPORT_RESIZED: &str = "host:viewport-resized";
pub const TOPIC_PANEL_FOCUSED: &str = "host:panel-focused";

// Markdown viewer panel
pub const TOPIC_MARKDOWN_VIEW_MODE_CHANGE: &str = "markdown-panel:view-mode-change";
pub const TOPIC_MARKDOWN_CHANGE_FONT_SIZE: &str = "markdown-panel:change-font-size";
pub const TOPIC_MARKDOWN_NAVIGATE_SLIDE: &str = "markdown-panel:navigate-slide";
pub const TOPIC_MARKDOWN_OPEN_DOCUMENT: &str = "markdown-panel:open-document";
pub const TOPIC_MARKDOWN_REQUEST_PREFERENCES: &str = "markdown-panel:request-preferences";
pub const TOPIC_MARKDOWN_SET_PREFERENCES: &str = "markdown-panel:set-preferences";
pub const TOPIC_MARKDOWN_PREFERENCES_CHANGED: &str = "markdown-panel:preferences-changed";

// Workspace slices
/// Slice holding the currently open file, keyed in the workspace scope.
pub const ACTIVE_FILE_SLICE: &str = "active-file";

/// Source id used when the host itself emits an event.
pub const SOURCE_HOST: &str = "host";
/// Source id used by agent-side tool invocations.
pub const SOURCE_AGENT: &str = "agent";

/// Returns true when `kind` follows the `<owner>:<action>` convention.
///
/// Both segments must be non-empty and made of lowercase ASCII letters,
/// digits, `-` or `_`; exactly one `:` separates them.
pub fn is_namespaced(kind: &str) -> bool {
    match kind.split_once(':') {
        Some((owner, action)) => is_segment(owner) && is_segment(action),
        None => false,
    }
}

/// Owner segment of a namespaced event type (`"file"` for `"file:opened"`).
pub fn owner_of(kind: &str) -> Option<&str> {
    if !is_namespaced(kind) {
        return None;
    }
    kind.split_once(':').map(|(owner, _)| owner)
}

fn is_segment(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '-' | '_'))
}
