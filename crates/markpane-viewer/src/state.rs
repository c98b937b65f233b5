use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::{SlideDirection, ViewMode};

pub const FONT_SCALE_MIN: f64 = 0.5;
pub const FONT_SCALE_MAX: f64 = 3.0;
pub const FONT_SCALE_STEP: f64 = 0.1;
pub const DEFAULT_MOBILE_BREAKPOINT: u32 = 768;

/// Host-supplied settings (`[panels.markdown-viewer]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerSettings {
    pub mobile_breakpoint: u32,
    pub default_font_scale: f64,
    pub default_view_mode: ViewMode,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            mobile_breakpoint: DEFAULT_MOBILE_BREAKPOINT,
            default_font_scale: 1.0,
            default_view_mode: ViewMode::Document,
        }
    }
}

impl ViewerSettings {
    /// Malformed settings fall back to defaults.
    pub fn from_value(value: &Value) -> Self {
        match Self::deserialize(value) {
            Ok(settings) => settings,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring malformed viewer settings");
                Self::default()
            }
        }
    }
}

/// User preferences persisted by the host. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_mode: Option<ViewMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_scale: Option<f64>,
}

/// Local view state of one viewer instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerState {
    pub view_mode: ViewMode,
    pub font_scale: f64,
    pub slide_index: usize,
    pub viewport_width: Option<u32>,
    pub preferences_requested: bool,
    pub preferences_hydrated: bool,
    /// The user changed a preference locally; stored ones no longer apply.
    pub preferences_overridden: bool,
    pub controlled_path: Option<String>,
    pub controlled_content: Option<String>,
}

impl Default for ViewerState {
    fn default() -> Self {
        Self::new(&ViewerSettings::default())
    }
}

impl ViewerState {
    pub fn new(settings: &ViewerSettings) -> Self {
        Self {
            view_mode: settings.default_view_mode,
            font_scale: normalize_scale(settings.default_font_scale),
            slide_index: 0,
            viewport_width: None,
            preferences_requested: false,
            preferences_hydrated: false,
            preferences_overridden: false,
            controlled_path: None,
            controlled_content: None,
        }
    }

    /// User-driven scale change. Returns true when the scale changed.
    pub fn set_font_scale(&mut self, scale: f64) -> bool {
        let next = normalize_scale(scale);
        let changed = (next - self.font_scale).abs() > f64::EPSILON;
        self.font_scale = next;
        self.preferences_overridden |= changed;
        changed
    }

    /// Move by whole steps on the 0.1 grid.
    pub fn step_font_scale(&mut self, steps: i32) -> bool {
        let grid = (self.font_scale / FONT_SCALE_STEP).round() + f64::from(steps);
        self.set_font_scale(grid * FONT_SCALE_STEP)
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) -> bool {
        let changed = self.view_mode != mode;
        self.view_mode = mode;
        self.preferences_overridden |= changed;
        changed
    }

    /// Move relative to the current slide within `count` slides.
    pub fn navigate(&mut self, direction: SlideDirection, count: usize) {
        let last = count.saturating_sub(1);
        let current = self.slide_index.min(last);
        self.slide_index = match direction {
            SlideDirection::First => 0,
            SlideDirection::Last => last,
            SlideDirection::Next => (current + 1).min(last),
            SlideDirection::Previous => current.saturating_sub(1),
        };
    }

    pub fn go_to(&mut self, index: usize, count: usize) {
        self.slide_index = index.min(count.saturating_sub(1));
    }

    /// New content: back to the first slide, preferences untouched.
    pub fn reset_position(&mut self) {
        self.slide_index = 0;
    }

    pub fn preferences(&self) -> Preferences {
        Preferences {
            view_mode: Some(self.view_mode),
            font_scale: Some(self.font_scale),
        }
    }

    /// Stored preferences are taken once per instance, and never over a
    /// choice the user already made.
    pub fn accepts_preferences(&self) -> bool {
        !self.preferences_hydrated && !self.preferences_overridden
    }

    /// Returns false when the preferences were not applied.
    pub fn apply_preferences(&mut self, prefs: &Preferences) -> bool {
        if !self.accepts_preferences() {
            return false;
        }
        if let Some(mode) = prefs.view_mode {
            self.view_mode = mode;
        }
        if let Some(scale) = prefs.font_scale {
            self.font_scale = normalize_scale(scale);
        }
        self.preferences_hydrated = true;
        true
    }

    pub fn is_mobile(&self, viewport_width: Option<u32>, breakpoint: u32) -> bool {
        viewport_width
            .or(self.viewport_width)
            .is_some_and(|w| w < breakpoint)
    }
}

/// Clamp to the supported range, rounded to two decimals.
pub fn normalize_scale(scale: f64) -> f64 {
    if !scale.is_finite() {
        return 1.0;
    }
    (scale.clamp(FONT_SCALE_MIN, FONT_SCALE_MAX) * 100.0).round() / 100.0
}
