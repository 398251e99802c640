//! Extension-local settings and scroll tuning.

pub mod paths;

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::gesture::{ActivationGesture, ModifierKey};
use paths::get_config_dir;

/// Zoom added per discrete scroll click, and the multiplier for smooth deltas.
pub const ZOOM_STEP: f64 = 0.25;

/// No magnification.
pub const MIN_ZOOM: f64 = 1.0;

/// Upper bound for the zoom factor.
pub const MAX_ZOOM: f64 = 20.0;

/// Touchpads and some mice emit a smooth event followed by an emulated
/// discrete one for the same physical motion; discrete events this soon after
/// a smooth one are dropped.
pub const SMOOTH_DEBOUNCE_MS: u64 = 50;

/// Smooth deltas below this are sensor jitter.
pub const NOISE_FLOOR: f64 = 0.005;

/// Smooth vertical delta needed before a workspace switch fires.
pub const WORKSPACE_SCROLL_THRESHOLD: f64 = 5.0;

/// Minimum spacing between two workspace switches.
pub const WORKSPACE_DEBOUNCE_MS: u64 = 250;

/// Window in which a second source delivering the same gesture is ignored.
pub const SOURCE_DEDUP_MS: u64 = 10;

/// When an Escape press may reset the zoom.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EscapePolicy {
    /// Escape resets zoom regardless of held modifiers.
    #[default]
    Global,
    /// Escape resets zoom only while the activation gesture is held.
    WithGesture,
    /// Escape is never intercepted.
    Disabled,
}

/// Device tuning for scroll handling. Defaults are the constants above.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollTuning {
    #[serde(default = "default_zoom_step")]
    pub zoom_step: f64,
    #[serde(default = "default_max_zoom")]
    pub max_zoom: f64,
    #[serde(default = "default_smooth_debounce_ms")]
    pub smooth_debounce_ms: u64,
    #[serde(default = "default_noise_floor")]
    pub noise_floor: f64,
    #[serde(default = "default_workspace_scroll_threshold")]
    pub workspace_scroll_threshold: f64,
    #[serde(default = "default_workspace_debounce_ms")]
    pub workspace_debounce_ms: u64,
    #[serde(default = "default_source_dedup_ms")]
    pub source_dedup_ms: u64,
}

impl Default for ScrollTuning {
    fn default() -> Self {
        Self {
            zoom_step: ZOOM_STEP,
            max_zoom: MAX_ZOOM,
            smooth_debounce_ms: SMOOTH_DEBOUNCE_MS,
            noise_floor: NOISE_FLOOR,
            workspace_scroll_threshold: WORKSPACE_SCROLL_THRESHOLD,
            workspace_debounce_ms: WORKSPACE_DEBOUNCE_MS,
            source_dedup_ms: SOURCE_DEDUP_MS,
        }
    }
}

impl ScrollTuning {
    /// Replace out-of-range values with their defaults.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        let mut out = self;
        if !(out.zoom_step.is_finite() && out.zoom_step > 0.0) {
            warn!(zoom_step = out.zoom_step, "Invalid zoom step, using default");
            out.zoom_step = defaults.zoom_step;
        }
        if !(out.max_zoom.is_finite() && out.max_zoom >= MIN_ZOOM) {
            warn!(max_zoom = out.max_zoom, "Invalid max zoom, using default");
            out.max_zoom = defaults.max_zoom;
        }
        if !(out.noise_floor.is_finite() && out.noise_floor >= 0.0) {
            warn!(noise_floor = out.noise_floor, "Invalid noise floor, using default");
            out.noise_floor = defaults.noise_floor;
        }
        if !(out.workspace_scroll_threshold.is_finite() && out.workspace_scroll_threshold >= 0.0) {
            warn!(
                threshold = out.workspace_scroll_threshold,
                "Invalid workspace scroll threshold, using default"
            );
            out.workspace_scroll_threshold = defaults.workspace_scroll_threshold;
        }
        out
    }
}

/// `settings.json` shape (written by the preferences form or `set-modifier`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionSettings {
    #[serde(default = "default_modifier_key")]
    pub modifier_key: String,
    #[serde(default)]
    pub escape_policy: EscapePolicy,
    /// Modifier that switches workspaces instead of zooming. `null` disables.
    #[serde(default = "default_workspace_modifier")]
    pub workspace_modifier: Option<ModifierKey>,
    /// Move the window manager's own scroll modifier off the gesture's keys.
    #[serde(default = "default_true")]
    pub avoid_wm_conflict: bool,
    #[serde(default)]
    pub tuning: ScrollTuning,
}

impl Default for ExtensionSettings {
    fn default() -> Self {
        Self {
            modifier_key: default_modifier_key(),
            escape_policy: EscapePolicy::default(),
            workspace_modifier: default_workspace_modifier(),
            avoid_wm_conflict: true,
            tuning: ScrollTuning::default(),
        }
    }
}

impl ExtensionSettings {
    /// The configured gesture, falling back to `super` for unknown tokens.
    pub fn gesture(&self) -> ActivationGesture {
        ActivationGesture::from_token(&self.modifier_key).unwrap_or_else(|| {
            warn!(
                modifier_key = %self.modifier_key,
                "Unknown modifier-key value, falling back to super"
            );
            ActivationGesture::default()
        })
    }
}

fn default_modifier_key() -> String {
    ActivationGesture::default().token().to_string()
}

fn default_workspace_modifier() -> Option<ModifierKey> {
    Some(ModifierKey::Alt)
}

fn default_true() -> bool {
    true
}

fn default_zoom_step() -> f64 {
    ZOOM_STEP
}

fn default_max_zoom() -> f64 {
    MAX_ZOOM
}

fn default_smooth_debounce_ms() -> u64 {
    SMOOTH_DEBOUNCE_MS
}

fn default_noise_floor() -> f64 {
    NOISE_FLOOR
}

fn default_workspace_scroll_threshold() -> f64 {
    WORKSPACE_SCROLL_THRESHOLD
}

fn default_workspace_debounce_ms() -> u64 {
    WORKSPACE_DEBOUNCE_MS
}

fn default_source_dedup_ms() -> u64 {
    SOURCE_DEDUP_MS
}

/// Path to settings.json.
pub fn get_settings_path() -> PathBuf {
    get_config_dir().join("settings.json")
}

/// Read settings from `path`, falling back to defaults when the file is
/// missing or malformed.
pub fn read_settings(path: &Path) -> ExtensionSettings {
    let mut settings: ExtensionSettings = read_json_file(path).unwrap_or_default();
    settings.tuning = settings.tuning.sanitized();
    settings
}

/// Write settings to `path` atomically (temp file + rename).
pub fn write_settings(path: &Path, settings: &ExtensionSettings) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// Generic helper: read a JSON file and deserialize it.
fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}
