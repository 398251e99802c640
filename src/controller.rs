//! Capture-phase event filter and zoom controller.
//!
//! Every input event passes through [`ZoomController::handle`] before normal
//! dispatch. Scrolls carrying the activation modifiers become zoom-factor
//! changes and are consumed; everything else propagates untouched. The zoom
//! factor lives only in the settings store and is re-read before each change,
//! so adjustments made by other tools are always picked up.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

use crate::config::{EscapePolicy, ExtensionSettings, ScrollTuning, MIN_ZOOM};
use crate::event::{EventKind, EventResponse, EventSource, InputEvent, Key, ScrollDirection};
use crate::gesture::{ActivationGesture, ModifierKey, Modifiers};
use crate::store::{SettingsStore, SystemKey};
use crate::workspace::WorkspaceSwitcher;

/// Something the controller changed in response to an event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    ZoomChanged { from: f64, to: f64 },
    ZoomReset { from: f64 },
    WorkspaceSwitched { from: usize, to: usize },
}

/// Receives every [`Action`] after it has been applied.
pub type Notifier = Box<dyn Fn(&Action) + Send + Sync>;

/// Behaviour knobs taken from the extension settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerConfig {
    pub tuning: ScrollTuning,
    pub escape_policy: EscapePolicy,
    pub workspace_modifier: Option<ModifierKey>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from(&ExtensionSettings::default())
    }
}

impl From<&ExtensionSettings> for ControllerConfig {
    fn from(settings: &ExtensionSettings) -> Self {
        Self {
            tuning: settings.tuning.sanitized(),
            escape_policy: settings.escape_policy,
            workspace_modifier: settings.workspace_modifier,
        }
    }
}

/// Debounce timestamps, all in event-time milliseconds.
#[derive(Debug, Default)]
struct FilterState {
    last_smooth_scroll_ms: Option<u64>,
    last_workspace_switch_ms: Option<u64>,
    /// Source and time of the last matched scroll that was acted on.
    last_handled: Option<(EventSource, u64)>,
}

struct Decision {
    response: EventResponse,
    action: Option<Action>,
}

impl Decision {
    fn propagate() -> Self {
        Self {
            response: EventResponse::Propagate,
            action: None,
        }
    }

    fn stop() -> Self {
        Self {
            response: EventResponse::Stop,
            action: None,
        }
    }

    fn stop_with(action: Option<Action>) -> Self {
        Self {
            response: EventResponse::Stop,
            action,
        }
    }
}

pub struct ZoomController {
    store: Arc<dyn SettingsStore>,
    workspaces: Option<Arc<dyn WorkspaceSwitcher>>,
    /// Cached activation mask, refreshed on settings change.
    required: AtomicU32,
    config: Mutex<ControllerConfig>,
    state: Mutex<FilterState>,
    notifier: Option<Notifier>,
}

impl ZoomController {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        gesture: ActivationGesture,
        config: ControllerConfig,
    ) -> Self {
        Self {
            store,
            workspaces: None,
            required: AtomicU32::new(gesture.required_mask().bits()),
            config: Mutex::new(config),
            state: Mutex::new(FilterState::default()),
            notifier: None,
        }
    }

    /// Enable the alternate-modifier workspace switch.
    pub fn with_workspaces(mut self, workspaces: Arc<dyn WorkspaceSwitcher>) -> Self {
        self.workspaces = Some(workspaces);
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Modifiers currently required for a zoom scroll.
    pub fn required_mask(&self) -> Modifiers {
        Modifiers::from_bits_truncate(self.required.load(Ordering::Acquire))
    }

    pub fn set_gesture(&self, gesture: ActivationGesture) {
        self.required
            .store(gesture.required_mask().bits(), Ordering::Release);
        info!(%gesture, mask = %gesture.required_mask(), "Activation gesture updated");
    }

    /// Apply a reloaded settings file: gesture plus tuning and policies.
    pub fn apply_settings(&self, settings: &ExtensionSettings) {
        self.set_gesture(settings.gesture());
        *self.config.lock().unwrap_or_else(|e| e.into_inner()) = ControllerConfig::from(settings);
    }

    /// Current zoom factor, read from the store.
    pub fn zoom_factor(&self) -> anyhow::Result<f64> {
        self.store.read_double(SystemKey::MagFactor)
    }

    /// Reset zoom to 1.0 on request (IPC), outside the event path.
    /// Returns `false` when already unzoomed.
    pub fn reset_zoom(&self) -> anyhow::Result<bool> {
        let current = self.zoom_factor()?;
        if current <= MIN_ZOOM {
            return Ok(false);
        }
        self.store.write_double(SystemKey::MagFactor, MIN_ZOOM)?;
        if let Some(notify) = self.notifier.as_ref() {
            notify(&Action::ZoomReset { from: current });
        }
        Ok(true)
    }

    /// Process one event. Never fails: errors and panics are logged and the
    /// event is propagated so normal input delivery keeps working.
    pub fn handle(&self, event: &InputEvent, source: EventSource) -> EventResponse {
        match panic::catch_unwind(AssertUnwindSafe(|| self.process(event, source))) {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(error = %format!("{:#}", e), ?event, "Event processing failed, propagating");
                EventResponse::Propagate
            }
            Err(_) => {
                error!(?event, "Event handler panicked, propagating");
                EventResponse::Propagate
            }
        }
    }

    /// Fallible core of [`handle`](Self::handle).
    pub fn process(&self, event: &InputEvent, source: EventSource) -> anyhow::Result<EventResponse> {
        let config = *self.config.lock().unwrap_or_else(|e| e.into_inner());
        let decision = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match event.kind {
                EventKind::KeyPress(Key::Escape) => self.handle_escape(event, &config)?,
                EventKind::Scroll(direction) => {
                    self.handle_scroll(event, direction, source, &config, &mut state)?
                }
                _ => Decision::propagate(),
            }
        };

        if let (Some(action), Some(notify)) = (decision.action.as_ref(), self.notifier.as_ref()) {
            notify(action);
        }
        Ok(decision.response)
    }

    fn handle_escape(&self, event: &InputEvent, config: &ControllerConfig) -> anyhow::Result<Decision> {
        match config.escape_policy {
            EscapePolicy::Disabled => return Ok(Decision::propagate()),
            EscapePolicy::WithGesture if !event.modifiers.contains(self.required_mask()) => {
                return Ok(Decision::propagate())
            }
            _ => {}
        }

        let current = self.store.read_double(SystemKey::MagFactor)?;
        if current <= MIN_ZOOM {
            return Ok(Decision::propagate());
        }
        self.store.write_double(SystemKey::MagFactor, MIN_ZOOM)?;
        info!(from = current, "Zoom reset by Escape");
        Ok(Decision::stop_with(Some(Action::ZoomReset { from: current })))
    }

    fn handle_scroll(
        &self,
        event: &InputEvent,
        direction: ScrollDirection,
        source: EventSource,
        config: &ControllerConfig,
        state: &mut FilterState,
    ) -> anyhow::Result<Decision> {
        let required = self.required_mask();
        let tuning = &config.tuning;

        let zoom = event.modifiers.contains(required);
        let switch = !zoom && self.is_workspace_gesture(event.modifiers, required, config);
        if !zoom && !switch {
            return Ok(Decision::propagate());
        }

        // Same physical scroll delivered again by the other surface
        if let Some((last_source, last_ms)) = state.last_handled {
            if last_source != source && event.time_ms.saturating_sub(last_ms) < tuning.source_dedup_ms {
                debug!(?source, "Duplicate scroll from redundant source ignored");
                return Ok(Decision::stop());
            }
        }
        state.last_handled = Some((source, event.time_ms));

        if zoom {
            self.zoom(event, direction, tuning, state)
        } else {
            self.switch_workspace(event, direction, tuning, state)
        }
    }

    /// The configured gesture is a single modifier and the event holds the
    /// workspace modifier instead.
    fn is_workspace_gesture(
        &self,
        held: Modifiers,
        required: Modifiers,
        config: &ControllerConfig,
    ) -> bool {
        let Some(workspace_mask) = config.workspace_modifier.map(ModifierKey::mask) else {
            return false;
        };
        self.workspaces.is_some()
            && required.count() == 1
            && workspace_mask != required
            && held.contains(workspace_mask)
            && !held.intersects(required)
    }

    fn zoom(
        &self,
        event: &InputEvent,
        direction: ScrollDirection,
        tuning: &ScrollTuning,
        state: &mut FilterState,
    ) -> anyhow::Result<Decision> {
        let delta = match direction {
            ScrollDirection::Smooth { dy, .. } => {
                state.last_smooth_scroll_ms = Some(event.time_ms);
                -dy * tuning.zoom_step
            }
            discrete => {
                if let Some(last) = state.last_smooth_scroll_ms {
                    if event.time_ms.saturating_sub(last) < tuning.smooth_debounce_ms {
                        debug!("Discrete scroll right after smooth scroll ignored");
                        return Ok(Decision::stop());
                    }
                }
                match discrete {
                    ScrollDirection::Up => tuning.zoom_step,
                    ScrollDirection::Down => -tuning.zoom_step,
                    _ => 0.0,
                }
            }
        };

        if delta.abs() < tuning.noise_floor {
            return Ok(Decision::stop());
        }

        let current = self.store.read_double(SystemKey::MagFactor)?;
        let next = (current + delta).clamp(MIN_ZOOM, tuning.max_zoom);
        if next == current {
            return Ok(Decision::stop());
        }

        self.store.write_double(SystemKey::MagFactor, next)?;
        debug!(from = current, to = next, delta, "Zoom factor changed");
        Ok(Decision::stop_with(Some(Action::ZoomChanged {
            from: current,
            to: next,
        })))
    }

    fn switch_workspace(
        &self,
        event: &InputEvent,
        direction: ScrollDirection,
        tuning: &ScrollTuning,
        state: &mut FilterState,
    ) -> anyhow::Result<Decision> {
        let Some(workspaces) = self.workspaces.as_ref() else {
            return Ok(Decision::propagate());
        };

        let forward = match direction {
            ScrollDirection::Down => true,
            ScrollDirection::Up => false,
            ScrollDirection::Smooth { dy, .. } if dy.abs() >= tuning.workspace_scroll_threshold => {
                dy > 0.0
            }
            _ => return Ok(Decision::stop()),
        };

        if let Some(last) = state.last_workspace_switch_ms {
            if event.time_ms.saturating_sub(last) < tuning.workspace_debounce_ms {
                return Ok(Decision::stop());
            }
        }

        let (count, active) = workspaces.layout()?;
        if count == 0 {
            return Ok(Decision::stop());
        }
        let active = active.min(count - 1);
        let target = if forward {
            (active + 1).min(count - 1)
        } else {
            active.saturating_sub(1)
        };
        if target == active {
            return Ok(Decision::stop());
        }

        workspaces.activate(target)?;
        state.last_workspace_switch_ms = Some(event.time_ms);
        debug!(from = active, to = target, "Workspace switched");
        Ok(Decision::stop_with(Some(Action::WorkspaceSwitched {
            from: active,
            to: target,
        })))
    }
}
