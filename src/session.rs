//! Activation session: overrides system settings, connects the event filter,
//! and undoes both on teardown.
//!
//! All state that lives for one activation (subscription handles, the
//! snapshot of overridden keys, the settings watcher) is owned here and
//! released by [`ZoomSession::disable`], which also runs on drop.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bridge::WatchHandle;
use crate::config::ExtensionSettings;
use crate::controller::ZoomController;
use crate::event::EventSource;
use crate::gesture::Modifiers;
use crate::store::{MouseTracking, SettingValue, SettingsStore, SystemKey};
use crate::surface::{EventSurface, SubscriptionId};

/// Window-manager scroll modifiers to move to, in order of preference.
const WM_MODIFIER_CHOICES: [&str; 3] = ["<Super>", "<Alt>", "<Control>"];

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Move `mouse-button-modifier` off the activation modifiers.
    pub avoid_wm_conflict: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            avoid_wm_conflict: true,
        }
    }
}

/// Pre-activation value of an overridden key.
#[derive(Debug, Clone, PartialEq)]
enum Captured {
    Value(SettingValue),
    /// The original could not be read; restore by resetting to the default.
    Unknown,
}

struct Subscription {
    surface: Arc<dyn EventSurface>,
    id: SubscriptionId,
}

pub struct ZoomSession {
    store: Arc<dyn SettingsStore>,
    controller: Arc<ZoomController>,
    options: SessionOptions,
    snapshot: Vec<(SystemKey, Captured)>,
    subscriptions: Vec<Subscription>,
    watch: Option<WatchHandle>,
    active: bool,
}

impl ZoomSession {
    /// Override the magnifier settings and connect the filter to `primary`
    /// and, when given, `secondary`.
    ///
    /// Setting overrides that fail are logged and skipped. Failing to connect
    /// to the primary surface undoes everything and returns the error.
    pub fn enable(
        store: Arc<dyn SettingsStore>,
        controller: Arc<ZoomController>,
        options: SessionOptions,
        primary: Arc<dyn EventSurface>,
        secondary: Option<Arc<dyn EventSurface>>,
    ) -> anyhow::Result<Self> {
        let mut session = Self {
            store,
            controller,
            options,
            snapshot: Vec::new(),
            subscriptions: Vec::new(),
            watch: None,
            active: true,
        };

        session.override_key(SystemKey::MagnifierEnabled, SettingValue::Bool(true));
        session.override_key(
            SystemKey::MouseTracking,
            SettingValue::tracking(MouseTracking::Proportional),
        );
        if options.avoid_wm_conflict {
            session.avoid_wm_conflict();
        }

        if let Err(e) = session.subscribe(primary, EventSource::Primary) {
            session.disable();
            return Err(e.context("Failed to connect to the primary event surface"));
        }
        if let Some(secondary) = secondary {
            if let Err(e) = session.subscribe(secondary, EventSource::Secondary) {
                warn!(error = %e, "Secondary event surface unavailable, continuing without it");
            }
        }

        info!(
            subscriptions = session.subscriptions.len(),
            overridden = session.snapshot.len(),
            mask = %session.controller.required_mask(),
            "Zoom session enabled"
        );
        Ok(session)
    }

    pub fn controller(&self) -> &Arc<ZoomController> {
        &self.controller
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Apply reloaded settings: the controller picks up the new gesture and
    /// tuning, and the window-manager modifier is moved off the new gesture
    /// (or given back when it no longer collides).
    pub fn apply_settings(&mut self, settings: &ExtensionSettings) {
        self.controller.apply_settings(settings);
        if !self.active {
            return;
        }
        self.options.avoid_wm_conflict = settings.avoid_wm_conflict;
        if self.options.avoid_wm_conflict {
            self.avoid_wm_conflict();
        } else {
            self.restore_key(SystemKey::MouseButtonModifier);
        }
    }

    /// Hand over the settings watcher so teardown stops it.
    pub fn set_watch(&mut self, watch: WatchHandle) {
        self.watch = Some(watch);
    }

    /// Disconnect every handler and restore every overridden key.
    ///
    /// Never fails: individual errors are logged and teardown continues.
    /// Calling it again is a no-op.
    pub fn disable(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        if let Some(mut watch) = self.watch.take() {
            watch.stop();
        }

        for sub in self.subscriptions.drain(..) {
            if let Err(e) = sub.surface.disconnect(sub.id) {
                warn!(surface = sub.surface.name(), error = %e, "Failed to disconnect handler");
            }
        }

        // Undo in reverse order of application
        while let Some((key, captured)) = self.snapshot.pop() {
            self.restore(key, &captured);
        }

        info!("Zoom session disabled");
    }

    fn subscribe(&mut self, surface: Arc<dyn EventSurface>, source: EventSource) -> anyhow::Result<()> {
        let controller = self.controller.clone();
        let id = surface.connect(Box::new(move |event| controller.handle(event, source)))?;
        debug!(surface = surface.name(), ?source, "Subscribed to event surface");
        self.subscriptions.push(Subscription { surface, id });
        Ok(())
    }

    fn restore(&self, key: SystemKey, captured: &Captured) {
        let result = match captured {
            Captured::Value(value) => self.store.write(key, value),
            Captured::Unknown => self.store.reset(key),
        };
        match result {
            Ok(()) => debug!(%key, ?captured, "Restored setting"),
            Err(e) => warn!(%key, error = %e, "Failed to restore setting"),
        }
    }

    /// Put back the pre-activation value of `key`, if this session changed it.
    fn restore_key(&mut self, key: SystemKey) {
        if let Some(pos) = self.snapshot.iter().position(|(k, _)| *k == key) {
            let (key, captured) = self.snapshot.remove(pos);
            self.restore(key, &captured);
        }
    }

    fn captured(&self, key: SystemKey) -> Option<&Captured> {
        self.snapshot
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, captured)| captured)
    }

    /// Record the current value of `key`, then write `value`. A key captured
    /// earlier keeps its first snapshot.
    fn override_key(&mut self, key: SystemKey, value: SettingValue) {
        if self.captured(key).is_some() {
            match self.store.write(key, &value) {
                Ok(()) => info!(%key, %value, "Setting overridden"),
                Err(e) => warn!(%key, error = %e, "Failed to override setting"),
            }
            return;
        }
        let captured = match self.store.read(key) {
            Ok(current) => Captured::Value(current),
            Err(e) => {
                warn!(%key, error = %e, "Could not read original value, will reset on teardown");
                Captured::Unknown
            }
        };
        if captured == Captured::Value(value.clone()) {
            debug!(%key, %value, "Already set");
            return;
        }
        match self.store.write(key, &value) {
            Ok(()) => {
                info!(%key, %value, "Setting overridden");
                self.snapshot.push((key, captured));
            }
            Err(e) => warn!(%key, error = %e, "Failed to override setting"),
        }
    }

    fn avoid_wm_conflict(&mut self) {
        // Judge the user's own binding, not one this session wrote
        if let Some(Captured::Value(SettingValue::Text(original))) =
            self.captured(SystemKey::MouseButtonModifier)
        {
            let original = original.clone();
            match disjoint_wm_modifier(&original, self.controller.required_mask()) {
                Some(replacement) => {
                    self.override_key(SystemKey::MouseButtonModifier, SettingValue::Text(replacement))
                }
                None => self.restore_key(SystemKey::MouseButtonModifier),
            }
            return;
        }

        let current = match self.store.read(SystemKey::MouseButtonModifier) {
            Ok(SettingValue::Text(accel)) => accel,
            Ok(other) => {
                warn!(value = ?other, "Unexpected window-manager modifier value");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Could not read window-manager modifier");
                return;
            }
        };
        if let Some(replacement) = disjoint_wm_modifier(&current, self.controller.required_mask()) {
            self.override_key(SystemKey::MouseButtonModifier, SettingValue::Text(replacement));
        }
    }
}

impl Drop for ZoomSession {
    fn drop(&mut self) {
        self.disable();
    }
}

/// When the window manager's modifier `current` overlaps `gesture`, pick a
/// replacement that does not. `None` means leave it alone.
fn disjoint_wm_modifier(current: &str, gesture: Modifiers) -> Option<String> {
    let held = Modifiers::from_accelerator(current)?;
    if !held.intersects(gesture) {
        return None;
    }
    WM_MODIFIER_CHOICES
        .iter()
        .find(|choice| {
            Modifiers::from_accelerator(choice).is_some_and(|m| !m.intersects(gesture))
        })
        .map(|choice| choice.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::tests::FakeWorkspaces;
    use crate::controller::ControllerConfig;
    use crate::event::{EventResponse, InputEvent, ScrollDirection};
    use crate::gesture::ActivationGesture;
    use crate::store::MemoryStore;
    use crate::surface::{CaptureStage, EventHandler};
    use anyhow::bail;

    struct BrokenSurface {
        connect_fails: bool,
        inner: CaptureStage,
    }

    impl EventSurface for BrokenSurface {
        fn name(&self) -> &str {
            "broken"
        }

        fn connect(&self, handler: EventHandler) -> anyhow::Result<SubscriptionId> {
            if self.connect_fails {
                bail!("surface gone");
            }
            self.inner.connect(handler)
        }

        fn disconnect(&self, _id: SubscriptionId) -> anyhow::Result<()> {
            bail!("handle already invalid")
        }
    }

    fn setup(gesture: ActivationGesture) -> (Arc<MemoryStore>, Arc<ZoomController>) {
        let store = Arc::new(MemoryStore::new());
        store.write_double(SystemKey::MagFactor, 1.0).unwrap();
        store
            .write(SystemKey::MouseTracking, &SettingValue::tracking(MouseTracking::Centered))
            .unwrap();
        let controller = Arc::new(ZoomController::new(
            store.clone(),
            gesture,
            ControllerConfig::default(),
        ));
        (store, controller)
    }

    fn read(store: &MemoryStore, key: SystemKey) -> SettingValue {
        store.read(key).unwrap()
    }

    fn overridden_keys(store: &MemoryStore) -> Vec<SettingValue> {
        [
            SystemKey::MagnifierEnabled,
            SystemKey::MouseTracking,
            SystemKey::MouseButtonModifier,
        ]
        .into_iter()
        .map(|k| read(store, k))
        .collect()
    }

    #[test]
    fn enable_overrides_and_disable_restores() {
        let (store, controller) = setup(ActivationGesture::Super);
        let before = overridden_keys(&store);
        let stage = Arc::new(CaptureStage::new("stage"));

        let mut session = ZoomSession::enable(
            store.clone(),
            controller,
            SessionOptions::default(),
            stage.clone(),
            None,
        )
        .unwrap();
        assert_eq!(read(&store, SystemKey::MagnifierEnabled), SettingValue::Bool(true));
        assert_eq!(
            read(&store, SystemKey::MouseTracking),
            SettingValue::tracking(MouseTracking::Proportional)
        );
        assert_eq!(
            read(&store, SystemKey::MouseButtonModifier),
            SettingValue::Text("<Alt>".into())
        );
        assert_eq!(stage.handler_count(), 1);

        let up = InputEvent::scroll(ScrollDirection::Up, Modifiers::SUPER, 1000);
        assert_eq!(stage.dispatch(&up), EventResponse::Stop);
        assert_eq!(store.read_double(SystemKey::MagFactor).unwrap(), 1.25);

        session.disable();
        assert_eq!(overridden_keys(&store), before);
        assert_eq!(stage.handler_count(), 0);
        assert!(!session.is_active());

        // No handler left: the gesture reaches windows again
        let later = InputEvent::scroll(ScrollDirection::Up, Modifiers::SUPER, 5000);
        assert_eq!(stage.dispatch(&later), EventResponse::Propagate);
        assert_eq!(store.read_double(SystemKey::MagFactor).unwrap(), 1.25);
    }

    #[test]
    fn disable_twice_and_drop_are_harmless() {
        let (store, controller) = setup(ActivationGesture::Super);
        let before = overridden_keys(&store);
        let stage = Arc::new(CaptureStage::new("stage"));
        let mut session = ZoomSession::enable(
            store.clone(),
            controller,
            SessionOptions::default(),
            stage.clone(),
            None,
        )
        .unwrap();
        session.disable();
        store
            .write(SystemKey::MagnifierEnabled, &SettingValue::Bool(true))
            .unwrap();
        session.disable();
        drop(session);
        // Second teardown must not restore again over a later user change
        assert_eq!(read(&store, SystemKey::MagnifierEnabled), SettingValue::Bool(true));
        assert_eq!(read(&store, SystemKey::MouseTracking), before[1]);
    }

    #[test]
    fn drop_restores_settings() {
        let (store, controller) = setup(ActivationGesture::Super);
        let before = overridden_keys(&store);
        let stage = Arc::new(CaptureStage::new("stage"));
        {
            let _session = ZoomSession::enable(
                store.clone(),
                controller,
                SessionOptions::default(),
                stage.clone(),
                None,
            )
            .unwrap();
        }
        assert_eq!(overridden_keys(&store), before);
        assert_eq!(stage.handler_count(), 0);
    }

    #[test]
    fn wm_modifier_left_alone_without_conflict() {
        let (store, controller) = setup(ActivationGesture::Alt);
        let stage = Arc::new(CaptureStage::new("stage"));
        let _session = ZoomSession::enable(
            store.clone(),
            controller,
            SessionOptions::default(),
            stage,
            None,
        )
        .unwrap();
        assert_eq!(
            read(&store, SystemKey::MouseButtonModifier),
            SettingValue::Text("<Super>".into())
        );
    }

    #[test]
    fn wm_conflict_avoidance_can_be_disabled() {
        let (store, controller) = setup(ActivationGesture::Super);
        let stage = Arc::new(CaptureStage::new("stage"));
        let _session = ZoomSession::enable(
            store.clone(),
            controller,
            SessionOptions {
                avoid_wm_conflict: false,
            },
            stage,
            None,
        )
        .unwrap();
        assert_eq!(
            read(&store, SystemKey::MouseButtonModifier),
            SettingValue::Text("<Super>".into())
        );
    }

    #[test]
    fn unreadable_original_is_reset_on_teardown() {
        let (store, controller) = setup(ActivationGesture::Super);
        store.forget(SystemKey::MagnifierEnabled);
        let stage = Arc::new(CaptureStage::new("stage"));
        let mut session = ZoomSession::enable(
            store.clone(),
            controller,
            SessionOptions::default(),
            stage,
            None,
        )
        .unwrap();
        assert_eq!(read(&store, SystemKey::MagnifierEnabled), SettingValue::Bool(true));
        session.disable();
        assert_eq!(
            read(&store, SystemKey::MagnifierEnabled),
            MemoryStore::default_value(SystemKey::MagnifierEnabled)
        );
    }

    #[test]
    fn primary_connect_failure_rolls_back() {
        let (store, controller) = setup(ActivationGesture::Super);
        let before = overridden_keys(&store);
        let broken = Arc::new(BrokenSurface {
            connect_fails: true,
            inner: CaptureStage::new("inner"),
        });
        let result = ZoomSession::enable(
            store.clone(),
            controller,
            SessionOptions::default(),
            broken,
            None,
        );
        assert!(result.is_err());
        assert_eq!(overridden_keys(&store), before);
    }

    #[test]
    fn secondary_failure_is_tolerated() {
        let (store, controller) = setup(ActivationGesture::Super);
        let stage = Arc::new(CaptureStage::new("stage"));
        let broken = Arc::new(BrokenSurface {
            connect_fails: true,
            inner: CaptureStage::new("inner"),
        });
        let session = ZoomSession::enable(
            store,
            controller,
            SessionOptions::default(),
            stage,
            Some(broken),
        )
        .unwrap();
        assert_eq!(session.subscription_count(), 1);
    }

    #[test]
    fn teardown_continues_past_disconnect_errors() {
        let (store, controller) = setup(ActivationGesture::Super);
        let before = overridden_keys(&store);
        let stage = Arc::new(CaptureStage::new("stage"));
        let flaky = Arc::new(BrokenSurface {
            connect_fails: false,
            inner: CaptureStage::new("inner"),
        });
        let mut session = ZoomSession::enable(
            store.clone(),
            controller,
            SessionOptions::default(),
            flaky,
            Some(stage.clone()),
        )
        .unwrap();
        assert_eq!(session.subscription_count(), 2);
        session.disable();
        assert_eq!(overridden_keys(&store), before);
        assert_eq!(stage.handler_count(), 0);
    }

    #[test]
    fn redundant_surfaces_apply_one_physical_scroll_once() {
        let (store, controller) = setup(ActivationGesture::Super);
        let primary = Arc::new(CaptureStage::new("primary"));
        let secondary = Arc::new(CaptureStage::new("secondary"));
        let _session = ZoomSession::enable(
            store.clone(),
            controller,
            SessionOptions::default(),
            primary.clone(),
            Some(secondary.clone()),
        )
        .unwrap();

        let up = InputEvent::scroll(ScrollDirection::Up, Modifiers::SUPER, 1000);
        assert_eq!(primary.dispatch(&up), EventResponse::Stop);
        let echo = InputEvent::scroll(ScrollDirection::Up, Modifiers::SUPER, 1002);
        assert_eq!(secondary.dispatch(&echo), EventResponse::Stop);
        assert_eq!(store.read_double(SystemKey::MagFactor).unwrap(), 1.25);
    }

    #[test]
    fn workspace_gesture_through_session() {
        let (store, _) = setup(ActivationGesture::Super);
        let ws = FakeWorkspaces::new(3, 0);
        let controller = Arc::new(
            ZoomController::new(store.clone(), ActivationGesture::Super, ControllerConfig::default())
                .with_workspaces(ws.clone()),
        );
        let stage = Arc::new(CaptureStage::new("stage"));
        let _session = ZoomSession::enable(
            store,
            controller,
            SessionOptions::default(),
            stage.clone(),
            None,
        )
        .unwrap();
        let down = InputEvent::scroll(ScrollDirection::Down, Modifiers::ALT, 1000);
        assert_eq!(stage.dispatch(&down), EventResponse::Stop);
        assert_eq!(ws.active.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    fn settings(token: &str, avoid_wm_conflict: bool) -> ExtensionSettings {
        ExtensionSettings {
            modifier_key: token.into(),
            avoid_wm_conflict,
            ..ExtensionSettings::default()
        }
    }

    fn wm_modifier(store: &MemoryStore) -> SettingValue {
        read(store, SystemKey::MouseButtonModifier)
    }

    #[test]
    fn gesture_change_onto_moved_wm_modifier_gives_the_original_back() {
        let (store, controller) = setup(ActivationGesture::Super);
        let stage = Arc::new(CaptureStage::new("stage"));
        let mut session = ZoomSession::enable(
            store.clone(),
            controller.clone(),
            SessionOptions::default(),
            stage,
            None,
        )
        .unwrap();
        assert_eq!(wm_modifier(&store), SettingValue::Text("<Alt>".into()));

        // Alt was only ours; the user's <Super> no longer collides
        session.apply_settings(&settings("alt", true));
        assert_eq!(controller.required_mask(), Modifiers::ALT);
        assert_eq!(wm_modifier(&store), SettingValue::Text("<Super>".into()));

        session.disable();
        assert_eq!(wm_modifier(&store), SettingValue::Text("<Super>".into()));
    }

    #[test]
    fn gesture_change_moves_wm_modifier_again_keeping_first_snapshot() {
        let (store, controller) = setup(ActivationGesture::Super);
        let stage = Arc::new(CaptureStage::new("stage"));
        let mut session = ZoomSession::enable(
            store.clone(),
            controller.clone(),
            SessionOptions::default(),
            stage,
            None,
        )
        .unwrap();

        session.apply_settings(&settings("super-alt", true));
        assert_eq!(wm_modifier(&store), SettingValue::Text("<Control>".into()));

        session.disable();
        assert_eq!(wm_modifier(&store), SettingValue::Text("<Super>".into()));
    }

    #[test]
    fn gesture_change_into_conflict_overrides_late() {
        let (store, controller) = setup(ActivationGesture::Ctrl);
        let stage = Arc::new(CaptureStage::new("stage"));
        let mut session = ZoomSession::enable(
            store.clone(),
            controller,
            SessionOptions::default(),
            stage,
            None,
        )
        .unwrap();
        assert_eq!(wm_modifier(&store), SettingValue::Text("<Super>".into()));

        session.apply_settings(&settings("super", true));
        assert_eq!(wm_modifier(&store), SettingValue::Text("<Alt>".into()));

        session.disable();
        assert_eq!(wm_modifier(&store), SettingValue::Text("<Super>".into()));
    }

    #[test]
    fn turning_off_conflict_avoidance_restores_wm_modifier() {
        let (store, controller) = setup(ActivationGesture::Super);
        let stage = Arc::new(CaptureStage::new("stage"));
        let mut session = ZoomSession::enable(
            store.clone(),
            controller,
            SessionOptions::default(),
            stage,
            None,
        )
        .unwrap();
        session.apply_settings(&settings("super", false));
        assert_eq!(wm_modifier(&store), SettingValue::Text("<Super>".into()));
        // Other overrides stay until teardown
        assert_eq!(read(&store, SystemKey::MagnifierEnabled), SettingValue::Bool(true));
    }

    #[test]
    fn disjoint_modifier_choice() {
        assert_eq!(
            disjoint_wm_modifier("<Super>", Modifiers::SUPER),
            Some("<Alt>".to_string())
        );
        assert_eq!(
            disjoint_wm_modifier("<Super>", Modifiers::SUPER | Modifiers::ALT),
            Some("<Control>".to_string())
        );
        assert_eq!(
            disjoint_wm_modifier("<Alt>", Modifiers::SUPER | Modifiers::SHIFT),
            None
        );
        assert_eq!(
            disjoint_wm_modifier("<Alt>", Modifiers::CONTROL | Modifiers::ALT),
            Some("<Super>".to_string())
        );
        assert_eq!(disjoint_wm_modifier("", Modifiers::SUPER), None);
    }
}
