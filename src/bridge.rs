//! Settings bridge: the stored `modifier-key` choice and change notification.
//!
//! The preferences form (or `zoom-by-scroll set-modifier`) writes
//! `settings.json`; the running daemon watches the file and hands every
//! changed settings value to the session, which updates the controller.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, error, info, warn};

use crate::config::{get_settings_path, read_settings, write_settings, ExtensionSettings};
use crate::gesture::ActivationGesture;

/// Coalescing window for bursts of file events from one save.
const COALESCE: Duration = Duration::from_millis(50);

pub struct SettingsBridge {
    path: PathBuf,
}

impl SettingsBridge {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Bridge over the default settings location.
    pub fn default_location() -> Self {
        Self::new(get_settings_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> ExtensionSettings {
        read_settings(&self.path)
    }

    /// Current gesture; unknown or missing values give `super`.
    pub fn gesture(&self) -> ActivationGesture {
        self.settings().gesture()
    }

    /// Persist a new gesture, keeping the other settings.
    pub fn set_gesture(&self, gesture: ActivationGesture) -> anyhow::Result<()> {
        let mut settings = self.settings();
        settings.modifier_key = gesture.token().to_string();
        write_settings(&self.path, &settings)?;
        info!(%gesture, path = %self.path.display(), "Modifier key saved");
        Ok(())
    }

    /// Call `callback` with the new settings whenever the file changes.
    ///
    /// Notifications stop when the returned handle is stopped or dropped.
    pub fn on_gesture_changed<F>(&self, callback: F) -> anyhow::Result<WatchHandle>
    where
        F: Fn(&ExtensionSettings) + Send + 'static,
    {
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .context("Settings path has no parent directory")?;
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        // Watch the directory: saves replace the file through a rename
        let file_name = self.path.file_name().map(|n| n.to_os_string());
        let (tx, rx) = mpsc::channel::<()>();
        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if !matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                    ) {
                        return;
                    }
                    let touches_settings = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if touches_settings {
                        let _ = tx.send(());
                    }
                }
                Err(e) => error!("Settings watcher error: {}", e),
            })
            .context("Failed to create settings watcher")?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;

        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();
        let path = self.path.clone();
        let mut last = read_settings(&path);

        let thread = std::thread::Builder::new()
            .name("settings-watcher".into())
            .spawn(move || {
                debug!(path = %path.display(), "Settings watcher thread started");
                loop {
                    match rx.recv_timeout(Duration::from_secs(1)) {
                        Ok(()) => {}
                        Err(RecvTimeoutError::Timeout) => {
                            if !running_clone.load(Ordering::Acquire) {
                                break;
                            }
                            continue;
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }

                    std::thread::sleep(COALESCE);
                    while rx.try_recv().is_ok() {}

                    if !running_clone.load(Ordering::Acquire) {
                        break;
                    }
                    if let Some(settings) = reload_if_changed(&path, &mut last) {
                        callback(&settings);
                    }
                }
                debug!("Settings watcher thread exited");
            })
            .context("Failed to spawn settings watcher thread")?;

        info!(path = %self.path.display(), "Watching settings for changes");
        Ok(WatchHandle {
            running,
            watcher: Some(watcher),
            thread: Some(thread),
        })
    }
}

/// Re-read `path`; return the settings when they differ from `last`.
fn reload_if_changed(path: &Path, last: &mut ExtensionSettings) -> Option<ExtensionSettings> {
    let current = read_settings(path);
    if current == *last {
        return None;
    }
    if current.modifier_key != last.modifier_key {
        info!(
            from = %last.modifier_key,
            to = %current.modifier_key,
            "Modifier key changed"
        );
    }
    *last = current.clone();
    Some(current)
}

/// Keeps the settings watcher alive.
pub struct WatchHandle {
    running: Arc<AtomicBool>,
    watcher: Option<RecommendedWatcher>,
    thread: Option<JoinHandle<()>>,
}

impl WatchHandle {
    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop watching. No callback fires after this returns.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        // Dropping the watcher closes the channel and wakes the thread
        self.watcher = None;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Settings watcher thread panicked");
            }
            info!("Settings watcher stopped");
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_bridge(name: &str) -> SettingsBridge {
        let dir = std::env::temp_dir()
            .join(format!("zoom_by_scroll_bridge_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        SettingsBridge::new(dir.join("settings.json"))
    }

    #[test]
    fn missing_settings_default_to_super() {
        let bridge = temp_bridge("missing");
        assert_eq!(bridge.gesture(), ActivationGesture::Super);
    }

    #[test]
    fn unknown_token_defaults_to_super() {
        let bridge = temp_bridge("unknown");
        std::fs::create_dir_all(bridge.path().parent().unwrap()).unwrap();
        std::fs::write(bridge.path(), r#"{"modifierKey": "hyper"}"#).unwrap();
        assert_eq!(bridge.gesture(), ActivationGesture::Super);
    }

    #[test]
    fn set_gesture_keeps_other_settings() {
        let bridge = temp_bridge("set");
        std::fs::create_dir_all(bridge.path().parent().unwrap()).unwrap();
        std::fs::write(bridge.path(), r#"{"escapePolicy": "disabled"}"#).unwrap();
        bridge.set_gesture(ActivationGesture::CtrlAlt).unwrap();
        let settings = bridge.settings();
        assert_eq!(settings.gesture(), ActivationGesture::CtrlAlt);
        assert_eq!(settings.escape_policy, crate::config::EscapePolicy::Disabled);
    }

    #[test]
    fn reload_reports_only_changes() {
        let bridge = temp_bridge("reload");
        let mut last = bridge.settings();
        assert!(reload_if_changed(bridge.path(), &mut last).is_none());

        bridge.set_gesture(ActivationGesture::Alt).unwrap();
        let changed = reload_if_changed(bridge.path(), &mut last).unwrap();
        assert_eq!(changed.gesture(), ActivationGesture::Alt);
        assert!(reload_if_changed(bridge.path(), &mut last).is_none());
    }

    #[test]
    fn watcher_delivers_new_gesture() {
        let bridge = temp_bridge("watch");
        let (tx, rx) = mpsc::channel();
        let mut handle = bridge
            .on_gesture_changed(move |s| {
                let _ = tx.send(s.gesture());
            })
            .unwrap();
        assert!(handle.is_running());

        bridge.set_gesture(ActivationGesture::ShiftSuper).unwrap();
        let got = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(got, ActivationGesture::ShiftSuper);

        handle.stop();
        assert!(!handle.is_running());
    }
}
