//! Global input capture.
//!
//! Grabs keyboard and pointer events system-wide with `rdev`'s grab API and
//! feeds them, translated to [`InputEvent`]s, into a [`CaptureStage`]. Events
//! a handler stops are swallowed before they reach any window.
//!
//! On Linux the grab reads `/dev/input` and re-injects through uinput, so the
//! user must be in the `input` group.

pub mod modifiers;

use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{anyhow, Context};
use rdev::{grab, Event, EventType};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::event::{EventKind, EventResponse, InputEvent, Key, ScrollDirection};
use crate::gesture::Modifiers;
use crate::surface::CaptureStage;
use modifiers::ModifierTracker;

/// Start the global grab on a background thread, dispatching into `stage`.
///
/// The returned receiver yields the error if the grab fails (typically no
/// access to `/dev/input`), and closes if the grab thread ends any other way.
/// The grab cannot be cancelled; once every handler is disconnected from the
/// stage all events simply pass through.
pub fn spawn_grab(stage: Arc<CaptureStage>) -> anyhow::Result<oneshot::Receiver<anyhow::Error>> {
    spawn_capture_thread(move || {
        let start = Instant::now();
        let tracker = Mutex::new(ModifierTracker::default());

        let callback = move |event: Event| -> Option<Event> {
            let time_ms = event_time_ms(start, Instant::now());
            let input = {
                let mut tracker = tracker.lock().unwrap_or_else(|e| e.into_inner());
                tracker.update(&event.event_type);
                translate(&event.event_type, tracker.modifiers(), time_ms)
            };
            match stage.dispatch(&input) {
                EventResponse::Stop => None,
                EventResponse::Propagate => Some(event),
            }
        };

        grab(callback).map_err(|e| anyhow!("Input grab failed: {:?}", e))
    })
}

/// Run `capture` on the grab thread, reporting its error through the
/// returned receiver.
fn spawn_capture_thread<F>(capture: F) -> anyhow::Result<oneshot::Receiver<anyhow::Error>>
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("input-grab".into())
        .spawn(move || {
            info!("Starting global input grab");
            match capture() {
                Ok(()) => warn!("Input grab ended"),
                Err(e) => {
                    error!("{:#}", e);
                    let _ = tx.send(e);
                }
            }
        })
        .context("Failed to spawn input grab thread")?;
    Ok(rx)
}

/// Milliseconds from `start` to `at`. Monotonic, unaffected by clock steps.
fn event_time_ms(start: Instant, at: Instant) -> u64 {
    at.saturating_duration_since(start).as_millis() as u64
}

/// Map a raw `rdev` event onto the filter's event model.
///
/// A single notch becomes a discrete direction. Larger or diagonal wheel
/// reports keep their size as a smooth scroll, where positive `dy` is down.
fn translate(event_type: &EventType, modifiers: Modifiers, time_ms: u64) -> InputEvent {
    let kind = match event_type {
        EventType::Wheel { delta_x, delta_y } => {
            // rdev reports wheel-up and wheel-right as positive
            let direction = match (*delta_x, *delta_y) {
                (0, 0) => None,
                (0, 1) => Some(ScrollDirection::Up),
                (0, -1) => Some(ScrollDirection::Down),
                (1, 0) => Some(ScrollDirection::Right),
                (-1, 0) => Some(ScrollDirection::Left),
                (dx, dy) => Some(ScrollDirection::Smooth {
                    dx: dx as f64,
                    dy: -dy as f64,
                }),
            };
            direction.map_or(EventKind::Other, EventKind::Scroll)
        }
        EventType::KeyPress(key) => EventKind::KeyPress(map_key(key)),
        EventType::KeyRelease(key) => EventKind::KeyRelease(map_key(key)),
        _ => EventKind::Other,
    };
    InputEvent {
        kind,
        modifiers,
        time_ms,
    }
}

fn map_key(key: &rdev::Key) -> Key {
    match key {
        rdev::Key::Escape => Key::Escape,
        rdev::Key::Unknown(code) => Key::Other(*code),
        _ => Key::Other(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ControllerConfig, ZoomController};
    use crate::event::EventSource;
    use crate::gesture::ActivationGesture;
    use crate::store::{MemoryStore, SettingsStore, SystemKey};
    use std::time::Duration;

    #[test]
    fn wheel_maps_to_discrete_directions() {
        let up = translate(&EventType::Wheel { delta_x: 0, delta_y: 1 }, Modifiers::SUPER, 7);
        assert_eq!(up.kind, EventKind::Scroll(ScrollDirection::Up));
        assert_eq!(up.modifiers, Modifiers::SUPER);
        assert_eq!(up.time_ms, 7);

        let down = translate(&EventType::Wheel { delta_x: 0, delta_y: -1 }, Modifiers::NONE, 0);
        assert_eq!(down.kind, EventKind::Scroll(ScrollDirection::Down));

        let left = translate(&EventType::Wheel { delta_x: -1, delta_y: 0 }, Modifiers::NONE, 0);
        assert_eq!(left.kind, EventKind::Scroll(ScrollDirection::Left));

        let none = translate(&EventType::Wheel { delta_x: 0, delta_y: 0 }, Modifiers::NONE, 0);
        assert_eq!(none.kind, EventKind::Other);
    }

    #[test]
    fn escape_and_other_keys() {
        let esc = translate(&EventType::KeyPress(rdev::Key::Escape), Modifiers::NONE, 0);
        assert_eq!(esc.kind, EventKind::KeyPress(Key::Escape));
        let a = translate(&EventType::KeyRelease(rdev::Key::KeyA), Modifiers::NONE, 0);
        assert_eq!(a.kind, EventKind::KeyRelease(Key::Other(0)));
        let motion = translate(&EventType::MouseMove { x: 1.0, y: 2.0 }, Modifiers::NONE, 0);
        assert_eq!(motion.kind, EventKind::Other);
    }

    #[test]
    fn multi_notch_wheel_keeps_its_size() {
        let ev = translate(&EventType::Wheel { delta_x: 0, delta_y: 5 }, Modifiers::SUPER, 0);
        assert_eq!(
            ev.kind,
            EventKind::Scroll(ScrollDirection::Smooth { dx: 0.0, dy: -5.0 })
        );
        let diagonal = translate(&EventType::Wheel { delta_x: 1, delta_y: -1 }, Modifiers::NONE, 0);
        assert_eq!(
            diagonal.kind,
            EventKind::Scroll(ScrollDirection::Smooth { dx: 1.0, dy: 1.0 })
        );
    }

    #[test]
    fn multi_notch_wheel_zooms_by_full_size() {
        let store = Arc::new(MemoryStore::new());
        store.write_double(SystemKey::MagFactor, 1.0).unwrap();
        let ctl = ZoomController::new(store.clone(), ActivationGesture::Super, ControllerConfig::default());

        let up = translate(&EventType::Wheel { delta_x: 0, delta_y: 5 }, Modifiers::SUPER, 1000);
        assert_eq!(ctl.handle(&up, EventSource::Primary), EventResponse::Stop);
        assert_eq!(store.read_double(SystemKey::MagFactor).unwrap(), 2.25);

        let down = translate(&EventType::Wheel { delta_x: 0, delta_y: -2 }, Modifiers::SUPER, 2000);
        assert_eq!(ctl.handle(&down, EventSource::Primary), EventResponse::Stop);
        assert_eq!(store.read_double(SystemKey::MagFactor).unwrap(), 1.75);

        // One notch is still a single step
        let notch = translate(&EventType::Wheel { delta_x: 0, delta_y: 1 }, Modifiers::SUPER, 3000);
        ctl.handle(&notch, EventSource::Primary);
        assert_eq!(store.read_double(SystemKey::MagFactor).unwrap(), 2.0);
    }

    #[test]
    fn event_time_is_monotonic_millis() {
        let start = Instant::now();
        assert_eq!(event_time_ms(start, start + Duration::from_millis(1234)), 1234);
        // An instant before the start never wraps
        let earlier = start.checked_sub(Duration::from_millis(5)).unwrap_or(start);
        assert_eq!(event_time_ms(start, earlier), 0);
    }

    #[test]
    fn capture_failure_reaches_the_receiver() {
        let rx = spawn_capture_thread(|| anyhow::bail!("permission denied on /dev/input")).unwrap();
        let err = rx.blocking_recv().unwrap();
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn capture_thread_ending_closes_the_receiver() {
        let rx = spawn_capture_thread(|| Ok(())).unwrap();
        assert!(rx.blocking_recv().is_err());
    }
}
