//! Input events as seen by the capture-phase filter.

use crate::gesture::Modifiers;

/// Discrete scroll direction, or a smooth (continuous) scroll with deltas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
    Smooth { dx: f64, dy: f64 },
}

/// Keys the filter cares about. Everything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Other(u32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind {
    Scroll(ScrollDirection),
    KeyPress(Key),
    KeyRelease(Key),
    /// Motion, button presses and anything else the filter never consumes.
    Other,
}

/// A single input event delivered before normal dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputEvent {
    pub kind: EventKind,
    /// Modifier state at the time of the event.
    pub modifiers: Modifiers,
    /// Milliseconds since capture started, from a monotonic clock.
    pub time_ms: u64,
}

impl InputEvent {
    pub fn scroll(direction: ScrollDirection, modifiers: Modifiers, time_ms: u64) -> Self {
        Self {
            kind: EventKind::Scroll(direction),
            modifiers,
            time_ms,
        }
    }

    pub fn key_press(key: Key, modifiers: Modifiers, time_ms: u64) -> Self {
        Self {
            kind: EventKind::KeyPress(key),
            modifiers,
            time_ms,
        }
    }
}

/// Whether dispatch should continue to the original target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventResponse {
    Propagate,
    Stop,
}

/// Identifies which subscribed surface delivered an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSource {
    Primary,
    Secondary,
}
