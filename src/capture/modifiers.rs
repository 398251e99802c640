//! Modifier state tracking for backends whose events carry no modifier mask.

use rdev::{EventType, Key};

use crate::gesture::Modifiers;

/// Physical modifier keys, tracked per side so releasing one Shift while the
/// other is held keeps Shift active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Slot {
    ShiftLeft = 0,
    ShiftRight,
    ControlLeft,
    ControlRight,
    Alt,
    AltGr,
    MetaLeft,
    MetaRight,
}

impl Slot {
    fn from_key(key: &Key) -> Option<Self> {
        match key {
            Key::ShiftLeft => Some(Self::ShiftLeft),
            Key::ShiftRight => Some(Self::ShiftRight),
            Key::ControlLeft => Some(Self::ControlLeft),
            Key::ControlRight => Some(Self::ControlRight),
            Key::Alt => Some(Self::Alt),
            Key::AltGr => Some(Self::AltGr),
            Key::MetaLeft => Some(Self::MetaLeft),
            Key::MetaRight => Some(Self::MetaRight),
            _ => None,
        }
    }

    fn modifier(self) -> Modifiers {
        match self {
            Self::ShiftLeft | Self::ShiftRight => Modifiers::SHIFT,
            Self::ControlLeft | Self::ControlRight => Modifiers::CONTROL,
            Self::Alt | Self::AltGr => Modifiers::ALT,
            Self::MetaLeft | Self::MetaRight => Modifiers::SUPER,
        }
    }

    const ALL: [Slot; 8] = [
        Self::ShiftLeft,
        Self::ShiftRight,
        Self::ControlLeft,
        Self::ControlRight,
        Self::Alt,
        Self::AltGr,
        Self::MetaLeft,
        Self::MetaRight,
    ];
}

#[derive(Debug, Default)]
pub struct ModifierTracker {
    held: u8,
}

impl ModifierTracker {
    /// Update from a raw event. Non-key events are ignored.
    pub fn update(&mut self, event_type: &EventType) {
        match event_type {
            EventType::KeyPress(key) => {
                if let Some(slot) = Slot::from_key(key) {
                    self.held |= 1 << slot as u8;
                }
            }
            EventType::KeyRelease(key) => {
                if let Some(slot) = Slot::from_key(key) {
                    self.held &= !(1 << slot as u8);
                }
            }
            _ => {}
        }
    }

    pub fn modifiers(&self) -> Modifiers {
        let mut mods = Modifiers::NONE;
        for slot in Slot::ALL {
            if self.held & (1 << slot as u8) != 0 {
                mods |= slot.modifier();
            }
        }
        mods
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_and_release() {
        let mut t = ModifierTracker::default();
        t.update(&EventType::KeyPress(Key::MetaLeft));
        t.update(&EventType::KeyPress(Key::Alt));
        assert_eq!(t.modifiers(), Modifiers::SUPER | Modifiers::ALT);
        t.update(&EventType::KeyRelease(Key::MetaLeft));
        assert_eq!(t.modifiers(), Modifiers::ALT);
    }

    #[test]
    fn both_sides_tracked_separately() {
        let mut t = ModifierTracker::default();
        t.update(&EventType::KeyPress(Key::ShiftLeft));
        t.update(&EventType::KeyPress(Key::ShiftRight));
        t.update(&EventType::KeyRelease(Key::ShiftLeft));
        assert_eq!(t.modifiers(), Modifiers::SHIFT);
        t.update(&EventType::KeyRelease(Key::ShiftRight));
        assert_eq!(t.modifiers(), Modifiers::NONE);
    }

    #[test]
    fn other_keys_ignored() {
        let mut t = ModifierTracker::default();
        t.update(&EventType::KeyPress(Key::KeyA));
        t.update(&EventType::Wheel {
            delta_x: 0,
            delta_y: 1,
        });
        assert_eq!(t.modifiers(), Modifiers::NONE);
        t.update(&EventType::KeyPress(Key::ControlRight));
        assert_eq!(t.modifiers(), Modifiers::CONTROL);
    }
}
