//! Modifier bitmask and the activation gesture table.
//!
//! The stored `modifier-key` token (e.g. `"super-alt"`) maps through a static
//! table to the set of modifier flags that must all be held for a scroll to
//! count as a zoom command.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Modifier-key state encoded as bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers(u32);

impl Modifiers {
    pub const NONE: Self = Self(0);
    pub const SHIFT: Self = Self(1 << 0);
    pub const CONTROL: Self = Self(1 << 2);
    pub const ALT: Self = Self(1 << 3);
    pub const SUPER: Self = Self(1 << 26);

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Build from raw bits, dropping anything that is not a known modifier.
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & (Self::SHIFT.0 | Self::CONTROL.0 | Self::ALT.0 | Self::SUPER.0))
    }

    /// `true` when every flag in `required` is also set in `self`.
    pub const fn contains(self, required: Self) -> bool {
        self.0 & required.0 == required.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of distinct modifiers set.
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Parse a window-manager accelerator such as `<Super>` or `<Control><Alt>`.
    ///
    /// Returns `None` for an empty or unrecognised accelerator.
    pub fn from_accelerator(accel: &str) -> Option<Self> {
        let mut mods = Self::NONE;
        let mut rest = accel.trim();
        while let Some(start) = rest.strip_prefix('<') {
            let end = start.find('>')?;
            mods.insert(match start[..end].to_ascii_lowercase().as_str() {
                "super" | "meta" | "mod4" => Self::SUPER,
                "alt" | "mod1" => Self::ALT,
                "control" | "ctrl" | "primary" => Self::CONTROL,
                "shift" => Self::SHIFT,
                _ => return None,
            });
            rest = &start[end + 1..];
        }
        if !rest.is_empty() || mods.is_empty() {
            return None;
        }
        Some(mods)
    }
}

impl BitOr for Modifiers {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Modifiers {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Modifiers {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names = [
            (Self::SHIFT, "shift"),
            (Self::CONTROL, "ctrl"),
            (Self::ALT, "alt"),
            (Self::SUPER, "super"),
        ];
        let parts: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", parts.join("+"))
    }
}

/// A single modifier name, used for the workspace-switch fallback setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModifierKey {
    Shift,
    Ctrl,
    Alt,
    Super,
}

impl ModifierKey {
    pub const fn mask(self) -> Modifiers {
        match self {
            Self::Shift => Modifiers::SHIFT,
            Self::Ctrl => Modifiers::CONTROL,
            Self::Alt => Modifiers::ALT,
            Self::Super => Modifiers::SUPER,
        }
    }
}

/// The modifier combination that turns a scroll into a zoom command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ActivationGesture {
    #[default]
    Super,
    Alt,
    Ctrl,
    SuperAlt,
    ShiftSuper,
    ShiftAlt,
    CtrlSuper,
    CtrlAlt,
}

struct GestureEntry {
    gesture: ActivationGesture,
    token: &'static str,
    label: &'static str,
    mask: Modifiers,
}

/// Token, preferences label and required modifiers for every gesture.
const GESTURE_TABLE: &[GestureEntry] = &[
    GestureEntry {
        gesture: ActivationGesture::Super,
        token: "super",
        label: "Super (Windows/Command)",
        mask: Modifiers::SUPER,
    },
    GestureEntry {
        gesture: ActivationGesture::Alt,
        token: "alt",
        label: "Alt",
        mask: Modifiers::ALT,
    },
    GestureEntry {
        gesture: ActivationGesture::Ctrl,
        token: "ctrl",
        label: "Ctrl",
        mask: Modifiers::CONTROL,
    },
    GestureEntry {
        gesture: ActivationGesture::SuperAlt,
        token: "super-alt",
        label: "Super + Alt",
        mask: Modifiers(Modifiers::SUPER.0 | Modifiers::ALT.0),
    },
    GestureEntry {
        gesture: ActivationGesture::ShiftSuper,
        token: "shift-super",
        label: "Shift + Super",
        mask: Modifiers(Modifiers::SHIFT.0 | Modifiers::SUPER.0),
    },
    GestureEntry {
        gesture: ActivationGesture::ShiftAlt,
        token: "shift-alt",
        label: "Shift + Alt",
        mask: Modifiers(Modifiers::SHIFT.0 | Modifiers::ALT.0),
    },
    GestureEntry {
        gesture: ActivationGesture::CtrlSuper,
        token: "ctrl-super",
        label: "Ctrl + Super",
        mask: Modifiers(Modifiers::CONTROL.0 | Modifiers::SUPER.0),
    },
    GestureEntry {
        gesture: ActivationGesture::CtrlAlt,
        token: "ctrl-alt",
        label: "Ctrl + Alt",
        mask: Modifiers(Modifiers::CONTROL.0 | Modifiers::ALT.0),
    },
];

impl ActivationGesture {
    /// All gestures, in preferences-list order.
    pub fn all() -> impl Iterator<Item = Self> {
        GESTURE_TABLE.iter().map(|e| e.gesture)
    }

    fn entry(self) -> &'static GestureEntry {
        GESTURE_TABLE
            .iter()
            .find(|e| e.gesture == self)
            .unwrap_or(&GESTURE_TABLE[0])
    }

    /// Look up a stored token. Unknown tokens yield `None`.
    pub fn from_token(token: &str) -> Option<Self> {
        let token = token.trim().to_ascii_lowercase();
        GESTURE_TABLE
            .iter()
            .find(|e| e.token == token)
            .map(|e| e.gesture)
    }

    pub fn token(self) -> &'static str {
        self.entry().token
    }

    pub fn label(self) -> &'static str {
        self.entry().label
    }

    /// Modifiers that must all be present for a scroll to zoom.
    pub fn required_mask(self) -> Modifiers {
        self.entry().mask
    }

    pub fn is_single_modifier(self) -> bool {
        self.required_mask().count() == 1
    }
}

impl fmt::Display for ActivationGesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}
