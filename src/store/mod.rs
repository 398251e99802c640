//! System configuration store: the magnifier and window-manager keys this
//! program reads, overrides and restores.

pub mod gsettings;
pub mod memory;

use std::fmt;

use anyhow::bail;

pub use gsettings::GsettingsStore;
pub use memory::MemoryStore;

/// A key in the system configuration store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemKey {
    MagnifierEnabled,
    MouseTracking,
    MagFactor,
    MouseButtonModifier,
}

impl SystemKey {
    pub const ALL: [SystemKey; 4] = [
        Self::MagnifierEnabled,
        Self::MouseTracking,
        Self::MagFactor,
        Self::MouseButtonModifier,
    ];

    pub const fn schema(self) -> &'static str {
        match self {
            Self::MagnifierEnabled => "org.gnome.desktop.a11y.applications",
            Self::MouseTracking | Self::MagFactor => "org.gnome.desktop.a11y.magnifier",
            Self::MouseButtonModifier => "org.gnome.desktop.wm.preferences",
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::MagnifierEnabled => "screen-magnifier-enabled",
            Self::MouseTracking => "mouse-tracking",
            Self::MagFactor => "mag-factor",
            Self::MouseButtonModifier => "mouse-button-modifier",
        }
    }

    pub const fn kind(self) -> ValueKind {
        match self {
            Self::MagnifierEnabled => ValueKind::Bool,
            Self::MouseTracking => ValueKind::Enum,
            Self::MagFactor => ValueKind::Double,
            Self::MouseButtonModifier => ValueKind::Text,
        }
    }
}

impl fmt::Display for SystemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.schema(), self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Double,
    Enum,
    Text,
}

/// Magnifier viewport-follow mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum MouseTracking {
    None = 0,
    Centered = 1,
    Proportional = 2,
    Push = 3,
}

impl MouseTracking {
    pub const fn nick(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Centered => "centered",
            Self::Proportional => "proportional",
            Self::Push => "push",
        }
    }

    pub fn from_nick(nick: &str) -> Option<Self> {
        match nick {
            "none" => Some(Self::None),
            "centered" => Some(Self::Centered),
            "proportional" => Some(Self::Proportional),
            "push" => Some(Self::Push),
            _ => None,
        }
    }

    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(Self::None),
            1 => Some(Self::Centered),
            2 => Some(Self::Proportional),
            3 => Some(Self::Push),
            _ => None,
        }
    }
}

/// A typed value held by a [`SystemKey`]. Enums are stored by nick.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Bool(bool),
    Double(f64),
    Enum(String),
    Text(String),
}

impl SettingValue {
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Double(_) => ValueKind::Double,
            Self::Enum(_) => ValueKind::Enum,
            Self::Text(_) => ValueKind::Text,
        }
    }

    pub fn tracking(mode: MouseTracking) -> Self {
        Self::Enum(mode.nick().to_string())
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Double(d) => write!(f, "{}", d),
            Self::Enum(s) | Self::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Read/write access to the system configuration store.
///
/// Implementations are called inline from the input path: no child
/// processes, no waiting on another process.
pub trait SettingsStore: Send + Sync {
    fn read(&self, key: SystemKey) -> anyhow::Result<SettingValue>;

    fn write(&self, key: SystemKey, value: &SettingValue) -> anyhow::Result<()>;

    /// Return `key` to its schema default.
    fn reset(&self, key: SystemKey) -> anyhow::Result<()>;

    fn read_bool(&self, key: SystemKey) -> anyhow::Result<bool> {
        match self.read(key)? {
            SettingValue::Bool(b) => Ok(b),
            other => bail!("{} holds {:?}, expected a boolean", key, other),
        }
    }

    fn read_double(&self, key: SystemKey) -> anyhow::Result<f64> {
        match self.read(key)? {
            SettingValue::Double(d) => Ok(d),
            other => bail!("{} holds {:?}, expected a double", key, other),
        }
    }

    fn write_double(&self, key: SystemKey, value: f64) -> anyhow::Result<()> {
        self.write(key, &SettingValue::Double(value))
    }
}

/// Reject a value whose type does not match the key.
pub(crate) fn check_kind(key: SystemKey, value: &SettingValue) -> anyhow::Result<()> {
    if value.kind() != key.kind() {
        bail!("{} expects {:?}, got {:?}", key, key.kind(), value);
    }
    if let SettingValue::Enum(nick) = value {
        if key == SystemKey::MouseTracking && MouseTracking::from_nick(nick).is_none() {
            bail!("{} has no value '{}'", key, nick);
        }
    }
    Ok(())
}
