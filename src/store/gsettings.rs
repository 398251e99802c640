//! GSettings backend, in-process through gio.
//!
//! Reads come straight from the local dconf database and writes are queued
//! to the settings daemon, so nothing here forks or waits on another process.

use anyhow::{anyhow, bail, Context};
use gio::glib::Variant;
use gio::prelude::*;
use tracing::debug;

use super::{check_kind, SettingValue, SettingsStore, SystemKey, ValueKind};

#[derive(Debug, Default)]
pub struct GsettingsStore;

impl GsettingsStore {
    pub fn new() -> Self {
        Self
    }

    /// Check that every key this program touches is installed.
    pub fn probe(&self) -> anyhow::Result<()> {
        for key in SystemKey::ALL {
            self.settings(key)
                .context("GNOME magnifier settings are not available")?;
        }
        Ok(())
    }

    /// Settings object for `key`'s schema. gio aborts on an unknown schema or
    /// key, so both are checked first.
    fn settings(&self, key: SystemKey) -> anyhow::Result<gio::Settings> {
        let schema = lookup_schema(key.schema())?;
        if !schema.has_key(key.name()) {
            bail!("Schema {} has no key {}", key.schema(), key.name());
        }
        Ok(gio::Settings::new_full(
            &schema,
            None::<&gio::SettingsBackend>,
            None,
        ))
    }
}

impl SettingsStore for GsettingsStore {
    fn read(&self, key: SystemKey) -> anyhow::Result<SettingValue> {
        let raw = self.settings(key)?.value(key.name());
        from_variant(key.kind(), &raw).with_context(|| format!("Unexpected value for {}", key))
    }

    fn write(&self, key: SystemKey, value: &SettingValue) -> anyhow::Result<()> {
        check_kind(key, value)?;
        debug!(%key, %value, "GSettings set");
        self.settings(key)?
            .set_value(key.name(), &to_variant(value))
            .with_context(|| format!("Failed to set {}", key))
    }

    fn reset(&self, key: SystemKey) -> anyhow::Result<()> {
        self.settings(key)?.reset(key.name());
        Ok(())
    }
}

fn lookup_schema(id: &str) -> anyhow::Result<gio::SettingsSchema> {
    gio::SettingsSchemaSource::default()
        .context("No GSettings schemas are installed")?
        .lookup(id, true)
        .with_context(|| format!("GSettings schema {} is not installed", id))
}

/// Enum keys travel as their nick string.
fn from_variant(kind: ValueKind, raw: &Variant) -> anyhow::Result<SettingValue> {
    let value = match kind {
        ValueKind::Bool => raw.get::<bool>().map(SettingValue::Bool),
        ValueKind::Double => raw.get::<f64>().map(SettingValue::Double),
        ValueKind::Enum => raw.get::<String>().map(SettingValue::Enum),
        ValueKind::Text => raw.get::<String>().map(SettingValue::Text),
    };
    value.ok_or_else(|| anyhow!("expected {:?}, got type {}", kind, raw.type_()))
}

fn to_variant(value: &SettingValue) -> Variant {
    match value {
        SettingValue::Bool(b) => b.to_variant(),
        SettingValue::Double(d) => d.to_variant(),
        SettingValue::Enum(s) | SettingValue::Text(s) => s.to_variant(),
    }
}
