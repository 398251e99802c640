//! In-memory store for `--dry-run` and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::anyhow;

use super::{check_kind, MouseTracking, SettingValue, SettingsStore, SystemKey};

/// Holds values in a map, starting from the stock desktop defaults.
#[derive(Debug)]
pub struct MemoryStore {
    values: Mutex<HashMap<SystemKey, SettingValue>>,
    writes: Mutex<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let values = SystemKey::ALL
            .into_iter()
            .map(|key| (key, Self::default_value(key)))
            .collect();
        Self {
            values: Mutex::new(values),
            writes: Mutex::new(0),
        }
    }

    /// Schema default for `key`.
    pub fn default_value(key: SystemKey) -> SettingValue {
        match key {
            SystemKey::MagnifierEnabled => SettingValue::Bool(false),
            SystemKey::MouseTracking => SettingValue::tracking(MouseTracking::Proportional),
            SystemKey::MagFactor => SettingValue::Double(2.0),
            SystemKey::MouseButtonModifier => SettingValue::Text("<Super>".into()),
        }
    }

    /// Remove `key` so reads fail, as with a broken schema.
    #[cfg(test)]
    pub fn forget(&self, key: SystemKey) {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key);
    }

    /// Number of successful writes so far.
    #[cfg(test)]
    pub fn write_count(&self) -> u64 {
        *self.writes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore for MemoryStore {
    fn read(&self, key: SystemKey) -> anyhow::Result<SettingValue> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .cloned()
            .ok_or_else(|| anyhow!("{} is not set", key))
    }

    fn write(&self, key: SystemKey, value: &SettingValue) -> anyhow::Result<()> {
        check_kind(key, value)?;
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, value.clone());
        *self.writes.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }

    fn reset(&self, key: SystemKey) -> anyhow::Result<()> {
        self.write(key, &Self::default_value(key))
    }
}
