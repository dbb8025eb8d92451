//! Persisted key-value state: the catalog, per-level baselines, metadata,
//! unusable variants and user preferences.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::baseline::Baseline;
use crate::catalog::Catalog;
use crate::Result;

const NAMESPACE: &str = "research-randomiser";

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&mut self, key: &str, value: Value) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
    fn keys(&self) -> Vec<String>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}

/// A single pretty-printed JSON document, rewritten on every change.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, Value>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let data = fs::read_to_string(&path)?;
            if data.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&data)?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.values)?)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_string(), value);
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.values.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub last_scan_utc: Option<u64>,
    #[serde(default)]
    pub randomize_count_by_level: BTreeMap<String, u32>,
}

/// Raw variant values that never resolve to a category. Probing skips them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnusableVariants(BTreeSet<i32>);

impl UnusableVariants {
    pub fn contains(&self, raw: i32) -> bool {
        self.0.contains(&raw)
    }

    pub fn insert(&mut self, raw: i32) -> bool {
        self.0.insert(raw)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Last options chosen by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub multiplier: f64,
    #[serde(default)]
    pub guarantee_cash_machine: bool,
    #[serde(default)]
    pub guarantee_info_kiosk: bool,
    #[serde(default)]
    pub exclude_custom: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            guarantee_cash_machine: false,
            guarantee_info_kiosk: false,
            exclude_custom: false,
        }
    }
}

/// Typed repository over a [`KeyValueStore`].
#[derive(Debug, Clone)]
pub struct ResearchStore<S> {
    store: S,
}

impl<S: KeyValueStore> ResearchStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    fn key(suffix: &str) -> String {
        format!("{NAMESPACE}.{suffix}")
    }

    fn baseline_key(level_key: &str) -> String {
        Self::key(&format!("baseline.{level_key}"))
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.store.get(key)?;
        if value.is_null() {
            return None;
        }
        match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                warn!(key, error = %err, "ignoring unreadable stored value");
                None
            }
        }
    }

    fn write<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.store.set(key, value)
    }

    pub fn has_catalog(&self) -> bool {
        self.read::<Catalog>(&Self::key("catalog"))
            .map(|c| !c.is_empty())
            .unwrap_or(false)
    }

    pub fn catalog(&self) -> Catalog {
        self.read(&Self::key("catalog")).unwrap_or_default()
    }

    pub fn set_catalog(&mut self, catalog: &Catalog) -> Result<()> {
        self.write(&Self::key("catalog"), catalog)
    }

    pub fn meta(&self) -> Meta {
        self.read(&Self::key("meta")).unwrap_or_default()
    }

    pub fn set_meta(&mut self, meta: &Meta) -> Result<()> {
        self.write(&Self::key("meta"), meta)
    }

    pub fn unusable_variants(&self) -> UnusableVariants {
        self.read(&Self::key("unusable-variants")).unwrap_or_default()
    }

    pub fn set_unusable_variants(&mut self, unusable: &UnusableVariants) -> Result<()> {
        self.write(&Self::key("unusable-variants"), unusable)
    }

    pub fn baseline(&self, level_key: &str) -> Option<Baseline> {
        self.read(&Self::baseline_key(level_key))
    }

    pub fn set_baseline(&mut self, level_key: &str, baseline: &Baseline) -> Result<()> {
        self.write(&Self::baseline_key(level_key), baseline)
    }

    pub fn preferences(&self) -> Preferences {
        self.read(&Self::key("prefs")).unwrap_or_default()
    }

    pub fn set_preferences(&mut self, prefs: &Preferences) -> Result<()> {
        self.write(&Self::key("prefs"), prefs)
    }

    /// Drop the catalog, metadata, unusable variants and every baseline.
    /// Preferences are kept.
    pub fn clear_all(&mut self) -> Result<()> {
        let baseline_prefix = Self::key("baseline.");
        for key in self.store.keys() {
            if key.starts_with(&baseline_prefix) {
                self.store.remove(&key)?;
            }
        }
        self.store.remove(&Self::key("catalog"))?;
        self.store.remove(&Self::key("meta"))?;
        self.store.remove(&Self::key("unusable-variants"))?;
        Ok(())
    }
}
