//! The slot registry and the per-slot configuration it owns.

use crate::size::{Size, SizeMapping};
use anyhow::{Error, anyhow};
use core::fmt;
use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::collections::hash_map::IterMut;

/// A key-value targeting value: one string or a set of strings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetingValue {
    Single(String),
    Multi(Vec<String>),
}

impl fmt::Display for TargetingValue {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(value) => formatter.write_str(value),
            Self::Multi(values) => write!(formatter, "[{}]", values.join(",")),
        }
    }
}

/// Targeting entries in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Targeting {
    entries: Vec<(String, TargetingValue)>,
}

impl Targeting {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Insert or replace a key. A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: TargetingValue) {
        let key = key.into();
        if let Some(entry) = self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&TargetingValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TargetingValue)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value))
    }

    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a JSON object of `key -> string | [string]`.
    ///
    /// Numbers and booleans are stringified; `null` and nested objects are skipped.
    ///
    /// # Errors
    /// Returns an error if the input is not a JSON object.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let Value::Object(object) = serde_json::from_str::<Value>(json)? else {
            return Err(anyhow!("targeting must be a JSON object"));
        };
        let mut targeting = Self::new();
        for (key, value) in object {
            match value {
                Value::Array(items) => {
                    let values = items.iter().filter_map(scalar_to_string).collect();
                    targeting.insert(key, TargetingValue::Multi(values));
                }
                other => {
                    if let Some(single) = scalar_to_string(&other) {
                        targeting.insert(key, TargetingValue::Single(single));
                    } else {
                        debug!("Skipping non-scalar targeting value for key '{key}'");
                    }
                }
            }
        }
        Ok(targeting)
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Everything needed to register and later refresh one placement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotConfig {
    /// Stable id, also the id of the backing marker element.
    pub id: String,
    /// Position name the mapping was looked up under.
    pub position: String,
    /// Sizes resolved for the viewport at the last discovery or refresh.
    pub sizes: Vec<Size>,
    pub size_mapping: SizeMapping,
    pub targeting: Option<Targeting>,
}

/// Live mapping from slot id to slot configuration.
#[derive(Debug, Default)]
pub struct SlotRegistry {
    slots: HashMap<String, SlotConfig>,
}

impl SlotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Insert or replace the configuration stored under `id`.
    pub fn upsert(&mut self, id: String, config: SlotConfig) {
        self.slots.insert(id, config);
    }

    pub fn get(&self, id: &str) -> Option<&SlotConfig> {
        self.slots.get(id)
    }

    /// Visit every entry. Order carries no meaning.
    pub fn for_each(&self, mut visit: impl FnMut(&str, &SlotConfig)) {
        for (id, config) in &self.slots {
            visit(id, config);
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, String, SlotConfig> {
        self.slots.iter_mut()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.slots.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
