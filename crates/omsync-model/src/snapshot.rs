//! Cached object-model mirror, keyed by top-level section.

use serde::Serialize;

use crate::keys::STATE_KEY;
use crate::merge::merge;
use crate::value::{lookup, Map, Value};

/// How an incoming result is folded into the cached value for its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Deep-merge into the cached value (frequent replies).
    Merge,
    /// Replace the cached value wholesale (verbose replies).
    Replace,
}

/// The locally cached copy of the controller's object model.
///
/// A `null` result never overwrites an existing entry, so a failed or
/// empty fetch leaves the previous value in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Snapshot {
    keys: Map<String, Value>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.keys.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.keys.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Drop every cached key.
    pub fn clear(&mut self) {
        self.keys.clear();
    }

    /// Fold `result` into the entry for `key`.
    pub fn apply(&mut self, key: &str, result: Value, mode: UpdateMode) {
        match mode {
            UpdateMode::Merge => self.merge_key(key, result),
            UpdateMode::Replace => self.replace_key(key, result),
        }
    }

    /// Deep-merge `patch` into the entry for `key`.
    pub fn merge_key(&mut self, key: &str, patch: Value) {
        match self.keys.get_mut(key) {
            Some(slot) => {
                let existing = slot.take();
                *slot = merge(existing, patch);
            }
            None if !patch.is_null() => {
                self.keys.insert(key.to_string(), patch);
            }
            None => {}
        }
    }

    /// Replace the entry for `key`; a `null` value leaves it untouched.
    pub fn replace_key(&mut self, key: &str, value: Value) {
        if value.is_null() {
            return;
        }
        self.keys.insert(key.to_string(), value);
    }

    /// Follow a path starting at a top-level key.
    pub fn lookup(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        lookup(self.keys.get(*first)?, rest)
    }

    /// `state.machineMode` as reported.
    pub fn machine_mode_text(&self) -> Option<&str> {
        self.lookup(&[STATE_KEY, "machineMode"])?.as_str()
    }

    /// `state.upTime` in seconds.
    pub fn uptime(&self) -> Option<f64> {
        self.lookup(&[STATE_KEY, "upTime"])?.as_f64()
    }

    /// The whole mirror as one object value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.keys.clone())
    }
}
