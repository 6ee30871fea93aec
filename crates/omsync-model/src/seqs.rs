use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::trace;

use crate::keys::TrackedKeySet;
use crate::value::{as_counter, is_empty, Value};

/// How the controller produces its object model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SequencingMode {
    /// Firmware serves the model itself and maintains `seqs` counters.
    #[default]
    Standalone,
    /// A single-board computer owns the model; no counters are available.
    Sbc,
}

impl SequencingMode {
    /// Classify a `seqs` reply: `null` or an empty object means SBC.
    pub fn from_seqs(seqs: &Value) -> Self {
        if is_empty(seqs) {
            SequencingMode::Sbc
        } else {
            SequencingMode::Standalone
        }
    }

    pub fn is_sbc(self) -> bool {
        self == SequencingMode::Sbc
    }
}

/// Last-seen change counter per tracked key.
///
/// A key is absent when the controller reports no counter for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceTable {
    counters: BTreeMap<String, i64>,
}

impl SequenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the table with counters from `seqs` for every tracked key.
    pub fn seed(&mut self, tracked: &TrackedKeySet, seqs: &Value) {
        self.counters.clear();
        for key in tracked.iter() {
            if let Some(counter) = seqs.get(key).and_then(as_counter) {
                self.counters.insert(key.to_string(), counter);
            }
        }
    }

    /// Compare `seqs` with the stored counters and return the tracked keys
    /// whose counter changed, appeared or disappeared.
    ///
    /// Counters for dirty keys are updated in place.
    pub fn refresh(&mut self, tracked: &TrackedKeySet, seqs: &Value) -> BTreeSet<String> {
        let mut dirty = BTreeSet::new();
        for key in tracked.iter() {
            let incoming = seqs.get(key).and_then(as_counter);
            if incoming == self.counters.get(key).copied() {
                continue;
            }
            match incoming {
                Some(counter) => {
                    self.counters.insert(key.to_string(), counter);
                }
                None => {
                    trace!(key, "sequence counter missing");
                    self.counters.remove(key);
                }
            }
            dirty.insert(key.to_string());
        }
        dirty
    }

    pub fn get(&self, key: &str) -> Option<i64> {
        self.counters.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub fn clear(&mut self) {
        self.counters.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.counters.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<K: Into<String>> FromIterator<(K, i64)> for SequenceTable {
    fn from_iter<I: IntoIterator<Item = (K, i64)>>(iter: I) -> Self {
        Self {
            counters: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
