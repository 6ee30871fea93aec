/// Top-level key holding machine status, mode and uptime. Always tracked.
pub const STATE_KEY: &str = "state";

/// Reserved key exposing per-key change counters. Never tracked itself.
pub const SEQS_KEY: &str = "seqs";

/// Ordered set of object-model keys kept in sync for a machine mode.
///
/// `state` is always present and always first; duplicates collapse to
/// their first occurrence and the reserved `seqs` key is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedKeySet {
    keys: Vec<String>,
}

impl TrackedKeySet {
    /// Build a key set from mode-specific keys.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out = vec![STATE_KEY.to_string()];
        for key in keys {
            let key = key.into();
            if key.is_empty() || key == SEQS_KEY || out.contains(&key) {
                continue;
            }
            out.push(key);
        }
        Self { keys: out }
    }

    /// All tracked keys, `state` first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Tracked keys other than `state`.
    pub fn without_state(&self) -> impl Iterator<Item = &str> {
        self.iter().skip(1)
    }

    /// Whether `key` is tracked.
    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Number of tracked keys, including `state`.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false: `state` is always tracked.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Default for TrackedKeySet {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>())
    }
}
