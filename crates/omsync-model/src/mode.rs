use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::keys::TrackedKeySet;

/// High-level controller operating mode, from `state.machineMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MachineMode {
    /// Fused filament fabrication (3D printing).
    #[serde(rename = "FFF")]
    Fff,
    /// Milling / routing.
    #[serde(rename = "CNC")]
    Cnc,
    /// Laser cutting / engraving.
    Laser,
}

impl MachineMode {
    /// Wire name as reported by the controller.
    pub fn as_str(self) -> &'static str {
        match self {
            MachineMode::Fff => "FFF",
            MachineMode::Cnc => "CNC",
            MachineMode::Laser => "Laser",
        }
    }
}

impl fmt::Display for MachineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MachineMode {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "FFF" => Ok(MachineMode::Fff),
            "CNC" => Ok(MachineMode::Cnc),
            "Laser" => Ok(MachineMode::Laser),
            other => Err(ModelError::UnknownMachineMode(other.to_string())),
        }
    }
}

/// Object-model keys to keep in sync for each supported machine mode.
///
/// A mode without an entry is unsupported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeKeys {
    keys: BTreeMap<MachineMode, Vec<String>>,
}

impl ModeKeys {
    /// An empty map: no mode is supported.
    pub fn empty() -> Self {
        Self {
            keys: BTreeMap::new(),
        }
    }

    /// Add or replace the key list for `mode`.
    pub fn with_mode<I, S>(mut self, mode: MachineMode, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys
            .insert(mode, keys.into_iter().map(Into::into).collect());
        self
    }

    /// Whether a key set is configured for `mode`.
    pub fn supports(&self, mode: MachineMode) -> bool {
        self.keys.contains_key(&mode)
    }

    /// Supported modes, in a stable order.
    pub fn modes(&self) -> impl Iterator<Item = MachineMode> + '_ {
        self.keys.keys().copied()
    }

    /// Tracked key set for `mode`.
    pub fn tracked_keys(&self, mode: MachineMode) -> Result<TrackedKeySet> {
        self.keys
            .get(&mode)
            .map(|keys| TrackedKeySet::new(keys.iter().cloned()))
            .ok_or(ModelError::UnsupportedMachineMode(mode))
    }

    /// Parse a reported mode and check it is supported.
    pub fn resolve(&self, reported: &str) -> Result<MachineMode> {
        let mode: MachineMode = reported.parse()?;
        if !self.supports(mode) {
            return Err(ModelError::UnsupportedMachineMode(mode));
        }
        Ok(mode)
    }
}

impl Default for ModeKeys {
    fn default() -> Self {
        Self::empty()
            .with_mode(MachineMode::Fff, ["heat", "tools", "job", "network"])
            .with_mode(MachineMode::Cnc, ["job", "move", "spindles", "network"])
            .with_mode(MachineMode::Laser, ["job", "move", "network"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_names() {
        assert_eq!("FFF".parse::<MachineMode>().unwrap(), MachineMode::Fff);
        assert_eq!("CNC".parse::<MachineMode>().unwrap(), MachineMode::Cnc);
        assert_eq!("Laser".parse::<MachineMode>().unwrap(), MachineMode::Laser);
        assert!(matches!(
            "fff".parse::<MachineMode>(),
            Err(ModelError::UnknownMachineMode(m)) if m == "fff"
        ));
    }

    #[test]
    fn display_round_trips_wire_name() {
        for mode in [MachineMode::Fff, MachineMode::Cnc, MachineMode::Laser] {
            assert_eq!(mode.to_string().parse::<MachineMode>().unwrap(), mode);
        }
    }

    #[test]
    fn default_key_map_covers_all_modes() {
        let keys = ModeKeys::default();
        let fff = keys.tracked_keys(MachineMode::Fff).unwrap();
        assert_eq!(
            fff.iter().collect::<Vec<_>>(),
            vec!["state", "heat", "tools", "job", "network"]
        );
        let cnc = keys.tracked_keys(MachineMode::Cnc).unwrap();
        assert!(cnc.contains("spindles"));
        assert_eq!(keys.modes().count(), 3);
    }

    #[test]
    fn resolve_rejects_unconfigured_modes() {
        let keys = ModeKeys::empty().with_mode(MachineMode::Fff, ["heat"]);
        assert_eq!(keys.resolve("FFF").unwrap(), MachineMode::Fff);
        assert_eq!(
            keys.resolve("CNC").unwrap_err(),
            ModelError::UnsupportedMachineMode(MachineMode::Cnc)
        );
        assert!(matches!(
            keys.resolve("Plotter"),
            Err(ModelError::UnknownMachineMode(_))
        ));
    }

    #[test]
    fn serde_uses_wire_names() {
        assert_eq!(
            serde_json::to_string(&MachineMode::Fff).unwrap(),
            "\"FFF\""
        );
        assert_eq!(
            serde_json::from_str::<MachineMode>("\"Laser\"").unwrap(),
            MachineMode::Laser
        );
    }
}
