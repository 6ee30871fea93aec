use std::fmt;

use omsync_model::MachineMode;
use serde::Serialize;

/// Lifecycle of a [`Session`](crate::Session).
///
/// ```text
/// Disconnected -> Handshaking -> Initializing -> Synced <-> Degraded
///                      any transport failure -> Fatal
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Disconnected,
    Handshaking,
    Initializing,
    Synced,
    /// Synced, but recent cycles keep failing.
    Degraded,
    /// The link failed; the session must be recreated.
    Fatal,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Handshaking => "handshaking",
            SessionState::Initializing => "initializing",
            SessionState::Synced => "synced",
            SessionState::Degraded => "degraded",
            SessionState::Fatal => "fatal",
        }
    }

    /// Whether update cycles may run.
    pub fn is_synced(self) -> bool {
        matches!(self, SessionState::Synced | SessionState::Degraded)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a cycle threw away the cached model and re-initialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ResyncReason {
    /// `state.machineMode` no longer matches the recorded mode.
    ModeChanged { from: MachineMode, to: String },
    /// `state.upTime` went backwards: the controller restarted.
    Rebooted { previous_uptime: f64, uptime: f64 },
}

impl fmt::Display for ResyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResyncReason::ModeChanged { from, to } => {
                write!(f, "machine mode changed from {from} to {to}")
            }
            ResyncReason::Rebooted {
                previous_uptime,
                uptime,
            } => write!(f, "controller rebooted (uptime {previous_uptime} -> {uptime})"),
        }
    }
}

/// Outcome of one update cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    /// 1-based cycle counter for the session.
    pub cycle: u64,
    /// Every fetch in the cycle succeeded.
    pub success: bool,
    /// Keys fetched with the verbose (replace) flag.
    pub verbose_keys: Vec<String>,
    /// Keys fetched with the frequent (merge) flag.
    pub frequent_keys: Vec<String>,
    /// Keys whose fetch failed; their cached values are unchanged.
    pub failed_keys: Vec<String>,
    /// The `seqs` fetch failed, so no key was scheduled as dirty.
    pub scheduler_failed: bool,
    /// Set when the cycle re-initialized the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resync: Option<ResyncReason>,
    /// Wall time spent in the cycle.
    pub elapsed_ms: u64,
}

impl CycleReport {
    pub(crate) fn new(cycle: u64) -> Self {
        Self {
            cycle,
            ..Self::default()
        }
    }

    /// Number of soft failures in the cycle.
    pub fn failure_count(&self) -> usize {
        self.failed_keys.len() + usize::from(self.scheduler_failed)
    }
}
