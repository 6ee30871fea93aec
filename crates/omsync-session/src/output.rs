//! What a session exposes to presentation layers after each cycle.

use omsync_model::{MachineMode, SequencingMode, Snapshot, Value};
use serde::Serialize;

use crate::state::{CycleReport, SessionState};

/// Read-only view of a session, borrowed for the duration of one publish.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SessionView<'a> {
    pub state: SessionState,
    pub machine_mode: Option<MachineMode>,
    pub sequencing: SequencingMode,
    pub firmware: Option<&'a str>,
    pub consecutive_failures: u32,
    pub snapshot: &'a Snapshot,
}

impl SessionView<'_> {
    /// Follow a path into the snapshot, e.g. `["state", "status"]`.
    pub fn lookup(&self, path: &[&str]) -> Option<&Value> {
        self.snapshot.lookup(path)
    }

    /// Whether a connectivity warning should be shown.
    pub fn is_degraded(&self) -> bool {
        self.state == SessionState::Degraded
    }
}

/// Consumer of per-cycle results (console, display panel, log file).
pub trait OutputSink {
    fn publish(&mut self, view: &SessionView<'_>, report: &CycleReport);
}

impl<F> OutputSink for F
where
    F: FnMut(&SessionView<'_>, &CycleReport),
{
    fn publish(&mut self, view: &SessionView<'_>, report: &CycleReport) {
        self(view, report)
    }
}
