use std::collections::BTreeSet;
use std::fmt;

use omsync_frame::{ScanOutcome, Verbosity};
use omsync_model::{
    MachineMode, SequenceTable, SequencingMode, Snapshot, TrackedKeySet, Value, SEQS_KEY,
    STATE_KEY,
};
use omsync_transport::{Clock, SystemClock, Transport};
use tracing::{debug, info, warn};

use crate::config::{NullResultPolicy, SessionConfig};
use crate::error::{Result, SessionError};
use crate::exchange::{FetchOutcome, Link};
use crate::handshake::probe_firmware;
use crate::output::SessionView;
use crate::state::{CycleReport, ResyncReason, SessionState};

/// A synchronization session with one controller.
///
/// The session owns the cached [`Snapshot`] and [`SequenceTable`]; nothing
/// else mutates them. All I/O is synchronous and bounded by the configured
/// timeouts, with at most one request outstanding.
pub struct Session<T, C = SystemClock> {
    link: Link<T, C>,
    config: SessionConfig,
    state: SessionState,
    snapshot: Snapshot,
    sequences: SequenceTable,
    /// Keys found dirty outside a cycle, fetched verbosely by the next one.
    pending_dirty: BTreeSet<String>,
    tracked: TrackedKeySet,
    machine_mode: Option<MachineMode>,
    sequencing: SequencingMode,
    uptime: Option<f64>,
    firmware: Option<String>,
    consecutive_failures: u32,
    cycles: u64,
}

impl<T: Transport> Session<T> {
    /// Create a session on the system clock.
    pub fn new(transport: T, config: SessionConfig) -> Result<Self> {
        Self::with_clock(transport, SystemClock, config)
    }
}

impl<T: Transport, C: Clock> Session<T, C> {
    /// Create a session with an explicit clock.
    pub fn with_clock(transport: T, clock: C, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            link: Link::new(transport, clock, config.brace_mode),
            config,
            state: SessionState::Disconnected,
            snapshot: Snapshot::new(),
            sequences: SequenceTable::new(),
            pending_dirty: BTreeSet::new(),
            tracked: TrackedKeySet::default(),
            machine_mode: None,
            sequencing: SequencingMode::default(),
            uptime: None,
            firmware: None,
            consecutive_failures: 0,
            cycles: 0,
        })
    }

    /// Handshake, then initialize.
    pub fn connect(&mut self) -> Result<()> {
        self.handshake()?;
        self.initialize()
    }

    /// Identify the controller firmware.
    ///
    /// Failure is fatal: the session moves to [`SessionState::Fatal`].
    pub fn handshake(&mut self) -> Result<String> {
        self.ensure_alive()?;
        self.state = SessionState::Handshaking;
        match probe_firmware(&mut self.link, &self.config) {
            Ok(banner) => {
                self.firmware = Some(banner.clone());
                Ok(banner)
            }
            Err(err) => {
                self.state = SessionState::Fatal;
                Err(err)
            }
        }
    }

    /// Seed the snapshot from scratch.
    ///
    /// Fetches `seqs` and `state`, resolves the machine mode and sequencing
    /// mode, then fetches every tracked key verbosely. Any failure leaves the
    /// session [`Disconnected`](SessionState::Disconnected) (or
    /// [`Fatal`](SessionState::Fatal) if the link broke).
    pub fn initialize(&mut self) -> Result<()> {
        self.ensure_alive()?;
        self.state = SessionState::Initializing;
        self.reset_model();

        match self.seed() {
            Ok(()) => {
                self.state = SessionState::Synced;
                self.consecutive_failures = 0;
                info!(
                    mode = ?self.machine_mode,
                    sequencing = ?self.sequencing,
                    keys = self.tracked.len(),
                    "object model synchronized"
                );
                Ok(())
            }
            Err(err) => {
                self.state = if err.is_transport() {
                    SessionState::Fatal
                } else {
                    SessionState::Disconnected
                };
                warn!(error = %err, "initialization failed");
                Err(err)
            }
        }
    }

    /// Run one update cycle.
    ///
    /// Soft failures (a key timing out, a verbose `null`) are reported in
    /// the returned [`CycleReport`]. `Err` means the session can no longer
    /// cycle: the link failed, or a resync could not re-initialize.
    pub fn cycle(&mut self) -> Result<CycleReport> {
        self.ensure_synced()?;
        let started = self.link.clock().now();
        self.cycles += 1;
        let mut report = CycleReport::new(self.cycles);

        let result = self.run_cycle(&mut report);
        self.guard(result)?;

        report.success = report.failure_count() == 0;
        report.elapsed_ms = duration_ms(self.link.clock().now() - started);
        self.record_outcome(&report);
        Ok(report)
    }

    /// Fetch `seqs` (frequent) and return the tracked keys whose counters
    /// changed.
    ///
    /// `Ok(None)` means the `seqs` fetch itself failed. The returned keys
    /// stay pending and are fetched verbosely by the next [`cycle`].
    ///
    /// [`cycle`]: Session::cycle
    pub fn refresh_dirty_set(&mut self) -> Result<Option<BTreeSet<String>>> {
        self.ensure_synced()?;
        let result = self.dirty_set();
        let dirty = self.guard(result)?;
        if let Some(dirty) = &dirty {
            self.pending_dirty.extend(dirty.iter().cloned());
        }
        Ok(dirty)
    }

    /// Fetch one key and fold the reply into the snapshot.
    ///
    /// Returns `Ok(false)` for a soft failure; the cached value is untouched.
    pub fn request_key(&mut self, key: &str, verbosity: Verbosity) -> Result<bool> {
        self.ensure_alive()?;
        let result = self.fetch_key(key, verbosity);
        Ok(self.guard(result)?.is_success())
    }

    /// Send an arbitrary command without waiting for its reply.
    pub fn send_gcode(&mut self, code: &str) -> Result<()> {
        self.ensure_alive()?;
        debug!(code, "sending command");
        let result = self.link.send(code);
        self.guard(result)
    }

    /// Send an arbitrary command and scan its reply.
    pub fn query(&mut self, command: &str) -> Result<ScanOutcome> {
        self.ensure_alive()?;
        let result = self.link.exchange(command, self.config.request_timeout);
        self.guard(result)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn sequence_table(&self) -> &SequenceTable {
        &self.sequences
    }

    pub fn tracked_keys(&self) -> &TrackedKeySet {
        &self.tracked
    }

    pub fn machine_mode(&self) -> Option<MachineMode> {
        self.machine_mode
    }

    pub fn sequencing(&self) -> SequencingMode {
        self.sequencing
    }

    /// Last recorded `state.upTime`.
    pub fn uptime(&self) -> Option<f64> {
        self.uptime
    }

    /// Firmware banner from the last successful handshake.
    pub fn firmware(&self) -> Option<&str> {
        self.firmware.as_deref()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Cycles run so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        self.link.clock()
    }

    /// Everything an output layer needs after a cycle.
    pub fn view(&self) -> SessionView<'_> {
        SessionView {
            state: self.state,
            machine_mode: self.machine_mode,
            sequencing: self.sequencing,
            firmware: self.firmware.as_deref(),
            consecutive_failures: self.consecutive_failures,
            snapshot: &self.snapshot,
        }
    }

    pub fn transport(&self) -> &T {
        self.link.transport()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.link.transport_mut()
    }

    pub fn into_transport(self) -> T {
        self.link.into_transport()
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.state == SessionState::Fatal {
            return Err(SessionError::Terminated);
        }
        Ok(())
    }

    fn ensure_synced(&self) -> Result<()> {
        self.ensure_alive()?;
        if !self.state.is_synced() {
            return Err(SessionError::NotSynced(self.state));
        }
        Ok(())
    }

    /// Record a broken link before handing the error back.
    fn guard<R>(&mut self, result: Result<R>) -> Result<R> {
        if let Err(err) = &result {
            if err.is_transport() {
                self.state = SessionState::Fatal;
            }
        }
        result
    }

    fn reset_model(&mut self) {
        self.snapshot.clear();
        self.sequences.clear();
        self.pending_dirty.clear();
        self.tracked = TrackedKeySet::default();
        self.machine_mode = None;
        self.sequencing = SequencingMode::default();
        self.uptime = None;
    }

    fn fetch_key(&mut self, key: &str, verbosity: Verbosity) -> Result<FetchOutcome> {
        self.link.fetch(
            &mut self.snapshot,
            key,
            verbosity,
            self.config.request_timeout,
            self.config.null_result,
        )
    }

    fn fetch_required(&mut self, key: &str) -> Result<()> {
        let outcome = self.fetch_key(key, Verbosity::Verbose)?;
        if !outcome.is_success() {
            return Err(SessionError::Initialization(format!(
                "initial fetch of '{key}' failed ({outcome:?})"
            )));
        }
        Ok(())
    }

    fn seed(&mut self) -> Result<()> {
        // An empty `seqs` result selects SBC mode, so null is never a failure here.
        let seqs = self.link.fetch(
            &mut self.snapshot,
            SEQS_KEY,
            Verbosity::Verbose,
            self.config.request_timeout,
            NullResultPolicy::Accept,
        )?;
        if !seqs.is_success() {
            return Err(SessionError::Initialization(format!(
                "initial fetch of '{SEQS_KEY}' failed ({seqs:?})"
            )));
        }
        self.sequencing =
            SequencingMode::from_seqs(self.snapshot.get(SEQS_KEY).unwrap_or(&Value::Null));

        self.fetch_required(STATE_KEY)?;
        let reported = self.snapshot.machine_mode_text().ok_or_else(|| {
            SessionError::Initialization("state has no machineMode".to_string())
        })?;
        let mode = self.config.mode_keys.resolve(reported)?;
        self.tracked = self.config.mode_keys.tracked_keys(mode)?;
        self.machine_mode = Some(mode);
        self.uptime = self.snapshot.uptime();

        if self.sequencing == SequencingMode::Standalone {
            self.sequences.seed(
                &self.tracked,
                self.snapshot.get(SEQS_KEY).unwrap_or(&Value::Null),
            );
        }

        let keys: Vec<String> = self.tracked.without_state().map(str::to_string).collect();
        for key in &keys {
            self.fetch_required(key)?;
        }
        Ok(())
    }

    fn dirty_set(&mut self) -> Result<Option<BTreeSet<String>>> {
        let outcome = self.fetch_key(SEQS_KEY, Verbosity::Frequent)?;
        if !outcome.is_success() {
            warn!("sequence counters unavailable this cycle");
            return Ok(None);
        }
        let dirty = self.sequences.refresh(
            &self.tracked,
            self.snapshot.get(SEQS_KEY).unwrap_or(&Value::Null),
        );
        if !dirty.is_empty() {
            debug!(?dirty, "keys changed since last cycle");
        }
        Ok(Some(dirty))
    }

    fn run_cycle(&mut self, report: &mut CycleReport) -> Result<()> {
        // `None` marks every key dirty.
        let dirty = match self.sequencing {
            SequencingMode::Sbc => None,
            SequencingMode::Standalone => {
                let fresh = self.dirty_set()?;
                let mut dirty = std::mem::take(&mut self.pending_dirty);
                match fresh {
                    Some(fresh) => dirty.extend(fresh),
                    None => report.scheduler_failed = true,
                }
                Some(dirty)
            }
        };
        let verbosity_for = |key: &str| {
            Verbosity::for_dirty(dirty.as_ref().is_none_or(|dirty| dirty.contains(key)))
        };

        // Reboot and mode checks need a fresh `state`.
        let state_ok = self.fetch_into(STATE_KEY, verbosity_for(STATE_KEY), report)?;
        let resync = if state_ok { self.detect_resync() } else { None };
        if let Some(reason) = resync {
            info!(%reason, "resynchronizing object model");
            self.initialize()?;
            report.frequent_keys.clear();
            report.verbose_keys = self.tracked.iter().map(str::to_string).collect();
            report.resync = Some(reason);
            return Ok(());
        }

        let keys: Vec<String> = self.tracked.without_state().map(str::to_string).collect();
        for key in &keys {
            self.fetch_into(key, verbosity_for(key), report)?;
        }
        Ok(())
    }

    fn fetch_into(
        &mut self,
        key: &str,
        verbosity: Verbosity,
        report: &mut CycleReport,
    ) -> Result<bool> {
        match verbosity {
            Verbosity::Verbose => report.verbose_keys.push(key.to_string()),
            Verbosity::Frequent => report.frequent_keys.push(key.to_string()),
        }
        let ok = self.fetch_key(key, verbosity)?.is_success();
        if !ok {
            report.failed_keys.push(key.to_string());
        }
        Ok(ok)
    }

    /// Compare the freshly fetched `state` with what was recorded.
    fn detect_resync(&mut self) -> Option<ResyncReason> {
        let recorded = self.machine_mode?;
        if let Some(reported) = self.snapshot.machine_mode_text() {
            if reported != recorded.as_str() {
                return Some(ResyncReason::ModeChanged {
                    from: recorded,
                    to: reported.to_string(),
                });
            }
        }

        let uptime = self.snapshot.uptime()?;
        if let Some(previous) = self.uptime {
            if uptime < previous {
                return Some(ResyncReason::Rebooted {
                    previous_uptime: previous,
                    uptime,
                });
            }
        }
        self.uptime = Some(uptime);
        None
    }

    fn record_outcome(&mut self, report: &CycleReport) {
        if report.success {
            if self.state == SessionState::Degraded {
                info!(cycle = report.cycle, "connection recovered");
            }
            self.consecutive_failures = 0;
            self.state = SessionState::Synced;
            return;
        }

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        warn!(
            cycle = report.cycle,
            failed = ?report.failed_keys,
            scheduler_failed = report.scheduler_failed,
            consecutive = self.consecutive_failures,
            "update cycle incomplete"
        );
        if self.consecutive_failures > self.config.degraded_threshold
            && self.state != SessionState::Degraded
        {
            warn!(
                consecutive = self.consecutive_failures,
                "session degraded"
            );
            self.state = SessionState::Degraded;
        }
    }
}

impl<T, C> fmt::Debug for Session<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("machine_mode", &self.machine_mode)
            .field("sequencing", &self.sequencing)
            .field("tracked", &self.tracked)
            .field("uptime", &self.uptime)
            .field("consecutive_failures", &self.consecutive_failures)
            .field("cycles", &self.cycles)
            .finish_non_exhaustive()
    }
}

fn duration_ms(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
