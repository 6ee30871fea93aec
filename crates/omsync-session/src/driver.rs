//! Fixed-interval cycle loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use omsync_transport::{Clock, Transport};
use tracing::debug;

use crate::error::Result;
use crate::output::OutputSink;
use crate::session::Session;

/// Default time between the starts of two successful cycles.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(1);

/// Options for [`Session::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Time between cycle starts. A failed cycle is retried after a tenth of it.
    pub update_interval: Duration,
    /// Stop after this many cycles.
    pub max_cycles: Option<u64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            update_interval: DEFAULT_UPDATE_INTERVAL,
            max_cycles: None,
        }
    }
}

/// Totals for one [`Session::run`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub successful: u64,
    pub failed: u64,
}

impl<T: Transport, C: Clock> Session<T, C> {
    /// Cycle until `stop` is set, `max_cycles` is reached, or a cycle errors.
    ///
    /// Every completed cycle is published to `sink`. `stop` is only checked
    /// between cycles.
    pub fn run<S>(
        &mut self,
        sink: &mut S,
        options: &RunOptions,
        stop: &AtomicBool,
    ) -> Result<RunSummary>
    where
        S: OutputSink + ?Sized,
    {
        let mut summary = RunSummary::default();
        while !stop.load(Ordering::SeqCst) {
            let report = self.cycle()?;
            sink.publish(&self.view(), &report);

            summary.cycles += 1;
            let wait = if report.success {
                summary.successful += 1;
                let elapsed = Duration::from_millis(report.elapsed_ms);
                options.update_interval.saturating_sub(elapsed)
            } else {
                summary.failed += 1;
                options.update_interval / 10
            };

            if options.max_cycles.is_some_and(|max| summary.cycles >= max) {
                break;
            }
            if stop.load(Ordering::SeqCst) {
                break;
            }
            debug!(?wait, "waiting for next cycle");
            self.clock().sleep(wait);
        }
        Ok(summary)
    }
}
