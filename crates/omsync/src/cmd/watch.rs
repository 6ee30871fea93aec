use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use omsync_session::{CycleReport, RunOptions, Session, SessionView};
use tracing::info;

use crate::cmd::{open_transport, parse_duration, watch_config, WatchArgs};
use crate::exit::{session_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS, USAGE};
use crate::output::{print_cycle, OutputFormat};

pub fn run(args: WatchArgs, format: OutputFormat) -> CliResult<i32> {
    let update_interval = parse_duration(&args.interval)?;
    if args.count == Some(0) {
        return Err(CliError::new(USAGE, "--count must be at least 1"));
    }
    let config = watch_config(&args)?;
    let (device, transport) = open_transport(&args.connection)?;
    let mut session =
        Session::new(transport, config).map_err(|err| session_error("invalid config", err))?;

    let stop = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(stop.clone())?;

    session
        .connect()
        .map_err(|err| session_error("connect failed", err))?;
    info!(%device, mode = ?session.machine_mode(), "synced");

    let options = RunOptions {
        update_interval,
        max_cycles: args.count,
    };
    let mut sink = |view: &SessionView<'_>, report: &CycleReport| {
        print_cycle(view, report, format);
    };
    let summary = session
        .run(&mut sink, &options, &stop)
        .map_err(|err| session_error("sync failed", err))?;
    info!(
        cycles = summary.cycles,
        successful = summary.successful,
        failed = summary.failed,
        "stopped"
    );

    if summary.cycles > 0 && summary.successful == 0 {
        Ok(FAILURE)
    } else {
        Ok(SUCCESS)
    }
}

fn install_ctrlc_handler(stop: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
