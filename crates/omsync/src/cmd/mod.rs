use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use omsync_frame::BraceMode;
use omsync_session::{NullResultPolicy, SessionConfig};
use omsync_transport::Transport;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod gcode;
pub mod probe;
pub mod version;
pub mod watch;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Handshake with a controller and print its firmware banner.
    Probe(ProbeArgs),
    /// Keep the object model in sync and print every cycle.
    Watch(WatchArgs),
    /// Send one G-code command after the handshake.
    Gcode(GcodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Probe(args) => probe::run(args, format),
        Command::Watch(args) => watch::run(args, format),
        Command::Gcode(args) => gcode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ConnectionArgs {
    /// Serial devices to try, in order (comma-separated).
    #[arg(
        long,
        short = 'd',
        env = "OMSYNC_DEVICES",
        value_delimiter = ',',
        default_value = "/dev/ttyACM0,/dev/ttyACM1"
    )]
    pub devices: Vec<PathBuf>,
    /// Serial baud rate.
    #[arg(long, env = "OMSYNC_BAUD", default_value_t = 57_600)]
    pub baud: u32,
    /// Per-request reply timeout (e.g. 500ms, 1s).
    #[arg(long, env = "OMSYNC_TIMEOUT", default_value = "500ms")]
    pub timeout: String,
    /// Firmware probes before giving up.
    #[arg(long, default_value_t = 10)]
    pub retries: u32,
    /// Append every byte sent and received to this file.
    #[arg(long, value_name = "FILE")]
    pub raw_log: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
    /// Time between cycle starts (e.g. 1s, 250ms).
    #[arg(long, default_value = "1s")]
    pub interval: String,
    /// Exit after N cycles.
    #[arg(long)]
    pub count: Option<u64>,
    /// Consecutive failed cycles tolerated before reporting degraded.
    #[arg(long, default_value_t = 3)]
    pub degraded_threshold: u32,
    /// Treat a null verbose result as an absent key instead of a failure.
    #[arg(long)]
    pub accept_null: bool,
    /// Ignore braces inside JSON string literals when scanning replies.
    #[arg(long)]
    pub quote_aware: bool,
}

#[derive(Args, Debug)]
pub struct GcodeArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
    /// Command text, without checksum (e.g. "M122").
    pub code: String,
    /// Do not wait for the reply.
    #[arg(long)]
    pub no_wait: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Build the session configuration shared by every connecting command.
pub fn session_config(args: &ConnectionArgs) -> CliResult<SessionConfig> {
    if args.retries == 0 {
        return Err(CliError::usage("--retries must be at least 1"));
    }
    let timeout = parse_duration(&args.timeout)?;
    Ok(SessionConfig {
        handshake_attempts: args.retries,
        ..SessionConfig::default().with_request_timeout(timeout)
    })
}

pub fn watch_config(args: &WatchArgs) -> CliResult<SessionConfig> {
    let base = session_config(&args.connection)?;
    Ok(SessionConfig {
        degraded_threshold: args.degraded_threshold,
        null_result: if args.accept_null {
            NullResultPolicy::Accept
        } else {
            NullResultPolicy::Fail
        },
        brace_mode: if args.quote_aware {
            BraceMode::QuoteAware
        } else {
            BraceMode::Naive
        },
        ..base
    })
}

/// Open the first device that responds to `open`, wrapped in a raw log if asked.
#[cfg(unix)]
pub fn open_transport(args: &ConnectionArgs) -> CliResult<(String, Box<dyn Transport>)> {
    use std::fs::OpenOptions;

    use omsync_transport::{LoggingTransport, TtyPort};

    use crate::exit::{io_error, transport_error};

    let port = TtyPort::open_first(&args.devices, args.baud)
        .map_err(|err| transport_error("open failed", err))?;
    let device = port.path().display().to_string();

    let Some(path) = &args.raw_log else {
        return Ok((device, Box::new(port)));
    };
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| io_error(&format!("raw log {}", path.display()), err))?;
    tracing::debug!(path = %path.display(), "logging raw traffic");
    Ok((device, Box::new(LoggingTransport::new(port, log))))
}

#[cfg(not(unix))]
pub fn open_transport(_args: &ConnectionArgs) -> CliResult<(String, Box<dyn Transport>)> {
    Err(CliError::new(
        crate::exit::TRANSPORT_ERROR,
        "serial devices are only supported on unix",
    ))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> ConnectionArgs {
        ConnectionArgs {
            devices: vec![PathBuf::from("/dev/ttyACM0")],
            baud: 57_600,
            timeout: "250ms".to_string(),
            retries: 4,
            raw_log: None,
        }
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert_eq!(parse_duration("0s").unwrap_err().code, USAGE);
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn session_config_derives_timeouts() {
        let config = session_config(&connection()).unwrap();
        assert_eq!(config.request_timeout, Duration::from_millis(250));
        assert_eq!(config.probe_timeout, Duration::from_millis(500));
        assert_eq!(config.settle_delay, Duration::from_millis(250));
        assert_eq!(config.handshake_attempts, 4);
    }

    #[test]
    fn session_config_rejects_zero_retries() {
        let mut args = connection();
        args.retries = 0;
        assert_eq!(session_config(&args).unwrap_err().code, USAGE);
    }

    #[test]
    fn watch_config_applies_flags() {
        let args = WatchArgs {
            connection: connection(),
            interval: "1s".to_string(),
            count: None,
            degraded_threshold: 5,
            accept_null: true,
            quote_aware: true,
        };
        let config = watch_config(&args).unwrap();
        assert_eq!(config.degraded_threshold, 5);
        assert_eq!(config.null_result, NullResultPolicy::Accept);
        assert_eq!(config.brace_mode, BraceMode::QuoteAware);
        assert_eq!(config.request_timeout, Duration::from_millis(250));
    }
}
