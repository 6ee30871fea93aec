mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "omsync", version, about = "Controller object-model sync CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_watch_subcommand() {
        let cli = Cli::try_parse_from([
            "omsync",
            "watch",
            "--devices",
            "/dev/ttyUSB0,/dev/ttyUSB1",
            "--interval",
            "250ms",
            "--count",
            "3",
        ])
        .expect("watch args should parse");

        let Command::Watch(args) = cli.command else {
            panic!("expected watch");
        };
        assert_eq!(args.connection.devices.len(), 2);
        assert_eq!(args.count, Some(3));
        assert_eq!(args.connection.baud, 57_600);
    }

    #[test]
    fn parses_gcode_subcommand() {
        let cli = Cli::try_parse_from(["omsync", "gcode", "M122", "--no-wait", "--format", "raw"])
            .expect("gcode args should parse");
        assert!(matches!(cli.command, Command::Gcode(ref args) if args.no_wait));
        assert_eq!(cli.format, Some(OutputFormat::Raw));
    }

    #[test]
    fn rejects_unknown_format() {
        let err = Cli::try_parse_from(["omsync", "--format", "xml", "version"])
            .expect_err("unknown format should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn gcode_requires_code() {
        let err = Cli::try_parse_from(["omsync", "gcode"]).expect_err("code is required");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
