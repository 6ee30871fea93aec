use omsync_session::Session;

use crate::cmd::{open_transport, session_config, ProbeArgs};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_probe, OutputFormat};

pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = session_config(&args.connection)?;
    let (device, transport) = open_transport(&args.connection)?;
    let mut session =
        Session::new(transport, config).map_err(|err| session_error("invalid config", err))?;

    let banner = session
        .handshake()
        .map_err(|err| session_error("handshake failed", err))?;
    print_probe(&device, &banner, format);

    Ok(SUCCESS)
}
