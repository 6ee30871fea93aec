use omsync_session::Session;
use tracing::info;

use crate::cmd::{open_transport, session_config, GcodeArgs};
use crate::exit::{session_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_reply, OutputFormat};

pub fn run(args: GcodeArgs, format: OutputFormat) -> CliResult<i32> {
    let code = args.code.trim();
    if code.is_empty() {
        return Err(CliError::usage("command must not be empty"));
    }

    let config = session_config(&args.connection)?;
    let (device, transport) = open_transport(&args.connection)?;
    let mut session =
        Session::new(transport, config).map_err(|err| session_error("invalid config", err))?;
    session
        .handshake()
        .map_err(|err| session_error("handshake failed", err))?;

    if args.no_wait {
        session
            .send_gcode(code)
            .map_err(|err| session_error("send failed", err))?;
        info!(%device, code, "command sent");
        return Ok(SUCCESS);
    }

    let reply = session
        .query(code)
        .map_err(|err| session_error("query failed", err))?;
    print_reply(code, &reply, format);

    if reply.terminated {
        Ok(SUCCESS)
    } else {
        Err(CliError::new(TIMEOUT, format!("no reply to {code} from {device}")))
    }
}
