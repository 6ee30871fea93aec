use omsync_frame::{ScanOutcome, FIRMWARE_PROBE, TERMINATOR};
use omsync_transport::{Clock, Transport};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::exchange::Link;

/// Probe the controller until its reply carries the firmware signature.
///
/// A bare newline goes out first to flush any half-written line in the
/// controller's input parser. Each attempt gets `probe_timeout`; attempts
/// are spaced by `request_timeout`. After a match the link is left to
/// settle for `settle_delay`.
pub(crate) fn probe_firmware<T: Transport, C: Clock>(
    link: &mut Link<T, C>,
    config: &SessionConfig,
) -> Result<String> {
    link.write_raw(b"\n")?;

    for attempt in 1..=config.handshake_attempts {
        let reply = link.exchange(FIRMWARE_PROBE, config.probe_timeout)?;
        if reply.contains(&config.firmware_signature) {
            let banner = firmware_banner(&reply);
            info!(attempt, firmware = %banner, "controller identified");
            link.clock().sleep(config.settle_delay);
            return Ok(banner);
        }

        debug!(
            attempt,
            terminated = reply.terminated,
            "no firmware signature in probe reply"
        );
        if attempt < config.handshake_attempts {
            link.clock().sleep(config.request_timeout);
        }
    }

    warn!(
        attempts = config.handshake_attempts,
        "controller never identified itself"
    );
    Err(SessionError::HandshakeFailed {
        attempts: config.handshake_attempts,
    })
}

/// Human-readable firmware identification from a probe reply.
///
/// The trailing `ok` terminator is dropped.
pub fn firmware_banner(reply: &ScanOutcome) -> String {
    let text = reply.text.trim();
    let text = if reply.terminated {
        text.strip_suffix(TERMINATOR).unwrap_or(text)
    } else {
        text
    };
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use omsync_frame::{frame, BraceMode};
    use omsync_transport::{ManualClock, MockTransport};

    use super::*;

    const BANNER: &str = "FIRMWARE_NAME: RepRapFirmware for Duet 3 Mini 5+ FIRMWARE_VERSION: 3.4.6";

    fn link(mock: MockTransport, clock: &ManualClock) -> Link<MockTransport, ManualClock> {
        Link::new(mock, clock.clone(), BraceMode::Naive)
    }

    #[test]
    fn identifies_after_silent_attempts() {
        let clock = ManualClock::new();
        let mut probes = 0;
        let mock = MockTransport::new(clock.clone()).with_responder(move |line| {
            if !line.starts_with("M115") {
                return Vec::new();
            }
            probes += 1;
            if probes < 3 {
                Vec::new()
            } else {
                format!("{BANNER}\r\nok\r\n").into_bytes()
            }
        });
        let mut link = link(mock, &clock);
        let start = clock.now();

        let banner = probe_firmware(&mut link, &SessionConfig::default()).unwrap();

        assert_eq!(banner, BANNER);
        let written = link.transport().written();
        assert_eq!(written[0], b'\n');
        assert_eq!(
            link.transport().sent_lines(),
            vec![String::from_utf8_lossy(&frame("M115")).trim_end().to_string(); 3]
        );
        // two timed-out probes, two pauses, then the settle delay
        assert_eq!(
            clock.now() - start,
            Duration::from_millis(2 * 1000 + 2 * 500 + 500)
        );
    }

    #[test]
    fn wrong_firmware_exhausts_attempts() {
        let clock = ManualClock::new();
        let mock = MockTransport::new(clock.clone())
            .with_responder(|_| b"FIRMWARE_NAME: Marlin 2.1\nok\n".to_vec());
        let mut link = link(mock, &clock);
        let config = SessionConfig {
            handshake_attempts: 4,
            ..SessionConfig::default()
        };

        let err = probe_firmware(&mut link, &config).unwrap_err();

        assert!(matches!(err, SessionError::HandshakeFailed { attempts: 4 }));
        assert_eq!(link.transport().sent_lines().len(), 4);
    }

    #[test]
    fn custom_signature() {
        let clock = ManualClock::new();
        let mock = MockTransport::new(clock.clone())
            .with_responder(|_| b"FIRMWARE_NAME: Marlin 2.1\nok\n".to_vec());
        let mut link = link(mock, &clock);
        let config = SessionConfig {
            firmware_signature: "Marlin".to_string(),
            ..SessionConfig::default()
        };

        assert_eq!(
            probe_firmware(&mut link, &config).unwrap(),
            "FIRMWARE_NAME: Marlin 2.1"
        );
    }

    #[test]
    fn write_failure_aborts_handshake() {
        let clock = ManualClock::new();
        let mut mock = MockTransport::new(clock.clone());
        mock.set_fail_writes(true);
        let mut link = link(mock, &clock);

        let err = probe_firmware(&mut link, &SessionConfig::default()).unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn banner_keeps_unterminated_text() {
        let reply = ScanOutcome {
            blocks: Vec::new(),
            text: "RepRapFirmware ok".to_string(),
            terminated: true,
        };
        assert_eq!(firmware_banner(&reply), "RepRapFirmware");

        let reply = ScanOutcome {
            terminated: false,
            text: "RepRapFirmware bo".to_string(),
            ..reply
        };
        assert_eq!(firmware_banner(&reply), "RepRapFirmware bo");
    }
}
