use std::fmt;
use std::time::Duration;

use omsync_frame::BraceMode;
use omsync_model::ModeKeys;

use crate::error::{Result, SessionError};

/// Default time allowed for one object-model reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(500);

/// Default number of firmware probes before giving up.
pub const DEFAULT_HANDSHAKE_ATTEMPTS: u32 = 10;

/// Default number of consecutive failed cycles tolerated before `Degraded`.
pub const DEFAULT_DEGRADED_THRESHOLD: u32 = 3;

/// Default substring identifying supported firmware in the probe reply.
pub const DEFAULT_FIRMWARE_SIGNATURE: &str = "RepRapFirmware";

/// What a `null` result in a verbose (replace) reply means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullResultPolicy {
    /// The fetch failed; the cached key is left untouched.
    #[default]
    Fail,
    /// The key is legitimately absent; the fetch succeeds without change.
    Accept,
}

/// Configuration for a [`Session`](crate::Session).
#[derive(Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Deadline for each object-model request.
    pub request_timeout: Duration,
    /// Deadline for each firmware probe reply.
    pub probe_timeout: Duration,
    /// Firmware probes sent before the handshake fails.
    pub handshake_attempts: u32,
    /// Pause after a successful handshake before the first query.
    pub settle_delay: Duration,
    /// Substring the probe reply must contain.
    pub firmware_signature: String,
    /// Consecutive failed cycles beyond which the session reports `Degraded`.
    pub degraded_threshold: u32,
    /// Handling of `null` verbose results.
    pub null_result: NullResultPolicy,
    /// Reply scanner brace handling.
    pub brace_mode: BraceMode,
    /// Keys tracked per machine mode.
    pub mode_keys: ModeKeys,
}

impl SessionConfig {
    /// Set the request timeout together with the values derived from it.
    ///
    /// The probe timeout becomes twice the request timeout and the settle
    /// delay equals it.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self.probe_timeout = timeout * 2;
        self.settle_delay = timeout;
        self
    }

    /// Check the configuration before it is used.
    pub fn validate(&self) -> Result<()> {
        validate_timeout("request_timeout", self.request_timeout)?;
        validate_timeout("probe_timeout", self.probe_timeout)?;
        if self.handshake_attempts == 0 {
            return Err(SessionError::InvalidConfig(
                "handshake_attempts must be at least 1".to_string(),
            ));
        }
        if self.firmware_signature.trim().is_empty() {
            return Err(SessionError::InvalidConfig(
                "firmware_signature must not be empty".to_string(),
            ));
        }
        if self.mode_keys.modes().next().is_none() {
            return Err(SessionError::InvalidConfig(
                "mode_keys must configure at least one machine mode".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            probe_timeout: DEFAULT_REQUEST_TIMEOUT * 2,
            handshake_attempts: DEFAULT_HANDSHAKE_ATTEMPTS,
            settle_delay: DEFAULT_REQUEST_TIMEOUT,
            firmware_signature: DEFAULT_FIRMWARE_SIGNATURE.to_string(),
            degraded_threshold: DEFAULT_DEGRADED_THRESHOLD,
            null_result: NullResultPolicy::default(),
            brace_mode: BraceMode::default(),
            mode_keys: ModeKeys::default(),
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("request_timeout", &self.request_timeout)
            .field("probe_timeout", &self.probe_timeout)
            .field("handshake_attempts", &self.handshake_attempts)
            .field("settle_delay", &self.settle_delay)
            .field("firmware_signature", &self.firmware_signature)
            .field("degraded_threshold", &self.degraded_threshold)
            .field("null_result", &self.null_result)
            .field("brace_mode", &self.brace_mode)
            .field("modes", &self.mode_keys.modes().collect::<Vec<_>>())
            .finish()
    }
}

fn validate_timeout(name: &str, timeout: Duration) -> Result<()> {
    if timeout.is_zero() {
        return Err(SessionError::InvalidConfig(format!(
            "{name} must be greater than zero"
        )));
    }
    Ok(())
}
