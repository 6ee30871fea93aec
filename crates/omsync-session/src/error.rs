use omsync_frame::FrameError;
use omsync_model::ModelError;
use omsync_transport::TransportError;

use crate::state::SessionState;

/// Errors that can occur in session operations.
///
/// Per-key fetch failures are not errors: they are counted in the
/// [`CycleReport`](crate::CycleReport) and the cycle carries on.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// No reply carried the firmware signature within the retry budget.
    #[error("handshake failed: no firmware signature after {attempts} attempt(s)")]
    HandshakeFailed { attempts: u32 },

    /// A reserved or tracked key failed its initial fetch.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// The controller reports a machine mode with no configured key set.
    #[error("unsupported machine mode: {0}")]
    UnsupportedMode(#[from] ModelError),

    /// The operation needs a synced session.
    #[error("session is not synced (state: {0})")]
    NotSynced(SessionState),

    /// A fatal error already ended this session.
    #[error("session terminated after a fatal error")]
    Terminated,

    /// Configuration rejected by [`SessionConfig::validate`](crate::SessionConfig::validate).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SessionError {
    /// Whether the embedding must tear the session down and start over.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SessionError::NotSynced(_) | SessionError::InvalidConfig(_))
    }

    /// Whether the link itself failed.
    pub fn is_transport(&self) -> bool {
        matches!(self, SessionError::Transport(_) | SessionError::Frame(_))
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
