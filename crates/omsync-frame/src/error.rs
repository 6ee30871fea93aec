use omsync_transport::TransportError;

/// Errors that can occur while exchanging framed commands.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The underlying link failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, FrameError>;

/// Errors from decoding a single reply candidate.
///
/// These are always local to one candidate; the caller skips it and moves
/// on to the next.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The candidate is not valid JSON.
    #[error("malformed JSON candidate: {0}")]
    Malformed(#[source] serde_json::Error),

    /// Valid JSON, but not an object-model envelope (`key` and `flags`).
    #[error("unrecognized payload: {0}")]
    Unrecognized(#[source] serde_json::Error),
}
