use std::path::PathBuf;

/// Errors that can occur in transport operations.
///
/// Every variant is unrecoverable from the point of view of a session: the
/// link has to be torn down and opened again.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the specified device.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to configure line settings on the device.
    #[error("failed to configure {path}: {source}")]
    Configure {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The requested baud rate has no platform equivalent.
    #[error("unsupported baud rate: {0}")]
    UnsupportedBaud(u32),

    /// None of the candidate devices could be opened.
    #[error("no usable device among {tried} candidate(s)")]
    NoDevice { tried: usize },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote end hung up.
    #[error("transport closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
