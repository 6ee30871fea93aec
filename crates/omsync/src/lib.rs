//! Keep a local mirror of a machine controller's object model.
//!
//! omsync talks to RepRapFirmware-style controllers over a serial link,
//! pulls JSON status out of their replies, and keeps a cached copy of the
//! object model current with as little traffic as the controller allows.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte-stream link contract, serial TTY port, test clock and mock
//! - [`frame`]: checksummed command framing, reply scanning, payload decoding
//! - [`model`]: cached object model, deep merge, sequence counters
//! - [`session`]: handshake, initialization, update cycles (behind `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use omsync_transport::*;
}

/// Re-export framing types.
pub mod frame {
    pub use omsync_frame::*;
}

/// Re-export object-model types.
pub mod model {
    pub use omsync_model::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use omsync_session::*;
}
