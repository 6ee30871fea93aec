//! Object-model synchronization sessions.
//!
//! This is the "just works" layer. Hand a [`Session`] a transport, let it
//! handshake and seed its snapshot, then call [`Session::cycle`] (or
//! [`Session::run`]) to keep the mirror current.

pub mod config;
pub mod driver;
pub mod error;
pub mod exchange;
pub mod handshake;
pub mod output;
pub mod session;
pub mod state;

#[cfg(test)]
mod testing;

pub use config::{NullResultPolicy, SessionConfig};
pub use driver::{RunOptions, RunSummary};
pub use error::{Result, SessionError};
pub use exchange::{FetchOutcome, PendingExchange};
pub use handshake::firmware_banner;
pub use output::{OutputSink, SessionView};
pub use session::Session;
pub use state::{CycleReport, ResyncReason, SessionState};
