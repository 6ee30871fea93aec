//! Byte-stream transport contract for talking to a machine controller.
//!
//! Provides a unified interface over the links a controller can be reached on:
//! - Serial TTY devices (USB-serial, UART) on Unix
//! - A scripted in-memory mock for tests and demos
//!
//! This is the lowest layer of omsync. Everything else builds on top of
//! the [`Transport`] trait and the [`Clock`] abstraction provided here.

pub mod clock;
pub mod error;
pub mod logging;
pub mod mock;
pub mod traits;

#[cfg(unix)]
pub mod tty;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, TransportError};
pub use logging::LoggingTransport;
pub use mock::MockTransport;
pub use traits::Transport;

#[cfg(unix)]
pub use tty::TtyPort;
