//! Checksummed command framing and reply scanning for controller links.
//!
//! Outgoing commands are framed as:
//! - The ASCII command text
//! - `*` followed by the decimal XOR checksum of the command's characters
//! - A `\r\n` line terminator
//!
//! Replies are a noisy character stream. The scanner pulls brace-balanced
//! JSON candidates out of it and stops at the `ok` terminator; the payload
//! decoder turns each candidate into a typed object-model envelope.

pub mod command;
pub mod error;
pub mod payload;
pub mod scanner;

pub use command::{
    checksum, encode_command, frame, om_query, unframe, Verbosity, FIRMWARE_PROBE, OM_QUERY_SUFFIX,
};
pub use error::{DecodeError, FrameError, Result};
pub use payload::{decode_payload, Payload};
pub use scanner::{scan, BraceMode, ResponseScanner, ScanOutcome, TERMINATOR};
