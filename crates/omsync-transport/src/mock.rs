//! Scripted in-memory transport.
//!
//! Every complete line written to a [`MockTransport`] (terminated by `\n`,
//! with any trailing `\r` stripped) is handed to a responder closure whose
//! return value is queued as input. When no input is queued, a read
//! advances the shared [`ManualClock`] by the requested timeout, so a caller
//! waiting for a deadline reaches it without sleeping.

use std::collections::VecDeque;
use std::fmt;
use std::io::ErrorKind;
use std::time::Duration;

use crate::clock::ManualClock;
use crate::error::{Result, TransportError};
use crate::traits::Transport;

type Responder = Box<dyn FnMut(&str) -> Vec<u8>>;

/// Transport double that records output and replays scripted input.
pub struct MockTransport {
    clock: ManualClock,
    input: VecDeque<u8>,
    written: Vec<u8>,
    line: Vec<u8>,
    responder: Option<Responder>,
    fail_writes: bool,
    fail_reads: bool,
}

impl MockTransport {
    /// Create a mock with no responder and no queued input.
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            input: VecDeque::new(),
            written: Vec::new(),
            line: Vec::new(),
            responder: None,
            fail_writes: false,
            fail_reads: false,
        }
    }

    /// Answer each written line with the bytes the closure returns.
    pub fn with_responder(mut self, responder: impl FnMut(&str) -> Vec<u8> + 'static) -> Self {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Queue raw input bytes.
    pub fn push_input(&mut self, bytes: &[u8]) {
        self.input.extend(bytes.iter().copied());
    }

    /// Make every subsequent write fail with a broken pipe.
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Make every subsequent read report the link as closed.
    pub fn set_fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    /// Everything written so far.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Non-empty lines written so far, without line terminators.
    pub fn sent_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.written)
            .split('\n')
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Number of queued input bytes not read yet.
    pub fn pending_input(&self) -> usize {
        self.input.len()
    }

    fn complete_line(&mut self) {
        let raw = std::mem::take(&mut self.line);
        let text = String::from_utf8_lossy(&raw);
        let text = text.trim_end_matches('\r');
        if text.is_empty() {
            return;
        }
        if let Some(responder) = self.responder.as_mut() {
            let reply = responder(text);
            self.input.extend(reply);
        }
    }
}

impl Transport for MockTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        if self.fail_writes {
            return Err(TransportError::Io(std::io::Error::from(
                ErrorKind::BrokenPipe,
            )));
        }
        self.written.extend_from_slice(bytes);
        for &byte in bytes {
            if byte == b'\n' {
                self.complete_line();
            } else {
                self.line.push(byte);
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.fail_writes {
            return Err(TransportError::Io(std::io::Error::from(
                ErrorKind::BrokenPipe,
            )));
        }
        Ok(())
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>> {
        if self.fail_reads {
            return Err(TransportError::Closed);
        }
        match self.input.pop_front() {
            Some(byte) => Ok(Some(byte)),
            None => {
                self.clock.advance(timeout);
                Ok(None)
            }
        }
    }

    fn discard_input(&mut self) -> Result<()> {
        self.input.clear();
        Ok(())
    }
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("pending_input", &self.input.len())
            .field("written", &self.written.len())
            .field("has_responder", &self.responder.is_some())
            .finish()
    }
}
