use std::io::Write;
use std::time::Duration;

use tracing::warn;

use crate::error::Result;
use crate::traits::Transport;

/// Tees raw link traffic into a log sink.
///
/// Sent bytes are written on their own line prefixed with `> `; received
/// bytes are copied verbatim. Failures writing the log are reported once and
/// never interrupt the link itself.
pub struct LoggingTransport<T, W> {
    inner: T,
    log: W,
    log_failed: bool,
}

impl<T: Transport, W: Write> LoggingTransport<T, W> {
    /// Wrap `inner`, copying its traffic into `log`.
    pub fn new(inner: T, log: W) -> Self {
        Self {
            inner,
            log,
            log_failed: false,
        }
    }

    /// Borrow the wrapped transport.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the wrapped transport.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the wrapper and return the transport and the log sink.
    pub fn into_parts(self) -> (T, W) {
        (self.inner, self.log)
    }

    fn record(&mut self, bytes: &[u8]) {
        if self.log_failed {
            return;
        }
        if let Err(err) = self.log.write_all(bytes) {
            warn!(%err, "raw traffic log write failed; logging disabled");
            self.log_failed = true;
        }
    }
}

impl<T: Transport, W: Write> Transport for LoggingTransport<T, W> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        let sent: Vec<u8> = bytes.iter().copied().filter(|&b| b != b'\r').collect();
        if !sent.iter().all(|&b| b == b'\n') {
            self.record(b"\n> ");
            self.record(&sent);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        if !self.log_failed {
            if let Err(err) = self.log.flush() {
                warn!(%err, "raw traffic log flush failed");
            }
        }
        Ok(())
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>> {
        let byte = self.inner.read_byte(timeout)?;
        if let Some(b) = byte {
            self.record(&[b]);
        }
        Ok(byte)
    }

    fn discard_input(&mut self) -> Result<()> {
        self.inner.discard_input()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::mock::MockTransport;

    #[test]
    fn logs_sent_lines_and_received_bytes() {
        let mock = MockTransport::new(ManualClock::new()).with_responder(|_| b"ok\n".to_vec());
        let mut logged = LoggingTransport::new(mock, Vec::<u8>::new());

        logged.write_all(b"M115*36\r\n").unwrap();
        logged.flush().unwrap();
        while logged.read_byte(Duration::ZERO).unwrap().is_some() {}

        let (_, log) = logged.into_parts();
        assert_eq!(String::from_utf8(log).unwrap(), "\n> M115*36\nok\n");
    }

    #[test]
    fn bare_newline_is_not_logged_as_command() {
        let mock = MockTransport::new(ManualClock::new());
        let mut logged = LoggingTransport::new(mock, Vec::<u8>::new());
        logged.write_all(b"\n").unwrap();
        let (mock, log) = logged.into_parts();
        assert!(log.is_empty());
        assert_eq!(mock.written(), b"\n");
    }

    #[test]
    fn log_failure_does_not_break_link() {
        let mock = MockTransport::new(ManualClock::new());
        let mut logged = LoggingTransport::new(mock, FailingWriter);
        logged.write_all(b"M115*36\r\n").unwrap();
        logged.write_all(b"M115*36\r\n").unwrap();
        assert_eq!(logged.get_ref().sent_lines().len(), 2);
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
