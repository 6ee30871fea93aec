use std::time::Duration;

use crate::error::Result;

/// A bidirectional byte link to a controller.
///
/// Writes are all-or-error; any error returned from [`write_all`] or
/// [`flush`] is fatal for the session using the link. Reads are polled one
/// byte at a time so a caller can enforce its own deadline.
///
/// [`write_all`]: Transport::write_all
/// [`flush`]: Transport::flush
pub trait Transport {
    /// Write every byte of `bytes` (blocking).
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Flush buffered output to the device.
    fn flush(&mut self) -> Result<()>;

    /// Wait up to `timeout` for a single byte.
    ///
    /// Returns `Ok(None)` when nothing arrived in time or the byte could not
    /// be read cleanly. `Err` is reserved for hard failures (device gone).
    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>>;

    /// Drop any input that has arrived but not been read yet.
    fn discard_input(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_all(bytes)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>> {
        (**self).read_byte(timeout)
    }

    fn discard_input(&mut self) -> Result<()> {
        (**self).discard_input()
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_all(bytes)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>> {
        (**self).read_byte(timeout)
    }

    fn discard_input(&mut self) -> Result<()> {
        (**self).discard_input()
    }
}
