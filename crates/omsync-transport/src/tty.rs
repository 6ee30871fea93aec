use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Serial TTY transport (USB-serial or UART device node).
///
/// The device is opened non-blocking and switched to raw mode at the
/// requested baud rate. Reads wait with `poll(2)` so a single byte read
/// never overruns the caller's deadline.
pub struct TtyPort {
    file: File,
    path: PathBuf,
    baud: u32,
}

impl TtyPort {
    /// Baud rate used by the controller's serial console unless configured
    /// otherwise.
    pub const DEFAULT_BAUD: u32 = 57_600;

    /// Open `path` in raw mode at `baud`.
    pub fn open(path: impl AsRef<Path>, baud: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let speed = baud_constant(baud).ok_or(TransportError::UnsupportedBaud(baud))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(&path)
            .map_err(|source| TransportError::Open {
                path: path.clone(),
                source,
            })?;

        configure_raw(&file, speed).map_err(|source| TransportError::Configure {
            path: path.clone(),
            source,
        })?;

        info!(?path, baud, "opened serial device");
        Ok(Self { file, path, baud })
    }

    /// Try each candidate device in order and return the first that opens.
    ///
    /// USB-serial device nodes tend to wander (`ttyACM0` vs `ttyACM1`) when
    /// a controller reboots, hence a list rather than a single path.
    pub fn open_first(paths: &[PathBuf], baud: u32) -> Result<Self> {
        if baud_constant(baud).is_none() {
            return Err(TransportError::UnsupportedBaud(baud));
        }
        for path in paths {
            match Self::open(path, baud) {
                Ok(port) => return Ok(port),
                Err(err) => debug!(?path, %err, "device not available"),
            }
        }
        Err(TransportError::NoDevice { tried: paths.len() })
    }

    /// The device path this port was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The configured baud rate.
    pub fn baud(&self) -> u32 {
        self.baud
    }
}

impl Transport for TtyPort {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.file.write(&bytes[offset..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    wait_for(&self.file, libc::POLLOUT, Duration::from_millis(10))?;
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        // SAFETY: the descriptor is owned by `self.file` and open for the
        // lifetime of this call.
        let rc = unsafe { libc::tcdrain(self.file.as_raw_fd()) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() != ErrorKind::Interrupted {
                return Err(TransportError::Io(err));
            }
        }
        Ok(())
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>> {
        read_one(&self.file, timeout)
    }

    fn discard_input(&mut self) -> Result<()> {
        // SAFETY: see `flush`.
        let rc = unsafe { libc::tcflush(self.file.as_raw_fd(), libc::TCIFLUSH) };
        if rc != 0 {
            return Err(TransportError::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for TtyPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtyPort")
            .field("path", &self.path)
            .field("baud", &self.baud)
            .finish()
    }
}

/// Read one byte once `file` polls readable.
///
/// A readable descriptor that yields end-of-file has lost its device.
fn read_one(mut file: &File, timeout: Duration) -> Result<Option<u8>> {
    if !wait_for(file, libc::POLLIN, timeout)? {
        return Ok(None);
    }

    let mut byte = [0u8; 1];
    match file.read(&mut byte) {
        Ok(0) => Err(TransportError::Closed),
        Ok(_) => Ok(Some(byte[0])),
        Err(err)
            if matches!(
                err.kind(),
                ErrorKind::WouldBlock | ErrorKind::Interrupted | ErrorKind::InvalidData
            ) =>
        {
            Ok(None)
        }
        Err(err) => Err(TransportError::Io(err)),
    }
}

/// Wait until the descriptor is ready for `events`.
///
/// Returns `Ok(false)` on timeout. Hang-ups without pending data are
/// reported as [`TransportError::Closed`].
fn wait_for(file: &File, events: libc::c_short, timeout: Duration) -> Result<bool> {
    let mut pfd = libc::pollfd {
        fd: file.as_raw_fd(),
        events,
        revents: 0,
    };
    let millis = poll_millis(timeout);

    // SAFETY: `pfd` is a valid, writable pollfd and the count is 1.
    let rc = unsafe { libc::poll(&mut pfd, 1, millis) };
    if rc < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(TransportError::Io(err));
    }
    if rc == 0 {
        return Ok(false);
    }
    if pfd.revents & events == 0
        && pfd.revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0
    {
        return Err(TransportError::Closed);
    }
    Ok(true)
}

/// `poll(2)` timeout in whole milliseconds, rounded up so a short remaining
/// wait still blocks.
fn poll_millis(timeout: Duration) -> libc::c_int {
    timeout
        .as_nanos()
        .div_ceil(1_000_000)
        .min(libc::c_int::MAX as u128) as libc::c_int
}

fn configure_raw(file: &File, speed: libc::speed_t) -> std::io::Result<()> {
    let fd = file.as_raw_fd();
    let mut tio = std::mem::MaybeUninit::<libc::termios>::uninit();

    // SAFETY: `tio` is a valid destination for a termios struct and `fd` is
    // an open descriptor owned by `file`.
    if unsafe { libc::tcgetattr(fd, tio.as_mut_ptr()) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: tcgetattr succeeded and fully initialised the struct.
    let mut tio = unsafe { tio.assume_init() };

    // SAFETY: `tio` is an initialised termios struct.
    unsafe { libc::cfmakeraw(&mut tio) };
    tio.c_cflag |= libc::CLOCAL | libc::CREAD;
    tio.c_cc[libc::VMIN] = 0;
    tio.c_cc[libc::VTIME] = 0;

    // SAFETY: `tio` is an initialised termios struct.
    if unsafe { libc::cfsetispeed(&mut tio, speed) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::cfsetospeed(&mut tio, speed) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // SAFETY: `tio` is initialised and `fd` is open.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tio) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

fn baud_constant(baud: u32) -> Option<libc::speed_t> {
    let speed = match baud {
        9_600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        _ => return None,
    };
    Some(speed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_baud() {
        let err = TtyPort::open("/dev/null", 12_345).unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedBaud(12_345)));
    }

    #[test]
    fn missing_device_reports_open_error() {
        let path = std::env::temp_dir().join(format!(
            "omsync-no-such-tty-{}",
            std::process::id()
        ));
        let err = TtyPort::open(&path, TtyPort::DEFAULT_BAUD).unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));
    }

    #[test]
    fn non_tty_fails_configuration() {
        // /dev/null opens fine but has no line discipline.
        let err = TtyPort::open("/dev/null", TtyPort::DEFAULT_BAUD).unwrap_err();
        assert!(matches!(err, TransportError::Configure { .. }));
    }

    #[test]
    fn open_first_reports_every_candidate_failing() {
        let dir = std::env::temp_dir();
        let paths = vec![
            dir.join(format!("omsync-missing-a-{}", std::process::id())),
            dir.join(format!("omsync-missing-b-{}", std::process::id())),
        ];
        let err = TtyPort::open_first(&paths, TtyPort::DEFAULT_BAUD).unwrap_err();
        assert!(matches!(err, TransportError::NoDevice { tried: 2 }));
    }

    #[test]
    fn readable_end_of_file_is_closed() {
        // /dev/null always polls readable and always reads zero bytes.
        let file = File::open("/dev/null").unwrap();
        let err = read_one(&file, Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[test]
    fn poll_timeout_rounds_up_to_whole_millis() {
        assert_eq!(poll_millis(Duration::ZERO), 0);
        assert_eq!(poll_millis(Duration::from_micros(300)), 1);
        assert_eq!(poll_millis(Duration::from_micros(1_500)), 2);
        assert_eq!(poll_millis(Duration::from_millis(50)), 50);
        assert_eq!(poll_millis(Duration::from_secs(u64::MAX)), libc::c_int::MAX);
    }

    #[test]
    fn common_baud_rates_are_mapped() {
        for baud in [9_600, 19_200, 38_400, 57_600, 115_200, 230_400] {
            assert!(baud_constant(baud).is_some(), "{baud} should be supported");
        }
        assert!(baud_constant(250_000).is_none());
    }
}
