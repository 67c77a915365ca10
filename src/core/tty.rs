//! Unix terminal device
//!
//! Wraps a terminal file descriptor: termios for mode switching and
//! `poll(2)` for input with timeouts. A self-pipe is polled next to the
//! terminal so [`ByteSource::close`] can wake a reader blocked on another
//! thread.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, FromRawFd};
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossterm::tty::IsTty;

use super::device::{ByteRead, ByteSource, DeviceError, DeviceId, Result, TerminalDevice};

/// Controlling terminal of the process
pub const CONTROLLING_TTY: &str = "/dev/tty";

/// Saved termios settings
#[derive(Clone, Copy)]
pub struct TerminalMode(libc::termios);

impl TerminalMode {
    /// Canonical (line buffered) input enabled
    pub fn is_canonical(&self) -> bool {
        self.0.c_lflag & libc::ICANON != 0
    }

    pub fn is_echo(&self) -> bool {
        self.0.c_lflag & libc::ECHO != 0
    }

    pub fn is_raw(&self) -> bool {
        self.0.c_lflag & (libc::ICANON | libc::ECHO | libc::ISIG) == 0
    }
}

impl fmt::Debug for TerminalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalMode")
            .field("c_iflag", &self.0.c_iflag)
            .field("c_oflag", &self.0.c_oflag)
            .field("c_cflag", &self.0.c_cflag)
            .field("c_lflag", &self.0.c_lflag)
            .finish()
    }
}

/// Terminal file descriptor with a wakeable input side
pub struct Tty {
    file: File,
    id: DeviceId,
    wake_rx: File,
    wake_tx: File,
    closed: AtomicBool,
}

impl Tty {
    /// Terminal attached to standard input
    pub fn stdin() -> Result<Self> {
        let fd = io::stdin()
            .as_fd()
            .try_clone_to_owned()
            .map_err(DeviceError::Open)?;
        Self::from_file(File::from(fd))
    }

    /// The process's controlling terminal, even when stdin is redirected
    pub fn controlling() -> Result<Self> {
        Self::open(CONTROLLING_TTY)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(DeviceError::Open)?;
        Self::from_file(file)
    }

    /// Wrap an already open file. It does not have to be a terminal, but
    /// raw mode can only be entered on one.
    pub fn from_file(file: File) -> Result<Self> {
        let meta = file.metadata().map_err(DeviceError::Open)?;
        // Character devices are identified by rdev so that separately
        // opened handles of one terminal collide in the guard registry
        let dev = if meta.rdev() != 0 { meta.rdev() } else { meta.dev() };
        let id = DeviceId::new(dev, meta.ino());
        let (wake_rx, wake_tx) = wake_pipe().map_err(DeviceError::Open)?;

        Ok(Self {
            file,
            id,
            wake_rx,
            wake_tx,
            closed: AtomicBool::new(false),
        })
    }

    fn drain_wake_pipe(&self) {
        let mut buf = [0u8; 16];
        while let Ok(n) = (&self.wake_rx).read(&mut buf) {
            if n == 0 {
                break;
            }
        }
    }
}

impl TerminalDevice for Tty {
    type Mode = TerminalMode;

    fn device_id(&self) -> DeviceId {
        self.id
    }

    fn is_interactive(&self) -> bool {
        self.file.is_tty()
    }

    fn query_mode(&self) -> Result<TerminalMode> {
        // Safety: termios is plain old data and fully written by tcgetattr
        let mut termios: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(self.file.as_raw_fd(), &mut termios) } != 0 {
            return Err(DeviceError::Query(io::Error::last_os_error()));
        }
        Ok(TerminalMode(termios))
    }

    fn set_mode(&self, mode: &TerminalMode) -> Result<()> {
        if unsafe { libc::tcsetattr(self.file.as_raw_fd(), libc::TCSANOW, &mode.0) } != 0 {
            return Err(DeviceError::Set(io::Error::last_os_error()));
        }
        Ok(())
    }

    fn raw_mode(&self, mode: &TerminalMode) -> TerminalMode {
        let mut termios = mode.0;
        unsafe { libc::cfmakeraw(&mut termios) };
        termios.c_cc[libc::VMIN] = 1;
        termios.c_cc[libc::VTIME] = 0;
        TerminalMode(termios)
    }
}

impl ByteSource for Tty {
    fn next_byte(&self, timeout: Option<Duration>) -> io::Result<ByteRead> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Ok(ByteRead::Closed);
            }

            let wait_ms = match deadline {
                None => -1,
                Some(deadline) => poll_millis(deadline.saturating_duration_since(Instant::now())),
            };

            let mut fds = [
                libc::pollfd {
                    fd: self.file.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                },
                libc::pollfd {
                    fd: self.wake_rx.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                },
            ];

            let ready = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, wait_ms) };
            if ready < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            if ready == 0 {
                return Ok(ByteRead::Timeout);
            }
            if fds[1].revents != 0 || self.closed.load(Ordering::SeqCst) {
                return Ok(ByteRead::Closed);
            }
            if !input_ready(fds[0].revents)? {
                continue;
            }

            let mut byte = [0u8; 1];
            match (&self.file).read(&mut byte) {
                Ok(0) => return Ok(ByteRead::Closed),
                Ok(_) => return Ok(ByteRead::Byte(byte[0])),
                Err(e) if matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock) => {
                    continue
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = (&self.wake_tx).write(&[1]);
    }

    fn reset(&self) {
        self.drain_wake_pipe();
        self.closed.store(false, Ordering::SeqCst);
    }
}

/// Whether a read will not block. An invalid descriptor is an error rather
/// than a readiness that never clears.
fn input_ready(revents: libc::c_short) -> io::Result<bool> {
    if revents & libc::POLLNVAL != 0 {
        return Err(io::Error::from_raw_os_error(libc::EBADF));
    }
    Ok(revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0)
}

/// Round up so a sub-millisecond wait does not turn into a busy poll
fn poll_millis(remaining: Duration) -> libc::c_int {
    let millis = (remaining.as_nanos() + 999_999) / 1_000_000;
    millis.min(libc::c_int::MAX as u128) as libc::c_int
}

/// Non-blocking, close-on-exec pipe: (read end, write end)
fn wake_pipe() -> io::Result<(File, File)> {
    let mut fds = [0 as libc::c_int; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // Safety: pipe() just returned two fresh descriptors we now own
    let (rx, tx) = unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) };

    for fd in [rx.as_raw_fd(), tx.as_raw_fd()] {
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFL);
            if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
                return Err(io::Error::last_os_error());
            }
            if libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) < 0 {
                return Err(io::Error::last_os_error());
            }
        }
    }
    Ok((rx, tx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// A Tty over the read end of a pipe, plus the write end
    fn piped() -> (Tty, File) {
        let (rx, tx) = wake_pipe().unwrap();
        (Tty::from_file(rx).unwrap(), tx)
    }

    #[test]
    fn test_pipe_is_not_interactive() {
        let (tty, _tx) = piped();
        assert!(!tty.is_interactive());
        assert!(matches!(tty.query_mode(), Err(DeviceError::Query(_))));
    }

    #[test]
    fn test_reads_bytes_and_times_out() -> anyhow::Result<()> {
        let (tty, mut tx) = piped();
        assert_eq!(tty.next_byte(Some(Duration::from_millis(10)))?, ByteRead::Timeout);

        tx.write_all(b"ab")?;
        assert_eq!(tty.next_byte(None)?, ByteRead::Byte(b'a'));
        assert_eq!(tty.next_byte(Some(Duration::ZERO))?, ByteRead::Byte(b'b'));

        drop(tx);
        assert_eq!(tty.next_byte(None)?, ByteRead::Closed);
        Ok(())
    }

    #[test]
    fn test_close_wakes_blocked_reader() -> anyhow::Result<()> {
        let (tty, _tx) = piped();
        let started = Instant::now();

        let result = thread::scope(|s| {
            let reader = s.spawn(|| tty.next_byte(None));
            thread::sleep(Duration::from_millis(30));
            tty.close();
            reader.join().unwrap()
        })?;

        assert_eq!(result, ByteRead::Closed);
        assert!(started.elapsed() < Duration::from_secs(2));
        Ok(())
    }

    #[test]
    fn test_reset_after_close() -> anyhow::Result<()> {
        let (tty, mut tx) = piped();
        tty.close();
        assert_eq!(tty.next_byte(None)?, ByteRead::Closed);

        tty.reset();
        tx.write_all(b"q")?;
        assert_eq!(tty.next_byte(Some(Duration::from_millis(500)))?, ByteRead::Byte(b'q'));
        Ok(())
    }

    #[test]
    fn test_distinct_devices() {
        let (a, _ta) = piped();
        let (b, _tb) = piped();
        assert_ne!(a.device_id(), b.device_id());
    }

    #[test]
    fn test_input_readiness() {
        assert!(input_ready(libc::POLLIN).unwrap());
        assert!(input_ready(libc::POLLHUP).unwrap());
        assert!(input_ready(libc::POLLERR).unwrap());
        assert!(!input_ready(0).unwrap());

        let err = input_ready(libc::POLLNVAL).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
    }

    #[test]
    fn test_poll_millis_rounds_up() {
        assert_eq!(poll_millis(Duration::ZERO), 0);
        assert_eq!(poll_millis(Duration::from_micros(10)), 1);
        assert_eq!(poll_millis(Duration::from_millis(50)), 50);
    }
}
