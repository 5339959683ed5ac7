//! Termios serial port for Linux and macOS.
//!
//! A blocked read waits in `poll(2)` on both the device and the read end of a
//! self-pipe. `close` writes to the pipe, which wakes the reader with an empty
//! result, and only then releases the descriptors.

use super::error::PortError;
use super::traits::{BaudRate, DataBits, Parity, PortSettings, SerialDevice, StopBits};
use parking_lot::{Mutex, RwLock};
use std::ffi::CString;
use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

/// Mark/space parity bit; not exported by every libc build.
#[cfg(target_os = "linux")]
const CMSPAR: libc::tcflag_t = 0o010000000000;

/// Descriptors a blocked read polls on. Dropped together when the port closes.
#[derive(Debug)]
struct Handles {
    device: OwnedFd,
    wake_rx: OwnedFd,
}

/// Serial port backed by a termios file descriptor.
#[derive(Debug)]
pub struct UnixPort {
    name: String,
    handles: RwLock<Option<Handles>>,
    wake_tx: Mutex<Option<OwnedFd>>,
    closing: AtomicBool,
}

/// Whether this platform's termios can express the parity mode.
pub fn supports_parity(parity: Parity) -> bool {
    match parity {
        Parity::None | Parity::Odd | Parity::Even => true,
        Parity::Mark | Parity::Space => cfg!(target_os = "linux"),
    }
}

/// Checks a complete line configuration without touching any device.
pub fn validate_settings(settings: &PortSettings) -> Result<(), PortError> {
    if !supports_parity(settings.parity) {
        return Err(unsupported_parity(settings.parity));
    }
    Ok(())
}

impl UnixPort {
    /// Open and configure a serial device.
    ///
    /// The device is put into raw mode with software and hardware flow control
    /// disabled, and locked against a second open.
    ///
    /// # Errors
    /// - `InvalidPort` if the path is empty, missing or already in use
    /// - `InvalidConfig` if the line parameters are unsupported here
    /// - `Device` if any termios or ioctl call fails
    pub fn open(settings: &PortSettings) -> Result<Self, PortError> {
        let path = settings.port_name.trim();
        if path.is_empty() {
            return Err(PortError::invalid_port("no serial port selected"));
        }
        validate_settings(settings)?;

        let c_path = CString::new(path)
            .map_err(|_| PortError::invalid_port(format!("{path}: contains a NUL byte")))?;
        let raw = unsafe {
            libc::open(
                c_path.as_ptr(),
                libc::O_RDWR | libc::O_NOCTTY | libc::O_NONBLOCK | libc::O_CLOEXEC,
            )
        };
        if raw < 0 {
            return Err(open_error(path, io::Error::last_os_error()));
        }
        // From here on every early return drops `device`, closing the descriptor.
        let device = unsafe { OwnedFd::from_raw_fd(raw) };
        let fd = device.as_raw_fd();

        if unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) } != 0 {
            let err = io::Error::last_os_error();
            return Err(match err.raw_os_error() {
                Some(libc::EWOULDBLOCK) => PortError::invalid_port(format!("{path}: already in use")),
                _ => PortError::device("flock", err),
            });
        }
        if unsafe { libc::ioctl(fd, libc::TIOCEXCL) } != 0 {
            return Err(PortError::last_os_error("TIOCEXCL"));
        }

        let mut termios = get_termios(fd)?;
        make_raw(&mut termios);
        apply_baud_rate(&mut termios, settings.baud_rate)?;
        apply_data_bits(&mut termios, settings.data_bits);
        apply_parity(&mut termios, settings.parity)?;
        apply_stop_bits(&mut termios, settings.stop_bits);
        set_termios(fd, &termios)?;

        if unsafe { libc::tcflush(fd, libc::TCIFLUSH) } != 0 {
            return Err(PortError::last_os_error("tcflush"));
        }

        let (wake_rx, wake_tx) = wake_pipe()?;

        debug!(
            port = path,
            baud = settings.baud_rate.bps(),
            data_bits = u8::from(settings.data_bits),
            parity = %settings.parity,
            stop_bits = settings.stop_bits.count(),
            "serial port opened"
        );

        Ok(Self {
            name: path.to_string(),
            handles: RwLock::new(Some(Handles { device, wake_rx })),
            wake_tx: Mutex::new(Some(wake_tx)),
            closing: AtomicBool::new(false),
        })
    }

    fn with_device<T>(
        &self,
        f: impl FnOnce(RawFd) -> Result<T, PortError>,
    ) -> Result<T, PortError> {
        let guard = self.handles.read();
        match guard.as_ref() {
            Some(handles) => f(handles.device.as_raw_fd()),
            None => Err(PortError::NotOpen),
        }
    }

    /// Read-modify-write of the current device attributes.
    fn update_termios(
        &self,
        f: impl FnOnce(&mut libc::termios) -> Result<(), PortError>,
    ) -> Result<(), PortError> {
        self.with_device(|fd| {
            let mut termios = get_termios(fd)?;
            f(&mut termios)?;
            set_termios(fd, &termios)
        })
    }

    fn modem_status(&self) -> Result<libc::c_int, PortError> {
        self.with_device(|fd| {
            let mut status: libc::c_int = 0;
            if unsafe { libc::ioctl(fd, libc::TIOCMGET, &mut status as *mut libc::c_int) } != 0 {
                return Err(PortError::last_os_error("TIOCMGET"));
            }
            Ok(status)
        })
    }

    fn set_modem_bit(&self, bit: libc::c_int, on: bool) -> Result<(), PortError> {
        self.with_device(|fd| {
            let request = if on { libc::TIOCMBIS } else { libc::TIOCMBIC };
            if unsafe { libc::ioctl(fd, request, &bit as *const libc::c_int) } != 0 {
                return Err(PortError::last_os_error("TIOCMSET"));
            }
            Ok(())
        })
    }

    fn closing_or_not_open(&self) -> Result<Vec<u8>, PortError> {
        if self.closing.load(Ordering::Acquire) {
            Ok(Vec::new())
        } else {
            Err(PortError::NotOpen)
        }
    }
}

impl SerialDevice for UnixPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.handles.read().is_some()
    }

    fn read(&self) -> Result<Vec<u8>, PortError> {
        let guard = self.handles.read();
        let Some(handles) = guard.as_ref() else {
            return self.closing_or_not_open();
        };
        let device = handles.device.as_raw_fd();
        let wake = handles.wake_rx.as_raw_fd();

        loop {
            let mut fds = [
                libc::pollfd {
                    fd: device,
                    events: libc::POLLIN,
                    revents: 0,
                },
                libc::pollfd {
                    fd: wake,
                    events: libc::POLLIN,
                    revents: 0,
                },
            ];
            let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(PortError::device("poll", err));
            }
            if fds[1].revents != 0 || self.closing.load(Ordering::Acquire) {
                trace!(port = %self.name, "read cancelled");
                return Ok(Vec::new());
            }
            if fds[0].revents & libc::POLLIN != 0 {
                break;
            }
            if fds[0].revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
                return Err(PortError::device(
                    "poll",
                    io::Error::new(io::ErrorKind::BrokenPipe, "serial device hung up"),
                ));
            }
        }

        drain(device)
    }

    fn write(&self, data: &[u8]) -> Result<usize, PortError> {
        if data.is_empty() {
            return Ok(0);
        }
        let guard = self.handles.read();
        let Some(handles) = guard.as_ref() else {
            // A write racing close is not an application fault.
            return self.closing_or_not_open().map(|_| 0);
        };
        let fd = handles.device.as_raw_fd();
        let wake = handles.wake_rx.as_raw_fd();

        let mut written = 0;
        while written < data.len() {
            let rest = &data[written..];
            let n = unsafe { libc::write(fd, rest.as_ptr().cast(), rest.len()) };
            if n < 0 {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::Interrupted => continue,
                    io::ErrorKind::WouldBlock => {
                        if !wait_writable(fd, wake)? || self.closing.load(Ordering::Acquire) {
                            trace!(port = %self.name, written, "write cancelled");
                            return Ok(written);
                        }
                        continue;
                    }
                    _ => return Err(PortError::device("write", err)),
                }
            }
            written += n as usize;
        }
        Ok(written)
    }

    fn close(&self) -> Result<(), PortError> {
        if self.closing.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(wake_tx) = self.wake_tx.lock().take() {
            let byte = 1u8;
            // Best effort: dropping the write end also raises POLLHUP on the
            // read end, so a failed write still wakes the reader.
            let _ = unsafe { libc::write(wake_tx.as_raw_fd(), (&byte as *const u8).cast(), 1) };
        }
        // Waits for an in-flight read or write to let go of the handles.
        let handles = self.handles.write().take();
        drop(handles);
        debug!(port = %self.name, "serial port closed");
        Ok(())
    }

    fn set_baud_rate(&self, value: BaudRate) -> Result<(), PortError> {
        self.update_termios(|t| apply_baud_rate(t, value))
    }

    fn set_data_bits(&self, value: DataBits) -> Result<(), PortError> {
        self.update_termios(|t| {
            apply_data_bits(t, value);
            Ok(())
        })
    }

    fn set_parity(&self, value: Parity) -> Result<(), PortError> {
        if !supports_parity(value) {
            return Err(unsupported_parity(value));
        }
        self.update_termios(|t| apply_parity(t, value))
    }

    fn set_stop_bits(&self, value: StopBits) -> Result<(), PortError> {
        self.update_termios(|t| {
            apply_stop_bits(t, value);
            Ok(())
        })
    }

    fn bytes_to_read(&self) -> Result<usize, PortError> {
        self.with_device(queued_input)
    }

    fn bytes_to_write(&self) -> Result<usize, PortError> {
        self.with_device(|fd| {
            let mut count: libc::c_int = 0;
            if unsafe { libc::ioctl(fd, libc::TIOCOUTQ, &mut count as *mut libc::c_int) } != 0 {
                return Err(PortError::last_os_error("TIOCOUTQ"));
            }
            Ok(count.max(0) as usize)
        })
    }

    fn rts(&self) -> Result<bool, PortError> {
        Ok(self.modem_status()? & libc::TIOCM_RTS != 0)
    }

    fn set_rts(&self, on: bool) -> Result<(), PortError> {
        self.set_modem_bit(libc::TIOCM_RTS, on)
    }

    fn dtr(&self) -> Result<bool, PortError> {
        Ok(self.modem_status()? & libc::TIOCM_DTR != 0)
    }

    fn set_dtr(&self, on: bool) -> Result<(), PortError> {
        self.set_modem_bit(libc::TIOCM_DTR, on)
    }
}

impl Drop for UnixPort {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Read everything currently queued, looping while the driver reports more.
fn drain(fd: RawFd) -> Result<Vec<u8>, PortError> {
    let mut data = Vec::new();
    loop {
        let queued = queued_input(fd)?.max(1);
        let start = data.len();
        data.resize(start + queued, 0);
        let n = unsafe { libc::read(fd, data[start..].as_mut_ptr().cast(), queued) };
        if n < 0 {
            data.truncate(start);
            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::Interrupted => continue,
                io::ErrorKind::WouldBlock => break,
                _ => return Err(PortError::device("read", err)),
            }
        }
        data.truncate(start + n as usize);
        if n == 0 || queued_input(fd)? == 0 {
            break;
        }
    }
    Ok(data)
}

fn queued_input(fd: RawFd) -> Result<usize, PortError> {
    let mut count: libc::c_int = 0;
    if unsafe { libc::ioctl(fd, libc::FIONREAD, &mut count as *mut libc::c_int) } != 0 {
        return Err(PortError::last_os_error("FIONREAD"));
    }
    Ok(count.max(0) as usize)
}

/// Blocks until `fd` accepts output. Returns `false` when the wake pipe fired.
fn wait_writable(fd: RawFd, wake: RawFd) -> Result<bool, PortError> {
    let mut fds = [
        libc::pollfd {
            fd,
            events: libc::POLLOUT,
            revents: 0,
        },
        libc::pollfd {
            fd: wake,
            events: libc::POLLIN,
            revents: 0,
        },
    ];
    if unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) } < 0 {
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(PortError::device("poll", err));
        }
        return Ok(true);
    }
    Ok(fds[1].revents == 0)
}

fn open_error(path: &str, err: io::Error) -> PortError {
    match err.raw_os_error() {
        Some(libc::ENOENT) | Some(libc::ENODEV) | Some(libc::ENXIO) | Some(libc::ENOTDIR) => {
            PortError::invalid_port(format!("{path}: no such device"))
        }
        Some(libc::EBUSY) => PortError::invalid_port(format!("{path}: already in use")),
        Some(libc::EACCES) | Some(libc::EPERM) => {
            PortError::invalid_port(format!("{path}: permission denied"))
        }
        _ => PortError::device("open", err),
    }
}

fn unsupported_parity(parity: Parity) -> PortError {
    PortError::invalid_config(format!("{parity} parity is not supported on this platform"))
}

fn get_termios(fd: RawFd) -> Result<libc::termios, PortError> {
    let mut termios = std::mem::MaybeUninit::<libc::termios>::uninit();
    if unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) } != 0 {
        return Err(PortError::last_os_error("tcgetattr"));
    }
    Ok(unsafe { termios.assume_init() })
}

fn set_termios(fd: RawFd, termios: &libc::termios) -> Result<(), PortError> {
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, termios) } != 0 {
        return Err(PortError::last_os_error("tcsetattr"));
    }
    Ok(())
}

fn set_nonblocking(fd: RawFd, on: bool) -> Result<(), PortError> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(PortError::last_os_error("fcntl"));
    }
    let flags = if on {
        flags | libc::O_NONBLOCK
    } else {
        flags & !libc::O_NONBLOCK
    };
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags) } != 0 {
        return Err(PortError::last_os_error("fcntl"));
    }
    Ok(())
}

/// Non-blocking, close-on-exec pipe used to interrupt `poll`.
fn wake_pipe() -> Result<(OwnedFd, OwnedFd), PortError> {
    let mut fds = [0 as RawFd; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(PortError::last_os_error("pipe"));
    }
    let (rx, tx) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    for fd in [rx.as_raw_fd(), tx.as_raw_fd()] {
        set_nonblocking(fd, true)?;
        if unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) } != 0 {
            return Err(PortError::last_os_error("fcntl"));
        }
    }
    Ok((rx, tx))
}

/// Non-canonical, non-echoing, no output processing, no flow control.
fn make_raw(t: &mut libc::termios) {
    t.c_cflag |= libc::CLOCAL | libc::CREAD;
    t.c_cflag &= !libc::CRTSCTS;
    t.c_lflag &= !(libc::ICANON
        | libc::ECHO
        | libc::ECHOE
        | libc::ECHOK
        | libc::ECHONL
        | libc::ISIG
        | libc::IEXTEN);
    t.c_oflag &= !(libc::OPOST | libc::ONLCR | libc::OCRNL);
    t.c_iflag &= !(libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IGNBRK
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);
    t.c_cc[libc::VMIN] = 1;
    t.c_cc[libc::VTIME] = 0;
}

fn speed_constant(rate: BaudRate) -> libc::speed_t {
    match rate {
        BaudRate::Baud50 => libc::B50,
        BaudRate::Baud75 => libc::B75,
        BaudRate::Baud110 => libc::B110,
        BaudRate::Baud134 => libc::B134,
        BaudRate::Baud150 => libc::B150,
        BaudRate::Baud200 => libc::B200,
        BaudRate::Baud300 => libc::B300,
        BaudRate::Baud600 => libc::B600,
        BaudRate::Baud1200 => libc::B1200,
        BaudRate::Baud1800 => libc::B1800,
        BaudRate::Baud2400 => libc::B2400,
        BaudRate::Baud4800 => libc::B4800,
        BaudRate::Baud9600 => libc::B9600,
        BaudRate::Baud19200 => libc::B19200,
        BaudRate::Baud38400 => libc::B38400,
        BaudRate::Baud57600 => libc::B57600,
        BaudRate::Baud115200 => libc::B115200,
    }
}

fn apply_baud_rate(t: &mut libc::termios, rate: BaudRate) -> Result<(), PortError> {
    let speed = speed_constant(rate);
    unsafe {
        if libc::cfsetispeed(t, speed) != 0 || libc::cfsetospeed(t, speed) != 0 {
            return Err(PortError::last_os_error("cfsetspeed"));
        }
    }
    Ok(())
}

fn apply_data_bits(t: &mut libc::termios, bits: DataBits) {
    t.c_cflag &= !libc::CSIZE;
    t.c_cflag |= match bits {
        DataBits::Five => libc::CS5,
        DataBits::Six => libc::CS6,
        DataBits::Seven => libc::CS7,
        DataBits::Eight => libc::CS8,
    };
}

fn apply_parity(t: &mut libc::termios, parity: Parity) -> Result<(), PortError> {
    t.c_iflag &= !(libc::INPCK | libc::ISTRIP);
    t.c_cflag &= !(libc::PARENB | libc::PARODD);
    #[cfg(target_os = "linux")]
    {
        t.c_cflag &= !CMSPAR;
    }

    match parity {
        Parity::None => {}
        Parity::Odd => t.c_cflag |= libc::PARENB | libc::PARODD,
        Parity::Even => t.c_cflag |= libc::PARENB,
        #[cfg(target_os = "linux")]
        Parity::Mark => t.c_cflag |= libc::PARENB | libc::PARODD | CMSPAR,
        #[cfg(target_os = "linux")]
        Parity::Space => t.c_cflag |= libc::PARENB | CMSPAR,
        #[cfg(not(target_os = "linux"))]
        Parity::Mark | Parity::Space => return Err(unsupported_parity(parity)),
    }
    Ok(())
}

fn apply_stop_bits(t: &mut libc::termios, bits: StopBits) {
    match bits {
        StopBits::One => t.c_cflag &= !libc::CSTOPB,
        StopBits::Two => t.c_cflag |= libc::CSTOPB,
    }
}
