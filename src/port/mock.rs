//! Mock serial port implementation for testing.
//!
//! `MockSerialPort` behaves like a real device as far as the transport can
//! tell: `read` blocks until bytes are queued and returns empty once `close`
//! is called. Writes are logged and, for loopback ports, fed back into the
//! read queue of the peer.

use super::error::PortError;
use super::traits::{BaudRate, DataBits, Parity, PortSettings, SerialDevice, StopBits};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;

/// Inner state of the mock port, protected by a mutex for interior mutability.
#[derive(Debug)]
struct MockPortState {
    /// Queue of bytes to be returned by read operations.
    read_queue: VecDeque<u8>,
    /// Log of all bytes written to the port.
    write_log: Vec<Vec<u8>>,
    open: bool,
    /// Set by `close`; a blocked `read` returns empty instead of `NotOpen`.
    closing: bool,
    settings: PortSettings,
    rts: bool,
    dtr: bool,
    /// Error returned by the next `read`, if any.
    read_failure: Option<String>,
    /// Error returned by the next `open_with`, if any.
    open_failure: Option<PortError>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<MockPortState>,
    readable: Condvar,
}

impl Shared {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockPortState {
                read_queue: VecDeque::new(),
                write_log: Vec::new(),
                open: true,
                closing: false,
                settings: PortSettings::new(name),
                rts: false,
                dtr: false,
                read_failure: None,
                open_failure: None,
            }),
            readable: Condvar::new(),
        })
    }

    fn push(&self, data: &[u8]) {
        let mut state = self.state.lock();
        state.read_queue.extend(data);
        self.readable.notify_all();
    }
}

/// Mock serial port implementation for testing.
///
/// Clones share state, so a test can hand one clone to the transport and
/// keep another to feed input and inspect output.
///
/// # Example
/// ```
/// use serial_transport::port::{MockSerialPort, SerialDevice};
///
/// let port = MockSerialPort::new("MOCK0");
/// port.enqueue_read(b"Hello, World!");
/// assert_eq!(port.read().unwrap(), b"Hello, World!");
///
/// port.write(b"Response").unwrap();
/// assert_eq!(port.get_write_log(), vec![b"Response".to_vec()]);
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    name: String,
    shared: Arc<Shared>,
    /// Where written bytes are delivered, if anywhere.
    echo: Option<Arc<Shared>>,
}

impl MockSerialPort {
    /// Create an open mock port with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            shared: Shared::new(&name),
            name,
            echo: None,
        }
    }

    /// A port whose writes come straight back as reads.
    pub fn loopback(name: impl Into<String>) -> Self {
        let mut port = Self::new(name);
        port.echo = Some(Arc::clone(&port.shared));
        port
    }

    /// Two ports wired back to back, like a null-modem cable.
    pub fn pair(a: impl Into<String>, b: impl Into<String>) -> (Self, Self) {
        let mut left = Self::new(a);
        let mut right = Self::new(b);
        left.echo = Some(Arc::clone(&right.shared));
        right.echo = Some(Arc::clone(&left.shared));
        (left, right)
    }

    /// Reopen this port with `settings`, as a platform open would.
    ///
    /// Fails with `InvalidPort` while the port is still open, mirroring
    /// exclusive access to a real device.
    pub fn open_with(&self, settings: &PortSettings) -> Result<Self, PortError> {
        let mut state = self.shared.state.lock();
        if let Some(err) = state.open_failure.take() {
            return Err(err);
        }
        if state.open && !state.closing {
            return Err(PortError::invalid_port(format!(
                "{}: already in use",
                self.name
            )));
        }
        state.open = true;
        state.closing = false;
        state.read_queue.clear();
        state.settings = settings.clone();
        state.settings.port_name = self.name.clone();
        drop(state);
        Ok(self.clone())
    }

    /// Mark the port closed without waking readers, ready for `open_with`.
    pub fn into_closed(self) -> Self {
        {
            let mut state = self.shared.state.lock();
            state.open = false;
            state.closing = false;
        }
        self
    }

    /// Enqueue bytes to be returned by subsequent read operations.
    pub fn enqueue_read(&self, data: &[u8]) {
        self.shared.push(data);
    }

    /// Make the next `read` fail with a device error.
    pub fn fail_next_read(&self, message: impl Into<String>) {
        let mut state = self.shared.state.lock();
        state.read_failure = Some(message.into());
        self.shared.readable.notify_all();
    }

    /// Make the next `open_with` fail with `err`.
    pub fn fail_next_open(&self, err: PortError) {
        self.shared.state.lock().open_failure = Some(err);
    }

    /// Get a copy of all data written to the port.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.shared.state.lock().write_log.clone()
    }

    /// All written bytes, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.shared.state.lock().write_log.concat()
    }

    /// Clear the write log.
    pub fn clear_write_log(&self) {
        self.shared.state.lock().write_log.clear();
    }

    /// Line settings as last applied.
    pub fn settings(&self) -> PortSettings {
        self.shared.state.lock().settings.clone()
    }

    /// Get the number of bytes available to read.
    pub fn available_bytes(&self) -> usize {
        self.shared.state.lock().read_queue.len()
    }

    fn with_open<T>(
        &self,
        f: impl FnOnce(&mut MockPortState) -> Result<T, PortError>,
    ) -> Result<T, PortError> {
        let mut state = self.shared.state.lock();
        if !state.open {
            return Err(PortError::NotOpen);
        }
        f(&mut state)
    }
}

impl SerialDevice for MockSerialPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.shared.state.lock().open
    }

    fn read(&self) -> Result<Vec<u8>, PortError> {
        let mut state = self.shared.state.lock();
        loop {
            if !state.open {
                return if state.closing {
                    Ok(Vec::new())
                } else {
                    Err(PortError::NotOpen)
                };
            }
            if let Some(message) = state.read_failure.take() {
                return Err(PortError::device(
                    "read",
                    std::io::Error::new(std::io::ErrorKind::Other, message),
                ));
            }
            if !state.read_queue.is_empty() {
                return Ok(state.read_queue.drain(..).collect());
            }
            self.shared.readable.wait(&mut state);
        }
    }

    fn write(&self, data: &[u8]) -> Result<usize, PortError> {
        {
            let mut state = self.shared.state.lock();
            if !state.open {
                return if state.closing {
                    Ok(0)
                } else {
                    Err(PortError::NotOpen)
                };
            }
            state.write_log.push(data.to_vec());
        }
        // Own lock released first: a loopback target is this very port.
        if let Some(target) = &self.echo {
            target.push(data);
        }
        Ok(data.len())
    }

    fn close(&self) -> Result<(), PortError> {
        let mut state = self.shared.state.lock();
        if state.open {
            state.open = false;
            state.closing = true;
        }
        self.shared.readable.notify_all();
        Ok(())
    }

    fn set_baud_rate(&self, value: BaudRate) -> Result<(), PortError> {
        self.with_open(|state| {
            state.settings.baud_rate = value;
            Ok(())
        })
    }

    fn set_data_bits(&self, value: DataBits) -> Result<(), PortError> {
        self.with_open(|state| {
            state.settings.data_bits = value;
            Ok(())
        })
    }

    fn set_parity(&self, value: Parity) -> Result<(), PortError> {
        self.with_open(|state| {
            state.settings.parity = value;
            Ok(())
        })
    }

    fn set_stop_bits(&self, value: StopBits) -> Result<(), PortError> {
        self.with_open(|state| {
            state.settings.stop_bits = value;
            Ok(())
        })
    }

    fn bytes_to_read(&self) -> Result<usize, PortError> {
        self.with_open(|state| Ok(state.read_queue.len()))
    }

    fn bytes_to_write(&self) -> Result<usize, PortError> {
        // Writes complete immediately.
        self.with_open(|_| Ok(0))
    }

    fn rts(&self) -> Result<bool, PortError> {
        self.with_open(|state| Ok(state.rts))
    }

    fn set_rts(&self, on: bool) -> Result<(), PortError> {
        self.with_open(|state| {
            state.rts = on;
            Ok(())
        })
    }

    fn dtr(&self) -> Result<bool, PortError> {
        self.with_open(|state| Ok(state.dtr))
    }

    fn set_dtr(&self, on: bool) -> Result<(), PortError> {
        self.with_open(|state| {
            state.dtr = on;
            Ok(())
        })
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .field("loopback", &self.echo.is_some())
            .finish()
    }
}
