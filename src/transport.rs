//! The serial transport.
//!
//! [`SerialTransport`] owns one device per open/close cycle and a single
//! background reader thread. Inbound chunks go either to the receive callback
//! or, while a [`SynchronousGuard`] is alive, into the [`SyncBuffer`] that
//! [`SerialTransport::receive`] searches.
//!
//! Locking: configuration, callback registrations, the mode flag and the
//! device handle live behind one `RwLock`. Callbacks are cloned out under the
//! read lock and invoked after it is released, so a handler may call back
//! into the transport. The sync buffer has its own lock. Open and close are
//! serialized by a separate lifecycle mutex that also owns the reader's
//! `JoinHandle`; state and lifecycle handlers run while it is held and must
//! not call `open` or `close` themselves.

use crate::error::{Result, TransportError};
use crate::events::{
    ConnectionState, ErrorHandler, Handlers, ReceivedEvent, StateHandler, TraceEvent,
    TraceFormat, TraceHandler, TraceLevel, TraceType,
};
use crate::messages::{catalog_for, Message, MessageCatalog};
use crate::port::{
    self, BaudRate, DataBits, NativeOpener, Parity, PortError, PortOpener, PortSettings,
    SerialDevice, StopBits,
};
use crate::settings;
use crate::sync_buffer::SyncBuffer;
use crate::wire::{hex, FromWire, ToWire};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tracing::{debug, warn};

/// Parameters of one synchronous receive.
///
/// At least one of `eop`, `count` or `all_data` must be set.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiveParameters<T> {
    /// Terminator that ends the reply; included in the reply.
    pub eop: Option<Vec<u8>>,
    /// Minimum number of bytes; with no terminator, the exact reply length.
    pub count: usize,
    /// Return everything buffered instead of the matched span.
    pub all_data: bool,
    /// How long to wait, in milliseconds. Zero or less returns at once.
    pub wait_time: i64,
    /// Decoded reply, set when `receive` returns `true`.
    pub reply: Option<T>,
}

impl<T> Default for ReceiveParameters<T> {
    fn default() -> Self {
        Self {
            eop: None,
            count: 0,
            all_data: false,
            wait_time: 0,
            reply: None,
        }
    }
}

impl<T> ReceiveParameters<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_eop<E: ToWire + ?Sized>(mut self, eop: &E) -> Self {
        self.eop = Some(eop.to_wire());
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn with_all_data(mut self) -> Self {
        self.all_data = true;
        self
    }

    pub fn with_wait_time(mut self, millis: i64) -> Self {
        self.wait_time = millis;
        self
    }

    fn terminator(&self) -> &[u8] {
        self.eop.as_deref().unwrap_or_default()
    }
}

struct Inner {
    settings: PortSettings,
    eop: Option<Vec<u8>>,
    trace_level: TraceLevel,
    trace_format: TraceFormat,
    state: ConnectionState,
    synchronous: bool,
    device: Option<Arc<dyn SerialDevice>>,
    reader_thread: Option<ThreadId>,
    handlers: Handlers,
    catalog: Arc<dyn MessageCatalog>,
    opener: Arc<dyn PortOpener>,
}

/// State shared with the reader thread.
struct Shared {
    inner: RwLock<Inner>,
    buffer: SyncBuffer,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    closing: AtomicBool,
}

impl Shared {
    fn port_name(&self) -> String {
        self.inner.read().settings.port_name.clone()
    }

    fn message(&self, message: Message, error: Option<&dyn fmt::Display>) -> String {
        let inner = self.inner.read();
        inner
            .catalog
            .format(message, &inner.settings.port_name, error)
    }

    fn device(&self) -> Option<Arc<dyn SerialDevice>> {
        self.inner.read().device.clone()
    }

    fn on_reader_thread(&self) -> bool {
        self.inner.read().reader_thread == Some(thread::current().id())
    }

    fn set_state(&self, state: ConnectionState) {
        let handler: Option<StateHandler> = {
            let mut inner = self.inner.write();
            inner.state = state;
            inner.handlers.state.clone()
        };
        if let Some(handler) = handler {
            handler(state);
        }
    }

    fn report_error(&self, err: &TransportError) {
        let handler: Option<ErrorHandler> = self.inner.read().handlers.error.clone();
        if let Some(handler) = handler {
            handler(err);
        }
    }

    /// Deliver a trace event if the level lets it through. `text` is only
    /// built when a handler will see it.
    fn trace(&self, kind: TraceType, text: impl FnOnce() -> String) {
        let handler: Option<TraceHandler> = {
            let inner = self.inner.read();
            if !inner.trace_level.allows(kind) {
                return;
            }
            inner.handlers.trace.clone()
        };
        if let Some(handler) = handler {
            handler(&TraceEvent { kind, text: text() });
        }
    }

    /// Trace, then route one inbound chunk.
    fn handle_data(&self, data: Vec<u8>) {
        let (format, synchronous) = {
            let inner = self.inner.read();
            (inner.trace_format, inner.synchronous)
        };

        match format {
            TraceFormat::Hex => self.trace(TraceType::Received, || format!("RX: {}", hex(&data))),
            TraceFormat::Text => match std::str::from_utf8(&data) {
                Ok(text) => self.trace(TraceType::Received, || format!("RX: {text}")),
                Err(e) => {
                    self.trace(TraceType::Error, || format!("RX failed: {e}"));
                    self.report_error(&TransportError::Decode(e.to_string()));
                }
            },
        }

        if synchronous {
            self.buffer.append(&data);
            return;
        }
        let (handler, sender) = {
            let inner = self.inner.read();
            (inner.handlers.received.clone(), inner.settings.port_name.clone())
        };
        if let Some(handler) = handler {
            handler(&ReceivedEvent { data, sender });
        }
    }
}

/// Body of the background reader. Exits when the device is closed or fails.
fn run_reader(shared: Arc<Shared>, device: Arc<dyn SerialDevice>) {
    // Recorded before the first chunk so a handler calling `close` is recognised.
    shared.inner.write().reader_thread = Some(thread::current().id());
    debug!(port = device.name(), "reader started");
    loop {
        match device.read() {
            Ok(chunk) if chunk.is_empty() => {
                if shared.closing.load(Ordering::Acquire) || !device.is_open() {
                    break;
                }
            }
            Ok(chunk) => {
                shared
                    .bytes_received
                    .fetch_add(chunk.len() as u64, Ordering::Relaxed);
                shared.handle_data(chunk);
            }
            Err(e) => {
                if shared.closing.load(Ordering::Acquire) {
                    break;
                }
                warn!(port = device.name(), error = %e, "reader failed");
                let err = TransportError::from(e);
                let text = shared.message(Message::ConnectionFailed, Some(&err));
                shared.trace(TraceType::Error, || text);
                shared.report_error(&err);
                break;
            }
        }
    }
    debug!(port = device.name(), "reader exited");
}

/// Serial port transport with callback and blocking receive modes.
///
/// # Example
/// ```no_run
/// use serial_transport::{BaudRate, DataBits, Parity, ReceiveParameters, SerialTransport, StopBits};
///
/// let transport = SerialTransport::new(
///     "/dev/ttyUSB0",
///     BaudRate::Baud9600,
///     DataBits::Eight,
///     Parity::None,
///     StopBits::One,
/// );
/// transport.open()?;
/// let sync = transport.synchronous();
/// transport.send("PING\n", None)?;
/// let mut params = ReceiveParameters::<String>::new().with_eop("\n").with_wait_time(1000);
/// if transport.receive(&mut params)? {
///     println!("{}", params.reply.unwrap_or_default());
/// }
/// sync.release();
/// transport.close()?;
/// # Ok::<(), serial_transport::TransportError>(())
/// ```
pub struct SerialTransport {
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl SerialTransport {
    pub fn new(
        port_name: impl Into<String>,
        baud_rate: BaudRate,
        data_bits: DataBits,
        parity: Parity,
        stop_bits: StopBits,
    ) -> Self {
        Self::from_settings(PortSettings {
            port_name: port_name.into(),
            baud_rate,
            data_bits,
            parity,
            stop_bits,
        })
    }

    pub fn from_settings(settings: PortSettings) -> Self {
        let inner = Inner {
            settings,
            eop: None,
            trace_level: TraceLevel::Off,
            trace_format: TraceFormat::Hex,
            state: ConnectionState::Closed,
            synchronous: false,
            device: None,
            reader_thread: None,
            handlers: Handlers::default(),
            catalog: Arc::new(catalog_for("en")),
            opener: Arc::new(NativeOpener),
        };
        Self {
            shared: Arc::new(Shared {
                inner: RwLock::new(inner),
                buffer: SyncBuffer::new(),
                bytes_sent: AtomicU64::new(0),
                bytes_received: AtomicU64::new(0),
                closing: AtomicBool::new(false),
            }),
            reader: Mutex::new(None),
        }
    }

    /// Replace how devices are opened. Takes effect on the next `open`.
    pub fn set_port_opener(&self, opener: impl PortOpener + 'static) {
        self.shared.inner.write().opener = Arc::new(opener);
    }

    /// Candidate port identifiers on this host.
    pub fn port_names() -> Result<Vec<String>> {
        Ok(port::port_names()?)
    }

    // ---- lifecycle -------------------------------------------------------

    /// Check the configuration without touching hardware.
    pub fn validate(&self) -> Result<()> {
        if self.shared.port_name().trim().is_empty() {
            let text = self.shared.message(Message::NoSerialPortSelected, None);
            return Err(PortError::InvalidPort(text).into());
        }
        Ok(())
    }

    /// Open the device and start the reader. Does nothing if already open.
    ///
    /// Failures are returned and also passed to the error handler.
    /// After a reader error the state stays `Open`; call `close()` before
    /// opening again.
    pub fn open(&self) -> Result<()> {
        let mut reader = self.reader.lock();
        if self.shared.inner.read().state == ConnectionState::Open {
            return Ok(());
        }
        // A reader that stopped on a device error, or was closed from its own
        // callback, is still joinable. Reopening from that callback detaches it.
        if let Some(stale) = reader.take() {
            if stale.thread().id() != thread::current().id() {
                let _ = stale.join();
            }
        }
        if let Err(err) = self.validate() {
            self.shared.report_error(&err);
            return Err(err);
        }

        self.shared.set_state(ConnectionState::Opening);
        let text = self.shared.message(Message::ConnectingTo, None);
        self.shared.trace(TraceType::Info, || text);

        let (settings, opener) = {
            let inner = self.shared.inner.read();
            (inner.settings.clone(), Arc::clone(&inner.opener))
        };
        let device: Arc<dyn SerialDevice> = match opener.open(&settings) {
            Ok(device) => Arc::from(device),
            Err(e) => return Err(self.fail_open(e)),
        };

        self.shared.closing.store(false, Ordering::Release);
        self.shared.inner.write().device = Some(Arc::clone(&device));

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("serial-reader {}", settings.port_name))
            .spawn({
                let device = Arc::clone(&device);
                move || run_reader(shared, device)
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.inner.write().device = None;
                let _ = device.close();
                return Err(self.fail_open(PortError::device("spawn reader", e)));
            }
        };
        *reader = Some(handle);

        debug!(port = %settings.port_name, "transport open");
        let text = self.shared.message(Message::ConnectedTo, None);
        self.shared.trace(TraceType::Info, || text);
        self.shared.set_state(ConnectionState::Open);
        Ok(())
    }

    fn fail_open(&self, e: PortError) -> TransportError {
        let err = TransportError::from(e);
        let text = self.shared.message(Message::ConnectFailed, Some(&err));
        self.shared.trace(TraceType::Error, || text);
        self.shared.report_error(&err);
        self.shared.set_state(ConnectionState::Closed);
        err
    }

    /// Close the device and wait for the reader to exit. Idempotent.
    ///
    /// Called from inside a handler on the reader thread, this closes the
    /// device without waiting; the reader exits once the handler returns.
    pub fn close(&self) -> Result<()> {
        let on_reader = self.shared.on_reader_thread();
        let mut reader = if on_reader {
            match self.reader.try_lock() {
                Some(guard) => guard,
                // Another thread is already closing and waits for us.
                None => {
                    self.shared.closing.store(true, Ordering::Release);
                    if let Some(device) = self.shared.device() {
                        let _ = device.close();
                    }
                    return Ok(());
                }
            }
        } else {
            self.reader.lock()
        };

        let device = self.shared.inner.write().device.take();
        let Some(device) = device else {
            if !on_reader {
                if let Some(stale) = reader.take() {
                    let _ = stale.join();
                }
            }
            return Ok(());
        };

        self.shared.closing.store(true, Ordering::Release);
        let text = self.shared.message(Message::ClosingConnection, None);
        self.shared.trace(TraceType::Info, || text);
        self.shared.set_state(ConnectionState::Closing);

        let result = device.close();
        if let Err(ref e) = result {
            warn!(port = device.name(), error = %e, "close failed");
        }
        if let Some(handle) = reader.take() {
            if on_reader {
                // The next open joins it once the callback has returned.
                *reader = Some(handle);
            } else {
                let _ = handle.join();
            }
        }
        self.shared.inner.write().reader_thread = None;

        debug!(port = device.name(), "transport closed");
        let text = self.shared.message(Message::ConnectionClosed, None);
        self.shared.trace(TraceType::Info, || text);
        self.shared.set_state(ConnectionState::Closed);

        result.map_err(|e| {
            let err = TransportError::from(e);
            self.shared.report_error(&err);
            err
        })
    }

    pub fn is_open(&self) -> bool {
        let inner = self.shared.inner.read();
        inner.state == ConnectionState::Open
            && inner.device.as_ref().is_some_and(|device| device.is_open())
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.inner.read().state
    }

    // ---- data ------------------------------------------------------------

    /// Write `data` in its big-endian wire form.
    ///
    /// `receiver` is accepted for interface parity with other transports and
    /// ignored on a point-to-point line.
    pub fn send<T: ToWire + ?Sized>(&self, data: &T, receiver: Option<&str>) -> Result<()> {
        let _ = receiver;
        let device = self.shared.device().ok_or(PortError::NotOpen)?;
        let bytes = data.to_wire();
        self.shared
            .bytes_sent
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        self.shared
            .trace(TraceType::Sent, || format!("TX: {}", data.trace_text()));
        device.write(&bytes)?;
        Ok(())
    }

    /// Wait for a reply in synchronous mode.
    ///
    /// Returns `Ok(false)` when nothing matched within `wait_time`; that is
    /// not an error. On `Ok(true)` the matched bytes (or everything, with
    /// `all_data`) are removed from the buffer and decoded into `reply`.
    pub fn receive<T: FromWire>(&self, params: &mut ReceiveParameters<T>) -> Result<bool> {
        let terminator = params.terminator().to_vec();
        if terminator.is_empty() && params.count == 0 && !params.all_data {
            let text = self.shared.message(Message::CountOrEop, None);
            return Err(TransportError::Validation(text));
        }

        let wait = if params.wait_time <= 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(params.wait_time.unsigned_abs())
        };
        // An all-data request with no other condition still needs a byte.
        let min_len = if params.all_data && params.count == 0 && terminator.is_empty() {
            1
        } else {
            params.count
        };

        let Some(end) = self.shared.buffer.search(&terminator, min_len, wait) else {
            return Ok(false);
        };
        let bytes = if params.all_data {
            self.shared.buffer.take_all()
        } else if terminator.is_empty() {
            self.shared.buffer.take(params.count)
        } else {
            self.shared.buffer.take(end)
        };
        params.reply = Some(T::from_wire(bytes)?);
        Ok(true)
    }

    /// Enter synchronous mode until the returned guard is released or dropped.
    ///
    /// The mode is a single flag for the whole connection; overlapping
    /// synchronous exchanges from several threads are not supported.
    pub fn synchronous(&self) -> SynchronousGuard<'_> {
        self.shared.inner.write().synchronous = true;
        SynchronousGuard {
            shared: &self.shared,
        }
    }

    pub fn is_synchronous(&self) -> bool {
        self.shared.inner.read().synchronous
    }

    /// Discard anything buffered for synchronous receives.
    pub fn reset_synchronous_buffer(&self) {
        self.shared.buffer.clear();
    }

    pub fn bytes_sent(&self) -> u64 {
        self.shared.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.shared.bytes_received.load(Ordering::Relaxed)
    }

    pub fn reset_byte_counters(&self) {
        self.shared.bytes_sent.store(0, Ordering::Relaxed);
        self.shared.bytes_received.store(0, Ordering::Relaxed);
    }

    // ---- callbacks -------------------------------------------------------

    pub fn on_received(&self, handler: impl Fn(&ReceivedEvent) + Send + Sync + 'static) {
        self.shared.inner.write().handlers.received = Some(Arc::new(handler));
    }

    pub fn on_error(&self, handler: impl Fn(&TransportError) + Send + Sync + 'static) {
        self.shared.inner.write().handlers.error = Some(Arc::new(handler));
    }

    pub fn on_state_change(&self, handler: impl Fn(ConnectionState) + Send + Sync + 'static) {
        self.shared.inner.write().handlers.state = Some(Arc::new(handler));
    }

    pub fn on_trace(&self, handler: impl Fn(&TraceEvent) + Send + Sync + 'static) {
        self.shared.inner.write().handlers.trace = Some(Arc::new(handler));
    }

    /// Remove every registered handler.
    pub fn clear_handlers(&self) {
        self.shared.inner.write().handlers = Handlers::default();
    }

    // ---- configuration ---------------------------------------------------

    pub fn port_name(&self) -> String {
        self.shared.port_name()
    }

    /// Takes effect on the next `open`.
    pub fn set_port_name(&self, name: impl Into<String>) {
        self.shared.inner.write().settings.port_name = name.into();
    }

    pub fn settings(&self) -> PortSettings {
        self.shared.inner.read().settings.clone()
    }

    pub fn baud_rate(&self) -> BaudRate {
        self.shared.inner.read().settings.baud_rate
    }

    pub fn set_baud_rate(&self, value: BaudRate) -> Result<()> {
        self.reconfigure(|d| d.set_baud_rate(value), |s| s.baud_rate = value)
    }

    pub fn data_bits(&self) -> DataBits {
        self.shared.inner.read().settings.data_bits
    }

    pub fn set_data_bits(&self, value: DataBits) -> Result<()> {
        self.reconfigure(|d| d.set_data_bits(value), |s| s.data_bits = value)
    }

    pub fn parity(&self) -> Parity {
        self.shared.inner.read().settings.parity
    }

    pub fn set_parity(&self, value: Parity) -> Result<()> {
        self.reconfigure(|d| d.set_parity(value), |s| s.parity = value)
    }

    pub fn stop_bits(&self) -> StopBits {
        self.shared.inner.read().settings.stop_bits
    }

    pub fn set_stop_bits(&self, value: StopBits) -> Result<()> {
        self.reconfigure(|d| d.set_stop_bits(value), |s| s.stop_bits = value)
    }

    /// Apply a line parameter to the open device, then remember it.
    fn reconfigure(
        &self,
        apply: impl FnOnce(&dyn SerialDevice) -> std::result::Result<(), PortError>,
        store: impl FnOnce(&mut PortSettings),
    ) -> Result<()> {
        if let Some(device) = self.shared.device() {
            if let Err(e) = apply(device.as_ref()) {
                let err = TransportError::from(e);
                self.shared.report_error(&err);
                return Err(err);
            }
        }
        let mut inner = self.shared.inner.write();
        store(&mut inner.settings);
        debug!(settings = ?inner.settings, "line settings updated");
        Ok(())
    }

    /// Apply every line parameter that differs from the current settings.
    pub fn set_settings(&self, settings: PortSettings) -> Result<()> {
        let current = self.settings();
        if settings.baud_rate != current.baud_rate {
            self.set_baud_rate(settings.baud_rate)?;
        }
        if settings.data_bits != current.data_bits {
            self.set_data_bits(settings.data_bits)?;
        }
        if settings.parity != current.parity {
            self.set_parity(settings.parity)?;
        }
        if settings.stop_bits != current.stop_bits {
            self.set_stop_bits(settings.stop_bits)?;
        }
        self.set_port_name(settings.port_name);
        Ok(())
    }

    /// Settings as flat tag text.
    pub fn settings_text(&self) -> String {
        settings::to_text(&self.settings())
    }

    /// Read settings from flat tag text. Blank text changes nothing.
    pub fn apply_settings_text(&self, text: &str) -> Result<()> {
        let mut updated = self.settings();
        settings::apply_text(&mut updated, text)?;
        self.set_settings(updated)
    }

    /// End-of-packet marker carried with this transport's configuration.
    pub fn eop(&self) -> Option<Vec<u8>> {
        self.shared.inner.read().eop.clone()
    }

    pub fn set_eop(&self, eop: Option<Vec<u8>>) {
        self.shared.inner.write().eop = eop;
    }

    pub fn trace_level(&self) -> TraceLevel {
        self.shared.inner.read().trace_level
    }

    pub fn set_trace_level(&self, level: TraceLevel) {
        self.shared.inner.write().trace_level = level;
    }

    pub fn trace_format(&self) -> TraceFormat {
        self.shared.inner.read().trace_format
    }

    pub fn set_trace_format(&self, format: TraceFormat) {
        self.shared.inner.write().trace_format = format;
    }

    /// Use `catalog` for lifecycle and validation texts.
    pub fn localize(&self, catalog: impl MessageCatalog + 'static) {
        self.shared.inner.write().catalog = Arc::new(catalog);
    }

    /// Use the built-in catalog for a locale tag; unknown tags get English.
    pub fn set_locale(&self, tag: &str) {
        self.localize(catalog_for(tag));
    }

    /// Copy port, line, trace and EOP settings onto `target`.
    pub fn copy_to(&self, target: &SerialTransport) -> Result<()> {
        let (settings, level, format, eop) = {
            let inner = self.shared.inner.read();
            (
                inner.settings.clone(),
                inner.trace_level,
                inner.trace_format,
                inner.eop.clone(),
            )
        };
        target.set_settings(settings)?;
        target.set_trace_level(level);
        target.set_trace_format(format);
        target.set_eop(eop);
        Ok(())
    }

    pub fn name(&self) -> String {
        self.port_name()
    }

    pub fn media_type(&self) -> &'static str {
        "Serial"
    }

    // ---- device status ---------------------------------------------------

    /// Bytes waiting in the driver's input queue; 0 while closed.
    pub fn bytes_to_read(&self) -> Result<usize> {
        match self.shared.device() {
            Some(device) => Ok(device.bytes_to_read()?),
            None => Ok(0),
        }
    }

    /// Bytes waiting in the driver's output queue; 0 while closed.
    pub fn bytes_to_write(&self) -> Result<usize> {
        match self.shared.device() {
            Some(device) => Ok(device.bytes_to_write()?),
            None => Ok(0),
        }
    }

    pub fn rts(&self) -> Result<bool> {
        Ok(self.open_device()?.rts()?)
    }

    pub fn set_rts(&self, on: bool) -> Result<()> {
        Ok(self.open_device()?.set_rts(on)?)
    }

    pub fn dtr(&self) -> Result<bool> {
        Ok(self.open_device()?.dtr()?)
    }

    pub fn set_dtr(&self, on: bool) -> Result<()> {
        Ok(self.open_device()?.set_dtr(on)?)
    }

    fn open_device(&self) -> Result<Arc<dyn SerialDevice>> {
        Ok(self.shared.device().ok_or(PortError::NotOpen)?)
    }
}

impl fmt::Display for SerialTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.settings();
        write!(
            f,
            "{} {} {} {} {}",
            s.port_name, s.baud_rate, s.data_bits, s.stop_bits, s.parity
        )
    }
}

impl fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.read();
        f.debug_struct("SerialTransport")
            .field("settings", &inner.settings)
            .field("state", &inner.state)
            .field("synchronous", &inner.synchronous)
            .field("trace_level", &inner.trace_level)
            .field("handlers", &inner.handlers)
            .finish()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Keeps the transport in synchronous mode while alive.
#[must_use = "synchronous mode ends when the guard is dropped"]
pub struct SynchronousGuard<'a> {
    shared: &'a Shared,
}

impl SynchronousGuard<'_> {
    /// Leave synchronous mode.
    pub fn release(self) {}
}

impl Drop for SynchronousGuard<'_> {
    fn drop(&mut self) {
        self.shared.inner.write().synchronous = false;
    }
}

impl fmt::Debug for SynchronousGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynchronousGuard").finish_non_exhaustive()
    }
}
