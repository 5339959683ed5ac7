//! Serial Transport Library
//!
//! A serial-port transport with two receive modes: inbound chunks go to a
//! callback, or, inside a synchronous section, into a buffer that a caller
//! searches for a terminator or a byte count with a timeout.
//!
//! # Modules
//!
//! - `transport`: the [`SerialTransport`] facade and [`ReceiveParameters`]
//! - `port`: OS serial device access (termios on Unix, overlapped I/O on Windows)
//! - `sync_buffer`: accumulation buffer for blocking receives
//! - `events`: connection state, trace levels and callback payloads
//! - `wire`: big-endian conversion of typed values to and from bytes
//! - `settings`: flat tag text form of line settings
//! - `messages`: localized lifecycle texts
//! - `config`: Configuration management with TOML support
//! - `error`: Unified error handling

pub mod config;
pub mod error;
pub mod events;
pub mod messages;
pub mod port;
pub mod settings;
pub mod sync_buffer;
pub mod transport;
pub mod wire;

// Re-export commonly used types for convenience
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
pub use error::{ErrorKind, Result, TransportError};
pub use events::{
    ConnectionState, ReceivedEvent, TraceEvent, TraceFormat, TraceLevel, TraceType,
};
pub use messages::{catalog_for, Message, MessageCatalog, StaticCatalog};
pub use port::{
    BaudRate, DataBits, MockSerialPort, Parity, PortError, PortOpener, PortSettings,
    SerialDevice, StopBits,
};
pub use sync_buffer::SyncBuffer;
pub use transport::{ReceiveParameters, SerialTransport, SynchronousGuard};
pub use wire::{FromWire, ToWire};
