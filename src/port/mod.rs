//! Port abstraction layer for serial communication.
//!
//! Provides the `SerialDevice` trait, the native platform port, and a mock
//! for tests. The transport never names a platform type directly; it goes
//! through a [`PortOpener`].

pub mod error;
pub mod mock;
pub mod traits;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

pub use error::PortError;
pub use mock::MockSerialPort;
pub use traits::*;

#[cfg(unix)]
pub use unix::{supports_parity, validate_settings, UnixPort as NativePort};
#[cfg(windows)]
pub use windows::{supports_parity, validate_settings, WindowsPort as NativePort};

/// Opens a device for the given settings.
///
/// Any `Fn(&PortSettings) -> Result<Box<dyn SerialDevice>, PortError>`
/// closure is an opener, which is how tests substitute a mock.
pub trait PortOpener: Send + Sync {
    fn open(&self, settings: &PortSettings) -> Result<Box<dyn SerialDevice>, PortError>;
}

impl<F> PortOpener for F
where
    F: Fn(&PortSettings) -> Result<Box<dyn SerialDevice>, PortError> + Send + Sync,
{
    fn open(&self, settings: &PortSettings) -> Result<Box<dyn SerialDevice>, PortError> {
        self(settings)
    }
}

/// Opens the platform's native port.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeOpener;

impl PortOpener for NativeOpener {
    fn open(&self, settings: &PortSettings) -> Result<Box<dyn SerialDevice>, PortError> {
        Ok(Box::new(NativePort::open(settings)?))
    }
}

impl PortOpener for MockSerialPort {
    fn open(&self, settings: &PortSettings) -> Result<Box<dyn SerialDevice>, PortError> {
        Ok(Box::new(self.open_with(settings)?))
    }
}

/// Names of the serial ports present on this machine.
pub fn port_names() -> Result<Vec<String>, PortError> {
    let ports = serialport::available_ports()
        .map_err(|e| PortError::device("available_ports", std::io::Error::from(e)))?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
