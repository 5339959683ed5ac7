//! Port-specific error types.
//!
//! Defines error types for serial port operations, separate from transport-level
//! errors to maintain clean separation of concerns.

use thiserror::Error;

/// Errors that can occur during serial port operations.
#[derive(Debug, Error)]
pub enum PortError {
    /// The device is missing, already owned, or the identifier is empty.
    #[error("Invalid serial port: {0}")]
    InvalidPort(String),

    /// A line parameter is outside what the platform supports.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An underlying OS call failed.
    #[error("Device error during {op}: {source}")]
    Device {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Attempted to use a port that's not open.
    #[error("Port is not open")]
    NotOpen,
}

impl PortError {
    /// Create an InvalidPort error from a port name or reason.
    pub fn invalid_port(message: impl Into<String>) -> Self {
        Self::InvalidPort(message.into())
    }

    /// Create an InvalidConfig error from a message.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Wrap an OS error with the name of the failing operation.
    pub fn device(op: &'static str, source: std::io::Error) -> Self {
        Self::Device { op, source }
    }

    /// Capture `errno` / `GetLastError` for the failing operation.
    pub fn last_os_error(op: &'static str) -> Self {
        Self::device(op, std::io::Error::last_os_error())
    }
}
