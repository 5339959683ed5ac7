//! Crate-level error type.
//!
//! Port failures pass through unchanged; the transport adds the request
//! validation, reply decoding and settings failures it can raise itself.

use crate::config::ConfigError;
use crate::port::PortError;
use std::fmt;
use thiserror::Error;

/// A specialized `Result` type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Unified transport error type.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Port(#[from] PortError),

    /// A receive request asked for neither a terminator, a count nor all data.
    #[error("{0}")]
    Validation(String),

    /// Bytes could not be converted to the requested reply type or trace text.
    #[error("Decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Coarse classification of a [`TransportError`], stable across variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidConfig,
    InvalidPort,
    DeviceError,
    NotOpen,
    ValidationError,
    Decode,
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Port(PortError::InvalidConfig(_)) => ErrorKind::InvalidConfig,
            Self::Port(PortError::InvalidPort(_)) => ErrorKind::InvalidPort,
            Self::Port(PortError::Device { .. }) => ErrorKind::DeviceError,
            Self::Port(PortError::NotOpen) => ErrorKind::NotOpen,
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Config(_) => ErrorKind::InvalidConfig,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidConfig => "InvalidConfig",
            Self::InvalidPort => "InvalidPort",
            Self::DeviceError => "DeviceError",
            Self::NotOpen => "NotOpen",
            Self::ValidationError => "ValidationError",
            Self::Decode => "Decode",
        };
        f.write_str(name)
    }
}
