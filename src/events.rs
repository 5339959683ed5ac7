//! Event payloads, callback types and the trace filter.

use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Closed,
    Opening,
    Open,
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "Closed",
            Self::Opening => "Opening",
            Self::Open => "Open",
            Self::Closing => "Closing",
        };
        f.write_str(name)
    }
}

/// Severity threshold for trace events. Ordered from quietest to noisiest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevel {
    #[default]
    Off,
    Error,
    Warning,
    Info,
    Verbose,
}

impl TraceLevel {
    /// Whether an event of `kind` passes this threshold.
    pub fn allows(self, kind: TraceType) -> bool {
        kind.level() <= self
    }
}

impl FromStr for TraceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "0" => Ok(Self::Off),
            "error" | "1" => Ok(Self::Error),
            "warning" | "warn" | "2" => Ok(Self::Warning),
            "info" | "3" => Ok(Self::Info),
            "verbose" | "4" => Ok(Self::Verbose),
            other => Err(format!("unknown trace level: {other}")),
        }
    }
}

impl fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Off => "off",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Verbose => "verbose",
        };
        f.write_str(name)
    }
}

/// Category of a trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceType {
    Error,
    Warning,
    Info,
    Sent,
    Received,
}

impl TraceType {
    /// Lowest trace level at which this category is delivered.
    pub const fn level(self) -> TraceLevel {
        match self {
            Self::Error => TraceLevel::Error,
            Self::Warning => TraceLevel::Warning,
            Self::Info => TraceLevel::Info,
            Self::Sent | Self::Received => TraceLevel::Verbose,
        }
    }
}

/// How received bytes are rendered in `RX:` traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceFormat {
    #[default]
    Hex,
    /// UTF-8 text; invalid sequences are reported as decode errors.
    Text,
}

impl FromStr for TraceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hex" => Ok(Self::Hex),
            "text" => Ok(Self::Text),
            other => Err(format!("unknown trace format: {other}")),
        }
    }
}

/// A chunk delivered to the receive callback in asynchronous mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedEvent {
    pub data: Vec<u8>,
    /// Port the data came from.
    pub sender: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub kind: TraceType,
    pub text: String,
}

pub type ReceivedHandler = Arc<dyn Fn(&ReceivedEvent) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&TransportError) + Send + Sync>;
pub type StateHandler = Arc<dyn Fn(ConnectionState) + Send + Sync>;
pub type TraceHandler = Arc<dyn Fn(&TraceEvent) + Send + Sync>;

/// Current callback registrations. At most one per category.
#[derive(Clone, Default)]
pub(crate) struct Handlers {
    pub received: Option<ReceivedHandler>,
    pub error: Option<ErrorHandler>,
    pub state: Option<StateHandler>,
    pub trace: Option<TraceHandler>,
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("received", &self.received.is_some())
            .field("error", &self.error.is_some())
            .field("state", &self.state.is_some())
            .field("trace", &self.trace.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_filter() {
        assert!(!TraceLevel::Off.allows(TraceType::Error));
        assert!(TraceLevel::Error.allows(TraceType::Error));
        assert!(!TraceLevel::Error.allows(TraceType::Info));
        assert!(TraceLevel::Info.allows(TraceType::Warning));
        assert!(!TraceLevel::Info.allows(TraceType::Sent));
        assert!(TraceLevel::Verbose.allows(TraceType::Received));
    }

    #[test]
    fn test_trace_level_parse() {
        assert_eq!("Verbose".parse::<TraceLevel>().unwrap(), TraceLevel::Verbose);
        assert_eq!("2".parse::<TraceLevel>().unwrap(), TraceLevel::Warning);
        assert!("loud".parse::<TraceLevel>().is_err());
        assert_eq!(TraceLevel::Info.to_string(), "info");
    }

    #[test]
    fn test_trace_format_parse() {
        assert_eq!("TEXT".parse::<TraceFormat>().unwrap(), TraceFormat::Text);
        assert!("binary".parse::<TraceFormat>().is_err());
    }
}
