//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! All configuration sections are defined here with appropriate defaults.

use crate::events::{TraceFormat, TraceLevel};
use crate::messages::catalog_for;
use crate::port::{BaudRate, DataBits, Parity, PortSettings, StopBits};
use crate::transport::{ReceiveParameters, SerialTransport};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial line configuration
    pub serial: SerialConfig,
    /// Transport behaviour
    pub transport: TransportConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Line settings with the port resolved through aliases.
    pub fn port_settings(&self) -> PortSettings {
        PortSettings {
            port_name: self.serial.resolve_port(&self.serial.port),
            baud_rate: self.serial.baud_rate,
            data_bits: self.serial.data_bits,
            parity: self.serial.parity,
            stop_bits: self.serial.stop_bits,
        }
    }

    /// Build a transport configured from every section.
    pub fn transport(&self) -> SerialTransport {
        let transport = SerialTransport::from_settings(self.port_settings());
        transport.set_eop(self.serial.eop.as_ref().map(|eop| eop.as_bytes().to_vec()));
        transport.set_trace_level(self.transport.trace_level);
        transport.set_trace_format(self.transport.trace_format);
        transport.localize(catalog_for(&self.transport.locale));
        transport
    }

    /// Receive request using the configured terminator and wait time.
    pub fn receive_parameters<T>(&self) -> ReceiveParameters<T> {
        let mut params = ReceiveParameters::new().with_wait_time(self.transport.wait_time_ms);
        params.eop = self.serial.eop.as_ref().map(|eop| eop.as_bytes().to_vec());
        params
    }
}

/// Serial port configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path or name; may be an alias
    pub port: String,
    pub baud_rate: BaudRate,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    /// End-of-packet marker, e.g. "\n"
    pub eop: Option<String>,
    /// Port aliases for convenience
    #[serde(default)]
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        let line = PortSettings::default();
        Self {
            port: String::new(),
            baud_rate: line.baud_rate,
            data_bits: line.data_bits,
            parity: line.parity,
            stop_bits: line.stop_bits,
            eop: Some("\n".to_string()),
            port_aliases: HashMap::new(),
        }
    }
}

impl SerialConfig {
    /// Resolve a port name through aliases
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

/// Transport configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub trace_level: TraceLevel,
    /// How received bytes appear in traces: "hex" or "text"
    pub trace_format: TraceFormat,
    /// Default receive wait in milliseconds
    pub wait_time_ms: i64,
    /// Locale tag for lifecycle messages, e.g. "en" or "de-DE"
    pub locale: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            trace_level: TraceLevel::Off,
            trace_format: TraceFormat::Hex,
            wait_time_ms: 1000,
            locale: "en".to_string(),
        }
    }
}

impl TransportConfig {
    /// Get the receive wait as Duration
    pub fn wait_time(&self) -> Duration {
        Duration::from_millis(self.wait_time_ms.max(0).unsigned_abs())
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}
