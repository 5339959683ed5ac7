//! Core traits for serial port abstraction.
//!
//! Defines the line-parameter value types and the `SerialDevice` trait that
//! every platform port (and the in-memory mock) implements.

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Standard baud rates accepted by every platform port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum BaudRate {
    Baud50,
    Baud75,
    Baud110,
    Baud134,
    Baud150,
    Baud200,
    Baud300,
    Baud600,
    Baud1200,
    Baud1800,
    Baud2400,
    Baud4800,
    Baud9600,
    Baud19200,
    Baud38400,
    Baud57600,
    Baud115200,
}

impl BaudRate {
    /// Every supported rate, slowest first.
    pub const ALL: [BaudRate; 17] = [
        BaudRate::Baud50,
        BaudRate::Baud75,
        BaudRate::Baud110,
        BaudRate::Baud134,
        BaudRate::Baud150,
        BaudRate::Baud200,
        BaudRate::Baud300,
        BaudRate::Baud600,
        BaudRate::Baud1200,
        BaudRate::Baud1800,
        BaudRate::Baud2400,
        BaudRate::Baud4800,
        BaudRate::Baud9600,
        BaudRate::Baud19200,
        BaudRate::Baud38400,
        BaudRate::Baud57600,
        BaudRate::Baud115200,
    ];

    /// Bits per second.
    pub const fn bps(self) -> u32 {
        match self {
            BaudRate::Baud50 => 50,
            BaudRate::Baud75 => 75,
            BaudRate::Baud110 => 110,
            BaudRate::Baud134 => 134,
            BaudRate::Baud150 => 150,
            BaudRate::Baud200 => 200,
            BaudRate::Baud300 => 300,
            BaudRate::Baud600 => 600,
            BaudRate::Baud1200 => 1200,
            BaudRate::Baud1800 => 1800,
            BaudRate::Baud2400 => 2400,
            BaudRate::Baud4800 => 4800,
            BaudRate::Baud9600 => 9600,
            BaudRate::Baud19200 => 19200,
            BaudRate::Baud38400 => 38400,
            BaudRate::Baud57600 => 57600,
            BaudRate::Baud115200 => 115200,
        }
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = PortError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        BaudRate::ALL
            .iter()
            .copied()
            .find(|rate| rate.bps() == value)
            .ok_or_else(|| PortError::invalid_config(format!("unsupported baud rate: {value}")))
    }
}

impl From<BaudRate> for u32 {
    fn from(rate: BaudRate) -> Self {
        rate.bps()
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bps())
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl TryFrom<u8> for DataBits {
    type Error = PortError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            _ => Err(PortError::invalid_config(format!(
                "invalid data bits: {value} (must be 5..8)"
            ))),
        }
    }
}

impl From<DataBits> for u8 {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

impl fmt::Display for DataBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// Parity checking modes.
///
/// `Mark` and `Space` are not available on every platform; ports reject them
/// with `PortError::InvalidConfig` instead of silently falling back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

impl Parity {
    /// Numeric code used by the settings text (0 = none .. 4 = space).
    pub const fn code(self) -> u8 {
        match self {
            Parity::None => 0,
            Parity::Odd => 1,
            Parity::Even => 2,
            Parity::Mark => 3,
            Parity::Space => 4,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, PortError> {
        match code {
            0 => Ok(Parity::None),
            1 => Ok(Parity::Odd),
            2 => Ok(Parity::Even),
            3 => Ok(Parity::Mark),
            4 => Ok(Parity::Space),
            _ => Err(PortError::invalid_config(format!("invalid parity: {code}"))),
        }
    }
}

impl std::str::FromStr for Parity {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Parity::None),
            "odd" => Ok(Parity::Odd),
            "even" => Ok(Parity::Even),
            "mark" => Ok(Parity::Mark),
            "space" => Ok(Parity::Space),
            other => match other.parse::<u8>() {
                Ok(code) => Parity::from_code(code),
                Err(_) => Err(PortError::invalid_config(format!("invalid parity: {s}"))),
            },
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Parity::None => "None",
            Parity::Odd => "Odd",
            Parity::Even => "Even",
            Parity::Mark => "Mark",
            Parity::Space => "Space",
        };
        f.write_str(name)
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopBits {
    One,
    Two,
}

impl StopBits {
    pub const fn count(self) -> u8 {
        match self {
            StopBits::One => 1,
            StopBits::Two => 2,
        }
    }

    pub fn from_count(count: u8) -> Result<Self, PortError> {
        match count {
            1 => Ok(StopBits::One),
            2 => Ok(StopBits::Two),
            _ => Err(PortError::invalid_config(format!(
                "invalid stop bits: {count} (must be 1 or 2)"
            ))),
        }
    }
}

impl std::str::FromStr for StopBits {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "one" | "1" => Ok(StopBits::One),
            "two" | "2" => Ok(StopBits::Two),
            _ => Err(PortError::invalid_config(format!("invalid stop bits: {s}"))),
        }
    }
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopBits::One => f.write_str("One"),
            StopBits::Two => f.write_str("Two"),
        }
    }
}

/// Everything a platform port needs to open and configure a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSettings {
    /// System path or name of the device (e.g. "/dev/ttyUSB0" or "COM3").
    pub port_name: String,

    pub baud_rate: BaudRate,

    pub data_bits: DataBits,

    pub parity: Parity,

    pub stop_bits: StopBits,
}

impl PortSettings {
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Default::default()
        }
    }
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: BaudRate::Baud9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

/// Trait for an open serial device.
///
/// All methods take `&self`: the transport's background reader blocks in
/// [`SerialDevice::read`] while the caller's thread writes, reconfigures or
/// closes the same device, so implementations synchronize internally.
pub trait SerialDevice: Send + Sync + fmt::Debug {
    /// Get the name/path of this serial port.
    fn name(&self) -> &str;

    /// Whether the device handle is still held.
    fn is_open(&self) -> bool;

    /// Block until at least one byte is available, then drain everything
    /// currently queued.
    ///
    /// Returns an empty vector, not an error, when [`SerialDevice::close`]
    /// interrupted the wait.
    fn read(&self) -> Result<Vec<u8>, PortError>;

    /// Write synchronously. A write interrupted by `close` reports success.
    fn write(&self, data: &[u8]) -> Result<usize, PortError>;

    /// Signal cancellation, then release the OS resources. Idempotent.
    fn close(&self) -> Result<(), PortError>;

    fn set_baud_rate(&self, value: BaudRate) -> Result<(), PortError>;

    fn set_data_bits(&self, value: DataBits) -> Result<(), PortError>;

    fn set_parity(&self, value: Parity) -> Result<(), PortError>;

    fn set_stop_bits(&self, value: StopBits) -> Result<(), PortError>;

    /// Bytes received by the driver but not yet read.
    fn bytes_to_read(&self) -> Result<usize, PortError>;

    /// Bytes queued for transmission.
    fn bytes_to_write(&self) -> Result<usize, PortError>;

    fn rts(&self) -> Result<bool, PortError>;

    fn set_rts(&self, on: bool) -> Result<(), PortError>;

    fn dtr(&self) -> Result<bool, PortError>;

    fn set_dtr(&self, on: bool) -> Result<(), PortError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = PortSettings::default();
        assert_eq!(settings.baud_rate, BaudRate::Baud9600);
        assert_eq!(settings.data_bits, DataBits::Eight);
        assert_eq!(settings.parity, Parity::None);
        assert_eq!(settings.stop_bits, StopBits::One);
        assert!(settings.port_name.is_empty());
    }

    #[test]
    fn test_baud_rate_conversion() {
        assert_eq!(BaudRate::try_from(115200).unwrap(), BaudRate::Baud115200);
        assert_eq!(u32::from(BaudRate::Baud4800), 4800);
        assert!(matches!(
            BaudRate::try_from(12345),
            Err(PortError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_data_bits_range() {
        assert_eq!(DataBits::try_from(7).unwrap(), DataBits::Seven);
        assert!(DataBits::try_from(4).is_err());
        assert!(DataBits::try_from(9).is_err());
    }

    #[test]
    fn test_parity_parse() {
        assert_eq!("Even".parse::<Parity>().unwrap(), Parity::Even);
        assert_eq!("space".parse::<Parity>().unwrap(), Parity::Space);
        assert_eq!("3".parse::<Parity>().unwrap(), Parity::Mark);
        assert!("sideways".parse::<Parity>().is_err());
    }

    #[test]
    fn test_settings_toml_shape() {
        let settings: PortSettings = toml::from_str(
            r#"
            port_name = "/dev/ttyUSB0"
            baud_rate = 19200
            data_bits = 7
            parity = "even"
            stop_bits = "two"
            "#,
        )
        .unwrap();
        assert_eq!(settings.baud_rate, BaudRate::Baud19200);
        assert_eq!(settings.data_bits, DataBits::Seven);
        assert_eq!(settings.stop_bits, StopBits::Two);

        let bad = toml::from_str::<PortSettings>(
            r#"
            port_name = "x"
            baud_rate = 1234
            data_bits = 8
            parity = "none"
            stop_bits = "one"
            "#,
        );
        assert!(bad.is_err());
    }
}
