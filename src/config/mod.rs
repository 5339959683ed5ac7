//! Configuration module for serial-transport.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `SERIAL_TRANSPORT_CONFIG` environment variable (explicit path)
//! 2. `./serial-transport.toml` (current directory)
//! 3. `~/.config/serial-transport/config.toml` (XDG on Linux)
//! 4. `%APPDATA%\serial-transport\config\config.toml` (Windows)
//! 5. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! Any configuration value can be overridden via environment variables.
//! The pattern is: `SERIAL_TRANSPORT_<SECTION>_<KEY>`
//!
//! Examples:
//! - `SERIAL_TRANSPORT_SERIAL_PORT=/dev/ttyUSB0`
//! - `SERIAL_TRANSPORT_SERIAL_BAUD_RATE=115200`
//! - `SERIAL_TRANSPORT_TRANSPORT_WAIT_TIME_MS=500`
//!
//! # Example
//!
//! ```rust,no_run
//! use serial_transport::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//! println!("Port: {}", config.serial.port);
//!
//! let transport = config.transport();
//! transport.open()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{Config, LogFormat, LoggingConfig, SerialConfig, TransportConfig};
