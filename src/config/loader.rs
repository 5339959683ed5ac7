//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "SERIAL_TRANSPORT";

/// Config file name inside the per-user config directory
const CONFIG_FILE_NAME: &str = "config.toml";

/// Config file name looked up in the current directory
const LOCAL_CONFIG_FILE_NAME: &str = "serial-transport.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "SERIAL_TRANSPORT_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `SERIAL_TRANSPORT_CONFIG` environment variable (explicit path)
    /// 2. `./serial-transport.toml` (current directory)
    /// 3. the per-user config directory, e.g.
    ///    `~/.config/serial-transport/config.toml`
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables can override any config file values.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;

        Ok(Self { config_path, config })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        // Still apply env overrides even with defaults
        let _ = apply_env_overrides(&mut config);

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a mutable reference to the configuration.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to file.
    pub fn save(&self) -> ConfigResult<()> {
        let path = self
            .config_path
            .as_ref()
            .ok_or_else(|| ConfigError::MissingRequired("No config file path set".to_string()))?;

        save_to_file(&self.config, path)
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }

    /// Reload configuration from file (if path is set).
    pub fn reload(&mut self) -> ConfigResult<()> {
        if let Some(ref path) = self.config_path {
            self.config = load_from_file(path)?;
            apply_env_overrides(&mut self.config)?;
        }
        Ok(())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    // 1. Explicit environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. Current directory
    let cwd_config = PathBuf::from(LOCAL_CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. Per-user config directory
    if let Some(app_config) = get_default_config_path() {
        if app_config.exists() {
            return Some(app_config);
        }
    }

    // 4. No config file found - will use defaults
    None
}

/// Get the default config directory for creating new config files.
///
/// XDG config home on Linux, `Library/Application Support` on macOS and
/// `%APPDATA%` on Windows.
pub fn get_default_config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "serial-transport")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

/// Save configuration to a file.
fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn env_key(key: &str) -> String {
    format!("{ENV_PREFIX}_{key}")
}

/// Parse `SERIAL_TRANSPORT_<key>` if set.
fn env_parse<T>(key: &str, what: &str) -> ConfigResult<Option<T>>
where
    T: FromStr,
{
    let var = env_key(key);
    match std::env::var(&var) {
        Ok(val) => val
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::env_parse(var, format!("Invalid {what}"))),
        Err(_) => Ok(None),
    }
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `SERIAL_TRANSPORT_<SECTION>_<KEY>`
/// For example:
/// - `SERIAL_TRANSPORT_SERIAL_PORT=/dev/ttyUSB0`
/// - `SERIAL_TRANSPORT_SERIAL_BAUD_RATE=115200`
/// - `SERIAL_TRANSPORT_TRANSPORT_TRACE_LEVEL=verbose`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    // Serial overrides
    if let Ok(val) = std::env::var(env_key("SERIAL_PORT")) {
        config.serial.port = val;
    }
    if let Some(bps) = env_parse::<u32>("SERIAL_BAUD_RATE", "baud rate")? {
        config.serial.baud_rate = bps.try_into().map_err(|e: crate::port::PortError| {
            ConfigError::env_parse(env_key("SERIAL_BAUD_RATE"), e.to_string())
        })?;
    }
    if let Some(bits) = env_parse::<u8>("SERIAL_DATA_BITS", "data bits")? {
        config.serial.data_bits = bits.try_into().map_err(|e: crate::port::PortError| {
            ConfigError::env_parse(env_key("SERIAL_DATA_BITS"), e.to_string())
        })?;
    }
    if let Some(parity) = env_parse("SERIAL_PARITY", "parity")? {
        config.serial.parity = parity;
    }
    if let Some(stop_bits) = env_parse("SERIAL_STOP_BITS", "stop bits")? {
        config.serial.stop_bits = stop_bits;
    }
    if let Ok(val) = std::env::var(env_key("SERIAL_EOP")) {
        config.serial.eop = if val.is_empty() { None } else { Some(val) };
    }

    // Transport overrides
    if let Some(level) = env_parse("TRANSPORT_TRACE_LEVEL", "trace level")? {
        config.transport.trace_level = level;
    }
    if let Some(format) = env_parse("TRANSPORT_TRACE_FORMAT", "trace format")? {
        config.transport.trace_format = format;
    }
    if let Some(wait) = env_parse("TRANSPORT_WAIT_TIME_MS", "wait time")? {
        config.transport.wait_time_ms = wait;
    }
    if let Ok(val) = std::env::var(env_key("TRANSPORT_LOCALE")) {
        config.transport.locale = val;
    }

    // Logging overrides
    if let Ok(val) = std::env::var(env_key("LOGGING_LEVEL")) {
        config.logging.level = val;
    }
    if let Some(format) = env_parse("LOGGING_FORMAT", "log format")? {
        config.logging.format = format;
    }

    Ok(())
}
