//! Strongly-typed settings loaded with Figment.

use crate::device::{DeviceId, HandshakeConfig};
use crate::workflow::{CartridgeSlot, Revision};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Path used when none is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "config/petri.toml";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or merging a configuration source failed
    #[error("Configuration load error: {0}")]
    LoadError(#[from] figment::Error),
    /// Values parsed but violate a constraint
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level station configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Station name and logging
    #[serde(default)]
    pub application: ApplicationSettings,
    /// Allowed dish counts per batch
    #[serde(default)]
    pub batch: BatchSettings,
    /// Which workflow definitions to run
    #[serde(default)]
    pub workflows: WorkflowSettings,
    /// Cartridge exchange layout
    #[serde(default)]
    pub cartridge: CartridgeSettings,
    /// One entry per physical controller
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    /// Simulated-controller timing
    #[serde(default)]
    pub simulation: SimulationSettings,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationSettings {
    /// Station name shown at startup
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error); `RUST_LOG` wins
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Console output style
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

/// Log output style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable console output
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Accepted dish counts per batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Smallest dish count a batch may request
    #[serde(default = "default_min_count")]
    pub min_count: u32,
    /// Largest dish count a batch may request
    #[serde(default = "default_max_count")]
    pub max_count: u32,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            min_count: default_min_count(),
            max_count: default_max_count(),
        }
    }
}

/// Where dish-cycle workflows come from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowSettings {
    /// Built-in vocabulary to use
    #[serde(default)]
    pub revision: Revision,
    /// TOML template replacing the built-in dish cycle
    #[serde(default)]
    pub dish_cycle_template: Option<PathBuf>,
}

/// Cartridge slots handled by load/unload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartridgeSettings {
    /// Slots covered by load/unload, in exchange order
    #[serde(default = "default_slots")]
    pub slots: Vec<CartridgeSlot>,
}

impl Default for CartridgeSettings {
    fn default() -> Self {
        Self {
            slots: default_slots(),
        }
    }
}

/// Serial connection to one controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Controller this port reaches
    pub id: DeviceId,
    /// Serial port (e.g., "/dev/ttyACM0", "COM4")
    pub port: String,
    /// Line speed
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Appended to every command
    #[serde(default = "default_line_terminator")]
    pub line_terminator: String,
    /// Longest single blocking read in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Greeting exchange to run after opening the port
    #[serde(default)]
    pub handshake: Option<HandshakeConfig>,
}

/// Simulated controllers used with `--simulate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Delay before a simulated controller answers
    #[serde(default = "default_response_delay")]
    pub response_delay_ms: u64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            response_delay_ms: default_response_delay(),
        }
    }
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_name() -> String {
    "Petri Streaker".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_min_count() -> u32 {
    1
}

fn default_max_count() -> u32 {
    10
}

fn default_slots() -> Vec<CartridgeSlot> {
    CartridgeSlot::ALL.to_vec()
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_line_terminator() -> String {
    "\n".to_string()
}

fn default_poll_interval() -> u64 {
    100
}

fn default_response_delay() -> u64 {
    50
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl Settings {
    /// Load configuration from `config/petri.toml` and environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// Environment variables (`PETRI_` prefix) override the file. A missing
    /// file yields the defaults. The result is validated.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("PETRI_").split("__"))
            .extract()
            .map_err(ConfigError::LoadError)?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Batch count range is non-empty and starts at 1 or more
    /// - Cartridge slots are non-empty and unique
    /// - Device IDs are unique and each device has a usable port setup
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.batch.min_count == 0 {
            return Err(ConfigError::ValidationError(
                "batch.min_count must be at least 1".to_string(),
            ));
        }
        if self.batch.max_count < self.batch.min_count {
            return Err(ConfigError::ValidationError(format!(
                "batch.max_count ({}) is below batch.min_count ({})",
                self.batch.max_count, self.batch.min_count
            )));
        }

        if self.cartridge.slots.is_empty() {
            return Err(ConfigError::ValidationError(
                "cartridge.slots cannot be empty".to_string(),
            ));
        }
        let mut slots = HashSet::new();
        for slot in &self.cartridge.slots {
            if !slots.insert(slot) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate cartridge slot: '{}'",
                    slot
                )));
            }
        }

        let mut ids = HashSet::new();
        for device in &self.devices {
            if !ids.insert(device.id) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate device ID: '{}'",
                    device.id
                )));
            }
            Self::validate_device(device)?;
        }

        Ok(())
    }

    fn validate_device(device: &DeviceConfig) -> Result<(), ConfigError> {
        if device.port.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "Device '{}': 'port' cannot be empty",
                device.id
            )));
        }
        if device.baud_rate == 0 {
            return Err(ConfigError::ValidationError(format!(
                "Device '{}': 'baud_rate' must be > 0",
                device.id
            )));
        }
        if device.line_terminator.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "Device '{}': 'line_terminator' cannot be empty",
                device.id
            )));
        }
        if device.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(format!(
                "Device '{}': 'poll_interval_ms' must be > 0",
                device.id
            )));
        }
        if let Some(handshake) = &device.handshake {
            if handshake.greeting.is_empty() || handshake.reply.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "Device '{}': handshake greeting and reply cannot be empty",
                    device.id
                )));
            }
            if handshake.timeout.is_zero() {
                return Err(ConfigError::ValidationError(format!(
                    "Device '{}': handshake timeout must be > 0",
                    device.id
                )));
            }
        }
        Ok(())
    }

    /// Configuration of one controller, if present.
    pub fn device(&self, id: DeviceId) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use std::time::Duration;

    fn device(id: DeviceId, port: &str) -> DeviceConfig {
        DeviceConfig {
            id,
            port: port.to_string(),
            baud_rate: 115200,
            line_terminator: "\n".to_string(),
            poll_interval_ms: 100,
            handshake: None,
        }
    }

    fn write_config(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.batch.max_count, 10);
        assert_eq!(settings.cartridge.slots.len(), 4);
    }

    #[test]
    fn test_invalid_log_level() {
        let mut settings = Settings::default();
        settings.application.log_level = "verbose".to_string();
        let result = settings.validate();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid log_level"));
    }

    #[test]
    fn test_inverted_batch_range() {
        let mut settings = Settings::default();
        settings.batch.min_count = 5;
        settings.batch.max_count = 2;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::ValidationError(msg)) if msg.contains("max_count")
        ));
    }

    #[test]
    fn test_duplicate_device_id() {
        let mut settings = Settings::default();
        settings.devices = vec![device(DeviceId::Arm, "/dev/ttyACM0"), device(DeviceId::Arm, "/dev/ttyACM1")];
        assert!(settings
            .validate()
            .unwrap_err()
            .to_string()
            .contains("Duplicate device ID"));
    }

    #[test]
    fn test_duplicate_slot() {
        let mut settings = Settings::default();
        settings.cartridge.slots = vec![CartridgeSlot::Blood, CartridgeSlot::Blood];
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_empty_port_rejected() {
        let mut settings = Settings::default();
        settings.devices = vec![device(DeviceId::Platform, " ")];
        assert!(settings
            .validate()
            .unwrap_err()
            .to_string()
            .contains("'port' cannot be empty"));
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let file = write_config(
            r#"
[application]
name = "Bench station"
log_level = "debug"
log_format = "json"

[workflows]
revision = "legacy"

[[devices]]
id = "arm"
port = "/dev/ttyACM0"

[[devices]]
id = "platform"
port = "/dev/ttyACM1"
baud_rate = 9600

[devices.handshake]
greeting = "Bob"
reply = "Hi Bob"
confirm = "INIT SUCCESS"
timeout = "5s"
"#,
        );

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.application.name, "Bench station");
        assert_eq!(settings.application.log_format, LogFormat::Json);
        assert_eq!(settings.workflows.revision, Revision::Legacy);

        let arm = settings.device(DeviceId::Arm).unwrap();
        assert_eq!(arm.baud_rate, 115200);
        assert_eq!(arm.line_terminator, "\n");
        assert!(arm.handshake.is_none());

        let platform = settings.device(DeviceId::Platform).unwrap();
        assert_eq!(platform.baud_rate, 9600);
        let handshake = platform.handshake.as_ref().unwrap();
        assert_eq!(handshake.timeout, Duration::from_secs(5));
        assert!(settings.device(DeviceId::Gripper).is_none());
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let file = write_config("[batch]\nmax_count = 10\n");
        std::env::set_var("PETRI_BATCH__MAX_COUNT", "4");
        let result = Settings::load_from(file.path());
        std::env::remove_var("PETRI_BATCH__MAX_COUNT");

        assert_eq!(result.unwrap().batch.max_count, 4);
    }

    #[test]
    #[serial]
    fn test_load_rejects_invalid_values() {
        let file = write_config("[batch]\nmin_count = 0\n");
        assert!(matches!(
            Settings::load_from(file.path()),
            Err(ConfigError::ValidationError(_))
        ));

        let file = write_config("[[devices]]\nid = \"laser\"\nport = \"/dev/ttyS0\"\n");
        assert!(matches!(
            Settings::load_from(file.path()),
            Err(ConfigError::LoadError(_))
        ));
    }
}
