//! Station configuration.
//!
//! Configuration is loaded with Figment from (in order of precedence):
//! 1. Environment variables prefixed with `PETRI_`
//! 2. TOML configuration file (default: `config/petri.toml`)
//!
//! # Example
//!
//! ```no_run
//! use petri_orchestrator::config::Settings;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::load_from("config/petri.toml")?;
//!     println!("Station: {}", settings.application.name);
//!     println!("Controllers: {}", settings.devices.len());
//!     Ok(())
//! }
//! ```
//!
//! # Environment Variables
//!
//! Nested keys are separated by a double underscore, so key names that
//! contain a single underscore still work:
//!
//! ```text
//! PETRI_APPLICATION__LOG_LEVEL=debug
//! PETRI_BATCH__MAX_COUNT=6
//! PETRI_WORKFLOWS__REVISION=legacy
//! ```

pub mod settings;

pub use settings::{
    ApplicationSettings, BatchSettings, CartridgeSettings, ConfigError, DeviceConfig, LogFormat,
    Settings, SimulationSettings, WorkflowSettings, DEFAULT_CONFIG_PATH,
};
