//! Tracing subscriber setup for the binary.

use crate::config::{ApplicationSettings, LogFormat};
use tracing_subscriber::EnvFilter;

/// Error returned when a global subscriber is already installed.
pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Filter from `RUST_LOG`, or `petri_orchestrator=<level>` when unset.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("petri_orchestrator={level},warn")))
}

/// Install the global subscriber described by `[application]`.
pub fn init_tracing(settings: &ApplicationSettings) -> Result<(), InitError> {
    let filter = env_filter(&settings.log_level);
    match settings.log_format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_filter_falls_back_to_configured_level() {
        std::env::remove_var("RUST_LOG");
        let filter = env_filter("debug");
        assert!(filter.to_string().contains("petri_orchestrator=debug"));
    }
}
