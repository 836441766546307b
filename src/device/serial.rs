//! Serial channel for the station controllers (USB-serial, 115200 baud).
//!
//! Wraps the serialport crate. All port I/O is blocking, so every read and
//! write runs on Tokio's blocking pool. Received bytes are buffered across
//! calls: a line that is only half received when a wait times out is completed
//! by the next `receive_line`, never dropped.

use super::{ChannelError, DeviceChannel, DeviceId};
use crate::config::DeviceConfig;
use async_trait::async_trait;
use std::time::Duration;

#[cfg(feature = "instrument_serial")]
use serialport::SerialPort;
#[cfg(feature = "instrument_serial")]
use std::sync::Arc;
#[cfg(feature = "instrument_serial")]
use tokio::sync::Mutex;
#[cfg(feature = "instrument_serial")]
use tracing::debug;

/// Builder for [`SerialChannel`].
///
/// # Example
/// ```no_run
/// use std::time::Duration;
/// use petri_orchestrator::device::{serial::SerialChannelBuilder, DeviceId};
///
/// let channel = SerialChannelBuilder::new(DeviceId::Arm, "/dev/ttyACM0", 115200)
///     .with_poll_interval(Duration::from_millis(50))
///     .open();
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(not(feature = "instrument_serial"), allow(dead_code))]
pub struct SerialChannelBuilder {
    device: DeviceId,
    port_name: String,
    baud_rate: u32,
    line_terminator: String,
    poll_interval: Duration,
}

impl SerialChannelBuilder {
    /// Defaults: `"\n"` terminator, 100 ms internal poll.
    pub fn new(device: DeviceId, port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            device,
            port_name: port_name.into(),
            baud_rate,
            line_terminator: "\n".to_string(),
            poll_interval: Duration::from_millis(100),
        }
    }

    /// Builder pre-filled from a `[[devices]]` configuration entry.
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(config.id, config.port.clone(), config.baud_rate)
            .with_line_terminator(config.line_terminator.clone())
            .with_poll_interval(Duration::from_millis(config.poll_interval_ms))
    }

    /// Terminator appended to every command.
    pub fn with_line_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.line_terminator = terminator.into();
        self
    }

    /// Upper bound on a single blocking read; bounds how late a deadline is noticed.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Open the port.
    #[cfg(feature = "instrument_serial")]
    pub fn open(self) -> Result<SerialChannel, ChannelError> {
        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(self.poll_interval)
            .open()
            .map_err(|e| ChannelError::OpenFailed {
                port: self.port_name.clone(),
                baud_rate: self.baud_rate,
                reason: e.to_string(),
            })?;

        debug!(
            device = %self.device,
            port = %self.port_name,
            baud_rate = self.baud_rate,
            "Serial port opened"
        );

        Ok(SerialChannel {
            device: self.device,
            port_name: self.port_name,
            line_terminator: self.line_terminator,
            poll_interval: self.poll_interval,
            state: Arc::new(Mutex::new(PortState {
                port,
                pending: Vec::new(),
            })),
        })
    }

    /// Open the port (always fails when the feature is not enabled).
    #[cfg(not(feature = "instrument_serial"))]
    pub fn open(self) -> Result<SerialChannel, ChannelError> {
        Err(ChannelError::FeatureDisabled)
    }
}

#[cfg(feature = "instrument_serial")]
struct PortState {
    port: Box<dyn SerialPort>,
    /// Bytes received but not yet returned as a complete line.
    pending: Vec<u8>,
}

#[cfg(feature = "instrument_serial")]
impl PortState {
    fn take_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let raw: Vec<u8> = self.pending.drain(..=end).collect();
        let text = String::from_utf8_lossy(&raw);
        Some(super::trim_line(&text).to_string())
    }
}

/// Line channel over one serial port.
#[cfg_attr(not(feature = "instrument_serial"), allow(dead_code))]
pub struct SerialChannel {
    device: DeviceId,
    port_name: String,
    line_terminator: String,
    poll_interval: Duration,
    #[cfg(feature = "instrument_serial")]
    state: Arc<Mutex<PortState>>,
}

impl SerialChannel {
    /// Port path this channel was opened on.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

#[async_trait]
impl DeviceChannel for SerialChannel {
    fn device(&self) -> DeviceId {
        self.device
    }

    #[cfg(feature = "instrument_serial")]
    async fn send(&mut self, command: &str) -> Result<(), ChannelError> {
        let device = self.device;
        let payload = format!("{}{}", command, self.line_terminator);
        let state = self.state.clone();

        tokio::task::spawn_blocking(move || {
            use std::io::Write;

            let mut guard = state.blocking_lock();
            guard
                .port
                .write_all(payload.as_bytes())
                .and_then(|_| guard.port.flush())
                .map_err(|source| ChannelError::Io { device, source })
        })
        .await
        .map_err(|e| ChannelError::Task(e.to_string()))??;

        debug!(device = %self.device, command, "Sent command");
        Ok(())
    }

    #[cfg(feature = "instrument_serial")]
    async fn receive_line(&mut self, timeout: Duration) -> Result<Option<String>, ChannelError> {
        let device = self.device;
        let poll = self.poll_interval;
        let state = self.state.clone();

        let line = tokio::task::spawn_blocking(move || -> Result<Option<String>, ChannelError> {
            use std::io::Read;

            let mut guard = state.blocking_lock();
            let deadline = std::time::Instant::now() + timeout;
            let mut buffer = [0u8; 64];

            loop {
                if let Some(line) = guard.take_line() {
                    return Ok(Some(line));
                }

                let now = std::time::Instant::now();
                if now >= deadline {
                    return Ok(None);
                }

                guard
                    .port
                    .set_timeout((deadline - now).min(poll))
                    .map_err(|e| ChannelError::Io {
                        device,
                        source: e.into(),
                    })?;

                match guard.port.read(&mut buffer) {
                    Ok(0) => return Err(ChannelError::Closed(device)),
                    Ok(n) => guard.pending.extend_from_slice(&buffer[..n]),
                    Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                    Err(source) => return Err(ChannelError::Io { device, source }),
                }
            }
        })
        .await
        .map_err(|e| ChannelError::Task(e.to_string()))??;

        if let Some(ref line) = line {
            debug!(device = %self.device, line = %line, "Received line");
        }
        Ok(line)
    }

    #[cfg(not(feature = "instrument_serial"))]
    async fn send(&mut self, _command: &str) -> Result<(), ChannelError> {
        Err(ChannelError::FeatureDisabled)
    }

    #[cfg(not(feature = "instrument_serial"))]
    async fn receive_line(&mut self, _timeout: Duration) -> Result<Option<String>, ChannelError> {
        Err(ChannelError::FeatureDisabled)
    }
}
