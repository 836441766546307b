//! Device channels: line-oriented text transport to the station controllers.
//!
//! Every physical controller (arm/handler board, extruder platform, cartridge
//! gripper) is reached through one [`DeviceChannel`]. The engine never talks to
//! a serial port directly; it only sends command lines and reads acknowledgment
//! lines, which lets tests and `--simulate` swap in a [`MockChannel`] without
//! touching the sequencer.
//!
//! - [`serial`] - RS-232/USB-serial implementation (serialport crate)
//! - [`mock`] - scripted simulated controller with call logging
//! - [`handshake`] - connect-time greeting exchange

pub mod handshake;
pub mod mock;
pub mod serial;

pub use handshake::{handshake, HandshakeConfig};
pub use mock::MockChannel;
pub use serial::SerialChannel;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Identity of a physical controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceId {
    /// Main handler board: arm moves, cartridge lifts, lid, suction, streaking
    Arm,
    /// Extruder board: sample fetch, extrusion and filament cut
    Platform,
    /// Cartridge gripper used during cartridge exchange
    Gripper,
}

impl DeviceId {
    /// All known controllers.
    pub const ALL: [DeviceId; 3] = [DeviceId::Arm, DeviceId::Platform, DeviceId::Gripper];

    /// Lowercase name used in configuration files and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceId::Arm => "arm",
            DeviceId::Platform => "platform",
            DeviceId::Gripper => "gripper",
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceId {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arm" => Ok(DeviceId::Arm),
            "platform" => Ok(DeviceId::Platform),
            "gripper" => Ok(DeviceId::Gripper),
            other => Err(ChannelError::UnknownDevice(other.to_string())),
        }
    }
}

/// Transport-level failures of a device channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Reading or writing the port failed
    #[error("I/O error on {device}: {source}")]
    Io {
        /// Controller behind the port
        device: DeviceId,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The port could not be opened
    #[error("Failed to open serial port '{port}' at {baud_rate} baud: {reason}")]
    OpenFailed {
        /// Port path
        port: String,
        /// Requested line speed
        baud_rate: u32,
        /// Driver message
        reason: String,
    },

    /// The channel was closed and can no longer be used
    #[error("Channel to {0} is closed")]
    Closed(DeviceId),

    /// A device name that matches no controller
    #[error("Unknown device '{0}'")]
    UnknownDevice(String),

    /// Serial support was compiled out
    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    FeatureDisabled,

    /// The blocking I/O task panicked or was cancelled
    #[error("Serial I/O task failed: {0}")]
    Task(String),
}

/// Duplex line-oriented connection to one controller.
///
/// `send` is fire-and-forget: a successful write implies nothing about the
/// controller having acted on the command. `receive_line` returns `Ok(None)`
/// when `timeout` elapses without a complete line.
#[async_trait]
pub trait DeviceChannel: Send {
    /// Controller this channel is bound to.
    fn device(&self) -> DeviceId;

    /// Write one command line; the line terminator is appended here.
    async fn send(&mut self, command: &str) -> Result<(), ChannelError>;

    /// Wait up to `timeout` for one complete line, trailing whitespace stripped.
    async fn receive_line(&mut self, timeout: Duration) -> Result<Option<String>, ChannelError>;
}

/// Strip the line terminator and trailing whitespace, keep everything else.
pub(crate) fn trim_line(raw: &str) -> &str {
    raw.trim_end()
}

/// The set of open channels, at most one per [`DeviceId`].
#[derive(Default)]
pub struct ChannelSet {
    channels: HashMap<DeviceId, Box<dyn DeviceChannel>>,
}

impl ChannelSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel under its own device id, replacing any previous one.
    pub fn insert(&mut self, channel: Box<dyn DeviceChannel>) -> Option<Box<dyn DeviceChannel>> {
        self.channels.insert(channel.device(), channel)
    }

    /// Builder-style [`ChannelSet::insert`].
    pub fn with(mut self, channel: impl DeviceChannel + 'static) -> Self {
        self.insert(Box::new(channel));
        self
    }

    /// Channel for `device`, if one is open.
    pub fn get_mut(&mut self, device: DeviceId) -> Option<&mut (dyn DeviceChannel + 'static)> {
        self.channels.get_mut(&device).map(|c| &mut **c)
    }

    /// Whether a channel for `device` is open.
    pub fn contains(&self, device: DeviceId) -> bool {
        self.channels.contains_key(&device)
    }

    /// Devices with an open channel, in no particular order.
    pub fn devices(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.channels.keys().copied()
    }

    /// Number of open channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True when no channel is open.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl fmt::Debug for ChannelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut devices: Vec<_> = self.devices().collect();
        devices.sort();
        f.debug_struct("ChannelSet").field("devices", &devices).finish()
    }
}
