//! Building the channel set for a station from its configuration.

use crate::config::DeviceConfig;
use crate::device::serial::SerialChannelBuilder;
use crate::device::{handshake, ChannelSet, DeviceChannel, DeviceId, MockChannel};
use crate::error::AppResult;
use crate::workflow::{DishType, StreakPattern, Workflow, WorkflowLibrary};
use std::time::Duration;
use tracing::info;

/// Open every configured serial port and run its handshake, if any.
pub async fn open_serial_channels(devices: &[DeviceConfig]) -> AppResult<ChannelSet> {
    let mut channels = ChannelSet::new();
    for config in devices {
        let mut channel = SerialChannelBuilder::from_config(config).open()?;
        if let Some(exchange) = &config.handshake {
            handshake(&mut channel, exchange).await?;
        }
        info!(device = %config.id, port = %channel.port_name(), "Controller connected");
        channels.insert(Box::new(channel));
    }
    Ok(channels)
}

/// Every workflow `library` can produce, for every dish and pattern.
pub fn all_workflows(library: &WorkflowLibrary) -> AppResult<Vec<Workflow>> {
    let mut workflows = Vec::with_capacity(DishType::ALL.len() * StreakPattern::ALL.len() + 2);
    for dish in DishType::ALL {
        for pattern in StreakPattern::ALL {
            workflows.push(library.dish_cycle(dish, pattern)?);
        }
    }
    workflows.push(library.cartridge_unload()?);
    workflows.push(library.cartridge_load()?);
    Ok(workflows)
}

/// Simulated controllers that acknowledge every step `library` can produce.
pub fn simulated_channels(library: &WorkflowLibrary, delay: Duration) -> AppResult<ChannelSet> {
    let workflows = all_workflows(library)?;
    let delay = (!delay.is_zero()).then_some(delay);

    let mut channels = ChannelSet::new();
    for device in DeviceId::ALL {
        let channel = MockChannel::simulating(device, &workflows, delay);
        info!(device = %channel.device(), "Simulated controller ready");
        channels.insert(Box::new(channel));
    }
    Ok(channels)
}
