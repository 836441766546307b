//! Connect-time greeting exchange.
//!
//! Controller firmware prints its identity line repeatedly after reset until
//! the host answers, then confirms with a fixed line. Running the exchange
//! before the first workflow makes sure no command is sent to a controller
//! that is still booting.

use super::DeviceChannel;
use crate::engine::Fault;
use crate::sequencer::await_confirmation;
use crate::workflow::Step;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// Greeting exchange expected from one controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeConfig {
    /// Line the controller prints while waiting for the host
    pub greeting: String,
    /// Line the host answers with
    pub reply: String,
    /// Line the controller prints once initialised, if any
    #[serde(default)]
    pub confirm: Option<String>,
    /// How long to wait for each line of the exchange
    #[serde(with = "humantime_serde", default = "default_handshake_timeout")]
    pub timeout: Duration,
}

fn default_handshake_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Run the greeting exchange described by `exchange` on `channel`.
///
/// Each wait has its own `exchange.timeout` deadline; failures are reported as
/// [`Fault`]s against the two-step exchange (greeting = 0, confirm = 1).
pub async fn handshake<C>(channel: &mut C, exchange: &HandshakeConfig) -> Result<(), Fault>
where
    C: DeviceChannel + ?Sized,
{
    let device = channel.device();
    let greeting = Step::follow_up(device, exchange.greeting.clone()).within(exchange.timeout);
    await_confirmation(channel, &greeting, 0).await?;

    let reply = match &exchange.confirm {
        Some(confirm) => Step::command(device, exchange.reply.clone(), confirm.clone()),
        // Nothing to wait for; the step only describes the send in faults.
        None => Step::command(device, exchange.reply.clone(), exchange.reply.clone()),
    }
    .within(exchange.timeout);

    channel
        .send(&exchange.reply)
        .await
        .map_err(|e| Fault::transport(1, &reply, &e))?;

    if exchange.confirm.is_some() {
        await_confirmation(channel, &reply, 1).await?;
    }

    info!(%device, "Controller handshake complete");
    Ok(())
}
