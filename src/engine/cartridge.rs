//! Cartridge load/unload runs.

use super::{CancelFlag, Fault, RunContext};
use crate::device::ChannelSet;
use crate::sequencer::StepSequencer;
use crate::workflow::Workflow;
use serde::Serialize;
use std::fmt;
use tracing::{info, info_span, Instrument};

/// Direction of a cartridge exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CartridgeOperation {
    /// Storage back into the cartridges
    Load,
    /// Cartridges out into storage
    Unload,
}

impl fmt::Display for CartridgeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CartridgeOperation::Load => f.write_str("load"),
            CartridgeOperation::Unload => f.write_str("unload"),
        }
    }
}

/// Runs cartridge workflows with the same sequencer as the dish cycle.
///
/// Progress is tracked on a private context; the batch [`RunContext`] is
/// only touched by the caller, and only on a fault.
#[derive(Debug, Clone)]
pub struct CartridgeExchange {
    sequencer: StepSequencer,
}

impl CartridgeExchange {
    /// Exchange that stops when `cancel` is requested.
    pub fn new(cancel: CancelFlag) -> Self {
        Self {
            sequencer: StepSequencer::new(cancel),
        }
    }

    /// Run `workflow` to completion or to its first fault.
    pub async fn run(
        &self,
        operation: CartridgeOperation,
        workflow: &Workflow,
        channels: &mut ChannelSet,
    ) -> Result<(), Fault> {
        let span = info_span!("cartridge", %operation, slots = workflow.len());
        async {
            let mut scratch = RunContext::default();
            self.sequencer.run_workflow(workflow, channels, &mut scratch).await?;
            info!("Cartridge exchange complete");
            Ok(())
        }
        .instrument(span)
        .await
    }
}
