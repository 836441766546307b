//! Step-by-step execution of one workflow.
//!
//! The sequencer sends each step's command, waits for its acknowledgment, and
//! stops at the first fault. Steps are never reordered, skipped or run in
//! parallel, including steps addressed to different controllers.

pub mod waiter;

pub use waiter::await_confirmation;

use crate::device::{ChannelSet, DeviceId};
use crate::engine::{CancelFlag, ContextPublisher, Fault, RunContext};
use crate::workflow::Workflow;
use tracing::{debug, info, warn};

/// Runs workflows against the open channels.
#[derive(Debug, Clone)]
pub struct StepSequencer {
    cancel: CancelFlag,
    publisher: Option<ContextPublisher>,
}

impl StepSequencer {
    /// Sequencer that checks `cancel` before each step.
    pub fn new(cancel: CancelFlag) -> Self {
        Self {
            cancel,
            publisher: None,
        }
    }

    /// Publish the context after every acknowledged step.
    pub fn with_publisher(mut self, publisher: ContextPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// First controller `workflow` needs that has no open channel.
    pub fn missing_channel(workflow: &Workflow, channels: &ChannelSet) -> Option<DeviceId> {
        workflow.devices().into_iter().find(|d| !channels.contains(*d))
    }

    /// Execute `workflow`, advancing `context.step_cursor` on every match.
    ///
    /// On success `step_cursor == workflow.len()`. On a fault at index `i`,
    /// `step_cursor == i` and nothing after step `i` has been sent.
    pub async fn run_workflow(
        &self,
        workflow: &Workflow,
        channels: &mut ChannelSet,
        context: &mut RunContext,
    ) -> Result<(), Fault> {
        context.step_cursor = 0;

        // Rejected before anything runs, so the fault is at the cursor (0).
        if let Some(device) = Self::missing_channel(workflow, channels) {
            warn!(workflow = workflow.name(), %device, "Workflow rejected: no channel");
            return Err(Fault::no_channel(0, &workflow.steps()[0], device));
        }

        info!(workflow = workflow.name(), steps = workflow.len(), "Running workflow");

        for (index, step) in workflow.steps().iter().enumerate() {
            if self.cancel.is_requested() {
                info!(workflow = workflow.name(), step_index = index, "Cancellation honoured");
                return Err(Fault::cancelled(index, step));
            }

            let Some(channel) = channels.get_mut(step.device) else {
                return Err(Fault::no_channel(index, step, step.device));
            };

            if let Some(command) = &step.command {
                debug!(device = %step.device, command = %command, step_index = index, "Sending");
                channel
                    .send(command)
                    .await
                    .map_err(|e| Fault::transport(index, step, &e))?;
            }

            await_confirmation(channel, step, index).await?;

            context.step_cursor = index + 1;
            self.publish(context);
        }

        info!(workflow = workflow.name(), "Workflow complete");
        Ok(())
    }

    fn publish(&self, context: &RunContext) {
        if let Some(publisher) = &self.publisher {
            publisher.send_replace(context.clone());
        }
    }
}
