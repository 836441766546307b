//! Batch execution: the dish cycle repeated `total_dishes` times.

use super::{CancelFlag, ContextPublisher, Fault, ProgressReporter, RunContext, RunStatus};
use crate::device::ChannelSet;
use crate::sequencer::StepSequencer;
use crate::workflow::Workflow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Outcome of one batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    /// Identifier of the run
    pub run_id: Uuid,
    /// Dishes fully processed
    pub completed: u32,
    /// Dishes requested
    pub total: u32,
    /// Fault that stopped the batch, if any
    pub fault: Option<Fault>,
    /// When the worker started
    pub started_at: DateTime<Utc>,
    /// When the worker stopped
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    /// Every dish processed without a fault.
    pub fn is_complete(&self) -> bool {
        self.fault.is_none() && self.completed == self.total
    }
}

/// Repeats one dish-cycle workflow, reporting progress after every dish.
pub struct BatchRunner {
    workflow: Workflow,
    sequencer: StepSequencer,
    reporter: Arc<dyn ProgressReporter>,
    publisher: ContextPublisher,
}

impl BatchRunner {
    /// Runner that publishes progress through `publisher`.
    pub fn new(
        workflow: Workflow,
        cancel: CancelFlag,
        reporter: Arc<dyn ProgressReporter>,
        publisher: ContextPublisher,
    ) -> Self {
        let sequencer = StepSequencer::new(cancel).with_publisher(publisher.clone());
        Self {
            workflow,
            sequencer,
            reporter,
            publisher,
        }
    }

    /// Dish-cycle workflow this runner repeats.
    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Run the batch described by `context` to completion or first fault.
    ///
    /// Cancellation is honoured before each step, so it takes effect between
    /// dishes or between steps, never during a send/acknowledge exchange. If
    /// the last dish finishes before the request is seen, the batch completes.
    pub async fn run(&self, channels: &mut ChannelSet, mut context: RunContext) -> BatchReport {
        let run_id = *context.run_id.get_or_insert_with(Uuid::new_v4);
        let span = info_span!("batch", %run_id, total = context.total_dishes);
        self.run_inner(channels, context, run_id).instrument(span).await
    }

    async fn run_inner(&self, channels: &mut ChannelSet, mut context: RunContext, run_id: Uuid) -> BatchReport {
        let started_at = Utc::now();
        let total = context.total_dishes;
        context.status = RunStatus::Active;
        context.dish_index = 0;
        self.publish(&context);

        info!(workflow = self.workflow.name(), total, "Batch started");

        while context.dish_index < total {
            info!(dish = context.dish_index + 1, total, "Starting dish");
            match self
                .sequencer
                .run_workflow(&self.workflow, channels, &mut context)
                .await
            {
                Ok(()) => {
                    context.dish_index += 1;
                    self.publish(&context);
                    self.reporter.on_progress(context.dish_index, total);
                }
                Err(fault) => {
                    warn!(dish = context.dish_index + 1, %fault, "Batch aborted");
                    context.status = RunStatus::Faulted;
                    self.publish(&context);
                    self.reporter.on_fault(&fault);
                    return BatchReport {
                        run_id,
                        completed: context.dish_index,
                        total,
                        fault: Some(fault),
                        started_at,
                        finished_at: Utc::now(),
                    };
                }
            }
        }

        context.status = RunStatus::Complete;
        self.publish(&context);
        self.reporter.on_complete();
        info!(total, "Batch complete");

        BatchReport {
            run_id,
            completed: total,
            total,
            fault: None,
            started_at,
            finished_at: Utc::now(),
        }
    }

    fn publish(&self, context: &RunContext) {
        self.publisher.send_replace(context.clone());
    }
}
