//! Actor wrapper around the [`Orchestrator`].
//!
//! All state mutations happen in a single task that processes
//! [`EngineCommand`]s in order. `cancel` and `snapshot` do not go through the
//! mailbox, so they answer immediately even while a cartridge exchange holds
//! the actor.

use super::{BatchConfig, BatchReport, CancelFlag, Orchestrator, RunContext};
use crate::error::{AppResult, EngineError};
use crate::messages::EngineCommand;
use crate::workflow::{DishType, StreakPattern};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

const MAILBOX_CAPACITY: usize = 32;

/// Cloneable handle to a running engine actor.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
    cancel: CancelFlag,
    context: watch::Receiver<RunContext>,
}

impl EngineHandle {
    /// Move `orchestrator` into a new actor task.
    pub fn spawn(orchestrator: Orchestrator) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let handle = Self {
            tx,
            cancel: orchestrator.cancel_flag(),
            context: orchestrator.subscribe(),
        };
        let task = tokio::spawn(run(orchestrator, rx));
        (handle, task)
    }

    /// Validate and record the selection for the next batch.
    pub async fn configure_batch(
        &self,
        dish_type: DishType,
        pattern: StreakPattern,
        count: u32,
    ) -> AppResult<BatchConfig> {
        self.request(EngineCommand::configure_batch(dish_type, pattern, count))
            .await?
    }

    /// Start the configured batch; returns its run id.
    pub async fn start_batch(&self) -> AppResult<Uuid> {
        self.request(EngineCommand::start_batch()).await?
    }

    /// Return a faulted or complete run to idle.
    pub async fn reset(&self) -> AppResult<()> {
        self.request(EngineCommand::reset()).await?
    }

    /// Move every dish out of the cartridges into storage.
    pub async fn unload_cartridge(&self) -> AppResult<()> {
        self.request(EngineCommand::unload_cartridge()).await?
    }

    /// Move the dishes back from storage into their cartridges.
    pub async fn load_cartridge(&self) -> AppResult<()> {
        self.request(EngineCommand::load_cartridge()).await?
    }

    /// Resolves with the report of the last started batch.
    pub async fn wait_for_batch(&self) -> AppResult<BatchReport> {
        self.request(EngineCommand::wait_for_batch()).await?
    }

    /// Stop the actor after cancelling and draining any batch.
    pub async fn shutdown(&self) -> AppResult<()> {
        self.request(EngineCommand::shutdown()).await
    }

    /// Cooperative stop, honoured at the next step boundary.
    pub fn cancel(&self) {
        self.cancel.request();
    }

    /// Latest published run state.
    pub fn snapshot(&self) -> RunContext {
        self.context.borrow().clone()
    }

    /// Receiver that sees every published run state.
    pub fn subscribe(&self) -> watch::Receiver<RunContext> {
        self.context.clone()
    }

    async fn request<T>(&self, (command, rx): (EngineCommand, oneshot::Receiver<T>)) -> AppResult<T> {
        self.tx.send(command).await.map_err(|_| EngineError::ShutDown)?;
        rx.await.map_err(|_| EngineError::ShutDown)
    }
}

async fn run(mut orchestrator: Orchestrator, mut rx: mpsc::Receiver<EngineCommand>) {
    info!("Engine actor started");

    while let Some(command) = rx.recv().await {
        match command {
            EngineCommand::ConfigureBatch {
                dish_type,
                pattern,
                count,
                response,
            } => {
                let result = orchestrator.configure_batch(dish_type, pattern, count);
                let _ = response.send(result);
            }

            EngineCommand::StartBatch { response } => {
                let result = orchestrator.start_batch().await;
                let _ = response.send(result);
            }

            EngineCommand::Reset { response } => {
                let _ = response.send(orchestrator.reset());
            }

            EngineCommand::UnloadCartridge { response } => {
                let result = orchestrator.unload_cartridge().await;
                let _ = response.send(result);
            }

            EngineCommand::LoadCartridge { response } => {
                let result = orchestrator.load_cartridge().await;
                let _ = response.send(result);
            }

            EngineCommand::WaitForBatch { response } => match orchestrator.take_worker() {
                // Join off the actor so the mailbox stays responsive.
                Some(worker) => {
                    tokio::spawn(async move {
                        let _ = response.send(worker.join().await);
                    });
                }
                None => {
                    let _ = response.send(Err(EngineError::NoBatch));
                }
            },

            EngineCommand::Shutdown { response } => {
                info!("Shutdown command received");
                orchestrator.shutdown().await;
                let _ = response.send(());
                break;
            }
        }
    }

    info!("Engine actor shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ChannelSet, DeviceId, MockChannel};
    use crate::engine::{BatchLimits, LogReporter, RunStatus};
    use crate::workflow::WorkflowLibrary;
    use std::sync::Arc;

    fn simulated_engine() -> Orchestrator {
        let library = WorkflowLibrary::default();
        let dish = library.dish_cycle(DishType::Chocolat, StreakPattern::Zigzag).unwrap();
        let mut channels = ChannelSet::new();
        for device in DeviceId::ALL {
            channels.insert(Box::new(MockChannel::simulating(device, [&dish], None)));
        }
        Orchestrator::new(library, BatchLimits::default(), channels, Arc::new(LogReporter))
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_runs_batch() {
        let (engine, task) = EngineHandle::spawn(simulated_engine());
        engine
            .configure_batch(DishType::Chocolat, StreakPattern::Zigzag, 2)
            .await
            .unwrap();
        let run_id = engine.start_batch().await.unwrap();

        let report = engine.wait_for_batch().await.unwrap();
        assert_eq!(report.run_id, run_id);
        assert_eq!(report.completed, 2);
        assert_eq!(engine.snapshot().status, RunStatus::Complete);

        engine.shutdown().await.unwrap();
        task.await.unwrap();
        assert!(matches!(engine.reset().await, Err(EngineError::ShutDown)));
    }

    #[tokio::test]
    async fn test_errors_travel_back_through_handle() {
        let (engine, _task) = EngineHandle::spawn(simulated_engine());
        assert!(matches!(engine.start_batch().await, Err(EngineError::NotConfigured)));
        assert!(matches!(
            engine.configure_batch(DishType::Normal, StreakPattern::Simple, 42).await,
            Err(EngineError::InvalidBatch { count: 42, .. })
        ));
    }
}
