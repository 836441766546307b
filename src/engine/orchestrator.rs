//! The engine boundary.
//!
//! [`Orchestrator`] owns the run state, the device channels and the batch
//! worker. Every operation validates the current state first and fails with
//! an illegal-invocation [`EngineError`] without touching the hardware when
//! the call is not allowed.

use super::{
    BatchReport, BatchRunner, CancelFlag, CartridgeExchange, CartridgeOperation, ContextPublisher,
    ProgressReporter, RunContext, RunStatus,
};
use crate::config::{BatchSettings, Settings};
use crate::device::ChannelSet;
use crate::error::{AppResult, EngineError};
use crate::sequencer::StepSequencer;
use crate::workflow::{DishType, StreakPattern, Workflow, WorkflowLibrary};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// Selection made by the operator before starting a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchConfig {
    /// Agar type, which picks the source cartridge
    pub dish_type: DishType,
    /// Pattern streaked on every dish
    pub pattern: StreakPattern,
    /// Number of dishes to process
    pub count: u32,
}

/// Accepted range for [`BatchConfig::count`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    /// Smallest accepted count
    pub min_count: u32,
    /// Largest accepted count
    pub max_count: u32,
}

impl BatchLimits {
    fn check(&self, count: u32) -> AppResult<()> {
        if (self.min_count..=self.max_count).contains(&count) {
            Ok(())
        } else {
            Err(EngineError::InvalidBatch {
                count,
                min: self.min_count,
                max: self.max_count,
            })
        }
    }
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            min_count: 1,
            max_count: 10,
        }
    }
}

impl From<&BatchSettings> for BatchLimits {
    fn from(settings: &BatchSettings) -> Self {
        Self {
            min_count: settings.min_count,
            max_count: settings.max_count,
        }
    }
}

/// Handle on a running batch worker.
#[derive(Debug)]
pub struct BatchWorker {
    run_id: Uuid,
    handle: JoinHandle<BatchReport>,
}

impl BatchWorker {
    /// Identifier of the batch this worker runs.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Wait for the worker to finish and return its report.
    pub async fn join(self) -> AppResult<BatchReport> {
        self.handle
            .await
            .map_err(|e| EngineError::Worker(e.to_string()))
    }
}

/// Single owner of the run state and the hardware.
pub struct Orchestrator {
    library: WorkflowLibrary,
    limits: BatchLimits,
    channels: Arc<Mutex<ChannelSet>>,
    reporter: Arc<dyn ProgressReporter>,
    publisher: ContextPublisher,
    cancel: CancelFlag,
    selection: Option<BatchConfig>,
    worker: Option<BatchWorker>,
}

impl Orchestrator {
    /// Idle engine over `channels`, reporting through `reporter`.
    pub fn new(
        library: WorkflowLibrary,
        limits: BatchLimits,
        channels: ChannelSet,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        let (publisher, _) = watch::channel(RunContext::default());
        Self {
            library,
            limits,
            channels: Arc::new(Mutex::new(channels)),
            reporter,
            publisher: Arc::new(publisher),
            cancel: CancelFlag::new(),
            selection: None,
            worker: None,
        }
    }

    /// Engine configured from `settings`, loading any workflow template.
    pub fn from_settings(
        settings: &Settings,
        channels: ChannelSet,
        reporter: Arc<dyn ProgressReporter>,
    ) -> AppResult<Self> {
        let library = WorkflowLibrary::from_settings(&settings.workflows, &settings.cartridge)?;
        Ok(Self::new(
            library,
            BatchLimits::from(&settings.batch),
            channels,
            reporter,
        ))
    }

    /// Copy of the live run state.
    pub fn snapshot(&self) -> RunContext {
        self.publisher.borrow().clone()
    }

    /// Receiver that sees every published run state.
    pub fn subscribe(&self) -> watch::Receiver<RunContext> {
        self.publisher.subscribe()
    }

    /// Shared cancellation flag, usable without going through the engine.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Current batch selection, if any.
    pub fn selection(&self) -> Option<BatchConfig> {
        self.selection
    }

    /// Workflows this engine runs.
    pub fn library(&self) -> &WorkflowLibrary {
        &self.library
    }

    fn status(&self) -> RunStatus {
        self.publisher.borrow().status
    }

    /// Record the operator's dish type, pattern and count.
    pub fn configure_batch(
        &mut self,
        dish_type: DishType,
        pattern: StreakPattern,
        count: u32,
    ) -> AppResult<BatchConfig> {
        match self.status() {
            RunStatus::Active => return Err(EngineError::AlreadyActive),
            status if status.is_terminal() => return Err(EngineError::RequiresReset(status)),
            _ => {}
        }
        self.limits.check(count)?;

        let config = BatchConfig {
            dish_type,
            pattern,
            count,
        };
        info!(dish = %dish_type, pattern = %pattern, count, "Batch configured");
        self.selection = Some(config);
        Ok(config)
    }

    /// Start the configured batch on a worker task.
    pub async fn start_batch(&mut self) -> AppResult<Uuid> {
        match self.status() {
            RunStatus::Active => return Err(EngineError::AlreadyActive),
            status if status.is_terminal() => return Err(EngineError::RequiresReset(status)),
            _ => {}
        }
        let config = self.selection.ok_or(EngineError::NotConfigured)?;
        let workflow = self.library.dish_cycle(config.dish_type, config.pattern)?;
        self.check_channels(&workflow).await?;

        self.cancel.clear();
        let context = RunContext::begin(config.count);
        let run_id = context.run_id.unwrap_or_else(Uuid::new_v4);
        self.publisher.send_replace(context.clone());

        let runner = BatchRunner::new(
            workflow,
            self.cancel.clone(),
            self.reporter.clone(),
            self.publisher.clone(),
        );
        let channels = self.channels.clone();
        let handle = tokio::spawn(async move {
            let mut channels = channels.lock().await;
            runner.run(&mut channels, context).await
        });

        info!(%run_id, "Batch worker spawned");
        self.worker = Some(BatchWorker { run_id, handle });
        Ok(run_id)
    }

    /// Ask the running batch to stop at the next step boundary. Idempotent.
    pub fn cancel(&self) {
        if !self.cancel.is_requested() {
            info!("Cancellation requested");
        }
        self.cancel.request();
    }

    /// Return a finished run to `Idle` and forget the batch selection.
    pub fn reset(&mut self) -> AppResult<()> {
        if self.status() == RunStatus::Active {
            return Err(EngineError::AlreadyActive);
        }
        self.selection = None;
        self.worker = None;
        self.cancel.clear();
        self.publisher.send_replace(RunContext::default());
        info!("Engine reset");
        Ok(())
    }

    /// Take the worker of the last started batch.
    pub fn take_worker(&mut self) -> Option<BatchWorker> {
        self.worker.take()
    }

    /// Wait for the last started batch to end.
    pub async fn wait_for_batch(&mut self) -> AppResult<BatchReport> {
        self.take_worker().ok_or(EngineError::NoBatch)?.join().await
    }

    /// Run the cartridge unload workflow. Refused while a batch is active.
    pub async fn unload_cartridge(&mut self) -> AppResult<()> {
        self.exchange_cartridge(CartridgeOperation::Unload).await
    }

    /// Run the cartridge load workflow. Refused while a batch is active.
    pub async fn load_cartridge(&mut self) -> AppResult<()> {
        self.exchange_cartridge(CartridgeOperation::Load).await
    }

    async fn exchange_cartridge(&mut self, operation: CartridgeOperation) -> AppResult<()> {
        match self.status() {
            RunStatus::Active => return Err(EngineError::BatchActive),
            RunStatus::Faulted => return Err(EngineError::RequiresReset(RunStatus::Faulted)),
            _ => {}
        }
        let workflow = match operation {
            CartridgeOperation::Unload => self.library.cartridge_unload()?,
            CartridgeOperation::Load => self.library.cartridge_load()?,
        };
        self.check_channels(&workflow).await?;

        self.cancel.clear();
        let exchange = CartridgeExchange::new(self.cancel.clone());
        let result = {
            let mut channels = self.channels.lock().await;
            exchange.run(operation, &workflow, &mut channels).await
        };

        match result {
            Ok(()) => {
                self.selection = None;
                Ok(())
            }
            Err(fault) => {
                warn!(%operation, %fault, "Cartridge exchange faulted");
                let mut context = self.snapshot();
                context.status = RunStatus::Faulted;
                self.publisher.send_replace(context);
                self.reporter.on_fault(&fault);
                Err(fault.into())
            }
        }
    }

    async fn check_channels(&self, workflow: &Workflow) -> AppResult<()> {
        let channels = self.channels.lock().await;
        match StepSequencer::missing_channel(workflow, &channels) {
            Some(device) => Err(EngineError::MissingChannel(device)),
            None => Ok(()),
        }
    }

    /// Cancel any running batch and wait for its worker.
    pub async fn shutdown(&mut self) {
        self.cancel();
        if let Some(worker) = self.take_worker() {
            if let Err(e) = worker.join().await {
                warn!(error = %e, "Batch worker ended abnormally");
            }
        }
    }
}
