use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use petri_orchestrator::config::{Settings, DEFAULT_CONFIG_PATH};
use petri_orchestrator::device::{ChannelSet, DeviceId};
use petri_orchestrator::engine::{ChannelReporter, EngineEvent, EngineHandle, Orchestrator};
use petri_orchestrator::workflow::{DishType, StreakPattern, WorkflowLibrary};
use petri_orchestrator::{logging, station};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "petri_orchestrator")]
#[command(about = "Drive the petri dish streaking station", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Use simulated controllers instead of serial ports
    #[arg(long)]
    simulate: bool,

    /// Print events and reports as JSON lines
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Streak a batch of dishes
    Run {
        #[arg(long, value_enum)]
        dish: DishType,
        #[arg(long, value_enum)]
        pattern: StreakPattern,
        #[arg(long)]
        count: u32,
    },
    /// Release all cartridges
    Unload,
    /// Grab and lower all cartridges, then home
    Load,
    /// Validate the configuration and print a summary
    CheckConfig,
    /// Print the dish-cycle steps for a selection
    ShowWorkflow {
        #[arg(long, value_enum)]
        dish: DishType,
        #[arg(long, value_enum)]
        pattern: StreakPattern,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let settings = Settings::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    logging::init_tracing(&settings.application).map_err(|e| anyhow!(e))?;

    let library = WorkflowLibrary::from_settings(&settings.workflows, &settings.cartridge)
        .context("Failed to load workflow definitions")?;

    match cli.command {
        Commands::CheckConfig => {
            check_config(&settings, &library, cli.json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::ShowWorkflow { dish, pattern } => {
            let workflow = library.dish_cycle(dish, pattern)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&workflow)?);
            } else {
                print!("{workflow}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run { dish, pattern, count } => {
            let running = start_engine(&settings, library, cli.simulate, cli.json).await?;
            let engine = &running.engine;
            engine.configure_batch(dish, pattern, count).await?;
            engine.start_batch().await?;

            let report = engine.wait_for_batch().await?;
            running.finish().await?;
            if cli.json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                println!(
                    "Batch {}: {}/{} dishes",
                    report.run_id, report.completed, report.total
                );
            }
            Ok(if report.is_complete() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Unload => exchange(&settings, library, &cli, true).await,
        Commands::Load => exchange(&settings, library, &cli, false).await,
    }
}

async fn exchange(settings: &Settings, library: WorkflowLibrary, cli: &Cli, unload: bool) -> Result<ExitCode> {
    let running = start_engine(settings, library, cli.simulate, cli.json).await?;
    let result = if unload {
        running.engine.unload_cartridge().await
    } else {
        running.engine.load_cartridge().await
    };
    running.finish().await?;
    match result {
        Ok(()) => {
            info!(unload, "Cartridge exchange finished");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            warn!(error = %e, "Cartridge exchange failed");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Running engine actor plus the task printing its events.
struct RunningEngine {
    engine: EngineHandle,
    actor: JoinHandle<()>,
    printer: JoinHandle<()>,
}

impl RunningEngine {
    /// Stop the engine and wait until every event has been printed.
    ///
    /// The printer ends once the actor has dropped the reporter.
    async fn finish(self) -> Result<()> {
        self.engine.shutdown().await?;
        self.actor.await?;
        self.printer.await?;
        Ok(())
    }
}

/// Open channels, spawn the engine actor, and wire events and Ctrl-C.
async fn start_engine(
    settings: &Settings,
    library: WorkflowLibrary,
    simulate: bool,
    json: bool,
) -> Result<RunningEngine> {
    let channels: ChannelSet = if simulate {
        let delay = Duration::from_millis(settings.simulation.response_delay_ms);
        station::simulated_channels(&library, delay)?
    } else {
        station::open_serial_channels(&settings.devices)
            .await
            .context("Failed to connect controllers")?
    };

    let (reporter, events) = ChannelReporter::channel();
    let orchestrator = Orchestrator::new(
        library,
        (&settings.batch).into(),
        channels,
        Arc::new(reporter),
    );
    let (engine, actor) = EngineHandle::spawn(orchestrator);
    let printer = tokio::spawn(print_events(events, json));

    let ctrl_c = engine.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping after the current step");
            ctrl_c.cancel();
        }
    });

    Ok(RunningEngine {
        engine,
        actor,
        printer,
    })
}

async fn print_events(mut events: mpsc::UnboundedReceiver<EngineEvent>, json: bool) {
    while let Some(event) = events.recv().await {
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "Failed to encode event"),
            }
            continue;
        }
        match event {
            EngineEvent::Progress { dish_index, total } => println!("Dish {dish_index}/{total} done"),
            EngineEvent::Fault(fault) => println!("FAULT: {fault}"),
            EngineEvent::Complete => println!("Batch complete"),
        }
    }
}

fn check_config(settings: &Settings, library: &WorkflowLibrary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(settings)?);
        return Ok(());
    }
    println!("Station: {}", settings.application.name);
    println!(
        "Batch size: {}-{}",
        settings.batch.min_count, settings.batch.max_count
    );
    println!(
        "Workflows: {} revision{}",
        library.revision(),
        if library.uses_template() { " (dish cycle from template)" } else { "" }
    );
    println!("Cartridge slots: {}", library.slots().len());
    for device in &settings.devices {
        println!(
            "  {} on {} @ {} baud{}",
            device.id,
            device.port,
            device.baud_rate,
            if device.handshake.is_some() { ", handshake" } else { "" }
        );
    }
    let missing: BTreeSet<DeviceId> = station::all_workflows(library)?
        .iter()
        .flat_map(|w| w.devices())
        .filter(|d| settings.device(*d).is_none())
        .collect();
    if !missing.is_empty() {
        println!("Warning: no port configured for {:?} (only --simulate will work)", missing);
    }
    Ok(())
}
