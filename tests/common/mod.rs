//! Common test utilities for petri_orchestrator integration tests
//!
//! - Simulated controller sets with handles kept for call-log inspection
//! - Engine construction with a recording reporter
//! - Waiting on published run state

#![allow(dead_code)] // Utilities may not all be used by every test binary

use petri_orchestrator::device::{ChannelSet, DeviceId, MockChannel};
use petri_orchestrator::engine::{
    BatchLimits, ChannelReporter, EngineEvent, Orchestrator, RunContext,
};
use petri_orchestrator::workflow::{Workflow, WorkflowLibrary};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Simulated controllers for `workflows`, plus a handle on each.
pub fn simulated(workflows: &[&Workflow]) -> (ChannelSet, HashMap<DeviceId, MockChannel>) {
    let mut set = ChannelSet::new();
    let mut handles = HashMap::new();
    for device in DeviceId::ALL {
        let channel = MockChannel::simulating(device, workflows.iter().copied(), None);
        handles.insert(device, channel.clone());
        set.insert(Box::new(channel));
    }
    (set, handles)
}

/// Controller for `device` that acknowledges `workflow` immediately, except
/// `slow_command`, whose acknowledgment arrives after `delay`.
pub fn with_slow_command(
    device: DeviceId,
    workflow: &Workflow,
    slow_command: &str,
    delay: Duration,
) -> MockChannel {
    let mut channel = MockChannel::new(device);
    for step in workflow.steps().iter().filter(|s| s.device == device) {
        let Some(command) = step.command.as_deref() else {
            continue;
        };
        channel = if command == slow_command {
            channel.respond_after(command, delay, [step.expected_ack.clone()])
        } else {
            channel.respond(command, [step.expected_ack.clone()])
        };
    }
    channel
}

/// Engine over `channels` whose events are collected on the returned receiver.
pub fn recording_engine(
    library: WorkflowLibrary,
    channels: ChannelSet,
) -> (Orchestrator, mpsc::UnboundedReceiver<EngineEvent>) {
    let (reporter, events) = ChannelReporter::channel();
    let engine = Orchestrator::new(library, BatchLimits::default(), channels, Arc::new(reporter));
    (engine, events)
}

/// Every event received so far.
pub fn drain(events: &mut mpsc::UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Wait until the published run state satisfies `predicate`.
pub async fn wait_until(
    rx: &mut watch::Receiver<RunContext>,
    predicate: impl Fn(&RunContext) -> bool,
) -> RunContext {
    loop {
        {
            let context = rx.borrow_and_update();
            if predicate(&context) {
                return context.clone();
            }
        }
        rx.changed().await.unwrap();
    }
}

/// Wait until `channel` has been sent `command` at least `times` times.
pub async fn wait_for_send(channel: &MockChannel, command: &str, times: usize) {
    while channel.call_log().iter().filter(|c| *c == command).count() < times {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
