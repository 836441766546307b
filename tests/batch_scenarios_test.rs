//! End-to-end batch scenarios against simulated controllers.

mod common;

use common::{drain, recording_engine, simulated, wait_for_send, wait_until, with_slow_command};
use petri_orchestrator::device::{ChannelSet, DeviceId, MockChannel};
use petri_orchestrator::engine::{EngineEvent, FaultKind, RunStatus};
use petri_orchestrator::workflow::{DishType, StreakPattern, WorkflowLibrary, WorkflowTemplate};
use std::time::Duration;
use tokio::time::Instant;

const THREE_STEP_CYCLE: &str = r#"
name = "three-step"

[[steps]]
device = "arm"
command = "MOVE {dish}"
expect = "MOVE COMPLETED"

[[steps]]
device = "platform"
command = "FETCH"
expect = "FETCH START"
timeout = "5s"

[[steps]]
device = "arm"
command = "LID CLOSE"
expect = "LID ON"
"#;

#[tokio::test(start_paused = true)]
async fn test_missing_ack_times_out_and_skips_rest() {
    let template = WorkflowTemplate::from_toml_str(THREE_STEP_CYCLE).unwrap();
    let library = WorkflowLibrary::default().with_template(template);
    let workflow = library.dish_cycle(DishType::Normal, StreakPattern::Simple).unwrap();

    let arm = MockChannel::simulating(DeviceId::Arm, [&workflow], None);
    let platform = MockChannel::new(DeviceId::Platform);
    let channels = ChannelSet::new().with(arm.clone()).with(platform.clone());
    let (mut engine, mut events) = recording_engine(library, channels);

    engine
        .configure_batch(DishType::Normal, StreakPattern::Simple, 1)
        .unwrap();
    let started = Instant::now();
    engine.start_batch().await.unwrap();
    let report = engine.wait_for_batch().await.unwrap();

    let fault = report.fault.unwrap();
    assert_eq!(fault.kind, FaultKind::Timeout);
    assert_eq!(fault.step_index, 1);
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(arm.call_log(), vec!["MOVE NORMAL"]);
    assert_eq!(platform.call_log(), vec!["FETCH"]);

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.status, RunStatus::Faulted);
    assert_eq!(snapshot.step_cursor, 1);
    assert_eq!(drain(&mut events), vec![EngineEvent::Fault(fault)]);
}

#[tokio::test(start_paused = true)]
async fn test_cut_failed_is_reported_immediately() {
    let library = WorkflowLibrary::default();
    let workflow = library.dish_cycle(DishType::Blood, StreakPattern::Spiral).unwrap();

    let arm = MockChannel::simulating(DeviceId::Arm, [&workflow], None);
    let platform = MockChannel::new(DeviceId::Platform)
        .respond("FETCH", ["FETCH START", "FETCH COMPLETED"])
        .respond("EXTRUDE", ["EXTRUDE START", "EXTRUDE COMPLETED"])
        .respond("PREP CUT", ["PREP START", "FILAMENT RDY"])
        .respond("CUT", ["CUT START", "CUT FAILED"]);
    let channels = ChannelSet::new().with(arm.clone()).with(platform);
    let (mut engine, mut events) = recording_engine(library, channels);

    engine
        .configure_batch(DishType::Blood, StreakPattern::Spiral, 2)
        .unwrap();
    let started = Instant::now();
    engine.start_batch().await.unwrap();
    let report = engine.wait_for_batch().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    let fault = report.fault.clone().unwrap();
    assert_eq!(fault.kind, FaultKind::DeviceError);
    assert_eq!(fault.detail, "CUT FAILED");
    assert_eq!(fault.step_index, 17);
    assert_eq!(report.completed, 0);

    assert!(!arm.call_log().contains(&"LID CLOSE".to_string()));
    assert_eq!(engine.snapshot().step_cursor, 17);
    assert_eq!(drain(&mut events), vec![EngineEvent::Fault(fault)]);
}

#[tokio::test(start_paused = true)]
async fn test_batch_of_three_reports_progress_in_order() {
    let library = WorkflowLibrary::default();
    let workflow = library.dish_cycle(DishType::Normal, StreakPattern::Quadrant).unwrap();
    let (channels, handles) = simulated(&[&workflow]);
    let (mut engine, mut events) = recording_engine(library, channels);

    engine
        .configure_batch(DishType::Normal, StreakPattern::Quadrant, 3)
        .unwrap();
    engine.start_batch().await.unwrap();
    let report = engine.wait_for_batch().await.unwrap();

    assert!(report.is_complete());
    assert!(report.finished_at >= report.started_at);
    assert_eq!(
        drain(&mut events),
        vec![
            EngineEvent::Progress { dish_index: 1, total: 3 },
            EngineEvent::Progress { dish_index: 2, total: 3 },
            EngineEvent::Progress { dish_index: 3, total: 3 },
            EngineEvent::Complete,
        ]
    );

    let arm_log = handles[&DeviceId::Arm].call_log();
    assert_eq!(arm_log.iter().filter(|c| *c == "MOVE NORMAL").count(), 3);
    assert_eq!(arm_log.iter().filter(|c| *c == "PATTERN 2").count(), 3);
    assert!(handles[&DeviceId::Gripper].call_log().is_empty());

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.status, RunStatus::Complete);
    assert_eq!(snapshot.dish_index, 3);
    assert_eq!(snapshot.step_cursor, workflow.len());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_last_step_of_dish_two_stops_before_dish_three() {
    let library = WorkflowLibrary::default();
    let workflow = library.dish_cycle(DishType::Chocolat, StreakPattern::Simple).unwrap();
    let last = workflow.len() - 1;

    let arm = with_slow_command(DeviceId::Arm, &workflow, "LIFT STRG DOWN", Duration::from_secs(2));
    let platform = MockChannel::simulating(DeviceId::Platform, [&workflow], None);
    let channels = ChannelSet::new().with(arm.clone()).with(platform.clone());
    let (mut engine, mut events) = recording_engine(library, channels);
    let mut state = engine.subscribe();

    engine
        .configure_batch(DishType::Chocolat, StreakPattern::Simple, 3)
        .unwrap();
    engine.start_batch().await.unwrap();

    wait_until(&mut state, |c| c.dish_index == 1 && c.step_cursor == last).await;
    wait_for_send(&arm, "LIFT STRG DOWN", 2).await;
    engine.cancel();
    let sends_at_cancel = arm.send_count() + platform.send_count();
    let report = engine.wait_for_batch().await.unwrap();

    let fault = report.fault.clone().unwrap();
    assert_eq!(fault.kind, FaultKind::Cancelled);
    assert_eq!(fault.step_index, 0);
    assert_eq!(report.completed, 2);
    assert_eq!(engine.snapshot().dish_index, 2);
    assert_eq!(engine.snapshot().status, RunStatus::Faulted);

    assert_eq!(arm.send_count() + platform.send_count(), sends_at_cancel);
    assert_eq!(
        arm.call_log().iter().filter(|c| *c == "MOVE CHOCOLAT").count(),
        2
    );
    assert_eq!(
        drain(&mut events),
        vec![
            EngineEvent::Progress { dish_index: 1, total: 3 },
            EngineEvent::Progress { dish_index: 2, total: 3 },
            EngineEvent::Fault(fault),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_dish_fault_keeps_completed_count() {
    let library = WorkflowLibrary::default();
    let workflow = library.dish_cycle(DishType::Normal, StreakPattern::Simple).unwrap();

    let arm = with_slow_command(DeviceId::Arm, &workflow, "LID OPEN", Duration::from_secs(3));
    let platform = MockChannel::simulating(DeviceId::Platform, [&workflow], None);
    let channels = ChannelSet::new().with(arm.clone()).with(platform.clone());
    let (mut engine, _events) = recording_engine(library, channels);
    let mut state = engine.subscribe();

    engine
        .configure_batch(DishType::Normal, StreakPattern::Simple, 2)
        .unwrap();
    engine.start_batch().await.unwrap();

    // Dish 1 waiting on "LID REMOVED" (step index 5)
    wait_until(&mut state, |c| c.dish_index == 0 && c.step_cursor == 5).await;
    wait_for_send(&arm, "LID OPEN", 1).await;
    engine.cancel();
    let report = engine.wait_for_batch().await.unwrap();

    let fault = report.fault.unwrap();
    assert_eq!(fault.kind, FaultKind::Cancelled);
    assert_eq!(fault.step_index, 6);
    assert_eq!(report.completed, 0);
    assert_eq!(arm.call_log().last().map(String::as_str), Some("LID OPEN"));
    assert!(platform.call_log().is_empty());
}
