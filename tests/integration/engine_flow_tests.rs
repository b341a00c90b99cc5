//! Integration tests for the engine reactor.
//!
//! Drives the engine directly through `handle` with a manual clock, then
//! through a spawned instance via its `EngineHandle`.

use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Pacific::Auckland;
use tokio::sync::oneshot;

use kerbside::models::{BinColor, CollectionSnapshot, FetchStatus, Offset, ParameterKey, TaskKey, TaskType};
use kerbside::schedule::{
    Clock, Engine, EngineCommand, EngineEvent, ParameterStore, TaskPhase,
};

use kerbside::persistence::db;
use kerbside::persistence::parameter_repo::ParameterRepo;
use kerbside::AppError;

use super::test_helpers::{date, nz, red_only, FakeSource, ManualClock, Reply, RunningEngine};

const RED_PUT_OUT: TaskKey = TaskKey::new(BinColor::Red, TaskType::PutOut);
const RED_BRING_IN: TaskKey = TaskKey::new(BinColor::Red, TaskType::BringIn);

fn engine_at(clock: &Arc<ManualClock>) -> Engine<chrono_tz::Tz> {
    Engine::new(
        Auckland,
        Arc::clone(clock) as Arc<dyn Clock>,
        ParameterStore::in_memory(),
    )
}

fn red_snapshot() -> CollectionSnapshot {
    CollectionSnapshot::success(date(2025, 10, 8), None, Utc::now())
}

async fn complete(engine: &mut Engine<chrono_tz::Tz>, task: TaskKey, completed: bool) -> bool {
    let (reply, rx) = oneshot::channel();
    engine
        .handle(EngineEvent::Command(EngineCommand::SetCompletion {
            task,
            completed,
            reply,
        }))
        .await;
    rx.await.expect("reply").completed
}

// ── Direct event handling ────────────────────────────────────

#[tokio::test]
async fn failed_parameter_write_is_reported_but_applied() {
    let clock = Arc::new(ManualClock::new(nz(2025, 10, 7, 19, 0)));
    let database = Arc::new(db::connect_memory().await.expect("db"));
    let mut engine = Engine::new(
        Auckland,
        Arc::clone(&clock) as Arc<dyn Clock>,
        ParameterStore::persistent(ParameterRepo::new(Arc::clone(&database))),
    );
    engine.handle(EngineEvent::Snapshot(red_snapshot())).await;
    database.close().await;

    let key = ParameterKey::new(RED_PUT_OUT, Offset::Pre);
    let (reply, rx) = oneshot::channel();
    engine
        .handle(EngineEvent::Command(EngineCommand::SetParameter {
            key,
            value: 0.5,
            reply,
        }))
        .await;

    let result = rx.await.expect("reply");
    assert!(matches!(result, Err(AppError::Db(_))));
    assert!((engine.parameters().get(key) - 0.5).abs() < f64::EPSILON);
    assert!(!engine.view().task(RED_PUT_OUT).expect("task").due);
}

#[tokio::test]
async fn snapshot_event_recomputes_all_tasks() {
    let clock = Arc::new(ManualClock::new(nz(2025, 10, 7, 19, 0)));
    let mut engine = engine_at(&clock);

    engine.handle(EngineEvent::Snapshot(red_snapshot())).await;
    let view = engine.view();

    assert_eq!(view.red_date, date(2025, 10, 8));
    assert_eq!(view.status, FetchStatus::Success);
    assert!(view.task(RED_PUT_OUT).expect("task").due);
    assert!(!view.task(RED_BRING_IN).expect("task").due);
    assert!(view.tasks.iter().skip(2).all(|task| !task.due));
}

#[tokio::test]
async fn tick_picks_up_clock_movement() {
    let clock = Arc::new(ManualClock::new(nz(2025, 10, 7, 12, 0)));
    let mut engine = engine_at(&clock);
    engine.handle(EngineEvent::Snapshot(red_snapshot())).await;
    assert!(!engine.task(RED_PUT_OUT).due_active());

    clock.set(nz(2025, 10, 7, 18, 0));
    engine.handle(EngineEvent::Tick).await;
    assert!(engine.task(RED_PUT_OUT).due_active());
}

#[tokio::test]
async fn completion_is_cleared_by_tick_after_window() {
    let clock = Arc::new(ManualClock::new(nz(2025, 10, 7, 19, 0)));
    let mut engine = engine_at(&clock);
    engine.handle(EngineEvent::Snapshot(red_snapshot())).await;

    assert!(complete(&mut engine, RED_PUT_OUT, true).await);
    assert_eq!(engine.task(RED_PUT_OUT).phase(), TaskPhase::Completed);

    clock.set(nz(2025, 10, 8, 8, 30));
    engine.handle(EngineEvent::Tick).await;
    let view = engine.view();
    let task = view.task(RED_PUT_OUT).expect("task");
    assert!(!task.completed);
    assert!(!task.due);
    assert!(!task.completion_available);
}

#[tokio::test]
async fn failed_snapshot_keeps_tasks_due() {
    let clock = Arc::new(ManualClock::new(nz(2025, 10, 7, 19, 0)));
    let mut engine = engine_at(&clock);
    let good = red_snapshot();
    engine.handle(EngineEvent::Snapshot(good.clone())).await;

    engine
        .handle(EngineEvent::Snapshot(good.failed(FetchStatus::NetworkError)))
        .await;
    let view = engine.view();
    assert!(!view.ok);
    assert_eq!(view.status, FetchStatus::NetworkError);
    assert!(view.task(RED_PUT_OUT).expect("task").due);
}

#[tokio::test]
async fn parameter_change_moves_the_window() {
    let clock = Arc::new(ManualClock::new(nz(2025, 10, 7, 19, 0)));
    let mut engine = engine_at(&clock);
    engine.handle(EngineEvent::Snapshot(red_snapshot())).await;
    assert!(engine.task(RED_PUT_OUT).due_active());

    let (reply, rx) = oneshot::channel();
    engine
        .handle(EngineEvent::Command(EngineCommand::SetParameter {
            key: ParameterKey::new(RED_PUT_OUT, Offset::Pre),
            value: 0.5,
            reply,
        }))
        .await;
    assert!((rx.await.expect("reply").expect("stored") - 0.5).abs() < f64::EPSILON);

    assert!(!engine.task(RED_PUT_OUT).due_active());
    let view = engine.view();
    assert_eq!(view.parameters.get("red_put_out_pre_hours"), Some(&0.5));
    let window_start = view
        .task(RED_PUT_OUT)
        .and_then(|task| task.window_start)
        .expect("window start");
    assert_eq!(window_start.to_rfc3339(), "2025-10-07T23:30:00+13:00");
}

#[tokio::test]
async fn restored_overrides_apply_before_first_recompute() {
    let clock = Arc::new(ManualClock::new(nz(2025, 10, 7, 19, 0)));
    let mut engine = engine_at(&clock);
    engine.restore_overrides(&[(RED_PUT_OUT, true)]);

    engine.handle(EngineEvent::Snapshot(red_snapshot())).await;
    assert_eq!(engine.task(RED_PUT_OUT).phase(), TaskPhase::Completed);
}

#[tokio::test]
async fn view_exposes_window_bounds_in_local_zone() {
    let clock = Arc::new(ManualClock::new(nz(2025, 10, 7, 12, 0)));
    let mut engine = engine_at(&clock);
    engine.handle(EngineEvent::Snapshot(red_snapshot())).await;

    let view = engine.view();
    let bring_in = view.task(RED_BRING_IN).expect("task");
    assert_eq!(
        bring_in.window_start.expect("start").to_rfc3339(),
        "2025-10-08T20:00:00+13:00"
    );
    assert_eq!(
        bring_in.window_end.expect("end").to_rfc3339(),
        "2025-10-09T05:00:00+13:00"
    );

    let yellow = view
        .task(TaskKey::new(BinColor::Yellow, TaskType::PutOut))
        .expect("task");
    assert!(yellow.window_start.is_none());
}

// ── Spawned engine ───────────────────────────────────────────

#[tokio::test]
async fn refresh_flows_into_published_view() {
    let source = FakeSource::new([Reply::Dates(red_only(2025, 10, 8))]);
    let running = RunningEngine::start(source, nz(2025, 10, 7, 19, 0));

    let initial = running.handle.view();
    assert_eq!(initial.status, FetchStatus::UnexpectedError);
    assert!(!initial.ok);

    let snapshot = running.handle.refresh().await;
    assert!(snapshot.ok);

    let view = running
        .wait_for(|view| view.red_date.is_some())
        .await;
    assert!(view.task(RED_PUT_OUT).expect("task").due);
    assert_eq!(running.source.calls(), 1);

    running.stop().await;
}

#[tokio::test]
async fn handle_commands_round_trip() {
    let source = FakeSource::new([Reply::Dates(red_only(2025, 10, 8))]);
    let running = RunningEngine::start(source, nz(2025, 10, 7, 19, 0));
    running.handle.refresh().await;
    running.wait_for(|view| view.red_date.is_some()).await;

    let task = running
        .handle
        .set_completion(RED_PUT_OUT, true)
        .await
        .expect("complete");
    assert!(task.completed);
    assert_eq!(task.phase, TaskPhase::Completed);

    let stored = running
        .handle
        .set_parameter(ParameterKey::new(RED_BRING_IN, Offset::Post), 6.5)
        .await
        .expect("set parameter");
    assert!((stored - 6.5).abs() < f64::EPSILON);

    let view = running
        .wait_for(|view| view.parameters.get("red_bring_in_post_hours") == Some(&6.5))
        .await;
    assert!(view.task(RED_PUT_OUT).expect("task").completed);

    running.stop().await;
}

#[tokio::test]
async fn tick_after_clock_change_updates_view() {
    let source = FakeSource::new([Reply::Dates(red_only(2025, 10, 8))]);
    let running = RunningEngine::start(source, nz(2025, 10, 7, 12, 0));
    running.handle.refresh().await;
    running.wait_for(|view| view.red_date.is_some()).await;
    assert!(!running.handle.view().task(RED_PUT_OUT).expect("task").due);

    running.clock.set(nz(2025, 10, 7, 18, 30));
    // Any event recomputes against the clock; a failed refresh is enough.
    running.source.push(Reply::Network);
    running.handle.refresh().await;

    let view = running
        .wait_for(|view| view.status == FetchStatus::NetworkError)
        .await;
    assert!(view.task(RED_PUT_OUT).expect("task").due);
    assert_eq!(view.red_date, date(2025, 10, 8));

    running.stop().await;
}

#[tokio::test]
async fn commands_fail_once_engine_stopped() {
    let running = RunningEngine::start(FakeSource::default(), nz(2025, 10, 7, 19, 0));
    let handle = running.handle.clone();
    running.stop().await;

    let err = handle
        .set_completion(RED_PUT_OUT, true)
        .await
        .expect_err("engine stopped");
    assert_eq!(err.to_string(), "io: engine is not running");
}
