//! Single-task reactor driving the four task state machines.
//!
//! The engine owns the parameter store, the task states and the current
//! snapshot, and processes events strictly in arrival order:
//!
//! - a fixed tick (one minute by default),
//! - a new snapshot published by the poll coordinator,
//! - commands from the IPC layer (parameter and completion changes).
//!
//! Every event funnels into [`Engine::recompute_all`], which reads one
//! snapshot and one set of parameters for all four tasks. After each event
//! the outward [`EngineView`] is replaced wholesale on a `watch` channel.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::models::{CollectionSnapshot, FetchStatus, ParameterKey, TaskKey};
use crate::poll::PollCoordinator;
use crate::{AppError, Result};

use super::clock::Clock;
use super::parameters::ParameterStore;
use super::task_state::{TaskPhase, TaskState, TaskStatus};
use super::{Observer, Restorable, Stateful};

/// Default recompute cadence.
pub const DEFAULT_TICK: Duration = Duration::from_secs(60);

const COMMAND_QUEUE_DEPTH: usize = 64;

/// Mutation requested through an [`EngineHandle`].
#[derive(Debug)]
pub enum EngineCommand {
    /// Change one window offset.
    SetParameter {
        /// Offset to change.
        key: ParameterKey,
        /// New value in hours.
        value: f64,
        /// Receives the stored value, or the persistence error.
        reply: oneshot::Sender<Result<f64>>,
    },
    /// Set or clear a task's completion flag.
    SetCompletion {
        /// Task to change.
        task: TaskKey,
        /// Desired flag.
        completed: bool,
        /// Receives the task view after the recompute.
        reply: oneshot::Sender<TaskView>,
    },
}

/// Anything the reactor reacts to.
#[derive(Debug)]
pub enum EngineEvent {
    /// Periodic recompute.
    Tick,
    /// A poll attempt finished.
    Snapshot(CollectionSnapshot),
    /// Host command.
    Command(EngineCommand),
}

/// Outward state of one task.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TaskView {
    /// Task name, e.g. `red_put_out`.
    pub task: String,
    /// State machine phase.
    pub phase: TaskPhase,
    /// Reminder signal.
    pub due: bool,
    /// Completion flag.
    pub completed: bool,
    /// Whether turning completion on should be offered.
    pub completion_available: bool,
    /// Window start in the engine's zone, when the date is known.
    pub window_start: Option<DateTime<FixedOffset>>,
    /// Window end in the engine's zone, when the date is known.
    pub window_end: Option<DateTime<FixedOffset>>,
}

/// Everything the host needs, replaced wholesale after every event.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EngineView {
    /// Next red bin collection day.
    pub red_date: Option<NaiveDate>,
    /// Next yellow bin collection day.
    pub yellow_date: Option<NaiveDate>,
    /// Last successful fetch.
    pub last_success_utc: Option<DateTime<Utc>>,
    /// Outcome of the latest fetch attempt.
    pub status: FetchStatus,
    /// Whether the latest fetch attempt succeeded.
    pub ok: bool,
    /// The four tasks in fixed order.
    pub tasks: Vec<TaskView>,
    /// The eight offsets by name.
    pub parameters: BTreeMap<String, f64>,
    /// When this view was computed.
    pub computed_at: DateTime<Utc>,
}

impl EngineView {
    /// View of one task by key.
    #[must_use]
    pub fn task(&self, key: TaskKey) -> Option<&TaskView> {
        self.tasks.get(key.index())
    }
}

/// Per-address scheduling context.
pub struct Engine<Tz: TimeZone> {
    tz: Tz,
    clock: Arc<dyn Clock>,
    parameters: ParameterStore,
    tasks: [TaskState; 4],
    snapshot: CollectionSnapshot,
}

impl<Tz> Engine<Tz>
where
    Tz: TimeZone + Send + Sync + 'static,
    Tz::Offset: Send + Sync,
{
    /// Build an engine in zone `tz` around an already loaded parameter store.
    #[must_use]
    pub fn new(tz: Tz, clock: Arc<dyn Clock>, parameters: ParameterStore) -> Self {
        Self {
            tz,
            clock,
            parameters,
            tasks: TaskKey::ALL.map(TaskState::new),
            snapshot: CollectionSnapshot::empty(),
        }
    }

    /// Register an observer on all four tasks.
    pub fn subscribe_all(&mut self, observer: &Arc<dyn Observer>) {
        for task in &mut self.tasks {
            task.subscribe(Arc::clone(observer));
        }
    }

    /// Restore persisted completion flags before the first recompute.
    pub fn restore_overrides(&mut self, saved: &[(TaskKey, bool)]) {
        for &(key, completed) in saved {
            self.tasks[key.index()].restore(completed);
        }
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> &CollectionSnapshot {
        &self.snapshot
    }

    /// State of one task.
    #[must_use]
    pub fn task(&self, key: TaskKey) -> &TaskState {
        &self.tasks[key.index()]
    }

    /// Parameter store.
    #[must_use]
    pub fn parameters(&self) -> &ParameterStore {
        &self.parameters
    }

    fn now(&self) -> DateTime<Tz> {
        self.clock.now_utc().with_timezone(&self.tz)
    }

    /// Recompute all four tasks against one snapshot and one parameter set.
    ///
    /// Returns how many tasks changed visibly.
    pub fn recompute_all(&mut self) -> usize {
        let now = self.now();
        let snapshot = &self.snapshot;
        let parameters = &self.parameters;
        self.tasks
            .iter_mut()
            .filter_map(|task| task.recompute(&now, snapshot, parameters))
            .count()
    }

    /// Process one event.
    pub async fn handle(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Tick => {
                let changed = self.recompute_all();
                debug!(changed, "tick recompute");
            }
            EngineEvent::Snapshot(snapshot) => {
                debug!(status = snapshot.status.as_str(), "snapshot replaced");
                self.snapshot = snapshot;
                self.recompute_all();
            }
            EngineEvent::Command(EngineCommand::SetParameter { key, value, reply }) => {
                let result = self.parameters.set(key, value).await.map(|()| value);
                match result {
                    Ok(_) => info!(parameter = %key, value, "parameter updated"),
                    Err(ref err) => {
                        warn!(parameter = %key, %err, "parameter stored in memory but not persisted");
                    }
                }
                self.recompute_all();
                let _ = reply.send(result);
            }
            EngineEvent::Command(EngineCommand::SetCompletion {
                task,
                completed,
                reply,
            }) => {
                let now = self.now();
                self.tasks[task.index()].set_completion(
                    completed,
                    &now,
                    &self.snapshot,
                    &self.parameters,
                );
                info!(task = %task, completed, "completion command applied");
                self.recompute_all();
                let _ = reply.send(self.task_view(task));
            }
        }
    }

    fn task_view(&self, key: TaskKey) -> TaskView {
        let state = &self.tasks[key.index()];
        let status: TaskStatus = state.current();
        let window = state.window(&self.tz, &self.snapshot, &self.parameters);
        TaskView {
            task: key.to_string(),
            phase: status.phase,
            due: status.due_active(),
            completed: status.completion_override,
            completion_available: status.completion_available(),
            window_start: window.as_ref().map(|w| w.start.fixed_offset()),
            window_end: window.as_ref().map(|w| w.end.fixed_offset()),
        }
    }

    /// Outward view of the current state.
    #[must_use]
    pub fn view(&self) -> EngineView {
        EngineView {
            red_date: self.snapshot.red_date,
            yellow_date: self.snapshot.yellow_date,
            last_success_utc: self.snapshot.last_success_utc,
            status: self.snapshot.status,
            ok: self.snapshot.ok,
            tasks: TaskKey::ALL.iter().map(|&key| self.task_view(key)).collect(),
            parameters: self.parameters.current(),
            computed_at: self.clock.now_utc(),
        }
    }

    /// Run the reactor until `cancel` fires.
    ///
    /// Snapshots are read from `coordinator`'s watch channel; the poll
    /// schedule itself runs elsewhere so a slow fetch never delays a tick.
    #[must_use]
    pub fn spawn(
        mut self,
        coordinator: Arc<PollCoordinator>,
        tick: Duration,
        cancel: CancellationToken,
    ) -> (EngineHandle, JoinHandle<()>) {
        let (command_tx, mut command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let mut snapshots = coordinator.subscribe();
        self.snapshot = snapshots.borrow_and_update().clone();
        self.recompute_all();
        let (view_tx, view_rx) = watch::channel(self.view());

        let span = info_span!("engine", address = %coordinator.address());
        let join = tokio::spawn(
            async move {
                let mut ticker = tokio::time::interval(tick);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    let event = tokio::select! {
                        () = cancel.cancelled() => {
                            info!("engine shutting down");
                            break;
                        }
                        _ = ticker.tick() => EngineEvent::Tick,
                        changed = snapshots.changed() => {
                            if changed.is_err() {
                                info!("snapshot channel closed");
                                break;
                            }
                            EngineEvent::Snapshot(snapshots.borrow_and_update().clone())
                        }
                        command = command_rx.recv() => match command {
                            Some(command) => EngineEvent::Command(command),
                            None => {
                                info!("command channel closed");
                                break;
                            }
                        },
                    };
                    self.handle(event).await;
                    view_tx.send_replace(self.view());
                }
            }
            .instrument(span),
        );

        let handle = EngineHandle {
            commands: command_tx,
            view: view_rx,
            coordinator,
        };
        (handle, join)
    }
}

/// Cloneable handle used by the command surfaces.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    view: watch::Receiver<EngineView>,
    coordinator: Arc<PollCoordinator>,
}

impl EngineHandle {
    /// Latest published view.
    #[must_use]
    pub fn view(&self) -> EngineView {
        self.view.borrow().clone()
    }

    /// Receiver notified whenever the view is replaced.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<EngineView> {
        self.view.clone()
    }

    /// Fetch immediately, outside the regular cadence.
    ///
    /// Coalesces with a fetch already in flight.
    pub async fn refresh(&self) -> CollectionSnapshot {
        info!("manual refresh requested");
        self.coordinator.poll().await
    }

    /// Change one window offset. No range policy is applied here.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the value could not be persisted, or
    /// `AppError::Io` if the engine has stopped.
    pub async fn set_parameter(&self, key: ParameterKey, value: f64) -> Result<f64> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::SetParameter { key, value, reply })
            .await?;
        rx.await.map_err(|_| stopped())?
    }

    /// Set or clear a task's completion flag.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the engine has stopped.
    pub async fn set_completion(&self, task: TaskKey, completed: bool) -> Result<TaskView> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::SetCompletion {
            task,
            completed,
            reply,
        })
        .await?;
        rx.await.map_err(|_| stopped())
    }

    async fn send(&self, command: EngineCommand) -> Result<()> {
        self.commands.send(command).await.map_err(|_| stopped())
    }
}

fn stopped() -> AppError {
    AppError::Io("engine is not running".into())
}
