//! Per-task due/completed state machine.
//!
//! States:
//! - `Inactive`: outside the window, or the collection date is unknown.
//! - `Due`: window active, not marked complete.
//! - `Completed`: window active and the completion override is set.
//!
//! The override is cleared the moment a recompute finds the window inactive
//! (for a known date). Re-entering a window later never revives it.

use std::sync::Arc;

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{CollectionSnapshot, TaskKey};

use super::parameters::ParameterStore;
use super::window::{self, WindowInterval};
use super::{Observer, Restorable, Stateful};

/// Phase of a task's state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    /// Not due.
    Inactive,
    /// Due and not yet done.
    Due,
    /// Due window open, marked done.
    Completed,
}

/// Externally visible state of one task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskStatus {
    /// State machine phase.
    pub phase: TaskPhase,
    /// Whether the computed window currently contains `now`.
    pub window_active: bool,
    /// User-set completion flag.
    pub completion_override: bool,
}

impl TaskStatus {
    const INITIAL: Self = Self {
        phase: TaskPhase::Inactive,
        window_active: false,
        completion_override: false,
    };

    /// Reminder signal: window active, date known, not marked complete.
    #[must_use]
    pub fn due_active(&self) -> bool {
        self.phase == TaskPhase::Due
    }

    /// Whether the host should offer turning completion on.
    ///
    /// Turning it off is always possible while it is on.
    #[must_use]
    pub fn completion_available(&self) -> bool {
        self.window_active || self.completion_override
    }
}

/// A visible state transition, delivered to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskChange {
    /// Task that changed.
    pub task: TaskKey,
    /// State before the recompute.
    pub previous: TaskStatus,
    /// State after the recompute.
    pub current: TaskStatus,
    /// Whether the override was cleared because the window closed.
    pub auto_reset: bool,
}

impl TaskChange {
    /// Whether the completion flag differs between the two states.
    #[must_use]
    pub fn override_changed(&self) -> bool {
        self.previous.completion_override != self.current.completion_override
    }
}

/// State machine for one (color, task type) pair.
pub struct TaskState {
    key: TaskKey,
    status: TaskStatus,
    observers: Vec<Arc<dyn Observer>>,
}

impl TaskState {
    /// New task in the `Inactive` phase with no override.
    #[must_use]
    pub fn new(key: TaskKey) -> Self {
        Self {
            key,
            status: TaskStatus::INITIAL,
            observers: Vec::new(),
        }
    }

    /// Task this state machine tracks.
    #[must_use]
    pub fn key(&self) -> TaskKey {
        self.key
    }

    /// Register an observer for visible state transitions.
    pub fn subscribe(&mut self, observer: Arc<dyn Observer>) {
        self.observers.push(observer);
    }

    /// Reminder signal for this task.
    #[must_use]
    pub fn due_active(&self) -> bool {
        self.status.due_active()
    }

    /// Current completion flag.
    #[must_use]
    pub fn completion_override(&self) -> bool {
        self.status.completion_override
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> TaskPhase {
        self.status.phase
    }

    /// Window for this task under the given snapshot and offsets.
    pub fn window<Tz: TimeZone>(
        &self,
        tz: &Tz,
        snapshot: &CollectionSnapshot,
        parameters: &ParameterStore,
    ) -> Option<WindowInterval<Tz>> {
        let date = snapshot.date_for(self.key.color)?;
        let params = parameters.for_task(self.key);
        window::window_interval(
            tz,
            date,
            self.key.task_type,
            params.pre_hours,
            params.post_hours,
        )
    }

    /// Re-derive the phase at `now` and notify observers on a visible change.
    pub fn recompute<Tz: TimeZone>(
        &mut self,
        now: &DateTime<Tz>,
        snapshot: &CollectionSnapshot,
        parameters: &ParameterStore,
    ) -> Option<TaskChange> {
        self.apply(self.status.completion_override, now, snapshot, parameters)
    }

    /// Set the completion flag and recompute immediately.
    ///
    /// Setting `true` outside the window is accepted; the same recompute
    /// clears it again when the collection date is known.
    pub fn set_completion<Tz: TimeZone>(
        &mut self,
        completed: bool,
        now: &DateTime<Tz>,
        snapshot: &CollectionSnapshot,
        parameters: &ParameterStore,
    ) -> Option<TaskChange> {
        self.apply(completed, now, snapshot, parameters)
    }

    fn apply<Tz: TimeZone>(
        &mut self,
        mut completion_override: bool,
        now: &DateTime<Tz>,
        snapshot: &CollectionSnapshot,
        parameters: &ParameterStore,
    ) -> Option<TaskChange> {
        let previous = self.status;
        let mut auto_reset = false;

        let (phase, window_active) = match snapshot.date_for(self.key.color) {
            // Unknown date: the override is kept but has no effect.
            None => (TaskPhase::Inactive, false),
            Some(date) => {
                let params = parameters.for_task(self.key);
                let active = window::is_active(
                    date,
                    self.key.task_type,
                    params.pre_hours,
                    params.post_hours,
                    now,
                );
                if !active && completion_override {
                    completion_override = false;
                    auto_reset = true;
                }
                let phase = match (active, completion_override) {
                    (false, _) => TaskPhase::Inactive,
                    (true, false) => TaskPhase::Due,
                    (true, true) => TaskPhase::Completed,
                };
                (phase, active)
            }
        };

        self.status = TaskStatus {
            phase,
            window_active,
            completion_override,
        };

        if self.status == previous {
            return None;
        }

        let change = TaskChange {
            task: self.key,
            previous,
            current: self.status,
            auto_reset: auto_reset && previous.completion_override,
        };
        debug!(task = %self.key, ?previous, current = ?self.status, auto_reset = change.auto_reset, "task state changed");
        for observer in &self.observers {
            observer.on_change(&change);
        }
        Some(change)
    }
}

impl Stateful for TaskState {
    type State = TaskStatus;

    fn current(&self) -> Self::State {
        self.status
    }
}

impl Restorable for TaskState {
    /// Persisted completion flag.
    type Saved = bool;

    fn restore(&mut self, saved: Self::Saved) {
        self.status.completion_override = saved;
    }
}
