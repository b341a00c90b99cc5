//! Collection-window scheduling engine.
//!
//! Components, leaves first: [`window`] (pure window arithmetic),
//! [`parameters`] (the eight lead/lag offsets), [`task_state`] (per-task
//! due/completed state machine) and [`engine`] (single-task reactor that
//! funnels ticks, snapshots and commands into one recompute routine).
//!
//! Components share behavior through small capability traits instead of a
//! common base type.

pub mod clock;
pub mod engine;
pub mod observers;
pub mod parameters;
pub mod task_state;
pub mod window;

pub use clock::{Clock, SystemClock};
pub use engine::{Engine, EngineCommand, EngineEvent, EngineHandle, EngineView, TaskView};
pub use parameters::{ParameterStore, TaskParameters};
pub use task_state::{TaskChange, TaskPhase, TaskState, TaskStatus};
pub use window::WindowInterval;

/// A component whose externally visible state can be read as a value.
pub trait Stateful {
    /// Value describing the current state.
    type State;

    /// Current externally visible state.
    fn current(&self) -> Self::State;
}

/// A component that can be rehydrated from persisted values at startup.
///
/// Restoring never emits change notifications.
pub trait Restorable {
    /// Persisted form consumed by [`Restorable::restore`].
    type Saved;

    /// Replace in-memory state with previously persisted values.
    fn restore(&mut self, saved: Self::Saved);
}

/// Receives task state transitions.
///
/// Observers run inline on the engine task and must not block.
pub trait Observer: Send + Sync {
    /// Called once per recompute that changed the task's visible state.
    fn on_change(&self, change: &TaskChange);
}
