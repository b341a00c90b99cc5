//! Built-in task observers: transition logging and override persistence.
//!
//! Observers run inline on the engine task, so persistence is handed to a
//! background writer over an unbounded channel (arrival order is kept).

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::models::TaskKey;
use crate::persistence::override_repo::OverrideRepo;

use super::task_state::TaskChange;
use super::Observer;

/// Logs every visible transition at `info`.
#[derive(Debug, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn on_change(&self, change: &TaskChange) {
        info!(
            task = %change.task,
            from = ?change.previous.phase,
            to = ?change.current.phase,
            due = change.current.due_active(),
            completed = change.current.completion_override,
            auto_reset = change.auto_reset,
            "task transition"
        );
    }
}

/// Forwards completion-flag changes to the override writer task.
#[derive(Debug, Clone)]
pub struct OverridePersister {
    tx: mpsc::UnboundedSender<(TaskKey, bool)>,
}

impl OverridePersister {
    /// Create a persister and the receiving end for [`spawn_override_writer`].
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<(TaskKey, bool)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Observer for OverridePersister {
    fn on_change(&self, change: &TaskChange) {
        if !change.override_changed() {
            return;
        }
        if self
            .tx
            .send((change.task, change.current.completion_override))
            .is_err()
        {
            error!(task = %change.task, "override writer is gone; flag not persisted");
        }
    }
}

/// Spawn the background task persisting completion flags.
///
/// The task runs until every [`OverridePersister`] is dropped, which happens
/// when the engine owning them stops. Changes queued before that point are
/// all written.
#[must_use]
pub fn spawn_override_writer(
    mut rx: mpsc::UnboundedReceiver<(TaskKey, bool)>,
    repo: Arc<OverrideRepo>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some((task, completed)) = rx.recv().await {
            persist(&repo, task, completed).await;
        }
        info!("override channel closed, writer stopped");
    })
}

async fn persist(repo: &OverrideRepo, task: TaskKey, completed: bool) {
    if let Err(err) = repo.save(task, completed).await {
        error!(task = %task, completed, %err, "failed to persist completion flag");
    }
}
