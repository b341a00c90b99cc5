//! Lead/lag offsets for the four reminder tasks.
//!
//! The store accepts any value; the 0–48 h range with 0.5 h steps is a
//! command-layer policy enforced by [`validate_hours`].

use std::collections::BTreeMap;

use tracing::warn;

use crate::models::{ParameterKey, TaskKey};
use crate::persistence::parameter_repo::ParameterRepo;
use crate::{AppError, Result};

use super::{Restorable, Stateful};

/// Upper bound accepted by the command layer, in hours.
pub const MAX_HOURS: f64 = 48.0;
/// Step granularity accepted by the command layer, in hours.
pub const HOURS_STEP: f64 = 0.5;

/// Resolved offsets for one task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskParameters {
    /// Hours before the anchor the window opens.
    pub pre_hours: f64,
    /// Hours after the anchor the window closes.
    pub post_hours: f64,
}

/// Holds the eight window offsets and persists every mutation.
pub struct ParameterStore {
    values: [Option<f64>; 8],
    repo: Option<ParameterRepo>,
}

impl ParameterStore {
    /// Store without persistence; every key starts at its default.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            values: [None; 8],
            repo: None,
        }
    }

    /// Store that writes every mutation through `repo`.
    #[must_use]
    pub fn persistent(repo: ParameterRepo) -> Self {
        Self {
            values: [None; 8],
            repo: Some(repo),
        }
    }

    /// Load persisted values from the backing repository, if any.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the rows cannot be read.
    pub async fn load(&mut self) -> Result<()> {
        let Some(repo) = self.repo.as_ref() else {
            return Ok(());
        };
        let rows = repo.load_all().await?;
        self.restore(rows);
        Ok(())
    }

    /// Current value for `key`, or its default when unset or unusable.
    #[must_use]
    pub fn get(&self, key: ParameterKey) -> f64 {
        self.values[key.index()]
            .filter(|value| value.is_finite())
            .unwrap_or_else(|| key.default_value())
    }

    /// Store `value` for `key` and persist it.
    ///
    /// The in-memory value is updated even when persistence fails.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the value cannot be written.
    pub async fn set(&mut self, key: ParameterKey, value: f64) -> Result<()> {
        self.values[key.index()] = Some(value);
        if let Some(repo) = self.repo.as_ref() {
            repo.save(key, value).await?;
        }
        Ok(())
    }

    /// Both offsets for one task, read together.
    #[must_use]
    pub fn for_task(&self, task: TaskKey) -> TaskParameters {
        TaskParameters {
            pre_hours: self.get(task.pre()),
            post_hours: self.get(task.post()),
        }
    }
}

impl Stateful for ParameterStore {
    type State = BTreeMap<String, f64>;

    fn current(&self) -> Self::State {
        ParameterKey::ALL
            .into_iter()
            .map(|key| (key.to_string(), self.get(key)))
            .collect()
    }
}

impl Restorable for ParameterStore {
    /// `(name, raw value)` rows as persisted.
    type Saved = Vec<(String, String)>;

    fn restore(&mut self, saved: Self::Saved) {
        for (name, raw) in saved {
            let Ok(key) = name.parse::<ParameterKey>() else {
                warn!(name = %name, "ignoring unknown persisted parameter");
                continue;
            };
            match raw.trim().parse::<f64>() {
                Ok(value) if value.is_finite() => self.values[key.index()] = Some(value),
                _ => {
                    warn!(name = %name, raw = %raw, "persisted parameter is not a number, using default");
                    self.values[key.index()] = None;
                }
            }
        }
    }
}

/// Enforce the command-layer range policy: `0 ≤ hours ≤ 48` in 0.5 h steps.
///
/// # Errors
///
/// Returns `AppError::InvalidInput` when the value is outside the policy.
pub fn validate_hours(value: f64) -> Result<f64> {
    if !value.is_finite() || !(0.0..=MAX_HOURS).contains(&value) {
        return Err(AppError::InvalidInput(format!(
            "hours must be between 0 and {MAX_HOURS}, got {value}"
        )));
    }
    let steps = value / HOURS_STEP;
    if (steps - steps.round()).abs() > f64::EPSILON {
        return Err(AppError::InvalidInput(format!(
            "hours must be a multiple of {HOURS_STEP}, got {value}"
        )));
    }
    Ok(value)
}
