//! Task identity model: bin colors, task types and parameter keys.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::AppError;

/// One of the two independently scheduled waste streams.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BinColor {
    /// General waste bin.
    Red,
    /// Recycling bin.
    Yellow,
}

impl BinColor {
    /// Both colors in display order.
    pub const ALL: [Self; 2] = [Self::Red, Self::Yellow];

    /// Stable lowercase name used in keys and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Yellow => "yellow",
        }
    }
}

/// Whether the bin has to go out before collection or come back after it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Bin must be at the kerb before collection.
    PutOut,
    /// Bin must be retrieved after collection.
    BringIn,
}

impl TaskType {
    /// Stable snake-case name used in keys and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PutOut => "put_out",
            Self::BringIn => "bring_in",
        }
    }

    /// Default `(pre_hours, post_hours)` for this task type.
    #[must_use]
    pub fn default_hours(self) -> (f64, f64) {
        match self {
            Self::PutOut => (6.0, 8.0),
            Self::BringIn => (4.0, 5.0),
        }
    }
}

/// A (color, task type) pair identifying one of the four reminder tasks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TaskKey {
    /// Bin color.
    pub color: BinColor,
    /// Task type.
    pub task_type: TaskType,
}

impl TaskKey {
    /// All four task keys in a fixed order.
    pub const ALL: [Self; 4] = [
        Self::new(BinColor::Red, TaskType::PutOut),
        Self::new(BinColor::Red, TaskType::BringIn),
        Self::new(BinColor::Yellow, TaskType::PutOut),
        Self::new(BinColor::Yellow, TaskType::BringIn),
    ];

    /// Construct a task key.
    #[must_use]
    pub const fn new(color: BinColor, task_type: TaskType) -> Self {
        Self { color, task_type }
    }

    /// Position of this key inside [`TaskKey::ALL`].
    #[must_use]
    pub fn index(self) -> usize {
        match (self.color, self.task_type) {
            (BinColor::Red, TaskType::PutOut) => 0,
            (BinColor::Red, TaskType::BringIn) => 1,
            (BinColor::Yellow, TaskType::PutOut) => 2,
            (BinColor::Yellow, TaskType::BringIn) => 3,
        }
    }

    /// Parameter key for the lead offset of this task.
    #[must_use]
    pub fn pre(self) -> ParameterKey {
        ParameterKey::new(self, Offset::Pre)
    }

    /// Parameter key for the lag offset of this task.
    #[must_use]
    pub fn post(self) -> ParameterKey {
        ParameterKey::new(self, Offset::Post)
    }
}

impl Display for TaskKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.color.as_str(), self.task_type.as_str())
    }
}

impl FromStr for TaskKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.to_string() == s)
            .ok_or_else(|| AppError::NotFound(format!("unknown task: {s}")))
    }
}

/// Which side of the anchor an offset applies to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Offset {
    /// Hours before the anchor.
    Pre,
    /// Hours after the anchor.
    Post,
}

impl Offset {
    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pre => "pre",
            Self::Post => "post",
        }
    }
}

/// Identifies one of the eight numeric window offsets.
///
/// The string form (`red_put_out_pre_hours`) is used as the persistence key
/// and on the IPC and HTTP surfaces.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ParameterKey {
    /// Task the offset belongs to.
    pub task: TaskKey,
    /// Lead or lag side.
    pub offset: Offset,
}

impl ParameterKey {
    /// All eight parameter keys, task-major.
    pub const ALL: [Self; 8] = [
        Self::new(TaskKey::ALL[0], Offset::Pre),
        Self::new(TaskKey::ALL[0], Offset::Post),
        Self::new(TaskKey::ALL[1], Offset::Pre),
        Self::new(TaskKey::ALL[1], Offset::Post),
        Self::new(TaskKey::ALL[2], Offset::Pre),
        Self::new(TaskKey::ALL[2], Offset::Post),
        Self::new(TaskKey::ALL[3], Offset::Pre),
        Self::new(TaskKey::ALL[3], Offset::Post),
    ];

    /// Construct a parameter key.
    #[must_use]
    pub const fn new(task: TaskKey, offset: Offset) -> Self {
        Self { task, offset }
    }

    /// Position of this key inside [`ParameterKey::ALL`].
    #[must_use]
    pub fn index(self) -> usize {
        let side = match self.offset {
            Offset::Pre => 0,
            Offset::Post => 1,
        };
        self.task.index() * 2 + side
    }

    /// Fixed default for this offset, determined by the task type only.
    #[must_use]
    pub fn default_value(self) -> f64 {
        let (pre, post) = self.task.task_type.default_hours();
        match self.offset {
            Offset::Pre => pre,
            Offset::Post => post,
        }
    }
}

impl Display for ParameterKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}_hours", self.task, self.offset.as_str())
    }
}

impl FromStr for ParameterKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.to_string() == s)
            .ok_or_else(|| AppError::NotFound(format!("unknown parameter: {s}")))
    }
}
