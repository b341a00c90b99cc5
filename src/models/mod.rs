//! Domain model module declarations.

pub mod snapshot;
pub mod task;

pub use snapshot::{CollectionSnapshot, FetchStatus};
pub use task::{BinColor, Offset, ParameterKey, TaskKey, TaskType};
