//! Collection date polling: the HTTP fetch seam and the resilient coordinator.

pub mod client;
pub mod coordinator;

pub use client::{check, CheckOutcome, CollectionDates, CollectionSource, FetchError, HttpCollectionClient};
pub use coordinator::{spawn_poller, PollCoordinator};
