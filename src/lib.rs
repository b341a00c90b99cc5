#![forbid(unsafe_code)]

//! Kerbside bin collection reminders.
//!
//! Polls the council collection-dates service for one address and derives
//! four reminder windows (put out and bring in, for the red and yellow
//! bins) that the host can query and acknowledge.

pub mod config;
pub mod errors;
pub mod http;
pub mod ipc;
pub mod models;
pub mod persistence;
pub mod poll;
pub mod schedule;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
