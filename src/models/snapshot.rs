//! Collection snapshot model: the last known dates plus the latest fetch outcome.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::task::BinColor;

/// Outcome classification of the most recent fetch attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FetchStatus {
    /// Payload fetched and parsed.
    #[serde(rename = "success")]
    Success,
    /// Transport failure, timeout or HTTP error status.
    #[serde(rename = "network_error")]
    NetworkError,
    /// Payload received but malformed.
    #[serde(rename = "json_parsing")]
    ParseError,
    /// Anything not classified above.
    #[serde(rename = "unexpected_error")]
    UnexpectedError,
}

impl FetchStatus {
    /// Status text exposed to the host.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NetworkError => "network_error",
            Self::ParseError => "json_parsing",
            Self::UnexpectedError => "unexpected_error",
        }
    }
}

/// Immutable snapshot of collection data, replaced wholesale on every poll.
///
/// Failed polls produce a new snapshot via [`CollectionSnapshot::failed`],
/// which carries the dates and `last_success_utc` over untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionSnapshot {
    /// Next red bin collection day.
    pub red_date: Option<NaiveDate>,
    /// Next yellow bin collection day.
    pub yellow_date: Option<NaiveDate>,
    /// Time of the last successful fetch.
    pub last_success_utc: Option<DateTime<Utc>>,
    /// Outcome of the most recent fetch attempt.
    pub status: FetchStatus,
    /// Whether the most recent fetch attempt succeeded.
    pub ok: bool,
}

impl Default for CollectionSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl CollectionSnapshot {
    /// Snapshot held before the first poll completes.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            red_date: None,
            yellow_date: None,
            last_success_utc: None,
            status: FetchStatus::UnexpectedError,
            ok: false,
        }
    }

    /// Snapshot for a successful fetch.
    #[must_use]
    pub fn success(
        red_date: Option<NaiveDate>,
        yellow_date: Option<NaiveDate>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            red_date,
            yellow_date,
            last_success_utc: Some(fetched_at),
            status: FetchStatus::Success,
            ok: true,
        }
    }

    /// Successor snapshot for a failed fetch; keeps every known-good value.
    #[must_use]
    pub fn failed(&self, status: FetchStatus) -> Self {
        debug_assert!(status != FetchStatus::Success);
        Self {
            status,
            ok: false,
            ..self.clone()
        }
    }

    /// Collection date for one bin color.
    #[must_use]
    pub fn date_for(&self, color: BinColor) -> Option<NaiveDate> {
        match color {
            BinColor::Red => self.red_date,
            BinColor::Yellow => self.yellow_date,
        }
    }
}
