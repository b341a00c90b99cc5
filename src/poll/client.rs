//! HTTP client for the collection-dates service.
//!
//! The service answers `GET <api_url>?address_string=<address>` with a JSON
//! array whose first element carries `RedBin` and `YellowBin` date-times:
//!
//! ```json
//! [{"RedBin": "2025-10-08T00:00:00", "YellowBin": null}]
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::models::FetchStatus;
use crate::{AppError, Result};

/// Default collection service endpoint.
pub const DEFAULT_API_URL: &str = "https://api.hcc.govt.nz/FightTheLandFill/get_Collection_Dates";

const RED_FIELD: &str = "RedBin";
const YELLOW_FIELD: &str = "YellowBin";

/// Why a fetch did not produce collection dates.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, timeout, DNS or HTTP status failure.
    #[error("network: {0}")]
    Network(String),
    /// Payload received but not in the expected shape.
    #[error("parse: {0}")]
    Parse(String),
    /// Anything else.
    #[error("unexpected: {0}")]
    Unexpected(String),
}

impl FetchError {
    /// Snapshot status this failure maps to.
    #[must_use]
    pub fn status(&self) -> FetchStatus {
        match self {
            Self::Network(_) => FetchStatus::NetworkError,
            Self::Parse(_) => FetchStatus::ParseError,
            Self::Unexpected(_) => FetchStatus::UnexpectedError,
        }
    }
}

/// Dates extracted from one successful fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollectionDates {
    /// Next red bin collection day.
    pub red: Option<NaiveDate>,
    /// Next yellow bin collection day.
    pub yellow: Option<NaiveDate>,
}

/// Boxed future returned by [`CollectionSource::fetch`].
pub type FetchFuture<'a> =
    Pin<Box<dyn Future<Output = std::result::Result<CollectionDates, FetchError>> + Send + 'a>>;

/// Anything able to fetch collection dates for an address.
pub trait CollectionSource: Send + Sync {
    /// Fetch the next collection dates for `address`.
    fn fetch<'a>(&'a self, address: &'a str) -> FetchFuture<'a>;
}

/// `reqwest`-backed collection service client.
#[derive(Debug, Clone)]
pub struct HttpCollectionClient {
    http: reqwest::Client,
    api_url: String,
}

impl HttpCollectionClient {
    /// Build a client targeting `api_url`; every request is bounded by
    /// `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the URL is invalid or the HTTP client
    /// cannot be constructed.
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let api_url = api_url.into();
        Url::parse(&api_url)
            .map_err(|err| AppError::Config(format!("invalid api_url '{api_url}': {err}")))?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("kerbside/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self { http, api_url })
    }

    async fn fetch_dates(&self, address: &str) -> std::result::Result<CollectionDates, FetchError> {
        let url = Url::parse_with_params(&self.api_url, &[("address_string", address)])
            .map_err(|err| FetchError::Unexpected(format!("cannot build request url: {err}")))?;

        let response = self.http.get(url).send().await.map_err(classify)?;
        let response = response.error_for_status().map_err(classify)?;
        let value: Value = response.json().await.map_err(classify)?;
        dates_from_value(&value)
    }
}

impl CollectionSource for HttpCollectionClient {
    fn fetch<'a>(&'a self, address: &'a str) -> FetchFuture<'a> {
        Box::pin(self.fetch_dates(address))
    }
}

/// Outcome of a one-off validation fetch (`kerbside --check`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    /// The service answered with a usable payload.
    Success,
    /// The service could not be reached.
    CannotConnect,
    /// The service answered with something unparseable.
    InvalidResponse,
    /// Any other failure.
    Unknown,
}

impl CheckOutcome {
    /// Stable name used in CLI output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::CannotConnect => "cannot_connect",
            Self::InvalidResponse => "invalid_response",
            Self::Unknown => "unknown",
        }
    }
}

impl From<&FetchError> for CheckOutcome {
    fn from(err: &FetchError) -> Self {
        match err {
            FetchError::Network(_) => Self::CannotConnect,
            FetchError::Parse(_) => Self::InvalidResponse,
            FetchError::Unexpected(_) => Self::Unknown,
        }
    }
}

/// Fetch once for `address` and classify the result.
pub async fn check(
    source: &dyn CollectionSource,
    address: &str,
) -> (CheckOutcome, Option<CollectionDates>) {
    match source.fetch(address).await {
        Ok(dates) => (CheckOutcome::Success, Some(dates)),
        Err(err) => {
            warn!(%err, "validation fetch failed");
            (CheckOutcome::from(&err), None)
        }
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Network(format!("request timed out: {err}"))
    } else if err.is_builder() {
        FetchError::Unexpected(err.to_string())
    } else if err.is_decode() {
        FetchError::Parse(err.to_string())
    } else {
        FetchError::Network(err.to_string())
    }
}

/// Parse a service response body into collection dates.
///
/// # Errors
///
/// Returns `FetchError::Parse` when the body is not JSON, is not a non-empty
/// array whose first element is an object, or carries an unparseable date.
pub fn parse_payload(body: &[u8]) -> std::result::Result<CollectionDates, FetchError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|err| FetchError::Parse(format!("body is not json: {err}")))?;
    dates_from_value(&value)
}

fn dates_from_value(value: &Value) -> std::result::Result<CollectionDates, FetchError> {
    let item = value
        .as_array()
        .and_then(|items| items.first())
        .and_then(Value::as_object)
        .ok_or_else(|| FetchError::Parse("unexpected json shape".into()))?;

    Ok(CollectionDates {
        red: parse_date_field(item.get(RED_FIELD))?,
        yellow: parse_date_field(item.get(YELLOW_FIELD))?,
    })
}

fn parse_date_field(raw: Option<&Value>) -> std::result::Result<Option<NaiveDate>, FetchError> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => parse_date(s)
            .map(Some)
            .ok_or_else(|| FetchError::Parse(format!("invalid timestamp: {s}"))),
        Some(other) => Err(FetchError::Parse(format!("invalid timestamp: {other}"))),
    }
}

/// Keep only the calendar date of an ISO-8601 value; any time or offset is
/// discarded.
#[must_use]
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}
