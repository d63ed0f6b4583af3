//! Error taxonomy for rate acquisition and conversion.

use chrono::NaiveDate;
use currate_common::{Currency, CurrencyError};
use thiserror::Error;

/// Why a transport-level call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Body,
    Other,
}

/// Errors from fetching the raw feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request could not be built (bad URL, client setup).
    #[error("failed to create request: {0}")]
    Request(String),

    /// 4xx response. Retrying would not change the outcome.
    #[error("invalid HTTP status code: {status}")]
    ClientStatus { status: u16 },

    /// Non-2xx, non-4xx response.
    #[error("HTTP request failed: server returned {status}")]
    ServerStatus { status: u16 },

    /// Connection, timeout or body read failure.
    #[error("HTTP request failed: {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },

    /// Redirect chain longer than the configured cap.
    #[error("too many redirects")]
    TooManyRedirects,

    /// Response body larger than the transport's byte cap.
    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// The caller cancelled the fetch.
    #[error("fetch cancelled")]
    Cancelled,

    /// Every attempt failed with a retryable error.
    #[error("max retries exceeded after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<FetchError>,
    },
}

impl FetchError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::ServerStatus { .. } | FetchError::Transport { .. }
        )
    }

    /// The error that ended the last attempt, looking through
    /// [`FetchError::RetriesExhausted`].
    pub fn last_cause(&self) -> &FetchError {
        match self {
            FetchError::RetriesExhausted { source, .. } => source.last_cause(),
            other => other,
        }
    }
}

/// Errors from decoding a feed document.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Input larger than the configured limit.
    #[error("feed exceeds maximum size of {limit} bytes")]
    TooLarge { limit: usize },

    /// The byte source failed mid-read.
    #[error("failed to read feed: {0}")]
    Read(#[from] std::io::Error),

    /// Not a well-formed feed document.
    #[error("invalid XML structure: {0}")]
    Malformed(String),

    /// No record survived filtering.
    #[error("no exchange rates found in feed")]
    NoRates,

    /// A record's value is not a positive decimal.
    #[error("invalid rate format: {0}")]
    InvalidRate(String),

    /// A record's nominal is not a positive integer.
    #[error("invalid nominal format: {0}")]
    InvalidNominal(String),
}

/// Errors surfaced by a [`crate::provider::RateProvider`].
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to fetch rates from feed: {0}")]
    Fetch(#[from] FetchError),

    #[error("failed to parse feed rates: {0}")]
    Decode(#[from] FeedError),
}

/// Input rejected before any rate lookup.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// NaN, infinite, zero or negative.
    #[error("amount must be a positive number, got {0}")]
    InvalidAmount(f64),

    #[error(transparent)]
    UnsupportedCurrency(#[from] CurrencyError),

    #[error("date {date} is in the future (today is {today})")]
    DateInFuture { date: NaiveDate, today: NaiveDate },
}

/// Errors returned by the converter.
#[derive(Debug, Error)]
pub enum FxError {
    /// The converter was built without a rate source.
    #[error("rate provider is not configured")]
    MissingProvider,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to fetch rates: {0}")]
    Provider(#[from] ProviderError),

    /// The snapshot was valid but lacked the requested currency.
    #[error("currency {currency} not found in rates for {date}")]
    RateNotFound { currency: Currency, date: NaiveDate },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl FxError {
    /// Whether this is a validation or configuration error, which the
    /// caller should present as-is.
    pub fn is_user_error(&self) -> bool {
        matches!(self, FxError::Validation(_) | FxError::MissingProvider)
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;
