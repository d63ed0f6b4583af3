//! CurRate FX
//!
//! Acquisition, caching and conversion of official Central Bank of Russia
//! exchange rates for USD and EUR into roubles.
//!
//! # Features
//!
//! - Daily XML feed client with retry, exponential backoff and cancellation
//! - Lenient feed decoder with Windows-1251 support and an input size cap
//! - Thread-safe LRU rate cache with TTL expiry
//! - Converter that validates input, consults the cache and formats results
//!
//! # Example
//!
//! ```rust,ignore
//! use currate_fx::{Converter, FxConfig};
//! use currate_common::Currency;
//! use chrono::NaiveDate;
//!
//! let converter = Converter::from_config(&FxConfig::from_env())?;
//!
//! let date = NaiveDate::from_ymd_opt(2025, 12, 20).unwrap();
//! let result = converter.convert(1000.0, Currency::Usd, date).await?;
//! println!("{}", result.formatted);
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod conversion;
pub mod converter;
pub mod decoder;
pub mod error;
pub mod provider;
pub mod transport;
pub mod validation;

pub use cache::{CacheStats, CachedRate, LruRateCache, NoopCache, RateCacheConfig, RateStore};
pub use client::{FeedClient, RetryPolicy};
pub use config::FxConfig;
pub use conversion::{format_number, format_result, ConversionResult};
pub use converter::{Converter, ConverterBuilder};
pub use decoder::FeedDecoder;
pub use error::{FeedError, FetchError, FxError, FxResult, ProviderError, ValidationError};
pub use provider::{CbrRateProvider, RateProvider};
pub use transport::{ReqwestTransport, Transport, TransportResponse};
pub use validation::{validate_amount, validate_currency, validate_date};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateProvider;
#[cfg(any(test, feature = "test-utils"))]
pub use transport::{MockOutcome, MockTransport};
