//! Rate provider trait and the CBR feed implementation.

use async_trait::async_trait;
use chrono::NaiveDate;
use currate_common::{format_request_date, Clock, RateData, SystemClock};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::client::FeedClient;
use crate::config::FxConfig;
use crate::decoder::FeedDecoder;
use crate::error::{FeedError, FetchError, ProviderError};
use crate::transport::{ReqwestTransport, Transport};

/// Source of daily rate snapshots.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Fetch the snapshot published for `date`.
    ///
    /// The returned [`RateData::date`] may be earlier than `date` when
    /// nothing was published that day.
    async fn fetch_rates(&self, date: NaiveDate) -> Result<RateData, ProviderError>;
}

/// Rates from the Central Bank of Russia daily XML feed.
#[derive(Debug, Clone)]
pub struct CbrRateProvider {
    client: FeedClient,
    decoder: FeedDecoder,
    endpoint: String,
}

impl CbrRateProvider {
    /// Create a provider over an existing client.
    pub fn new(client: FeedClient, decoder: FeedDecoder, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            decoder,
            endpoint: endpoint.into(),
        }
    }

    /// Build the HTTP stack described by `config`.
    pub fn from_config(config: &FxConfig) -> Result<Self, FetchError> {
        let transport = ReqwestTransport::new(config)?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    /// Use `transport` with the rest of `config`.
    pub fn with_transport(transport: Arc<dyn Transport>, config: &FxConfig) -> Self {
        Self::new(
            FeedClient::new(transport, config.retry_policy()),
            FeedDecoder::new(config.max_feed_bytes),
            config.endpoint.clone(),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Feed URL for `date`.
    pub fn rates_url(&self, date: NaiveDate) -> String {
        build_url(&self.endpoint, Some(date))
    }

    /// Fetch rates for `date`, stopping early if `cancel` fires.
    #[instrument(skip(self, cancel), fields(provider = "CBR"))]
    pub async fn fetch_rates_with_cancel(
        &self,
        date: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<RateData, ProviderError> {
        let url = self.rates_url(date);
        let body = self.fetch_body(&url, cancel).await?;
        let data = self.decoder.decode(&body, date)?;

        debug!(requested = %date, actual = %data.date, rates = data.len(), "Fetched rates");
        Ok(data)
    }

    /// Fetch the most recent snapshot the feed has published.
    pub async fn latest_rates(&self) -> Result<RateData, ProviderError> {
        self.latest_rates_with_cancel(&CancellationToken::new()).await
    }

    /// [`CbrRateProvider::latest_rates`], stopping early if `cancel` fires.
    #[instrument(skip(self, cancel), fields(provider = "CBR"))]
    pub async fn latest_rates_with_cancel(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RateData, ProviderError> {
        let url = build_url(&self.endpoint, None);
        let body = self.fetch_body(&url, cancel).await?;
        Ok(self.decoder.decode(&body, SystemClock.today())?)
    }

    async fn fetch_body(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ProviderError> {
        match self.client.fetch_with_cancel(url, cancel).await {
            Ok(body) => Ok(body),
            Err(FetchError::BodyTooLarge { limit }) => Err(FeedError::TooLarge { limit }.into()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl RateProvider for CbrRateProvider {
    fn name(&self) -> &str {
        "CBR"
    }

    async fn fetch_rates(&self, date: NaiveDate) -> Result<RateData, ProviderError> {
        self.fetch_rates_with_cancel(date, &CancellationToken::new())
            .await
    }
}

fn build_url(endpoint: &str, date: Option<NaiveDate>) -> String {
    match date {
        Some(date) => {
            let separator = if endpoint.contains('?') { '&' } else { '?' };
            format!("{endpoint}{separator}date_req={}", format_request_date(date))
        }
        None => endpoint.to_string(),
    }
}

/// Mock rate provider for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateProvider {
    name: String,
    snapshots: parking_lot::Mutex<std::collections::HashMap<NaiveDate, RateData>>,
    failure: parking_lot::Mutex<Option<fn() -> ProviderError>>,
    calls: parking_lot::Mutex<Vec<NaiveDate>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateProvider {
    /// Create a new mock provider.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            snapshots: parking_lot::Mutex::new(Default::default()),
            failure: parking_lot::Mutex::new(None),
            calls: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Answer requests for `requested` with `data`.
    pub fn set_rates(&self, requested: NaiveDate, data: RateData) {
        self.snapshots.lock().insert(requested, data);
    }

    /// Fail every request with the error `make` builds.
    pub fn fail_with(&self, make: fn() -> ProviderError) {
        *self.failure.lock() = Some(make);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Dates requested so far, in order.
    pub fn requested_dates(&self) -> Vec<NaiveDate> {
        self.calls.lock().clone()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateProvider for MockRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_rates(&self, date: NaiveDate) -> Result<RateData, ProviderError> {
        self.calls.lock().push(date);

        if let Some(make) = *self.failure.lock() {
            return Err(make());
        }

        self.snapshots
            .lock()
            .get(&date)
            .cloned()
            .ok_or(ProviderError::Decode(FeedError::NoRates))
    }
}
