//! Conversion orchestration: validation, cache, fetch and formatting.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone};
use currate_common::{calendar_day, Clock, Currency, SystemClock};
use tracing::{debug, info, instrument};

use crate::cache::{CachedRate, LruRateCache, NoopCache, RateStore};
use crate::config::FxConfig;
use crate::conversion::ConversionResult;
use crate::error::{FxError, FxResult};
use crate::provider::{CbrRateProvider, RateProvider};
use crate::validation::{validate_amount, validate_date};

/// Converts USD and EUR amounts into roubles.
///
/// Holds no mutable state of its own; share it behind an `Arc` and call it
/// from as many tasks as needed.
pub struct Converter {
    provider: Option<Arc<dyn RateProvider>>,
    cache: Arc<dyn RateStore>,
    clock: Arc<dyn Clock>,
}

impl Converter {
    /// Create a new converter over `provider` and `cache`.
    pub fn new(provider: Arc<dyn RateProvider>, cache: Arc<dyn RateStore>) -> Self {
        Self::builder().provider(provider).cache(cache).build()
    }

    pub fn builder() -> ConverterBuilder {
        ConverterBuilder::default()
    }

    /// Wire the CBR provider and an LRU cache from `config`.
    pub fn from_config(config: &FxConfig) -> FxResult<Self> {
        config.validate().map_err(FxError::InvalidConfig)?;

        let provider =
            CbrRateProvider::from_config(config).map_err(|e| FxError::InvalidConfig(e.to_string()))?;
        let cache = LruRateCache::with_config(config.cache_config());

        Ok(Self::new(Arc::new(provider), Arc::new(cache)))
    }

    /// Convert `amount` of `currency` into roubles at the rate for `date`.
    #[instrument(skip(self), fields(currency = %currency))]
    pub async fn convert(
        &self,
        amount: f64,
        currency: Currency,
        date: NaiveDate,
    ) -> FxResult<ConversionResult> {
        let provider = self.provider()?;
        validate_amount(amount)?;
        validate_date(date, self.clock.today())?;

        let resolved = self.resolve_rate(provider, currency, date).await?;
        let result = ConversionResult::new(currency, amount, resolved.rate, resolved.actual_date);

        info!(
            requested = %date,
            actual = %result.date,
            rate = result.rate,
            target_amount = result.target_amount,
            "Conversion completed"
        );

        Ok(result)
    }

    /// Roubles per unit of `currency` on `date`, without formatting.
    #[instrument(skip(self), fields(currency = %currency))]
    pub async fn get_rate(&self, currency: Currency, date: NaiveDate) -> FxResult<f64> {
        let provider = self.provider()?;
        validate_date(date, self.clock.today())?;

        Ok(self.resolve_rate(provider, currency, date).await?.rate)
    }

    /// [`Converter::convert`] for a timestamp, taking the calendar day in
    /// the timestamp's own zone.
    pub async fn convert_at<Tz: TimeZone>(
        &self,
        amount: f64,
        currency: Currency,
        at: &DateTime<Tz>,
    ) -> FxResult<ConversionResult> {
        self.convert(amount, currency, calendar_day(at)).await
    }

    /// [`Converter::get_rate`] for a timestamp.
    pub async fn get_rate_at<Tz: TimeZone>(
        &self,
        currency: Currency,
        at: &DateTime<Tz>,
    ) -> FxResult<f64> {
        self.get_rate(currency, calendar_day(at)).await
    }

    /// Drop every cached rate.
    pub fn clear_cache(&self) {
        self.cache.clear();
        debug!("Rate cache cleared");
    }

    fn provider(&self) -> FxResult<&Arc<dyn RateProvider>> {
        self.provider.as_ref().ok_or(FxError::MissingProvider)
    }

    async fn resolve_rate(
        &self,
        provider: &Arc<dyn RateProvider>,
        currency: Currency,
        date: NaiveDate,
    ) -> FxResult<CachedRate> {
        if currency.is_domestic() {
            return Ok(CachedRate {
                rate: 1.0,
                actual_date: date,
            });
        }

        if let Some(cached) = self.cache.get(currency, date) {
            debug!(%date, actual = %cached.actual_date, "Using cached rate");
            return Ok(cached);
        }

        debug!(%date, provider = provider.name(), "Rate not cached, fetching");
        let data = provider.fetch_rates(date).await?;

        let rate = data
            .rate(currency)
            .ok_or(FxError::RateNotFound {
                currency,
                date: data.date,
            })?
            .per_unit();
        let actual_date = data.date;

        // Also key by the feed's date so a later request for it is a hit.
        self.cache.set(currency, date, rate, actual_date);
        if actual_date != date {
            self.cache.set(currency, actual_date, rate, actual_date);
        }

        Ok(CachedRate { rate, actual_date })
    }
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("provider", &self.provider.as_ref().map(|p| p.name()))
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Converter`]. Without a cache every call goes to the
/// provider; without a provider every call fails with
/// [`FxError::MissingProvider`].
#[derive(Default)]
pub struct ConverterBuilder {
    provider: Option<Arc<dyn RateProvider>>,
    cache: Option<Arc<dyn RateStore>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ConverterBuilder {
    pub fn provider(mut self, provider: Arc<dyn RateProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn RateStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Clock used to decide what "today" is.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Converter {
        Converter {
            provider: self.provider,
            cache: self.cache.unwrap_or_else(|| Arc::new(NoopCache)),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RateCacheConfig;
    use crate::error::{FeedError, FetchError, ProviderError, ValidationError};
    use crate::provider::MockRateProvider;
    use chrono::{Days, Duration, FixedOffset, TimeZone, Utc};
    use currate_common::{ExchangeRate, ManualClock, RateData};

    struct Fixture {
        converter: Converter,
        provider: Arc<MockRateProvider>,
        cache: Arc<LruRateCache>,
        today: NaiveDate,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 12, 20, 10, 0, 0).unwrap(),
        ));
        let today = clock.today();
        let provider = Arc::new(MockRateProvider::new("mock"));
        let cache = Arc::new(LruRateCache::with_clock(
            RateCacheConfig::default(),
            clock.clone(),
        ));

        let converter = Converter::builder()
            .provider(provider.clone())
            .cache(cache.clone())
            .clock(clock)
            .build();

        Fixture {
            converter,
            provider,
            cache,
            today,
        }
    }

    fn snapshot(date: NaiveDate, rates: &[(Currency, f64, u32)]) -> RateData {
        let mut data = RateData::new(date);
        for &(currency, rate, nominal) in rates {
            data.add_rate(ExchangeRate::new(currency, rate, nominal, date));
        }
        data
    }

    fn days_before(date: NaiveDate, n: u64) -> NaiveDate {
        date.checked_sub_days(Days::new(n)).unwrap()
    }

    #[tokio::test]
    async fn test_convert_with_cached_rate() {
        let f = fixture();
        let date = days_before(f.today, 1);
        f.cache.set(Currency::Usd, date, 80.0, date);

        let result = f.converter.convert(1000.0, Currency::Usd, date).await.unwrap();

        assert_eq!(result.target_amount, 80000.0);
        assert_eq!(result.rate, 80.0);
        assert_eq!(result.date, date);
        assert_eq!(result.formatted, "80 000,00 руб. ($1 000,00 по курсу 80,0000)");
        assert_eq!(f.provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_domestic_short_circuit() {
        let f = fixture();
        let date = days_before(f.today, 30);

        let result = f.converter.convert(1000.0, Currency::Rub, date).await.unwrap();

        assert_eq!(result.target_amount, 1000.0);
        assert_eq!(result.rate, 1.0);
        assert_eq!(result.date, date);
        assert_eq!(result.source_currency, Currency::Rub);
        assert_eq!(f.provider.call_count(), 0);
        assert!(f.cache.is_empty());
        assert_eq!(f.cache.stats().misses, 0);

        let rate = f.converter.get_rate(Currency::Rub, date).await.unwrap();
        assert_eq!(rate, 1.0);
    }

    #[tokio::test]
    async fn test_invalid_amounts_never_fetch() {
        let f = fixture();

        for amount in [-5.0, 0.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = f
                .converter
                .convert(amount, Currency::Usd, f.today)
                .await
                .unwrap_err();
            assert!(
                matches!(err, FxError::Validation(ValidationError::InvalidAmount(_))),
                "{amount}"
            );
        }
        assert_eq!(f.provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_future_date_is_rejected() {
        let f = fixture();
        let tomorrow = f.today.succ_opt().unwrap();

        let err = f.converter.get_rate(Currency::Usd, tomorrow).await.unwrap_err();
        assert!(matches!(
            err,
            FxError::Validation(ValidationError::DateInFuture { .. })
        ));

        let err = f
            .converter
            .convert(10.0, Currency::Rub, tomorrow)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FxError::Validation(ValidationError::DateInFuture { .. })
        ));
        assert_eq!(f.provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_today_is_allowed() {
        let f = fixture();
        f.provider
            .set_rates(f.today, snapshot(f.today, &[(Currency::Eur, 90.0, 1)]));

        let rate = f.converter.get_rate(Currency::Eur, f.today).await.unwrap();
        assert_eq!(rate, 90.0);
    }

    #[tokio::test]
    async fn test_fetch_caches_under_both_dates() {
        let f = fixture();
        let requested = days_before(f.today, 1);
        let published = days_before(requested, 3);
        f.provider.set_rates(
            requested,
            snapshot(published, &[(Currency::Usd, 80.0, 1), (Currency::Eur, 90.0, 1)]),
        );

        let result = f
            .converter
            .convert(100.0, Currency::Usd, requested)
            .await
            .unwrap();

        assert_eq!(result.date, published);
        assert_eq!(result.rate, 80.0);
        assert_eq!(result.target_amount, 8000.0);
        assert!(f.cache.contains(Currency::Usd, requested));
        assert!(f.cache.contains(Currency::Usd, published));
        assert_eq!(f.provider.requested_dates(), vec![requested]);

        let again = f
            .converter
            .convert(100.0, Currency::Usd, published)
            .await
            .unwrap();
        assert_eq!(again.date, published);
        assert_eq!(f.provider.call_count(), 1);

        let rate = f.converter.get_rate(Currency::Usd, requested).await.unwrap();
        assert_eq!(rate, 80.0);
        assert_eq!(f.provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_same_day_snapshot_caches_once() {
        let f = fixture();
        let date = days_before(f.today, 2);
        f.provider
            .set_rates(date, snapshot(date, &[(Currency::Usd, 80.0, 1)]));

        f.converter.convert(1.0, Currency::Usd, date).await.unwrap();

        assert_eq!(f.cache.len(), 1);
    }

    #[tokio::test]
    async fn test_nominal_is_normalized() {
        let f = fixture();
        let date = days_before(f.today, 1);
        f.provider
            .set_rates(date, snapshot(date, &[(Currency::Usd, 800.0, 10)]));

        let rate = f.converter.get_rate(Currency::Usd, date).await.unwrap();

        assert_eq!(rate, 80.0);
        assert_eq!(f.cache.get(Currency::Usd, date).unwrap().rate, 80.0);
    }

    #[tokio::test]
    async fn test_missing_currency_in_snapshot() {
        let f = fixture();
        let date = days_before(f.today, 1);
        f.provider
            .set_rates(date, snapshot(date, &[(Currency::Eur, 90.0, 1)]));

        let err = f.converter.convert(1.0, Currency::Usd, date).await.unwrap_err();

        assert!(matches!(
            err,
            FxError::RateNotFound {
                currency: Currency::Usd,
                ..
            }
        ));
        assert!(f.cache.is_empty());
    }

    #[tokio::test]
    async fn test_provider_errors_are_wrapped() {
        let f = fixture();
        f.provider.fail_with(|| {
            ProviderError::Fetch(FetchError::RetriesExhausted {
                attempts: 3,
                source: Box::new(FetchError::ServerStatus { status: 500 }),
            })
        });

        let err = f
            .converter
            .convert(1.0, Currency::Eur, f.today)
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("failed to fetch rates: "));
        match err {
            FxError::Provider(ProviderError::Fetch(fetch)) => {
                assert!(matches!(
                    fetch.last_cause(),
                    FetchError::ServerStatus { status: 500 }
                ));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_provider_comes_first() {
        let converter = Converter::builder().build();

        let err = converter
            .convert(-5.0, Currency::Usd, NaiveDate::from_ymd_opt(2099, 1, 1).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, FxError::MissingProvider));

        let err = converter
            .get_rate(Currency::Rub, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, FxError::MissingProvider));
    }

    #[tokio::test]
    async fn test_without_cache_every_call_fetches() {
        let provider = Arc::new(MockRateProvider::new("mock"));
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        provider.set_rates(date, snapshot(date, &[(Currency::Usd, 90.0, 1)]));

        let converter = Converter::builder().provider(provider.clone()).build();
        converter.get_rate(Currency::Usd, date).await.unwrap();
        converter.get_rate(Currency::Usd, date).await.unwrap();

        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_refetch() {
        let f = fixture();
        let date = days_before(f.today, 1);
        f.provider
            .set_rates(date, snapshot(date, &[(Currency::Usd, 80.0, 1)]));

        f.converter.get_rate(Currency::Usd, date).await.unwrap();
        f.converter.clear_cache();
        f.converter.get_rate(Currency::Usd, date).await.unwrap();

        assert_eq!(f.provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_convert_at_uses_local_calendar_day() {
        let f = fixture();
        let yesterday = days_before(f.today, 1);
        f.provider
            .set_rates(yesterday, snapshot(yesterday, &[(Currency::Eur, 90.0, 1)]));
        f.provider
            .set_rates(f.today, snapshot(f.today, &[(Currency::Eur, 91.0, 1)]));

        let moscow = FixedOffset::east_opt(3 * 3600).unwrap();
        let late_evening = moscow
            .from_local_datetime(&yesterday.and_hms_opt(23, 30, 0).unwrap())
            .unwrap();

        let result = f
            .converter
            .convert_at(2.0, Currency::Eur, &late_evening)
            .await
            .unwrap();
        assert_eq!(result.date, yesterday);
        assert_eq!(f.provider.requested_dates(), vec![yesterday]);

        let rate = f
            .converter
            .get_rate_at(Currency::Eur, &(late_evening + Duration::minutes(40)))
            .await
            .unwrap();
        assert_eq!(rate, 91.0);
        assert_eq!(f.provider.requested_dates(), vec![yesterday, f.today]);
    }

    #[tokio::test]
    async fn test_decode_failure_is_not_cached() {
        let f = fixture();
        f.provider
            .fail_with(|| ProviderError::Decode(FeedError::NoRates));

        assert!(f.converter.get_rate(Currency::Usd, f.today).await.is_err());
        assert!(f.converter.get_rate(Currency::Usd, f.today).await.is_err());

        assert_eq!(f.provider.call_count(), 2);
        assert!(f.cache.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_conversions() {
        let f = fixture();
        let date = days_before(f.today, 1);
        f.cache.set(Currency::Usd, date, 80.0, date);
        let converter = Arc::new(f.converter);

        let handles: Vec<_> = (1..=16)
            .map(|i| {
                let converter = converter.clone();
                tokio::spawn(async move {
                    converter
                        .convert(i as f64, Currency::Usd, date)
                        .await
                        .map(|r| r.target_amount)
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let amount = handle.await.unwrap().unwrap();
            assert_eq!(amount, (i + 1) as f64 * 80.0);
        }
        assert_eq!(f.provider.call_count(), 0);
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let config = FxConfig {
            cache_max_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            Converter::from_config(&config),
            Err(FxError::InvalidConfig(_))
        ));

        assert!(Converter::from_config(&FxConfig::default()).is_ok());
    }
}
