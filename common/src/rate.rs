//! Exchange rate snapshot types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::currency::Currency;

/// Official rate of one currency against the rouble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// The quoted currency.
    pub currency: Currency,
    /// Roubles per `nominal` units, as published.
    pub rate: f64,
    /// Number of currency units the rate is quoted for.
    pub nominal: u32,
    /// Date the rate applies to.
    pub date: NaiveDate,
}

impl ExchangeRate {
    pub fn new(currency: Currency, rate: f64, nominal: u32, date: NaiveDate) -> Self {
        Self {
            currency,
            rate,
            nominal,
            date,
        }
    }

    /// Roubles per single unit of the currency.
    pub fn per_unit(&self) -> f64 {
        if self.nominal > 1 {
            self.rate / f64::from(self.nominal)
        } else {
            self.rate
        }
    }
}

/// All rates published for one date.
///
/// `date` is the feed's own date, which may precede the date that was asked
/// for when the request falls on a weekend or holiday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateData {
    pub date: NaiveDate,
    pub rates: HashMap<Currency, ExchangeRate>,
}

impl RateData {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            rates: HashMap::new(),
        }
    }

    /// Insert a rate, replacing any previous rate for the same currency.
    pub fn add_rate(&mut self, rate: ExchangeRate) {
        self.rates.insert(rate.currency, rate);
    }

    pub fn rate(&self, currency: Currency) -> Option<&ExchangeRate> {
        self.rates.get(&currency)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}
