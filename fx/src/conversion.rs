//! Conversion results and their display formatting.

use chrono::NaiveDate;
use currate_common::Currency;
use serde::{Deserialize, Serialize};

/// A completed conversion into roubles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub source_currency: Currency,
    /// Always [`Currency::DOMESTIC`].
    pub target_currency: Currency,
    pub source_amount: f64,
    pub target_amount: f64,
    /// Roubles per one unit of the source currency.
    pub rate: f64,
    /// Date the rate belongs to. For foreign currencies this is the feed's
    /// date, which can precede the requested one.
    pub date: NaiveDate,
    /// e.g. `80 000,00 руб. ($1 000,00 по курсу 80,0000)`.
    pub formatted: String,
}

impl ConversionResult {
    /// Create a new conversion result and render its display string.
    pub fn new(source_currency: Currency, source_amount: f64, rate: f64, date: NaiveDate) -> Self {
        let target_amount = source_amount * rate;
        Self {
            source_currency,
            target_currency: Currency::DOMESTIC,
            source_amount,
            target_amount,
            rate,
            date,
            formatted: format_result(source_amount, rate, source_currency, target_amount),
        }
    }
}

/// `"{result} руб. ({symbol}{amount} по курсу {rate})"`, with amounts in
/// [`format_number`] style and the rate to four decimals.
pub fn format_result(amount: f64, rate: f64, currency: Currency, result: f64) -> String {
    format!(
        "{} руб. ({}{} по курсу {})",
        format_number(result),
        currency.symbol(),
        format_number(amount),
        format!("{rate:.4}").replace('.', ",")
    )
}

/// Two decimals, comma separator, thousands grouped with spaces:
/// `1234567.891` becomes `1 234 567,89`.
pub fn format_number(value: f64) -> String {
    let fixed = format!("{value:.2}");
    let (sign, unsigned) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed.as_str()),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, "00"));

    format!("{sign}{},{frac_part}", group_thousands(int_part))
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(c);
    }
    grouped
}
