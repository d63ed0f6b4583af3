//! Input checks run before any rate lookup.

use chrono::NaiveDate;
use currate_common::Currency;

use crate::error::ValidationError;

/// Amounts must be finite and strictly positive.
pub fn validate_amount(amount: f64) -> Result<(), ValidationError> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidAmount(amount))
    }
}

/// Parse and check a currency code.
pub fn validate_currency(code: &str) -> Result<Currency, ValidationError> {
    Ok(code.parse::<Currency>()?)
}

/// `date` may be today or earlier, never later.
pub fn validate_date(date: NaiveDate, today: NaiveDate) -> Result<(), ValidationError> {
    if date > today {
        return Err(ValidationError::DateInFuture { date, today });
    }
    Ok(())
}
