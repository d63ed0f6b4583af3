//! Parsing of user-typed amounts.
//!
//! Accepts the usual ways people write numbers: `1000`, `1 000`,
//! `1,000.50`, `1.000,50`, `1000.50` and `1000,50`. A single separator
//! followed by exactly three digits is read as a thousands separator.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("пустая строка")]
    Empty,

    #[error("не удалось распознать число '{0}'")]
    Invalid(String),

    #[error("сумма не может быть отрицательной: {0}")]
    Negative(String),
}

pub fn parse_amount(input: &str) -> Result<f64, AmountError> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(AmountError::Empty);
    }

    let normalized = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        // 1,000.50
        (Some(dot), Some(comma)) if dot > comma => cleaned.replace(',', ""),
        // 1.000,50
        (Some(_), Some(_)) => cleaned.replace('.', "").replace(',', "."),
        (None, Some(_)) => normalize_single(&cleaned, ','),
        (Some(_), None) => normalize_single(&cleaned, '.'),
        (None, None) => cleaned,
    };

    let value: f64 = normalized
        .parse()
        .map_err(|_| AmountError::Invalid(input.trim().to_string()))?;

    if !value.is_finite() {
        return Err(AmountError::Invalid(input.trim().to_string()));
    }
    if value < 0.0 {
        return Err(AmountError::Negative(input.trim().to_string()));
    }

    Ok(value)
}

fn normalize_single(s: &str, separator: char) -> String {
    match s.split_once(separator) {
        Some((_, fraction)) if !fraction.contains(separator) && fraction.len() != 3 => {
            s.replace(separator, ".")
        }
        _ => s.replace(separator, ""),
    }
}
