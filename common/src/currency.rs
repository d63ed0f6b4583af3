//! Supported currencies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CurrencyError;

/// Currencies understood by the converter.
///
/// The set is closed: anything else is rejected when parsing, so a value of
/// this type is always valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// US dollar.
    Usd,
    /// Euro.
    Eur,
    /// Russian rouble, the domestic currency.
    Rub,
}

impl Currency {
    /// Every supported currency, domestic last.
    pub const ALL: [Currency; 3] = [Currency::Usd, Currency::Eur, Currency::Rub];

    /// The currency every conversion targets.
    pub const DOMESTIC: Currency = Currency::Rub;

    /// Three-letter ISO 4217 code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Rub => "RUB",
        }
    }

    /// Display symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Usd => "$",
            Currency::Eur => "€",
            Currency::Rub => "₽",
        }
    }

    /// Full name in Russian, as shown to users.
    pub fn name(&self) -> &'static str {
        match self {
            Currency::Usd => "Доллар США",
            Currency::Eur => "Евро",
            Currency::Rub => "Российский рубль",
        }
    }

    pub fn is_domestic(&self) -> bool {
        *self == Self::DOMESTIC
    }

    /// Parse an exact upper-case code, as found in the feed.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "USD" => Some(Currency::Usd),
            "EUR" => Some(Currency::Eur),
            "RUB" => Some(Currency::Rub),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = CurrencyError;

    /// Trims surrounding whitespace and ignores case, so `" usd "` parses.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        Self::from_code(&normalized).ok_or(CurrencyError::Unsupported(normalized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_input() {
        assert_eq!("usd".parse::<Currency>().unwrap(), Currency::Usd);
        assert_eq!(" eur ".parse::<Currency>().unwrap(), Currency::Eur);
        assert_eq!("Rub\n".parse::<Currency>().unwrap(), Currency::Rub);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = "gbp".parse::<Currency>().unwrap_err();
        assert_eq!(err, CurrencyError::Unsupported("GBP".to_string()));
        assert!("".parse::<Currency>().is_err());
        assert!("US D".parse::<Currency>().is_err());
    }

    #[test]
    fn test_display_metadata() {
        assert_eq!(Currency::Usd.to_string(), "USD");
        assert_eq!(Currency::Eur.symbol(), "€");
        assert_eq!(Currency::Rub.name(), "Российский рубль");
        assert!(Currency::Rub.is_domestic());
        assert!(!Currency::Usd.is_domestic());
    }

    #[test]
    fn test_serde_uses_codes() {
        let json = serde_json::to_string(&Currency::Eur).unwrap();
        assert_eq!(json, "\"EUR\"");
        let parsed: Currency = serde_json::from_str("\"USD\"").unwrap();
        assert_eq!(parsed, Currency::Usd);
    }
}
