//! Error types shared across CurRate crates.

use thiserror::Error;

/// Errors raised while interpreting currency codes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CurrencyError {
    /// The code is not one of USD, EUR or RUB.
    #[error("unsupported currency: {0}")]
    Unsupported(String),
}
