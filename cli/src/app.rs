//! Request/response adapter between user input and the converter.

use std::sync::Arc;

use currate_common::{format_display_date, parse_display_date};
use currate_fx::{validate_currency, Converter, FxError, ValidationError};
use serde::{Deserialize, Serialize};
use tracing::warn;

const MAX_RAW_ERROR_LEN: usize = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct ConvertRequest {
    pub amount: f64,
    /// Three-letter code, any case.
    pub currency: String,
    /// `DD.MM.YYYY`.
    pub date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    pub success: bool,
    pub result: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
    pub source_amount: f64,
    #[serde(rename = "targetAmountRUB")]
    pub target_amount_rub: f64,
    pub rate: f64,
    pub currency: String,
    pub currency_symbol: String,
    pub requested_date: String,
    pub actual_date: String,
}

impl ConvertResponse {
    fn failure(error: String) -> Self {
        Self {
            error,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RateResponse {
    pub success: bool,
    pub rate: f64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl RateResponse {
    fn failure(error: String) -> Self {
        Self {
            error,
            ..Default::default()
        }
    }
}

/// Front end over a shared [`Converter`].
#[derive(Debug, Clone)]
pub struct App {
    converter: Arc<Converter>,
}

impl App {
    pub fn new(converter: Arc<Converter>) -> Self {
        Self { converter }
    }

    pub async fn convert(&self, req: &ConvertRequest) -> ConvertResponse {
        let Ok(currency) = validate_currency(&req.currency) else {
            return ConvertResponse::failure(format!("Неподдерживаемая валюта: {}", req.currency));
        };

        let Ok(date) = parse_display_date(&req.date) else {
            return ConvertResponse::failure(format!(
                "Неверный формат даты: {}. Используйте формат ДД.ММ.ГГГГ",
                req.date
            ));
        };

        match self.converter.convert(req.amount, currency, date).await {
            Ok(result) => ConvertResponse {
                success: true,
                result: result.formatted,
                error: String::new(),
                source_amount: result.source_amount,
                target_amount_rub: result.target_amount,
                rate: result.rate,
                currency: currency.code().to_string(),
                currency_symbol: currency.symbol().to_string(),
                requested_date: req.date.trim().to_string(),
                actual_date: format_display_date(result.date),
            },
            Err(e) => {
                if !e.is_user_error() {
                    warn!(error = %e, currency = %currency, %date, "Conversion failed");
                }
                ConvertResponse::failure(translate_error(&e))
            }
        }
    }

    pub async fn get_rate(&self, currency: &str, date: &str) -> RateResponse {
        let Ok(currency) = validate_currency(currency) else {
            return RateResponse::failure(format!("Неподдерживаемая валюта: {currency}"));
        };

        let Ok(date) = parse_display_date(date) else {
            return RateResponse::failure(format!("Неверный формат даты: {date}"));
        };

        match self.converter.get_rate(currency, date).await {
            Ok(rate) => RateResponse {
                success: true,
                rate,
                error: String::new(),
            },
            Err(e) => {
                if !e.is_user_error() {
                    warn!(error = %e, currency = %currency, %date, "Rate lookup failed");
                }
                RateResponse::failure(translate_error(&e))
            }
        }
    }
}

/// Map an error to the message shown to the user.
///
/// Known kinds get fixed wording. Anything else is passed through unless
/// it is long enough to be a technical dump.
pub fn translate_error(err: &FxError) -> String {
    match err {
        FxError::MissingProvider => "Ошибка конфигурации: источник курсов не настроен".to_string(),
        FxError::Validation(ValidationError::InvalidAmount(_)) => {
            "Сумма должна быть положительным числом".to_string()
        }
        FxError::Validation(ValidationError::DateInFuture { .. }) => {
            "Дата не может быть в будущем".to_string()
        }
        FxError::Validation(ValidationError::UnsupportedCurrency(_)) => {
            "Неподдерживаемая валюта. Поддерживаются только USD, EUR и RUB".to_string()
        }
        other => {
            let message = other.to_string();
            if message.chars().count() > MAX_RAW_ERROR_LEN {
                "Произошла ошибка при выполнении операции. Попробуйте еще раз.".to_string()
            } else {
                message
            }
        }
    }
}
