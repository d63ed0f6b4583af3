//! Decoder for the daily rates XML feed.
//!
//! The feed looks like:
//!
//! ```text
//! <?xml version="1.0" encoding="windows-1251"?>
//! <ValCurs Date="20.12.2025" name="Foreign Currency Market">
//!   <Valute ID="R01235">
//!     <NumCode>840</NumCode>
//!     <CharCode>USD</CharCode>
//!     <Nominal>1</Nominal>
//!     <Name>Доллар США</Name>
//!     <Value>80,7220</Value>
//!   </Valute>
//!   ...
//! </ValCurs>
//! ```
//!
//! Records for other currencies, or with a bad value or nominal, are
//! skipped. The document only fails as a whole when it is too large,
//! unreadable, not XML, or left with no usable records.

use std::borrow::Cow;
use std::io::Read;

use chrono::NaiveDate;
use currate_common::{formats, Currency, ExchangeRate, RateData};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::DEFAULT_MAX_FEED_BYTES;
use crate::error::FeedError;

const LEGACY_ENCODING: &[u8] = b"windows-1251";
const UTF8_LABEL: &str = "UTF-8";

#[derive(Debug, Default, Deserialize)]
struct ValCurs {
    #[serde(rename = "@Date", default)]
    date: Option<String>,
    #[serde(rename = "Valute", default)]
    records: Vec<Valute>,
}

// Every field is free text so one bad record cannot fail the document.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Valute {
    #[serde(rename = "NumCode")]
    num_code: String,
    #[serde(rename = "CharCode")]
    char_code: String,
    #[serde(rename = "Nominal")]
    nominal: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Value")]
    value: String,
}

impl Valute {
    /// `Ok(None)` for currencies we do not support.
    fn to_rate(&self, date: NaiveDate) -> Result<Option<ExchangeRate>, FeedError> {
        let code = self.char_code.trim().to_ascii_uppercase();
        let Some(currency) = Currency::from_code(&code) else {
            return Ok(None);
        };

        let rate = parse_rate(&self.value)?;
        let nominal = parse_nominal(&self.nominal)?;

        Ok(Some(ExchangeRate::new(currency, rate, nominal, date)))
    }
}

/// Turns feed bytes into a [`RateData`] snapshot.
#[derive(Debug, Clone, Copy)]
pub struct FeedDecoder {
    max_size: usize,
}

impl FeedDecoder {
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Read at most `max_size` bytes from `reader` and decode them.
    pub fn decode_reader<R: Read>(&self, reader: R, fallback_date: NaiveDate) -> Result<RateData, FeedError> {
        let limit = u64::try_from(self.max_size).unwrap_or(u64::MAX).saturating_add(1);
        let mut buf = Vec::new();
        reader.take(limit).read_to_end(&mut buf)?;
        self.decode(&buf, fallback_date)
    }

    /// Decode a whole document.
    ///
    /// The feed's `Date` attribute becomes the snapshot date; when it is
    /// missing or unparsable `fallback_date` is used instead.
    pub fn decode(&self, bytes: &[u8], fallback_date: NaiveDate) -> Result<RateData, FeedError> {
        if bytes.len() > self.max_size {
            return Err(FeedError::TooLarge {
                limit: self.max_size,
            });
        }

        let text = normalize_encoding(bytes)?;
        // Record tolerance covers field contents only. Markup nested inside a
        // field breaks the document structure and fails the whole decode.
        let document: ValCurs =
            quick_xml::de::from_str(&text).map_err(|e| FeedError::Malformed(e.to_string()))?;

        let date = document
            .date
            .as_deref()
            .and_then(parse_feed_date)
            .unwrap_or(fallback_date);

        let mut data = RateData::new(date);
        for record in &document.records {
            match record.to_rate(date) {
                Ok(Some(rate)) => data.add_rate(rate),
                Ok(None) => {}
                Err(e) => warn!(
                    code = %record.char_code.trim(),
                    num_code = %record.num_code.trim(),
                    name = %record.name.trim(),
                    error = %e,
                    "Skipping malformed feed record"
                ),
            }
        }

        if data.is_empty() {
            return Err(FeedError::NoRates);
        }

        debug!(%date, rates = data.len(), records = document.records.len(), "Decoded feed");
        Ok(data)
    }
}

impl Default for FeedDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FEED_BYTES)
    }
}

/// Produce UTF-8 text, transcoding from Windows-1251 when the XML
/// declaration names it (in any letter case).
fn normalize_encoding(bytes: &[u8]) -> Result<Cow<'_, str>, FeedError> {
    let declares_legacy = xml_declaration(bytes)
        .map(|decl| find_ignore_ascii_case(decl, LEGACY_ENCODING).is_some())
        .unwrap_or(false);

    if !declares_legacy {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| FeedError::Malformed(format!("feed is not valid UTF-8: {e}")))?;
        return Ok(Cow::Borrowed(text.trim_start_matches('\u{feff}')));
    }

    let (decoded, _) = encoding_rs::WINDOWS_1251.decode_without_bom_handling(bytes);
    let mut text = decoded.into_owned();

    // ASCII lowercasing keeps byte offsets, and the declaration comes first.
    if let Some(pos) = find_ignore_ascii_case(text.as_bytes(), LEGACY_ENCODING) {
        text.replace_range(pos..pos + LEGACY_ENCODING.len(), UTF8_LABEL);
    }

    Ok(Cow::Owned(text))
}

/// The `<?xml ... ?>` prolog, if the document starts with one.
fn xml_declaration(bytes: &[u8]) -> Option<&[u8]> {
    let start = bytes
        .strip_prefix(b"\xEF\xBB\xBF".as_slice())
        .unwrap_or(bytes);
    let start = &start[start.iter().position(|b| !b.is_ascii_whitespace())?..];

    if !start.starts_with(b"<?xml") {
        return None;
    }

    let end = start.windows(2).position(|w| w == b"?>")?;
    Some(&start[..end])
}

fn find_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

fn parse_feed_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), formats::DISPLAY_DATE).ok()
}

/// Parse a feed decimal such as `80,7220`. Must be finite and positive.
pub fn parse_rate(s: &str) -> Result<f64, FeedError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(FeedError::InvalidRate("empty value".to_string()));
    }

    let rate: f64 = s
        .replace(',', ".")
        .parse()
        .map_err(|_| FeedError::InvalidRate(s.to_string()))?;

    if !rate.is_finite() || rate <= 0.0 {
        return Err(FeedError::InvalidRate(format!("{s}: rate must be positive")));
    }

    Ok(rate)
}

/// Parse a nominal such as `1`, `100` or `10 000`. Must be a positive
/// integer.
pub fn parse_nominal(s: &str) -> Result<u32, FeedError> {
    let digits: String = s
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if digits.is_empty() {
        return Err(FeedError::InvalidNominal("empty nominal".to_string()));
    }

    let nominal: u32 = digits
        .parse()
        .map_err(|_| FeedError::InvalidNominal(digits.clone()))?;

    if nominal == 0 {
        return Err(FeedError::InvalidNominal(format!("{digits}: nominal must be positive")));
    }

    Ok(nominal)
}
