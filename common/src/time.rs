//! Clocks and calendar-date helpers.

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use std::fmt::Debug;

/// Date formats used by the rate feed and its users.
pub mod formats {
    /// `20.12.2025`: user input and the feed's `Date` attribute.
    pub const DISPLAY_DATE: &str = "%d.%m.%Y";

    /// `20/12/2025`: the `date_req` query parameter.
    pub const REQUEST_DATE: &str = "%d/%m/%Y";
}

/// Source of the current time.
///
/// Injected into anything that expires entries or compares against "today"
/// so tests can control time.
pub trait Clock: Send + Sync + Debug {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Time elapsed since `earlier`, negative if `earlier` is in the future.
    fn elapsed_since(&self, earlier: DateTime<Utc>) -> Duration {
        self.now().signed_duration_since(earlier)
    }

    /// Today's calendar date in the local time zone.
    fn today(&self) -> NaiveDate {
        self.now().with_timezone(&Local).date_naive()
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Calendar day of a timestamp, taken in the timestamp's own zone.
pub fn calendar_day<Tz: TimeZone>(at: &DateTime<Tz>) -> NaiveDate {
    at.date_naive()
}

/// Format as `DD.MM.YYYY`.
pub fn format_display_date(date: NaiveDate) -> String {
    date.format(formats::DISPLAY_DATE).to_string()
}

/// Parse `DD.MM.YYYY`, ignoring surrounding whitespace.
pub fn parse_display_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s.trim(), formats::DISPLAY_DATE)
}

/// Format as `DD/MM/YYYY` for the feed request.
pub fn format_request_date(date: NaiveDate) -> String {
    date.format(formats::REQUEST_DATE).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn test_manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2025, 12, 20, 10, 0, 0).unwrap();
        let clock = ManualClock::new(start);

        assert_eq!(clock.elapsed_since(start), Duration::zero());

        clock.advance(Duration::hours(25));
        assert_eq!(clock.now(), start + Duration::hours(25));
        assert_eq!(clock.elapsed_since(start), Duration::hours(25));
    }

    #[test]
    fn test_calendar_day_uses_own_zone() {
        // 23:30 at UTC-5 is already the next day in UTC.
        let zone = FixedOffset::west_opt(5 * 3600).unwrap();
        let at = zone.with_ymd_and_hms(2025, 12, 20, 23, 30, 0).unwrap();

        assert_eq!(calendar_day(&at), NaiveDate::from_ymd_opt(2025, 12, 20).unwrap());
        assert_eq!(
            calendar_day(&at.with_timezone(&Utc)),
            NaiveDate::from_ymd_opt(2025, 12, 21).unwrap()
        );
    }

    #[test]
    fn test_date_formats() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(format_display_date(date), "07.03.2025");
        assert_eq!(format_request_date(date), "07/03/2025");
        assert_eq!(parse_display_date(" 07.03.2025 ").unwrap(), date);
        assert!(parse_display_date("2025-03-07").is_err());
        assert!(parse_display_date("31.02.2025").is_err());
    }
}
