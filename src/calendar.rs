// =============================================================================
// Trading calendar — Eastern-Time session windows mapped to UTC milliseconds
// =============================================================================
//
// Date strings are YYYY-MM-DD in America/New_York. All timestamps handed to
// the rest of the engine are UTC milliseconds; conversion happens only here.
//
// Default windows (overridable via the session preset):
//   premarket 04:30 · zone start 09:30 · zone end 10:00 · execution end 12:00
//
// Early-close days truncate the execution end to the early-close time.
// =============================================================================

use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};

/// Eastern-Time session times, as configured (before date resolution).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowPreset {
    /// Premarket reference window opens (backfill start).
    pub premarket_open: NaiveTime,
    /// First bar of the decision zone.
    pub zone_start: NaiveTime,
    /// Zone build deadline.
    pub zone_end: NaiveTime,
    /// Hard session end; any open trade is closed at this time.
    pub execution_end: NaiveTime,
    /// Exchange early-close time applied on shortened days.
    pub early_close: NaiveTime,
}

impl Default for WindowPreset {
    fn default() -> Self {
        Self {
            premarket_open: NaiveTime::from_hms_opt(4, 30, 0).unwrap(),
            zone_start: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            zone_end: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            execution_end: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            early_close: NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
        }
    }
}

/// A single trading date's windows resolved to UTC milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindows {
    pub premarket_open_ms: i64,
    pub zone_start_ms: i64,
    pub zone_end_ms: i64,
    pub execution_end_ms: i64,
}

/// Calendar resolving Eastern-Time sessions, weekends, holidays, and
/// early-close days.
#[derive(Debug, Clone)]
pub struct TradingCalendar {
    preset: WindowPreset,
    holidays: HashSet<NaiveDate>,
    early_closes: HashSet<NaiveDate>,
}

impl TradingCalendar {
    pub fn new(
        preset: WindowPreset,
        holidays: HashSet<NaiveDate>,
        early_closes: HashSet<NaiveDate>,
    ) -> Self {
        Self {
            preset,
            holidays,
            early_closes,
        }
    }

    /// Calendar with default windows and no holiday data.
    pub fn with_defaults() -> Self {
        Self::new(WindowPreset::default(), HashSet::new(), HashSet::new())
    }

    /// Whether `date` is a regular or shortened trading day.
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    /// Whether `date` closes early.
    pub fn is_early_close(&self, date: NaiveDate) -> bool {
        self.early_closes.contains(&date)
    }

    /// Resolve the session windows for `date`, truncating the execution end
    /// on early-close days.
    pub fn session_windows(&self, date: NaiveDate) -> Result<SessionWindows> {
        let execution_end = if self.is_early_close(date)
            && self.preset.early_close < self.preset.execution_end
        {
            self.preset.early_close
        } else {
            self.preset.execution_end
        };

        Ok(SessionWindows {
            premarket_open_ms: et_to_utc_ms(date, self.preset.premarket_open)?,
            zone_start_ms: et_to_utc_ms(date, self.preset.zone_start)?,
            zone_end_ms: et_to_utc_ms(date, self.preset.zone_end)?,
            execution_end_ms: et_to_utc_ms(date, execution_end)?,
        })
    }

    /// The Eastern-Time calendar date of a UTC-milliseconds instant.
    pub fn trading_date(&self, utc_ms: i64) -> NaiveDate {
        utc_ms_to_et(utc_ms).date_naive()
    }
}

/// Format a date as the canonical YYYY-MM-DD session key.
pub fn date_string(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parse a YYYY-MM-DD session key.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid session date {s:?} (expected YYYY-MM-DD)"))
}

/// Convert an Eastern wall-clock time on `date` to UTC milliseconds.
fn et_to_utc_ms(date: NaiveDate, time: NaiveTime) -> Result<i64> {
    let naive = date.and_time(time);
    let local = New_York
        .from_local_datetime(&naive)
        .single()
        .with_context(|| format!("ambiguous or skipped Eastern time {naive}"))?;
    Ok(local.with_timezone(&Utc).timestamp_millis())
}

fn utc_ms_to_et(utc_ms: i64) -> DateTime<chrono_tz::Tz> {
    Utc.timestamp_millis_opt(utc_ms)
        .single()
        .unwrap_or_else(|| Utc.timestamp_millis_opt(0).unwrap())
        .with_timezone(&New_York)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn summer_windows_are_edt() {
        // 2024-07-10 is EDT (UTC-4): 09:30 ET == 13:30 UTC.
        let cal = TradingCalendar::with_defaults();
        let w = cal.session_windows(date(2024, 7, 10)).unwrap();

        let zone_start = Utc.timestamp_millis_opt(w.zone_start_ms).unwrap();
        assert_eq!(zone_start.format("%H:%M").to_string(), "13:30");

        let exec_end = Utc.timestamp_millis_opt(w.execution_end_ms).unwrap();
        assert_eq!(exec_end.format("%H:%M").to_string(), "16:00");
    }

    #[test]
    fn winter_windows_are_est() {
        // 2024-01-10 is EST (UTC-5): 09:30 ET == 14:30 UTC.
        let cal = TradingCalendar::with_defaults();
        let w = cal.session_windows(date(2024, 1, 10)).unwrap();

        let zone_start = Utc.timestamp_millis_opt(w.zone_start_ms).unwrap();
        assert_eq!(zone_start.format("%H:%M").to_string(), "14:30");
    }

    #[test]
    fn window_ordering() {
        let cal = TradingCalendar::with_defaults();
        let w = cal.session_windows(date(2024, 7, 10)).unwrap();
        assert!(w.premarket_open_ms < w.zone_start_ms);
        assert!(w.zone_start_ms < w.zone_end_ms);
        assert!(w.zone_end_ms < w.execution_end_ms);
    }

    #[test]
    fn weekends_and_holidays_are_not_trading_days() {
        let mut holidays = HashSet::new();
        holidays.insert(date(2024, 7, 4));
        let cal = TradingCalendar::new(WindowPreset::default(), holidays, HashSet::new());

        assert!(!cal.is_trading_day(date(2024, 7, 6))); // Saturday
        assert!(!cal.is_trading_day(date(2024, 7, 7))); // Sunday
        assert!(!cal.is_trading_day(date(2024, 7, 4))); // holiday
        assert!(cal.is_trading_day(date(2024, 7, 10)));
    }

    #[test]
    fn early_close_truncates_execution_end_only_when_earlier() {
        let mut preset = WindowPreset::default();
        // Push the regular execution end past the early close so truncation
        // has an effect.
        preset.execution_end = NaiveTime::from_hms_opt(15, 30, 0).unwrap();

        let mut early = HashSet::new();
        early.insert(date(2024, 11, 29)); // day after Thanksgiving
        let cal = TradingCalendar::new(preset, HashSet::new(), early);

        let shortened = cal.session_windows(date(2024, 11, 29)).unwrap();
        let regular = cal.session_windows(date(2024, 11, 27)).unwrap();

        let end_et = |w: &SessionWindows| {
            Utc.timestamp_millis_opt(w.execution_end_ms)
                .unwrap()
                .with_timezone(&New_York)
                .format("%H:%M")
                .to_string()
        };
        assert_eq!(end_et(&shortened), "13:00");
        assert_eq!(end_et(&regular), "15:30");
    }

    #[test]
    fn default_execution_end_unaffected_by_early_close() {
        // 12:00 is before the 13:00 early close, so nothing changes.
        let mut early = HashSet::new();
        early.insert(date(2024, 11, 29));
        let cal = TradingCalendar::new(WindowPreset::default(), HashSet::new(), early);

        let shortened = cal.session_windows(date(2024, 11, 29)).unwrap();
        let regular_end = Utc
            .timestamp_millis_opt(shortened.execution_end_ms)
            .unwrap()
            .with_timezone(&New_York)
            .format("%H:%M")
            .to_string();
        assert_eq!(regular_end, "12:00");
    }

    #[test]
    fn trading_date_crosses_midnight_in_et() {
        let cal = TradingCalendar::with_defaults();
        // 2024-07-11 01:00 UTC is still 2024-07-10 21:00 ET.
        let late_evening = Utc
            .with_ymd_and_hms(2024, 7, 11, 1, 0, 0)
            .unwrap()
            .timestamp_millis();
        assert_eq!(cal.trading_date(late_evening), date(2024, 7, 10));
    }

    #[test]
    fn date_string_round_trip() {
        let d = date(2024, 3, 8);
        assert_eq!(date_string(d), "2024-03-08");
        assert_eq!(parse_date("2024-03-08").unwrap(), d);
        assert!(parse_date("03/08/2024").is_err());
    }
}
