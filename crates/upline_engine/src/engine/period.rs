//! Calendar-month settlement periods.
//!
//! Revenue share settles once per UTC calendar month. Periods carry exact
//! millisecond boundaries so transaction range queries never straddle months.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Milliseconds in one UTC day.
pub const MILLIS_PER_DAY: i64 = 86_400_000;

const MIN_PERIOD_YEAR: i32 = 1970;
const MAX_PERIOD_YEAR: i32 = 9999;

/// A UTC calendar month. Serialized as `"YYYY-MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self, String> {
        if !(1..=12).contains(&month) {
            return Err(format!("period month out of range: {month}"));
        }
        if !(MIN_PERIOD_YEAR..=MAX_PERIOD_YEAR).contains(&year) {
            return Err(format!("period year out of range: {year}"));
        }
        Ok(Self { year, month })
    }

    /// The period containing the given timestamp. Timestamps before the epoch
    /// clamp to 1970-01.
    pub fn containing(at_unix_ms: i64) -> Self {
        let max_days = days_from_civil(MAX_PERIOD_YEAR, 12, 31);
        let days = (at_unix_ms.max(0) / MILLIS_PER_DAY).min(max_days);
        let (year, month, _) = civil_from_days(days);
        Self { year, month }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// First instant of the month, inclusive.
    pub fn start_unix_ms(&self) -> i64 {
        days_from_civil(self.year, self.month, 1) * MILLIS_PER_DAY
    }

    /// First instant of the next month, exclusive.
    pub fn end_unix_ms(&self) -> i64 {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        days_from_civil(year, month, 1) * MILLIS_PER_DAY
    }

    pub fn contains(&self, at_unix_ms: i64) -> bool {
        at_unix_ms >= self.start_unix_ms() && at_unix_ms < self.end_unix_ms()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl TryFrom<String> for Period {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let Some((year_raw, month_raw)) = value.split_once('-') else {
            return Err(format!("invalid period: {value}"));
        };
        let year: i32 = year_raw
            .parse()
            .map_err(|_| format!("invalid period year: {value}"))?;
        let month: u32 = month_raw
            .parse()
            .map_err(|_| format!("invalid period month: {value}"))?;
        Self::new(year, month)
    }
}

impl From<Period> for String {
    fn from(period: Period) -> String {
        period.to_string()
    }
}

// Civil-date conversions from Howard Hinnant's chrono-compatible algorithms.
// Day 0 is 1970-01-01.
fn days_from_civil(year: i32, month: u32, day: u32) -> i64 {
    let y = i64::from(if month <= 2 { year - 1 } else { year });
    let m = i64::from(month);
    let d = i64::from(day);
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (m + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn civil_from_days(days: i64) -> (i32, u32, u32) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if month <= 2 { y + 1 } else { y };
    (year as i32, month as u32, day as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_month_starts_at_zero() {
        let period = Period::new(1970, 1).expect("period");
        assert_eq!(period.start_unix_ms(), 0);
        assert_eq!(period.end_unix_ms(), 31 * MILLIS_PER_DAY);
    }

    #[test]
    fn leap_february_has_29_days() {
        let period = Period::new(2024, 2).expect("period");
        assert_eq!(period.end_unix_ms() - period.start_unix_ms(), 29 * MILLIS_PER_DAY);

        let plain = Period::new(2025, 2).expect("period");
        assert_eq!(plain.end_unix_ms() - plain.start_unix_ms(), 28 * MILLIS_PER_DAY);
    }

    #[test]
    fn known_month_boundary() {
        // 2026-08-01T00:00:00Z == 1_785_542_400 seconds.
        let period = Period::new(2026, 8).expect("period");
        assert_eq!(period.start_unix_ms(), 1_785_542_400_000);
    }

    #[test]
    fn december_rolls_into_next_year() {
        let period = Period::new(2025, 12).expect("period");
        let january = Period::new(2026, 1).expect("period");
        assert_eq!(period.end_unix_ms(), january.start_unix_ms());
    }

    #[test]
    fn contains_is_inclusive_exclusive() {
        let period = Period::new(2026, 8).expect("period");
        assert!(period.contains(period.start_unix_ms()));
        assert!(period.contains(period.end_unix_ms() - 1));
        assert!(!period.contains(period.end_unix_ms()));
        assert!(!period.contains(period.start_unix_ms() - 1));
    }

    #[test]
    fn containing_maps_timestamps_to_months() {
        let august = Period::new(2026, 8).expect("period");
        assert_eq!(Period::containing(august.start_unix_ms()), august);
        assert_eq!(
            Period::containing(august.start_unix_ms() - 1),
            Period::new(2026, 7).expect("period")
        );
        assert_eq!(Period::containing(-5), Period::new(1970, 1).expect("period"));
    }

    #[test]
    fn string_round_trip() {
        let period = Period::new(2026, 8).expect("period");
        assert_eq!(period.year(), 2026);
        assert_eq!(period.month(), 8);
        assert_eq!(period.to_string(), "2026-08");
        assert_eq!(Period::try_from("2026-08".to_string()), Ok(period));

        let json = serde_json::to_string(&period).expect("serialize");
        assert_eq!(json, "\"2026-08\"");
        let back: Period = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, period);
    }

    #[test]
    fn rejects_malformed_periods() {
        assert!(Period::try_from("2026-13".to_string()).is_err());
        assert!(Period::try_from("2026-00".to_string()).is_err());
        assert!(Period::try_from("0001-05".to_string()).is_err());
        assert!(Period::try_from("august".to_string()).is_err());
        assert!(Period::new(2026, 0).is_err());
    }
}
