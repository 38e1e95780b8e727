use std::fmt;

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// The weekly bucket that scopes a record set, identified by ISO week
/// number and ISO week-based year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeriodKey {
    pub year: i32,
    pub week: u32,
}

impl PeriodKey {
    pub fn new(year: i32, week: u32) -> Self {
        Self { year, week }
    }

    /// Period the given date falls in. Dates in late December or early
    /// January may belong to a different week-based year than their
    /// calendar year.
    pub fn from_date(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }

    /// Period one week after the given date. Derived through date
    /// arithmetic so the wrap at week 52/53 lands in the right year.
    pub fn following(date: NaiveDate) -> Self {
        Self::from_date(date + Days::new(7))
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_follows_iso_week_numbering() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 21).unwrap();
        assert_eq!(PeriodKey::from_date(date), PeriodKey::new(2026, 34));
    }

    #[test]
    fn january_dates_can_belong_to_previous_iso_year() {
        // 2027-01-01 falls in week 53 of 2026.
        let date = NaiveDate::from_ymd_opt(2027, 1, 1).unwrap();
        assert_eq!(PeriodKey::from_date(date), PeriodKey::new(2026, 53));
    }

    #[test]
    fn following_wraps_into_the_new_year() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 26).unwrap();
        assert_eq!(PeriodKey::from_date(date), PeriodKey::new(2025, 52));
        assert_eq!(PeriodKey::following(date), PeriodKey::new(2026, 1));
    }

    #[test]
    fn following_handles_53_week_years() {
        // 2026 has 53 ISO weeks, so the period after 2026-W53 is 2027-W01.
        let date = NaiveDate::from_ymd_opt(2027, 1, 1).unwrap();
        assert_eq!(PeriodKey::following(date), PeriodKey::new(2027, 1));
    }

    #[test]
    fn display_pads_week_number() {
        assert_eq!(PeriodKey::new(2026, 1).to_string(), "2026-W01");
        assert_eq!(PeriodKey::new(2026, 34).to_string(), "2026-W34");
    }
}
