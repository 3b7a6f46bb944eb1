//! Value objects shared across the domain
//!
//! Identifiers and the tolerant date handling used for studbook pages.

use std::fmt;

use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// External identifier assigned by the registry (`hid` in detail page urls)
pub type StudbookId = u32;

/// Internal identifier assigned by the record store on creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HorseId(pub i64);

impl HorseId {
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for HorseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

static HID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[?&]hid=(\d+)").expect("hid pattern is a valid regex"));

/// Extract the studbook id from a detail page link (`...Horse.aspx?hid=1234`)
#[must_use]
pub fn extract_studbook_id(link: &str) -> Option<StudbookId> {
    HID_PATTERN
        .captures(link)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Leading decimal digits of a component, the way the registry pages are read
fn leading_number(component: &str) -> Option<u32> {
    let digits: String = component
        .trim()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Parse a `day/month/year` studbook date into a UTC midnight timestamp.
///
/// Day or month that are zero, missing or non numeric default to 1. Values
/// past the end of the calendar roll over (`31/02/2012` is 2 March 2012,
/// month 13 is January of the next year). A missing or unparsable year
/// yields `None`.
#[must_use]
pub fn parse_studbook_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let parts: Vec<&str> = raw.split('/').collect();
    let year = parts.get(2).and_then(|p| leading_number(p))?;
    let year = i32::try_from(year).ok()?;

    let month = parts
        .get(1)
        .and_then(|p| leading_number(p))
        .filter(|m| *m >= 1)
        .unwrap_or(1);

    let day = parts
        .first()
        .and_then(|p| leading_number(p))
        .filter(|d| *d >= 1)
        .unwrap_or(1);

    let date = NaiveDate::from_ymd_opt(year, 1, 1)?
        .checked_add_months(Months::new(month - 1))?
        .checked_add_days(Days::new(u64::from(day - 1)))?;

    date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use proptest::prelude::*;
    use rstest::rstest;

    fn ymd(d: DateTime<Utc>) -> (i32, u32, u32) {
        (d.year(), d.month(), d.day())
    }

    #[test]
    fn parses_full_date_as_utc_midnight() {
        let date = parse_studbook_date("15/06/2010").expect("date");
        assert_eq!(ymd(date), (2010, 6, 15));
        assert_eq!(date.hour(), 0);
        assert_eq!(date.minute(), 0);
    }

    #[rstest]
    #[case("31/02/2012", (2012, 3, 2))]
    #[case("30/02/2011", (2011, 3, 2))]
    #[case("12/13/2001", (2002, 1, 12))]
    #[case("32/12/1999", (2000, 1, 1))]
    fn out_of_calendar_components_roll_over(#[case] raw: &str, #[case] expected: (i32, u32, u32)) {
        let date = parse_studbook_date(raw).expect("date");
        assert_eq!(ymd(date), expected);
    }

    #[test]
    fn zero_day_and_month_default_to_first() {
        let date = parse_studbook_date("00/00/2010").expect("date");
        assert_eq!(ymd(date), (2010, 1, 1));
    }

    #[rstest]
    #[case("abc")]
    #[case("")]
    #[case("   ")]
    #[case("15/06")]
    #[case("15/06/xx")]
    fn unparsable_input_is_absent(#[case] raw: &str) {
        assert!(parse_studbook_date(raw).is_none());
    }

    #[rstest]
    #[case("xx/06/2010", (2010, 6, 1))]
    #[case("15/yy/2010", (2010, 1, 15))]
    #[case(" 3/4/1999 ", (1999, 4, 3))]
    fn tolerant_components(#[case] raw: &str, #[case] expected: (i32, u32, u32)) {
        let date = parse_studbook_date(raw).expect("date");
        assert_eq!(ymd(date), expected);
    }

    #[rstest]
    #[case("https://www.studbook.org.au/Horse.aspx?hid=12345", Some(12345))]
    #[case("Horse.aspx?HID=77&tab=2", Some(77))]
    #[case("Horse.aspx?x=1&hid=9", Some(9))]
    #[case("Horse.aspx?hid=", None)]
    #[case("https://www.studbook.org.au/Default.aspx", None)]
    fn studbook_id_from_link(#[case] link: &str, #[case] expected: Option<StudbookId>) {
        assert_eq!(extract_studbook_id(link), expected);
    }

    proptest! {
        #[test]
        fn valid_calendar_dates_round_trip(y in 1800i32..2100, m in 1u32..=12, d in 1u32..=28) {
            let raw = format!("{d:02}/{m:02}/{y}");
            let parsed = parse_studbook_date(&raw).expect("date");
            prop_assert_eq!(ymd(parsed), (y, m, d));
        }

        #[test]
        fn never_panics_on_arbitrary_input(raw in ".*") {
            let _ = parse_studbook_date(&raw);
        }
    }
}
