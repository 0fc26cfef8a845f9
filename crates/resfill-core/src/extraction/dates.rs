//! Date coercion for `FieldKind::Date` values.

use chrono::NaiveDate;
use regex::Captures;

use super::patterns::{DATE_CJK, DATE_COMPACT, DATE_YM, DATE_YMD, ONGOING};

/// Canonical text of an ongoing end date.
pub const PRESENT: &str = "present";

/// A coerced date value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateValue {
    Day(NaiveDate),
    Month { year: i32, month: u32 },
    Present,
}

impl DateValue {
    /// Parse a single date value. Returns `None` when no rule applies.
    pub fn parse(raw: &str) -> Option<Self> {
        let text = raw.trim();
        if text.is_empty() {
            return None;
        }

        if ONGOING.is_match(text) {
            return Some(DateValue::Present);
        }

        if let Some(caps) = DATE_YMD.captures(text) {
            return day(&caps);
        }

        if let Some(caps) = DATE_CJK.captures(text) {
            return if caps.get(3).is_some() {
                day(&caps)
            } else {
                month(&caps)
            };
        }

        DATE_YM
            .captures(text)
            .or_else(|| DATE_COMPACT.captures(text))
            .and_then(|caps| month(&caps))
    }

    /// `YYYY-MM-DD`, `YYYY-MM` or `present`.
    pub fn render(&self) -> String {
        match self {
            DateValue::Day(date) => date.format("%Y-%m-%d").to_string(),
            DateValue::Month { year, month } => format!("{year:04}-{month:02}"),
            DateValue::Present => PRESENT.to_string(),
        }
    }
}

fn number<T: std::str::FromStr>(caps: &Captures<'_>, i: usize) -> Option<T> {
    caps.get(i)?.as_str().parse().ok()
}

fn day(caps: &Captures<'_>) -> Option<DateValue> {
    let date = NaiveDate::from_ymd_opt(number(caps, 1)?, number(caps, 2)?, number(caps, 3)?)?;
    Some(DateValue::Day(date))
}

fn month(caps: &Captures<'_>) -> Option<DateValue> {
    let year: i32 = number(caps, 1)?;
    let month: u32 = number(caps, 2)?;
    // validates the month
    NaiveDate::from_ymd_opt(year, month, 1)?;
    Some(DateValue::Month { year, month })
}

/// Coerce a date to its canonical text, or `None` if no rule applies.
pub fn coerce_date(raw: &str) -> Option<String> {
    DateValue::parse(raw).map(|d| d.render())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_date_rules() {
        let cases = [
            ("2020-03-15", Some("2020-03-15")),
            ("2020-3", Some("2020-03")),
            ("2020/03", Some("2020-03")),
            ("2020/3/5", Some("2020-03-05")),
            ("2019.09", Some("2019-09")),
            ("2019.09.01", Some("2019-09-01")),
            ("2018年9月", Some("2018-09")),
            ("2018 年 9 月 1 日", Some("2018-09-01")),
            ("201809", Some("2018-09")),
            ("至今", Some("present")),
            ("Present", Some("present")),
            (" now ", Some("present")),
        ];

        for (raw, expected) in cases {
            assert_eq!(coerce_date(raw).as_deref(), expected, "input {raw:?}");
        }
    }

    #[test]
    fn test_invalid_calendar_values_rejected() {
        assert_eq!(coerce_date("2020-13"), None);
        assert_eq!(coerce_date("2021-02-30"), None);
        assert_eq!(coerce_date("201813"), None);
    }

    #[test]
    fn test_unrecognized_formats() {
        assert_eq!(coerce_date("2018"), None);
        assert_eq!(coerce_date("Sept 2018"), None);
        assert_eq!(coerce_date(""), None);
    }
}
