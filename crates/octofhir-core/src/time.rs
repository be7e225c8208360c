//! FHIR `date` / `dateTime` values with precision, and date search comparators.
//!
//! FHIR dates carry their own precision (`2020`, `2020-02`, `2020-02-03`,
//! `2020-02-03T10:00:00Z`). Each value stands for a range of instants, and
//! date search parameters compare ranges rather than points.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::{Date, Duration, Month, OffsetDateTime, PrimitiveDateTime};

use crate::error::{CoreError, Result};

/// Search prefix for ordered parameter types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl Comparator {
    /// The fixed fan-out re-issued for every date search value.
    pub const FAN_OUT: [Comparator; 4] = [
        Comparator::Gt,
        Comparator::Lt,
        Comparator::Le,
        Comparator::Ge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::Eq => "eq",
            Comparator::Ne => "ne",
            Comparator::Gt => "gt",
            Comparator::Lt => "lt",
            Comparator::Ge => "ge",
            Comparator::Le => "le",
        }
    }

    /// Split a search value into its prefix and the remaining value.
    /// Values without a recognised prefix are `eq`.
    pub fn split_prefix(value: &str) -> (Comparator, &str) {
        if value.len() > 2 && value.is_char_boundary(2) {
            let (prefix, rest) = value.split_at(2);
            if let Ok(comparator) = prefix.parse() {
                return (comparator, rest);
            }
        }
        (Comparator::Eq, value)
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Comparator {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "eq" => Ok(Comparator::Eq),
            "ne" => Ok(Comparator::Ne),
            "gt" => Ok(Comparator::Gt),
            "lt" => Ok(Comparator::Lt),
            "ge" => Ok(Comparator::Ge),
            "le" => Ok(Comparator::Le),
            other => Err(CoreError::InvalidComparator(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePrecision {
    Year,
    Month,
    Day,
    Instant,
}

/// A parsed FHIR date or dateTime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FhirDateTime {
    start: OffsetDateTime,
    precision: DatePrecision,
}

impl FhirDateTime {
    pub fn precision(&self) -> DatePrecision {
        self.precision
    }

    /// First instant covered by this value.
    pub fn start(&self) -> OffsetDateTime {
        self.start
    }

    /// Last instant covered by this value.
    pub fn end(&self) -> OffsetDateTime {
        let next = match self.precision {
            DatePrecision::Year => first_of_month(self.start.year() + 1, Month::January),
            DatePrecision::Month => {
                let (year, month) = add_months(self.start.year(), self.start.month(), 1);
                first_of_month(year, month)
            }
            DatePrecision::Day => self
                .start
                .date()
                .next_day()
                .map(|d| d.midnight().assume_utc()),
            DatePrecision::Instant => return self.start,
        };
        next.map(|n| n - Duration::nanoseconds(1))
            .unwrap_or(self.start)
    }

    /// Shift by one unit of the value's own precision (days for instants).
    pub fn shifted(&self, steps: i32) -> Option<FhirDateTime> {
        let start = match self.precision {
            DatePrecision::Year => first_of_month(self.start.year() + steps, Month::January)?,
            DatePrecision::Month => {
                let (year, month) = add_months(self.start.year(), self.start.month(), steps);
                first_of_month(year, month)?
            }
            DatePrecision::Day | DatePrecision::Instant => self
                .start
                .checked_add(Duration::days(i64::from(steps)))?,
        };
        Some(FhirDateTime {
            start,
            precision: self.precision,
        })
    }
}

impl fmt::Display for FhirDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.start;
        match self.precision {
            DatePrecision::Year => write!(f, "{:04}", s.year()),
            DatePrecision::Month => write!(f, "{:04}-{:02}", s.year(), u8::from(s.month())),
            DatePrecision::Day => write!(
                f,
                "{:04}-{:02}-{:02}",
                s.year(),
                u8::from(s.month()),
                s.day()
            ),
            DatePrecision::Instant => {
                let formatted = s.format(&Rfc3339).map_err(|_| fmt::Error)?;
                f.write_str(&formatted)
            }
        }
    }
}

impl FromStr for FhirDateTime {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || CoreError::invalid_date_time(s.to_string());

        if s.contains('T') {
            let start = OffsetDateTime::parse(s, &Rfc3339)
                .or_else(|_| {
                    let format = time::macros::format_description!(
                        "[year]-[month]-[day]T[hour]:[minute]:[second]"
                    );
                    PrimitiveDateTime::parse(s, format).map(PrimitiveDateTime::assume_utc)
                })
                .map_err(|_| invalid())?;
            return Ok(FhirDateTime {
                start,
                precision: DatePrecision::Instant,
            });
        }

        let parts: Vec<&str> = s.split('-').collect();
        let year: i32 = parts
            .first()
            .filter(|p| p.len() == 4)
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let month = match parts.get(1) {
            Some(m) => {
                let n: u8 = m.parse().map_err(|_| invalid())?;
                Some(Month::try_from(n).map_err(|_| invalid())?)
            }
            None => None,
        };
        let day = match parts.get(2) {
            Some(d) => Some(d.parse::<u8>().map_err(|_| invalid())?),
            None => None,
        };
        if parts.len() > 3 {
            return Err(invalid());
        }

        let (month_value, day_value, precision) = match (month, day) {
            (None, _) => (Month::January, 1, DatePrecision::Year),
            (Some(m), None) => (m, 1, DatePrecision::Month),
            (Some(m), Some(d)) => (m, d, DatePrecision::Day),
        };
        let date = Date::from_calendar_date(year, month_value, day_value).map_err(|_| invalid())?;

        Ok(FhirDateTime {
            start: date.midnight().assume_utc(),
            precision,
        })
    }
}

fn first_of_month(year: i32, month: Month) -> Option<OffsetDateTime> {
    Date::from_calendar_date(year, month, 1)
        .ok()
        .map(|d| d.midnight().assume_utc())
}

fn add_months(year: i32, month: Month, delta: i32) -> (i32, Month) {
    let zero_based = i32::from(u8::from(month)) - 1 + delta;
    let year = year + zero_based.div_euclid(12);
    let month_number = (zero_based.rem_euclid(12) + 1) as u8;
    // month_number is always 1..=12
    let month = Month::try_from(month_number).unwrap_or(Month::January);
    (year, month)
}

/// Inclusive instant range covered by a date element. `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<OffsetDateTime>,
    pub end: Option<OffsetDateTime>,
}

impl DateRange {
    /// Range of a `date`/`dateTime`/`instant` string or a `Period` object.
    pub fn from_element(element: &Value) -> Option<DateRange> {
        match element {
            Value::String(s) => {
                let parsed: FhirDateTime = s.parse().ok()?;
                Some(DateRange {
                    start: Some(parsed.start()),
                    end: Some(parsed.end()),
                })
            }
            Value::Object(map) => {
                let start = map
                    .get("start")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<FhirDateTime>().ok());
                let end = map
                    .get("end")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<FhirDateTime>().ok());
                if start.is_none() && end.is_none() {
                    return None;
                }
                Some(DateRange {
                    start: start.map(|s| s.start()),
                    end: end.map(|e| e.end()),
                })
            }
            _ => None,
        }
    }
}

/// Whether `target` satisfies the date search value (prefix included).
///
/// `eq` accepts any overlap between the target and the search range, so a
/// Period matches a search on a date it spans.
pub fn matches_date_search(search_value: &str, target: &DateRange) -> bool {
    let (comparator, raw) = Comparator::split_prefix(search_value);
    let Ok(search) = raw.parse::<FhirDateTime>() else {
        return false;
    };
    let (search_start, search_end) = (search.start(), search.end());
    let target_start = target.start.unwrap_or(PrimitiveDateTime::MIN.assume_utc());
    let target_end = target.end.unwrap_or(PrimitiveDateTime::MAX.assume_utc());

    match comparator {
        Comparator::Eq => target_start <= search_end && target_end >= search_start,
        Comparator::Ne => target_start > search_end || target_end < search_start,
        Comparator::Lt => target_start < search_start,
        Comparator::Le => target_start <= search_end,
        Comparator::Gt => target_end > search_end,
        Comparator::Ge => target_end >= search_start,
    }
}

/// Build a prefixed search value that still matches `date`.
///
/// `gt`/`ge` move one unit earlier and `lt`/`le` one unit later. Values that
/// cannot be parsed are returned with the prefix and no shift.
pub fn comparator_value(comparator: Comparator, date: &str) -> String {
    let steps = match comparator {
        Comparator::Gt | Comparator::Ge => -1,
        Comparator::Lt | Comparator::Le => 1,
        Comparator::Eq | Comparator::Ne => 0,
    };
    let shifted = date
        .parse::<FhirDateTime>()
        .ok()
        .and_then(|d| d.shifted(steps))
        .map(|d| d.to_string())
        .unwrap_or_else(|| date.to_string());
    format!("{}{}", comparator.as_str(), shifted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_precisions() {
        let year: FhirDateTime = "2020".parse().unwrap();
        assert_eq!(year.precision(), DatePrecision::Year);
        assert_eq!(year.to_string(), "2020");

        let month: FhirDateTime = "2020-02".parse().unwrap();
        assert_eq!(month.precision(), DatePrecision::Month);
        assert_eq!(month.to_string(), "2020-02");

        let day: FhirDateTime = "2020-02-29".parse().unwrap();
        assert_eq!(day.precision(), DatePrecision::Day);
        assert_eq!(day.to_string(), "2020-02-29");

        let instant: FhirDateTime = "2020-02-03T10:00:00Z".parse().unwrap();
        assert_eq!(instant.precision(), DatePrecision::Instant);

        let local: FhirDateTime = "2020-02-03T10:00:00".parse().unwrap();
        assert_eq!(local.precision(), DatePrecision::Instant);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<FhirDateTime>().is_err());
        assert!("20".parse::<FhirDateTime>().is_err());
        assert!("2020-13".parse::<FhirDateTime>().is_err());
        assert!("2021-02-29".parse::<FhirDateTime>().is_err());
        assert!("2020-01-01-01".parse::<FhirDateTime>().is_err());
        assert!("yesterday".parse::<FhirDateTime>().is_err());
    }

    #[test]
    fn test_end_of_precision() {
        let month: FhirDateTime = "2020-12".parse().unwrap();
        let end = month.end();
        assert_eq!(end.year(), 2020);
        assert_eq!(end.month(), Month::December);
        assert_eq!(end.day(), 31);
    }

    #[test]
    fn test_comparator_prefix() {
        assert_eq!(Comparator::split_prefix("ge2020"), (Comparator::Ge, "2020"));
        assert_eq!(Comparator::split_prefix("2020"), (Comparator::Eq, "2020"));
        assert_eq!(Comparator::split_prefix("xx2020"), (Comparator::Eq, "xx2020"));
    }

    #[test]
    fn test_comparator_value_shifts() {
        assert_eq!(comparator_value(Comparator::Gt, "2020-03-01"), "gt2020-02-29");
        assert_eq!(comparator_value(Comparator::Le, "2020-12-31"), "le2021-01-01");
        assert_eq!(comparator_value(Comparator::Ge, "2020-01"), "ge2019-12");
        assert_eq!(comparator_value(Comparator::Lt, "2020"), "lt2021");
        assert_eq!(
            comparator_value(Comparator::Gt, "2020-02-03T10:00:00Z"),
            "gt2020-02-02T10:00:00Z"
        );
        assert_eq!(comparator_value(Comparator::Gt, "not-a-date"), "gtnot-a-date");
    }

    #[test]
    fn test_fan_out_values_match_original_date() {
        let target = DateRange::from_element(&json!("2020-02-03T10:00:00Z")).unwrap();
        for comparator in Comparator::FAN_OUT {
            let value = comparator_value(comparator, "2020-02-03T10:00:00Z");
            assert!(matches_date_search(&value, &target), "{value} should match");
        }
    }

    #[test]
    fn test_matches_period() {
        let period = DateRange::from_element(&json!({"start": "2019-05-01", "end": "2019-06-01"}))
            .unwrap();
        assert!(matches_date_search("2019", &period));
        assert!(matches_date_search("ge2019-05-15", &period));
        assert!(!matches_date_search("gt2019-07-01", &period));
        assert!(matches_date_search("lt2019-05-02", &period));
        assert!(matches_date_search("2019-05-01T08:00:00Z", &period));
        assert!(!matches_date_search("2019-07-01", &period));
        assert!(matches_date_search("ne2019-07-01", &period));

        let open = DateRange::from_element(&json!({"start": "2019-05-01"})).unwrap();
        assert!(matches_date_search("gt2030-01-01", &open));
        assert!(DateRange::from_element(&json!({})).is_none());
    }

    #[test]
    fn test_unparseable_search_value_never_matches() {
        let target = DateRange::from_element(&json!("2020")).unwrap();
        assert!(!matches_date_search("eqsoon", &target));
    }
}
