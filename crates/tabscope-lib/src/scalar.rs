//! Backend-neutral cell values.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::cmp::Ordering;

const UNIX_EPOCH_CE_DAYS: i32 = 719_163;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Seconds,
    Milliseconds,
    Microseconds,
    Nanoseconds,
}

impl TimeUnit {
    pub fn per_second(self) -> i64 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Milliseconds => 1_000,
            TimeUnit::Microseconds => 1_000_000,
            TimeUnit::Nanoseconds => 1_000_000_000,
        }
    }

    /// Number of fractional-second digits this unit can carry.
    pub fn subsec_digits(self) -> usize {
        match self {
            TimeUnit::Seconds => 0,
            TimeUnit::Milliseconds => 3,
            TimeUnit::Microseconds => 6,
            TimeUnit::Nanoseconds => 9,
        }
    }
}

/// A single cell read out of a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    /// `ts` is wall-clock UTC; `tz` is the column's zone when known.
    Datetime {
        ts: NaiveDateTime,
        unit: TimeUnit,
        tz: Option<String>,
    },
    Time(NaiveTime),
    /// Anything without a dedicated variant, carried as its display string.
    Other(String),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Null or NaN. Missing values sort last and never match a comparison.
    pub fn is_missing(&self) -> bool {
        match self {
            Scalar::Null => true,
            Scalar::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    pub fn date_from_epoch_days(days: i64) -> Option<NaiveDate> {
        let days = i32::try_from(days).ok()?;
        NaiveDate::from_num_days_from_ce_opt(UNIX_EPOCH_CE_DAYS.checked_add(days)?)
    }

    pub fn datetime_from_epoch(value: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
        let dt = match unit {
            TimeUnit::Seconds => DateTime::from_timestamp(value, 0),
            TimeUnit::Milliseconds => DateTime::from_timestamp_millis(value),
            TimeUnit::Microseconds => DateTime::from_timestamp_micros(value),
            TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(value)),
        };
        dt.map(|d| d.naive_utc())
    }

    pub fn time_from_nanos(nanos: i64) -> Option<NaiveTime> {
        let nanos = u64::try_from(nanos).ok()?;
        let secs = u32::try_from(nanos / 1_000_000_000).ok()?;
        NaiveTime::from_num_seconds_from_midnight_opt(secs, (nanos % 1_000_000_000) as u32)
    }

    /// Numeric view used by aggregates and histograms: dates become epoch
    /// days, datetimes epoch counts in their unit, times seconds since midnight.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            Scalar::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Scalar::Date(d) => Some((d.num_days_from_ce() - UNIX_EPOCH_CE_DAYS) as f64),
            Scalar::Datetime { ts, unit, .. } => Some(datetime_to_epoch(ts, *unit) as f64),
            Scalar::Time(t) => Some(
                t.num_seconds_from_midnight() as f64 + t.nanosecond() as f64 / 1_000_000_000.0,
            ),
            _ => None,
        }
    }

    /// Ordering class used when a column mixes value kinds.
    pub fn type_rank(&self) -> u8 {
        match self {
            Scalar::Bool(_) => 0,
            Scalar::Int(_) | Scalar::Float(_) => 1,
            Scalar::Str(_) => 2,
            Scalar::Date(_) => 3,
            Scalar::Datetime { .. } => 4,
            Scalar::Time(_) => 5,
            Scalar::Other(_) => 6,
            Scalar::Null => 7,
        }
    }

    /// Total order over present values. Values of different kinds order by
    /// kind; callers handle missing values before calling this.
    pub fn cmp_present(&self, other: &Scalar) -> Ordering {
        match (self, other) {
            (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
            (Scalar::Int(a), Scalar::Int(b)) => a.cmp(b),
            (Scalar::Int(_) | Scalar::Float(_), Scalar::Int(_) | Scalar::Float(_)) => {
                let a = self.as_f64().unwrap_or(f64::NAN);
                let b = other.as_f64().unwrap_or(f64::NAN);
                a.total_cmp(&b)
            }
            (Scalar::Str(a), Scalar::Str(b)) => a.cmp(b),
            (Scalar::Date(a), Scalar::Date(b)) => a.cmp(b),
            (Scalar::Datetime { ts: a, .. }, Scalar::Datetime { ts: b, .. }) => a.cmp(b),
            (Scalar::Time(a), Scalar::Time(b)) => a.cmp(b),
            (Scalar::Other(a), Scalar::Other(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    /// Ordering used by sorts: missing values last regardless of direction,
    /// present values compared with [`Scalar::cmp_present`].
    pub fn cmp_for_sort(&self, other: &Scalar, ascending: bool) -> Ordering {
        match (self.is_missing(), other.is_missing()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ord = self.cmp_present(other);
                if ascending {
                    ord
                } else {
                    ord.reverse()
                }
            }
        }
    }

    /// Key under which equal values group together in value counts.
    pub fn group_key(&self) -> (u8, String) {
        let text = match self {
            Scalar::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => (*f as i64).to_string(),
            _ => self.to_raw_string(),
        };
        (self.type_rank(), text)
    }

    /// Unformatted text form, used for exports and text matching.
    pub fn to_raw_string(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Str(s) | Scalar::Other(s) => s.clone(),
            Scalar::Date(d) => d.format("%Y-%m-%d").to_string(),
            Scalar::Datetime { ts, unit, .. } => format_datetime(ts, *unit),
            Scalar::Time(t) => {
                let base = t.format("%H:%M:%S").to_string();
                let frac = t.nanosecond();
                if frac == 0 {
                    base
                } else {
                    let digits = format!("{:09}", frac);
                    format!("{}.{}", base, digits.trim_end_matches('0'))
                }
            }
        }
    }
}

pub fn datetime_to_epoch(ts: &NaiveDateTime, unit: TimeUnit) -> i64 {
    let utc = ts.and_utc();
    match unit {
        TimeUnit::Seconds => utc.timestamp(),
        TimeUnit::Milliseconds => utc.timestamp_millis(),
        TimeUnit::Microseconds => utc.timestamp_micros(),
        TimeUnit::Nanoseconds => utc.timestamp_nanos_opt().unwrap_or(i64::MAX),
    }
}

/// `%Y-%m-%d %H:%M:%S` followed by as many sub-second digits as the unit
/// carries, with trailing zeros trimmed.
pub fn format_datetime(ts: &NaiveDateTime, unit: TimeUnit) -> String {
    let base = ts.format("%Y-%m-%d %H:%M:%S").to_string();
    let digits = unit.subsec_digits();
    if digits == 0 {
        return base;
    }
    let nanos = format!("{:09}", ts.nanosecond() % 1_000_000_000);
    let frac = nanos[..digits].trim_end_matches('0');
    if frac.is_empty() {
        base
    } else {
        format!("{}.{}", base, frac)
    }
}
