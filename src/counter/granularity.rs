//! Time granularity levels for bucketed counters.
//!
//! Levels are ordered coarsest to finest: `None` (the all-time bucket only),
//! then `Year` down to `Second`. A level's ordinal doubles as the number of
//! dated bucket keys a counter at that granularity writes per increment.

use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Timelike, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TimeGranularity {
    /// Only the all-time bucket is tracked.
    #[default]
    None,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl TimeGranularity {
    /// All levels, coarsest first.
    pub const ALL: [TimeGranularity; 7] = [
        TimeGranularity::None,
        TimeGranularity::Year,
        TimeGranularity::Month,
        TimeGranularity::Day,
        TimeGranularity::Hour,
        TimeGranularity::Minute,
        TimeGranularity::Second,
    ];

    /// Position in the `None..Second` ordering.
    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeGranularity::None => "none",
            TimeGranularity::Year => "year",
            TimeGranularity::Month => "month",
            TimeGranularity::Day => "day",
            TimeGranularity::Hour => "hour",
            TimeGranularity::Minute => "minute",
            TimeGranularity::Second => "second",
        }
    }

    /// Parse a level name. Anything unrecognized normalizes to `None`, so a
    /// counter configured with a bad granularity degrades to all-time only.
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "year" => TimeGranularity::Year,
            "month" => TimeGranularity::Month,
            "day" => TimeGranularity::Day,
            "hour" => TimeGranularity::Hour,
            "minute" => TimeGranularity::Minute,
            "second" => TimeGranularity::Second,
            _ => TimeGranularity::None,
        }
    }

    /// Level for a numeric ordinal; out-of-range normalizes to `None`.
    pub fn from_ordinal_lenient(n: i64) -> Self {
        match usize::try_from(n) {
            Ok(i) if i < Self::ALL.len() => Self::ALL[i],
            _ => TimeGranularity::None,
        }
    }

    /// Digits in a bucket stamp at this resolution; 0 for `None`.
    pub(crate) fn stamp_len(self) -> usize {
        match self {
            TimeGranularity::None => 0,
            TimeGranularity::Year => 4,
            TimeGranularity::Month => 6,
            TimeGranularity::Day => 8,
            TimeGranularity::Hour => 10,
            TimeGranularity::Minute => 12,
            TimeGranularity::Second => 14,
        }
    }

    /// Inverse of [`TimeGranularity::stamp_len`] for dated levels.
    pub(crate) fn from_stamp_len(len: usize) -> Option<Self> {
        TimeGranularity::ALL[1..]
            .iter()
            .copied()
            .find(|level| level.stamp_len() == len)
    }

    /// Format `at` (UTC) as this level's bucket stamp, e.g. `201501` for a
    /// month bucket. `None` has no stamp.
    pub(crate) fn stamp(self, at: DateTime<Utc>) -> Option<String> {
        let fmt = match self {
            TimeGranularity::None => return None,
            TimeGranularity::Year => "%Y",
            TimeGranularity::Month => "%Y%m",
            TimeGranularity::Day => "%Y%m%d",
            TimeGranularity::Hour => "%Y%m%d%H",
            TimeGranularity::Minute => "%Y%m%d%H%M",
            TimeGranularity::Second => "%Y%m%d%H%M%S",
        };
        Some(at.format(fmt).to_string())
    }

    /// Truncate `at` down to this level's bucket boundary.
    pub fn truncate(self, at: DateTime<Utc>) -> DateTime<Utc> {
        let (y, mo, d, h, mi, s) = (
            at.year(),
            at.month(),
            at.day(),
            at.hour(),
            at.minute(),
            at.second(),
        );
        let (y, mo, d, h, mi, s) = match self {
            TimeGranularity::None => return at,
            TimeGranularity::Year => (y, 1, 1, 0, 0, 0),
            TimeGranularity::Month => (y, mo, 1, 0, 0, 0),
            TimeGranularity::Day => (y, mo, d, 0, 0, 0),
            TimeGranularity::Hour => (y, mo, d, h, 0, 0),
            TimeGranularity::Minute => (y, mo, d, h, mi, 0),
            TimeGranularity::Second => (y, mo, d, h, mi, s),
        };
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s)
            .single()
            .expect("UTC timestamps are unambiguous")
    }

    /// Advance one unit at this level. Callers pass bucket boundaries, so
    /// year/month arithmetic never lands on an invalid day.
    pub fn step(self, at: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            TimeGranularity::None => at,
            TimeGranularity::Year => at
                .with_year(at.year() + 1)
                .expect("year arithmetic overflow"),
            TimeGranularity::Month => at
                .checked_add_months(Months::new(1))
                .expect("month arithmetic overflow"),
            TimeGranularity::Day => at
                .checked_add_signed(Duration::days(1))
                .expect("timestamp arithmetic overflow"),
            TimeGranularity::Hour => at
                .checked_add_signed(Duration::hours(1))
                .expect("timestamp arithmetic overflow"),
            TimeGranularity::Minute => at
                .checked_add_signed(Duration::minutes(1))
                .expect("timestamp arithmetic overflow"),
            TimeGranularity::Second => at
                .checked_add_signed(Duration::seconds(1))
                .expect("timestamp arithmetic overflow"),
        }
    }
}

impl std::fmt::Display for TimeGranularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TimeGranularity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TimeGranularity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct GranularityVisitor;

        impl Visitor<'_> for GranularityVisitor {
            type Value = TimeGranularity;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a granularity name or level number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(TimeGranularity::parse_lenient(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(TimeGranularity::from_ordinal_lenient(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(TimeGranularity::from_ordinal_lenient(
                    i64::try_from(v).unwrap_or(-1),
                ))
            }
        }

        deserializer.deserialize_any(GranularityVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_ordinals_are_ordered_coarsest_first() {
        assert_eq!(TimeGranularity::None.ordinal(), 0);
        assert_eq!(TimeGranularity::Year.ordinal(), 1);
        assert_eq!(TimeGranularity::Second.ordinal(), 6);
        assert!(TimeGranularity::Year < TimeGranularity::Second);
    }

    #[test]
    fn test_parse_lenient_normalizes_unknown_to_none() {
        assert_eq!(
            TimeGranularity::parse_lenient("minute"),
            TimeGranularity::Minute
        );
        assert_eq!(TimeGranularity::parse_lenient("none"), TimeGranularity::None);
        assert_eq!(
            TimeGranularity::parse_lenient("total"),
            TimeGranularity::None
        );
        assert_eq!(
            TimeGranularity::parse_lenient("fortnight"),
            TimeGranularity::None
        );
    }

    #[test]
    fn test_from_ordinal_lenient_resets_out_of_range() {
        assert_eq!(TimeGranularity::from_ordinal_lenient(3), TimeGranularity::Day);
        assert_eq!(
            TimeGranularity::from_ordinal_lenient(-10),
            TimeGranularity::None
        );
        assert_eq!(
            TimeGranularity::from_ordinal_lenient(10),
            TimeGranularity::None
        );
    }

    #[test]
    fn test_stamp_formats() {
        let t = at(2015, 1, 2, 3, 4, 5);
        assert_eq!(TimeGranularity::None.stamp(t), None);
        assert_eq!(TimeGranularity::Year.stamp(t).unwrap(), "2015");
        assert_eq!(TimeGranularity::Month.stamp(t).unwrap(), "201501");
        assert_eq!(TimeGranularity::Day.stamp(t).unwrap(), "20150102");
        assert_eq!(TimeGranularity::Hour.stamp(t).unwrap(), "2015010203");
        assert_eq!(TimeGranularity::Minute.stamp(t).unwrap(), "201501020304");
        assert_eq!(TimeGranularity::Second.stamp(t).unwrap(), "20150102030405");
    }

    #[test]
    fn test_stamp_len_roundtrip() {
        for level in &TimeGranularity::ALL[1..] {
            assert_eq!(
                TimeGranularity::from_stamp_len(level.stamp_len()),
                Some(*level)
            );
        }
        assert_eq!(TimeGranularity::from_stamp_len(0), None);
        assert_eq!(TimeGranularity::from_stamp_len(5), None);
    }

    #[test]
    fn test_truncate() {
        let t = at(2015, 6, 15, 12, 30, 45);
        assert_eq!(TimeGranularity::Year.truncate(t), at(2015, 1, 1, 0, 0, 0));
        assert_eq!(TimeGranularity::Month.truncate(t), at(2015, 6, 1, 0, 0, 0));
        assert_eq!(TimeGranularity::Day.truncate(t), at(2015, 6, 15, 0, 0, 0));
        assert_eq!(TimeGranularity::Hour.truncate(t), at(2015, 6, 15, 12, 0, 0));
        assert_eq!(
            TimeGranularity::Minute.truncate(t),
            at(2015, 6, 15, 12, 30, 0)
        );
        assert_eq!(TimeGranularity::Second.truncate(t), t);
        assert_eq!(TimeGranularity::None.truncate(t), t);
    }

    #[test]
    fn test_step_walks_one_unit() {
        assert_eq!(
            TimeGranularity::Year.step(at(2014, 1, 1, 0, 0, 0)),
            at(2015, 1, 1, 0, 0, 0)
        );
        assert_eq!(
            TimeGranularity::Month.step(at(2015, 12, 1, 0, 0, 0)),
            at(2016, 1, 1, 0, 0, 0)
        );
        assert_eq!(
            TimeGranularity::Day.step(at(2015, 2, 28, 0, 0, 0)),
            at(2015, 3, 1, 0, 0, 0)
        );
        assert_eq!(
            TimeGranularity::Second.step(at(2015, 1, 1, 0, 0, 59)),
            at(2015, 1, 1, 0, 1, 0)
        );
    }

    #[test]
    fn test_serde_forms() {
        #[derive(Deserialize)]
        struct Wrap {
            g: TimeGranularity,
        }
        let w: Wrap = toml::from_str("g = \"hour\"").unwrap();
        assert_eq!(w.g, TimeGranularity::Hour);
        let w: Wrap = toml::from_str("g = 2").unwrap();
        assert_eq!(w.g, TimeGranularity::Month);
        let w: Wrap = toml::from_str("g = \"bogus\"").unwrap();
        assert_eq!(w.g, TimeGranularity::None);
        let w: Wrap = toml::from_str("g = -3").unwrap();
        assert_eq!(w.g, TimeGranularity::None);
    }
}
