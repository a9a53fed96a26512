//! Bucket TTL policy.
//!
//! Finer buckets expire sooner: a per-second bucket lives ten minutes, a
//! monthly bucket ten years, and year/all-time buckets never expire unless
//! configured otherwise. TTLs are applied once, at a bucket's first write,
//! and never renewed; the window starts with the first event.

use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::collections::HashMap;

use super::granularity::TimeGranularity;

/// TTL value meaning "never expire".
pub const NEVER_EXPIRE: i64 = -1;

/// Built-in TTLs indexed by level ordinal: all-time, year, month, day,
/// hour, minute, second.
const DEFAULT_TTLS: [i64; 7] = [
    NEVER_EXPIRE,
    NEVER_EXPIRE,
    315_360_000, // month buckets: 10 * 365 days
    63_072_000,  // day buckets: 2 * 365 days
    2_678_400,   // hour buckets: 31 days
    43_200,      // minute buckets: 12 hours
    600,         // second buckets: 10 minutes
];

/// Per-level TTL overrides. Levels without an entry use the built-in
/// defaults. The all-time level is addressed by [`TimeGranularity::None`],
/// or in named form as `"0"`, `"total"`, or `"T"` (all equivalent).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpirationTable {
    overrides: [Option<i64>; 7],
}

impl ExpirationTable {
    pub fn new() -> Self {
        ExpirationTable::default()
    }

    /// Builder-style override for one level.
    pub fn with(mut self, level: TimeGranularity, ttl_secs: i64) -> Self {
        self.set(level, ttl_secs);
        self
    }

    pub fn set(&mut self, level: TimeGranularity, ttl_secs: i64) {
        self.overrides[level.ordinal()] = Some(ttl_secs);
    }

    /// Override a level by name, accepting the all-time spellings `"0"`,
    /// `"total"`, and `"T"` interchangeably.
    pub fn set_named(&mut self, level: &str, ttl_secs: i64) -> Result<(), crate::TallyError> {
        match parse_level(level) {
            Some(ordinal) => {
                self.overrides[ordinal] = Some(ttl_secs);
                Ok(())
            }
            None => Err(crate::TallyError::InvalidArgument(format!(
                "unknown expiration level '{}'",
                level
            ))),
        }
    }

    /// TTL in seconds for a level; the built-in default when no override is
    /// present. An override affects only its own level.
    pub fn ttl_for(&self, level: TimeGranularity) -> i64 {
        let ordinal = level.ordinal();
        self.overrides[ordinal].unwrap_or(DEFAULT_TTLS[ordinal])
    }
}

fn parse_level(s: &str) -> Option<usize> {
    match s {
        "0" | "total" | "T" => Some(0),
        "year" => Some(1),
        "month" => Some(2),
        "day" => Some(3),
        "hour" => Some(4),
        "minute" => Some(5),
        "second" => Some(6),
        _ => None,
    }
}

impl<'de> Deserialize<'de> for ExpirationTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = HashMap::<String, i64>::deserialize(deserializer)?;
        let mut table = ExpirationTable::new();
        for (name, ttl_secs) in raw {
            let ordinal = parse_level(&name).ok_or_else(|| {
                de::Error::custom(format!("unknown expiration level '{}'", name))
            })?;
            table.overrides[ordinal] = Some(ttl_secs);
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ttls() {
        let table = ExpirationTable::new();
        assert_eq!(table.ttl_for(TimeGranularity::Second), 600);
        assert_eq!(table.ttl_for(TimeGranularity::Minute), 43_200);
        assert_eq!(table.ttl_for(TimeGranularity::Hour), 2_678_400);
        assert_eq!(table.ttl_for(TimeGranularity::Day), 63_072_000);
        assert_eq!(table.ttl_for(TimeGranularity::Month), 315_360_000);
        assert_eq!(table.ttl_for(TimeGranularity::Year), NEVER_EXPIRE);
        assert_eq!(table.ttl_for(TimeGranularity::None), NEVER_EXPIRE);
    }

    #[test]
    fn test_override_affects_only_its_level() {
        let table = ExpirationTable::new().with(TimeGranularity::Day, 3600);
        assert_eq!(table.ttl_for(TimeGranularity::Day), 3600);
        assert_eq!(table.ttl_for(TimeGranularity::Hour), 2_678_400);
        assert_eq!(table.ttl_for(TimeGranularity::None), NEVER_EXPIRE);
    }

    #[test]
    fn test_all_time_spellings_are_equivalent() {
        for spelling in ["0", "total", "T"] {
            let mut table = ExpirationTable::new();
            table.set_named(spelling, 42).unwrap();
            assert_eq!(table.ttl_for(TimeGranularity::None), 42);
        }
    }

    #[test]
    fn test_unknown_level_is_rejected() {
        let mut table = ExpirationTable::new();
        let err = table.set_named("fortnight", 1).unwrap_err();
        assert!(matches!(err, crate::TallyError::InvalidArgument(_)));
    }

    #[test]
    fn test_deserialize_table() {
        #[derive(Deserialize)]
        struct Wrap {
            expiration: ExpirationTable,
        }
        let w: Wrap = toml::from_str("[expiration]\ntotal = 100\nyear = 10\n").unwrap();
        assert_eq!(w.expiration.ttl_for(TimeGranularity::None), 100);
        assert_eq!(w.expiration.ttl_for(TimeGranularity::Year), 10);
        assert_eq!(w.expiration.ttl_for(TimeGranularity::Second), 600);

        let w: Wrap = toml::from_str("[expiration]\n\"0\" = 2\n").unwrap();
        assert_eq!(w.expiration.ttl_for(TimeGranularity::None), 2);

        let w: Wrap = toml::from_str("[expiration]\nT = 4\n").unwrap();
        assert_eq!(w.expiration.ttl_for(TimeGranularity::None), 4);

        assert!(toml::from_str::<Wrap>("[expiration]\nfortnight = 1\n").is_err());
    }
}
