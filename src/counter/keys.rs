//! Bucket key derivation.
//!
//! A counter named `foo` under prefix `c` fans out into a family of keys:
//! the all-time key `c:foo`, one dated key per level down to the configured
//! granularity (`c:foo:2015`, `c:foo:201501`, ...), and a `:z` sibling per
//! bucket holding the qualifier leaderboard.

use chrono::{DateTime, Utc};

use super::granularity::TimeGranularity;

/// Marks the auxiliary ranked-set key for a bucket's qualifier leaderboard.
pub(crate) const QUALIFIER_SUFFIX: &str = ":z";

/// The ranked-set sibling of a bucket key.
pub(crate) fn qualifier_key(key: &str) -> String {
    format!("{}{}", key, QUALIFIER_SUFFIX)
}

#[derive(Debug, Clone)]
pub(crate) struct KeyBuilder {
    /// `<prefix>:<name>`, also the all-time bucket key.
    base: String,
    granularity: TimeGranularity,
}

impl KeyBuilder {
    pub fn new(prefix: &str, name: &str, granularity: TimeGranularity) -> Self {
        KeyBuilder {
            base: format!("{}:{}", prefix, name),
            granularity,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// All bucket keys for an increment at `at`, coarsest first. The
    /// all-time key always comes first; one dated key follows per level
    /// down to the configured granularity.
    pub fn keys(&self, at: DateTime<Utc>) -> Vec<String> {
        let mut keys = Vec::with_capacity(1 + self.granularity.ordinal());
        keys.push(self.base.clone());
        for level in &TimeGranularity::ALL[1..=self.granularity.ordinal()] {
            if let Some(stamp) = level.stamp(at) {
                keys.push(format!("{}:{}", self.base, stamp));
            }
        }
        debug_assert_eq!(
            keys.len(),
            1 + self.granularity.ordinal(),
            "Invariant violated: one key per level down to the granularity"
        );
        debug_assert!(
            keys.windows(2).all(|w| w[1].starts_with(w[0].as_str())),
            "Invariant violated: each key must prefix-extend the previous"
        );
        keys
    }

    /// The single bucket key at `level` for the instant `at`; the all-time
    /// key for `TimeGranularity::None`.
    pub fn key_at(&self, level: TimeGranularity, at: DateTime<Utc>) -> String {
        match level.stamp(at) {
            Some(stamp) => format!("{}:{}", self.base, stamp),
            None => self.base.clone(),
        }
    }

    /// Granularity implied by a key's stamp suffix. Keys without a dated
    /// stamp (the all-time key, unknown shapes) map to `None`; a trailing
    /// `:z` marker is ignored.
    pub fn level_of(&self, key: &str) -> TimeGranularity {
        let rest = match key.strip_prefix(self.base.as_str()) {
            Some(rest) => rest.strip_suffix(QUALIFIER_SUFFIX).unwrap_or(rest),
            None => return TimeGranularity::None,
        };
        match rest.strip_prefix(':') {
            Some(stamp) => {
                TimeGranularity::from_stamp_len(stamp.len()).unwrap_or(TimeGranularity::None)
            }
            None => TimeGranularity::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn builder(granularity: TimeGranularity) -> KeyBuilder {
        KeyBuilder::new("c", "foo", granularity)
    }

    fn jan_2nd_2015() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 1, 2, 3, 4, 5).unwrap()
    }

    #[test]
    fn test_none_has_only_the_all_time_key() {
        let keys = builder(TimeGranularity::None).keys(jan_2nd_2015());
        assert_eq!(keys, vec!["c:foo"]);
    }

    #[test]
    fn test_keys_per_granularity() {
        let at = jan_2nd_2015();
        assert_eq!(
            builder(TimeGranularity::Year).keys(at),
            vec!["c:foo", "c:foo:2015"]
        );
        assert_eq!(
            builder(TimeGranularity::Month).keys(at),
            vec!["c:foo", "c:foo:2015", "c:foo:201501"]
        );
        assert_eq!(
            builder(TimeGranularity::Second).keys(at),
            vec![
                "c:foo",
                "c:foo:2015",
                "c:foo:201501",
                "c:foo:20150102",
                "c:foo:2015010203",
                "c:foo:201501020304",
                "c:foo:20150102030405",
            ]
        );
    }

    #[test]
    fn test_each_key_prefix_extends_the_previous() {
        for level in TimeGranularity::ALL {
            let keys = builder(level).keys(jan_2nd_2015());
            assert_eq!(keys.len(), 1 + level.ordinal());
            for pair in keys.windows(2) {
                assert!(pair[1].starts_with(pair[0].as_str()));
                assert!(pair[1].len() > pair[0].len());
            }
        }
    }

    #[test]
    fn test_key_at_addresses_one_bucket() {
        let b = builder(TimeGranularity::Second);
        let at = jan_2nd_2015();
        assert_eq!(b.key_at(TimeGranularity::None, at), "c:foo");
        assert_eq!(b.key_at(TimeGranularity::Hour, at), "c:foo:2015010203");
    }

    #[test]
    fn test_qualifier_key_appends_marker() {
        assert_eq!(qualifier_key("c:foo:2015"), "c:foo:2015:z");
    }

    #[test]
    fn test_level_of_infers_from_stamp_shape() {
        let b = builder(TimeGranularity::Second);
        assert_eq!(b.level_of("c:foo"), TimeGranularity::None);
        assert_eq!(b.level_of("c:foo:z"), TimeGranularity::None);
        assert_eq!(b.level_of("c:foo:2015"), TimeGranularity::Year);
        assert_eq!(b.level_of("c:foo:2015:z"), TimeGranularity::Year);
        assert_eq!(b.level_of("c:foo:20150102030405"), TimeGranularity::Second);
        assert_eq!(b.level_of("unrelated"), TimeGranularity::None);
    }
}
