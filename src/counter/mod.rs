//! Timestamped counters.
//!
//! A [`Counter`] is a cheap, immutable descriptor: a name under a key
//! prefix plus options. All mutable state lives in the store, so counters
//! clone freely and are safe to share across tasks. One call, one store
//! round trip; atomicity is the store's job.
//!
//! The implementation is split across files:
//!
//! - `granularity.rs`: the time-level enum, stamp formats, truncation
//! - `keys.rs`: bucket-key derivation
//! - `expiry.rs`: TTL policy and the expiration table
//! - `update.rs`: write strategy selection and batch planning
//! - `mod.rs` (this file): the counter itself and its query methods

mod expiry;
mod granularity;
mod keys;
mod update;

pub use self::expiry::{ExpirationTable, NEVER_EXPIRE};
pub use self::granularity::TimeGranularity;
pub use self::update::UpdateStrategy;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::{Result, TallyError};
use crate::store::{CounterStore, Order};
use self::keys::{qualifier_key, KeyBuilder};

/// Counter configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CounterOptions {
    /// Finest time resolution tracked. `None` keeps only the all-time
    /// bucket.
    pub time_granularity: TimeGranularity,
    /// Whether dated buckets get a TTL on first write. Disabled means no
    /// bucket ever expires, regardless of the table.
    pub expire_keys: bool,
    /// Per-level TTL overrides.
    pub expiration: ExpirationTable,
}

impl Default for CounterOptions {
    fn default() -> Self {
        CounterOptions {
            time_granularity: TimeGranularity::None,
            expire_keys: true,
            expiration: ExpirationTable::new(),
        }
    }
}

/// A range bound for [`Counter::count_range`]: a typed instant, an
/// ISO-8601 string, or epoch milliseconds.
#[derive(Debug, Clone)]
pub enum InstantArg {
    Instant(DateTime<Utc>),
    Iso8601(String),
    EpochMillis(i64),
}

impl InstantArg {
    fn resolve(self) -> Result<DateTime<Utc>> {
        match self {
            InstantArg::Instant(t) => Ok(t),
            InstantArg::Iso8601(s) => parse_iso8601(&s),
            InstantArg::EpochMillis(ms) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .ok_or_else(|| {
                    TallyError::InvalidArgument(format!("epoch milliseconds out of range: {}", ms))
                }),
        }
    }
}

impl From<DateTime<Utc>> for InstantArg {
    fn from(t: DateTime<Utc>) -> Self {
        InstantArg::Instant(t)
    }
}

impl From<&str> for InstantArg {
    fn from(s: &str) -> Self {
        InstantArg::Iso8601(s.to_string())
    }
}

impl From<String> for InstantArg {
    fn from(s: String) -> Self {
        InstantArg::Iso8601(s)
    }
}

impl From<i64> for InstantArg {
    fn from(ms: i64) -> Self {
        InstantArg::EpochMillis(ms)
    }
}

fn parse_iso8601(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    // Bare dates are common in reporting ranges.
    if let Ok(d) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always valid")
            .and_utc());
    }
    Err(TallyError::InvalidArgument(format!(
        "unparseable timestamp '{}'",
        s
    )))
}

/// A time-bucketed event counter.
///
/// Each increment touches the all-time bucket plus one dated bucket per
/// level down to the configured granularity, atomically. Queries read one
/// or more buckets and treat missing keys as zero.
#[derive(Clone)]
pub struct Counter {
    store: Arc<dyn CounterStore>,
    options: CounterOptions,
    keys: KeyBuilder,
}

impl Counter {
    pub fn new(
        store: Arc<dyn CounterStore>,
        prefix: &str,
        name: &str,
        options: CounterOptions,
    ) -> Self {
        let keys = KeyBuilder::new(prefix, name, options.time_granularity);
        Counter {
            store,
            options,
            keys,
        }
    }

    pub fn options(&self) -> &CounterOptions {
        &self.options
    }

    /// The all-time bucket key, `<prefix>:<name>`.
    pub fn base_key(&self) -> &str {
        self.keys.base()
    }

    /// Bucket keys for an increment right now, coarsest first.
    pub fn keys(&self) -> Vec<String> {
        self.keys_at(Utc::now())
    }

    /// Bucket keys for an increment at `at`, coarsest first.
    pub fn keys_at(&self, at: DateTime<Utc>) -> Vec<String> {
        self.keys.keys(at)
    }

    /// TTL this counter would assign to `key`, from the expiration table or
    /// the built-in defaults. [`NEVER_EXPIRE`] for the all-time bucket
    /// unless configured.
    pub fn key_ttl(&self, key: &str) -> i64 {
        self.options.expiration.ttl_for(self.keys.level_of(key))
    }

    /// Record one event. See [`Counter::incr_by_at`].
    pub async fn incr(&self, qualifier: Option<&str>) -> Result<Vec<i64>> {
        self.incr_by_at(1, qualifier, Utc::now()).await
    }

    /// Record `delta` events. See [`Counter::incr_by_at`].
    pub async fn incr_by(&self, delta: i64, qualifier: Option<&str>) -> Result<Vec<i64>> {
        self.incr_by_at(delta, qualifier, Utc::now()).await
    }

    /// Record one event at an explicit instant.
    pub async fn incr_at(&self, qualifier: Option<&str>, at: DateTime<Utc>) -> Result<Vec<i64>> {
        self.incr_by_at(1, qualifier, at).await
    }

    /// Record `delta` events at an explicit instant.
    ///
    /// Every bucket key for the instant is updated in one atomic store
    /// operation; the reply holds the post-increment value per bucket, in
    /// key order. With a qualifier, the updates go to each bucket's ranked
    /// set and the replies are the qualifier's new scores. A store failure
    /// aborts the whole call with no partial effect.
    pub async fn incr_by_at(
        &self,
        delta: i64,
        qualifier: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Vec<i64>> {
        let keys = self.keys_at(at);
        let strategy = UpdateStrategy::select(keys.len(), self.options.expire_keys);
        debug!(
            counter = %self.keys.base(),
            ?strategy,
            keys = keys.len(),
            delta,
            qualifier = qualifier.unwrap_or(""),
            "incrementing"
        );
        match strategy {
            UpdateStrategy::Single => {
                let value = match qualifier {
                    None => self.store.incr_by(&keys[0], delta).await?,
                    Some(q) => {
                        self.store
                            .zincr_by(&qualifier_key(&keys[0]), q, delta)
                            .await?
                    }
                };
                Ok(vec![value])
            }
            UpdateStrategy::SingleExpiring => {
                let ttl_secs = self.key_ttl(&keys[0]);
                let value = match qualifier {
                    None => {
                        self.store
                            .incr_with_expire_nx(&keys[0], delta, ttl_secs)
                            .await?
                    }
                    Some(q) => {
                        self.store
                            .zincr_with_expire_nx(&qualifier_key(&keys[0]), q, delta, ttl_secs)
                            .await?
                    }
                };
                Ok(vec![value])
            }
            UpdateStrategy::Batch => {
                let ops = update::plan_batch(
                    &keys,
                    delta,
                    qualifier,
                    self.options.expire_keys,
                    |key| self.key_ttl(key),
                );
                Ok(self.store.exec(ops).await?)
            }
        }
    }

    /// All-time count. Zero when nothing has been recorded.
    pub async fn count(&self) -> Result<i64> {
        self.count_at(TimeGranularity::None, None, Utc::now()).await
    }

    /// Count in the current bucket at `granularity` (`None` reads the
    /// all-time bucket), optionally for one qualifier.
    pub async fn count_for(
        &self,
        granularity: TimeGranularity,
        qualifier: Option<&str>,
    ) -> Result<i64> {
        self.count_at(granularity, qualifier, Utc::now()).await
    }

    /// Count in the bucket containing `at` at `granularity`.
    pub async fn count_at(
        &self,
        granularity: TimeGranularity,
        qualifier: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<i64> {
        let key = self.keys.key_at(granularity, at);
        trace!(counter = %self.keys.base(), key = %key, "reading count");
        let count = match qualifier {
            None => self.store.get(&key).await?,
            Some(q) => self.store.zscore(&qualifier_key(&key), q).await?,
        };
        Ok(count.unwrap_or(0))
    }

    /// Counts per bucket from `start` through `end` (inclusive of both
    /// truncations), one entry per granularity unit in chronological order.
    /// Buckets with no data read zero. `end` of `None` means now.
    pub async fn count_range(
        &self,
        granularity: TimeGranularity,
        start: impl Into<InstantArg>,
        end: Option<InstantArg>,
        qualifier: Option<&str>,
    ) -> Result<Vec<(DateTime<Utc>, i64)>> {
        if granularity == TimeGranularity::None {
            return Err(TallyError::InvalidArgument(
                "count_range requires a dated granularity".to_string(),
            ));
        }
        let start = start.into().resolve()?;
        let end = match end {
            Some(arg) => arg.resolve()?,
            None => Utc::now(),
        };

        let stop = granularity.truncate(end);
        let mut boundaries = Vec::new();
        let mut cursor = granularity.truncate(start);
        while cursor <= stop {
            boundaries.push(cursor);
            cursor = granularity.step(cursor);
        }
        trace!(
            counter = %self.keys.base(),
            granularity = %granularity,
            buckets = boundaries.len(),
            "reading range"
        );

        let keys: Vec<String> = boundaries
            .iter()
            .map(|t| self.keys.key_at(granularity, *t))
            .collect();
        let counts = match qualifier {
            None => self.store.get_many(&keys).await?,
            Some(q) => {
                let pairs: Vec<(String, String)> = keys
                    .iter()
                    .map(|key| (qualifier_key(key), q.to_string()))
                    .collect();
                self.store.zscore_many(&pairs).await?
            }
        };
        debug_assert_eq!(counts.len(), boundaries.len());
        Ok(boundaries
            .into_iter()
            .zip(counts)
            .map(|(t, c)| (t, c.unwrap_or(0)))
            .collect())
    }

    /// Leaderboard over this counter's qualifiers, read from the all-time
    /// ranked set (leaderboards are not time-bucketed).
    ///
    /// `direction` must be `"asc"` or `"desc"`; anything else fails before
    /// any store access. `starting_at` and `limit` are inclusive zero-based
    /// indices, `limit = -1` reads to the end.
    pub async fn top(
        &self,
        direction: &str,
        starting_at: i64,
        limit: i64,
    ) -> Result<Vec<(String, i64)>> {
        let order = match direction {
            "asc" => Order::Ascending,
            "desc" => Order::Descending,
            other => {
                return Err(TallyError::InvalidArgument(format!(
                    "invalid direction '{}', expected 'asc' or 'desc'",
                    other
                )))
            }
        };
        let key = qualifier_key(self.keys.base());
        trace!(counter = %self.keys.base(), key = %key, "reading leaderboard");
        Ok(self
            .store
            .zrange_with_scores(&key, starting_at, limit, order)
            .await?)
    }

    /// [`Counter::top`] with the usual arguments: descending, from the
    /// start, unbounded.
    pub async fn top_default(&self) -> Result<Vec<(String, i64)>> {
        self.top("desc", 0, -1).await
    }
}

impl std::fmt::Debug for Counter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Counter")
            .field("key", &self.keys.base())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instant_arg_forms_resolve_to_the_same_instant() {
        let typed = Utc.with_ymd_and_hms(2014, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(InstantArg::from(typed).resolve().unwrap(), typed);
        assert_eq!(
            InstantArg::from("2014-01-01T00:00:00Z").resolve().unwrap(),
            typed
        );
        assert_eq!(InstantArg::from("2014-01-01").resolve().unwrap(), typed);
        assert_eq!(
            InstantArg::from(typed.timestamp_millis()).resolve().unwrap(),
            typed
        );
    }

    #[test]
    fn test_instant_arg_rejects_garbage() {
        let err = InstantArg::from("not a time").resolve().unwrap_err();
        assert!(matches!(err, TallyError::InvalidArgument(_)));
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: CounterOptions =
            toml::from_str("time_granularity = \"hour\"\n").unwrap();
        assert_eq!(options.time_granularity, TimeGranularity::Hour);
        assert!(options.expire_keys);
        assert_eq!(options.expiration, ExpirationTable::new());

        let options: CounterOptions = toml::from_str(
            "time_granularity = \"year\"\nexpire_keys = false\n[expiration]\ntotal = 9\n",
        )
        .unwrap();
        assert_eq!(options.time_granularity, TimeGranularity::Year);
        assert!(!options.expire_keys);
        assert_eq!(options.expiration.ttl_for(TimeGranularity::None), 9);
    }
}
