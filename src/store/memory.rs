//! In-memory store with a virtual clock.
//!
//! Backs the test suite. Mirrors the slice of Redis semantics the counters
//! rely on: INCRBY, ZINCRBY, TTL bookkeeping with lazy expiry, inclusive
//! ranked-range reads, and all-or-nothing batches. The clock only moves when
//! [`MemoryStore::advance`] is called, so TTL behavior is deterministic.

use ahash::AHashMap;
use async_trait::async_trait;
use parking_lot::Mutex;

use super::{CounterStore, Order, StoreError, WriteOp};

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug, Clone)]
enum Value {
    Scalar(i64),
    Ranked(AHashMap<String, i64>),
}

#[derive(Debug, Clone, Default)]
struct Inner {
    data: AHashMap<String, Value>,
    /// Absolute expiry deadline in virtual seconds.
    expirations: AHashMap<String, i64>,
    now_secs: i64,
}

impl Inner {
    fn purge_if_expired(&mut self, key: &str) {
        if let Some(deadline) = self.expirations.get(key) {
            if *deadline <= self.now_secs {
                self.data.remove(key);
                self.expirations.remove(key);
            }
        }
    }

    fn incr_by(&mut self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.purge_if_expired(key);
        match self
            .data
            .entry(key.to_string())
            .or_insert(Value::Scalar(0))
        {
            Value::Scalar(v) => {
                *v += delta;
                Ok(*v)
            }
            Value::Ranked(_) => Err(StoreError::Command(WRONGTYPE.to_string())),
        }
    }

    fn zincr_by(&mut self, key: &str, member: &str, delta: i64) -> Result<i64, StoreError> {
        self.purge_if_expired(key);
        match self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::Ranked(AHashMap::new()))
        {
            Value::Ranked(members) => {
                let score = members.entry(member.to_string()).or_insert(0);
                *score += delta;
                Ok(*score)
            }
            Value::Scalar(_) => Err(StoreError::Command(WRONGTYPE.to_string())),
        }
    }

    /// Set a deadline only when the key has none yet. No-op for negative TTLs.
    fn expire_nx(&mut self, key: &str, ttl_secs: i64) {
        if ttl_secs >= 0 && self.data.contains_key(key) && !self.expirations.contains_key(key) {
            self.expirations.insert(key.to_string(), self.now_secs + ttl_secs);
        }
    }

    fn apply(&mut self, op: &WriteOp) -> Result<i64, StoreError> {
        match op {
            WriteOp::IncrBy { key, delta } => self.incr_by(key, *delta),
            WriteOp::ZIncrBy { key, member, delta } => self.zincr_by(key, member, *delta),
            WriteOp::IncrExpireNx {
                key,
                delta,
                ttl_secs,
            } => {
                let value = self.incr_by(key, *delta)?;
                self.expire_nx(key, *ttl_secs);
                Ok(value)
            }
            WriteOp::ZIncrExpireNx {
                key,
                member,
                delta,
                ttl_secs,
            } => {
                let score = self.zincr_by(key, member, *delta)?;
                self.expire_nx(key, *ttl_secs);
                Ok(score)
            }
        }
    }

    fn get(&mut self, key: &str) -> Result<Option<i64>, StoreError> {
        self.purge_if_expired(key);
        match self.data.get(key) {
            Some(Value::Scalar(v)) => Ok(Some(*v)),
            Some(Value::Ranked(_)) => Err(StoreError::Command(WRONGTYPE.to_string())),
            None => Ok(None),
        }
    }

    fn zscore(&mut self, key: &str, member: &str) -> Result<Option<i64>, StoreError> {
        self.purge_if_expired(key);
        match self.data.get(key) {
            Some(Value::Ranked(members)) => Ok(members.get(member).copied()),
            Some(Value::Scalar(_)) => Err(StoreError::Command(WRONGTYPE.to_string())),
            None => Ok(None),
        }
    }
}

/// Map inclusive, possibly negative range indices onto `0..len`.
fn normalize_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let n = len as i64;
    if n == 0 {
        return None;
    }
    let mut start = if start < 0 { n + start } else { start };
    let mut stop = if stop < 0 { n + stop } else { stop };
    if start < 0 {
        start = 0;
    }
    if stop >= n {
        stop = n - 1;
    }
    if start > stop {
        return None;
    }
    Some((start as usize, stop as usize))
}

/// In-memory [`CounterStore`] with a controllable clock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Advance the virtual clock. Expired keys are purged lazily on the next
    /// access, the way the real store evicts.
    pub fn advance(&self, secs: i64) {
        let mut inner = self.inner.lock();
        inner.now_secs += secs;
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.inner.lock().incr_by(key, delta)
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        self.inner.lock().get(key)
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<i64>>, StoreError> {
        let mut inner = self.inner.lock();
        keys.iter().map(|key| inner.get(key)).collect()
    }

    async fn zincr_by(&self, key: &str, member: &str, delta: i64) -> Result<i64, StoreError> {
        self.inner.lock().zincr_by(key, member, delta)
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>, StoreError> {
        self.inner.lock().zscore(key, member)
    }

    async fn zscore_many(
        &self,
        pairs: &[(String, String)],
    ) -> Result<Vec<Option<i64>>, StoreError> {
        let mut inner = self.inner.lock();
        pairs
            .iter()
            .map(|(key, member)| inner.zscore(key, member))
            .collect()
    }

    async fn zrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        order: Order,
    ) -> Result<Vec<(String, i64)>, StoreError> {
        let mut inner = self.inner.lock();
        inner.purge_if_expired(key);
        let mut entries: Vec<(String, i64)> = match inner.data.get(key) {
            Some(Value::Ranked(members)) => members
                .iter()
                .map(|(m, s)| (m.clone(), *s))
                .collect(),
            Some(Value::Scalar(_)) => return Err(StoreError::Command(WRONGTYPE.to_string())),
            None => return Ok(Vec::new()),
        };
        // Redis orders by score, ties lexicographically by member; the
        // descending order is the exact reverse.
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        if order == Order::Descending {
            entries.reverse();
        }
        match normalize_range(entries.len(), start, stop) {
            Some((lo, hi)) => Ok(entries[lo..=hi].to_vec()),
            None => Ok(Vec::new()),
        }
    }

    async fn ttl(&self, key: &str) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock();
        inner.purge_if_expired(key);
        if !inner.data.contains_key(key) {
            return Ok(-2);
        }
        match inner.expirations.get(key) {
            Some(deadline) => Ok(deadline - inner.now_secs),
            None => Ok(-1),
        }
    }

    async fn incr_with_expire_nx(
        &self,
        key: &str,
        delta: i64,
        ttl_secs: i64,
    ) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock();
        let value = inner.incr_by(key, delta)?;
        inner.expire_nx(key, ttl_secs);
        Ok(value)
    }

    async fn zincr_with_expire_nx(
        &self,
        key: &str,
        member: &str,
        delta: i64,
        ttl_secs: i64,
    ) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock();
        let score = inner.zincr_by(key, member, delta)?;
        inner.expire_nx(key, ttl_secs);
        Ok(score)
    }

    async fn exec(&self, ops: Vec<WriteOp>) -> Result<Vec<i64>, StoreError> {
        let mut inner = self.inner.lock();
        // All-or-nothing: apply against the live state, restore the snapshot
        // if any op fails.
        let snapshot = inner.clone();
        let mut results = Vec::with_capacity(ops.len());
        for op in &ops {
            match inner.apply(op) {
                Ok(value) => results.push(value),
                Err(e) => {
                    *inner = snapshot;
                    return Err(e);
                }
            }
        }
        debug_assert_eq!(
            results.len(),
            ops.len(),
            "Invariant violated: one reply per op"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_incr_by_creates_and_accumulates() {
        let store = MemoryStore::new();
        assert_eq!(store.incr_by("k", 2).await.unwrap(), 2);
        assert_eq!(store.incr_by("k", 3).await.unwrap(), 5);
        assert_eq!(store.get("k").await.unwrap(), Some(5));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zincr_and_zscore() {
        let store = MemoryStore::new();
        assert_eq!(store.zincr_by("z", "a", 4).await.unwrap(), 4);
        assert_eq!(store.zincr_by("z", "a", 1).await.unwrap(), 5);
        assert_eq!(store.zscore("z", "a").await.unwrap(), Some(5));
        assert_eq!(store.zscore("z", "b").await.unwrap(), None);
        assert_eq!(store.zscore("missing", "a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_wrongtype_is_a_command_error() {
        let store = MemoryStore::new();
        store.incr_by("k", 1).await.unwrap();
        let err = store.zincr_by("k", "a", 1).await.unwrap_err();
        assert!(matches!(err, StoreError::Command(_)));
    }

    #[tokio::test]
    async fn test_ttl_states() {
        let store = MemoryStore::new();
        assert_eq!(store.ttl("k").await.unwrap(), -2);
        store.incr_by("k", 1).await.unwrap();
        assert_eq!(store.ttl("k").await.unwrap(), -1);
        store.incr_with_expire_nx("k", 1, 100).await.unwrap();
        assert_eq!(store.ttl("k").await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_expire_nx_does_not_renew() {
        let store = MemoryStore::new();
        store.incr_with_expire_nx("k", 1, 100).await.unwrap();
        store.advance(30);
        store.incr_with_expire_nx("k", 1, 100).await.unwrap();
        assert_eq!(store.ttl("k").await.unwrap(), 70);
    }

    #[tokio::test]
    async fn test_expired_key_reads_as_missing() {
        let store = MemoryStore::new();
        store.incr_with_expire_nx("k", 7, 10).await.unwrap();
        store.advance(10);
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.ttl("k").await.unwrap(), -2);
        // A later write starts a fresh value and a fresh window.
        assert_eq!(store.incr_with_expire_nx("k", 1, 10).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_negative_ttl_never_expires() {
        let store = MemoryStore::new();
        store.incr_with_expire_nx("k", 1, -1).await.unwrap();
        store.advance(1_000_000);
        assert_eq!(store.get("k").await.unwrap(), Some(1));
        assert_eq!(store.ttl("k").await.unwrap(), -1);
    }

    #[tokio::test]
    async fn test_zrange_orders_and_clamps() {
        let store = MemoryStore::new();
        store.zincr_by("z", "a", 3).await.unwrap();
        store.zincr_by("z", "b", 1).await.unwrap();
        store.zincr_by("z", "c", 2).await.unwrap();

        let asc = store
            .zrange_with_scores("z", 0, -1, Order::Ascending)
            .await
            .unwrap();
        assert_eq!(
            asc,
            vec![
                ("b".to_string(), 1),
                ("c".to_string(), 2),
                ("a".to_string(), 3)
            ]
        );

        let desc = store
            .zrange_with_scores("z", 0, 1, Order::Descending)
            .await
            .unwrap();
        assert_eq!(desc, vec![("a".to_string(), 3), ("c".to_string(), 2)]);

        let empty = store
            .zrange_with_scores("z", 5, 9, Order::Ascending)
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_exec_applies_all_ops() {
        let store = MemoryStore::new();
        let results = store
            .exec(vec![
                WriteOp::IncrBy {
                    key: "a".to_string(),
                    delta: 1,
                },
                WriteOp::IncrExpireNx {
                    key: "b".to_string(),
                    delta: 2,
                    ttl_secs: 50,
                },
            ])
            .await
            .unwrap();
        assert_eq!(results, vec![1, 2]);
        assert_eq!(store.ttl("b").await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_exec_rolls_back_on_failure() {
        let store = MemoryStore::new();
        store.zincr_by("zset", "m", 1).await.unwrap();
        let err = store
            .exec(vec![
                WriteOp::IncrBy {
                    key: "a".to_string(),
                    delta: 1,
                },
                // WRONGTYPE against the ranked set
                WriteOp::IncrBy {
                    key: "zset".to_string(),
                    delta: 1,
                },
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Command(_)));
        // The first op must not be observable.
        assert_eq!(store.get("a").await.unwrap(), None);
    }
}
