//! Store abstraction: the minimal Redis command surface the counters need.
//!
//! The counters never talk to a concrete client directly. Everything goes
//! through [`CounterStore`], which exposes:
//!
//! - numeric increment-by-delta and scalar reads
//! - ranked-set score increment, score read, and ranked-range reads
//! - TTL read and increment-with-conditional-expire (TTL set only when the
//!   key has none yet)
//! - an all-or-nothing batch ([`CounterStore::exec`]) for multi-key updates
//!
//! Two implementations ship with the crate: [`MemoryStore`], a fake with a
//! virtual clock that backs the test suite, and [`RedisStore`], a thin
//! adapter over a multiplexed async Redis connection.

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use async_trait::async_trait;

/// Iteration order for ranked-range reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Lowest score first.
    Ascending,
    /// Highest score first.
    Descending,
}

/// One write in an atomic batch.
///
/// The conditional-expire variants bundle the increment and the TTL set into
/// a single indivisible step so the batch stays a flat sequence of commands;
/// each op produces exactly one post-increment value in the [`CounterStore::exec`]
/// reply. A negative `ttl_secs` means "never expire" and skips the TTL set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    IncrBy {
        key: String,
        delta: i64,
    },
    ZIncrBy {
        key: String,
        member: String,
        delta: i64,
    },
    IncrExpireNx {
        key: String,
        delta: i64,
        ttl_secs: i64,
    },
    ZIncrExpireNx {
        key: String,
        member: String,
        delta: i64,
        ttl_secs: i64,
    },
}

/// Failure reported by a store backend.
///
/// Forwarded to callers unchanged; the counters never retry, suppress, or
/// log these.
#[derive(Debug)]
pub enum StoreError {
    /// Could not reach the backend.
    Connection(String),
    /// The backend rejected or failed a command or script.
    Command(String),
    /// A reply did not have the shape the command expects.
    UnexpectedReply(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Connection(msg) => write!(f, "connection failure: {}", msg),
            StoreError::Command(msg) => write!(f, "command failure: {}", msg),
            StoreError::UnexpectedReply(msg) => write!(f, "unexpected reply: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// The command surface the counters are built on.
///
/// Atomicity contract: `exec` applies all of its ops or none of them, and
/// the `*_expire_nx` methods are single indivisible operations on the
/// backend. Concurrent calls on overlapping keys are serialized by the
/// backend, never in-process.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment a numeric key, returning the post-increment value.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError>;

    /// Read a numeric key. `None` when unset.
    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError>;

    /// Read several numeric keys in one round trip, in input order.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<i64>>, StoreError>;

    /// Increment a member's score in a ranked set, returning the new score.
    async fn zincr_by(&self, key: &str, member: &str, delta: i64) -> Result<i64, StoreError>;

    /// Read a member's score. `None` when the key or member is unset.
    async fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>, StoreError>;

    /// Read several (key, member) scores in one round trip, in input order.
    async fn zscore_many(
        &self,
        pairs: &[(String, String)],
    ) -> Result<Vec<Option<i64>>, StoreError>;

    /// Read members with scores by inclusive index range. `stop = -1` reads
    /// to the end; negative indices count from the end.
    async fn zrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        order: Order,
    ) -> Result<Vec<(String, i64)>, StoreError>;

    /// Remaining lifetime in seconds: -2 when the key is missing, -1 when it
    /// has no expiry.
    async fn ttl(&self, key: &str) -> Result<i64, StoreError>;

    /// Atomically increment a numeric key and set its TTL only if the key
    /// has no TTL yet. Negative `ttl_secs` skips the TTL set.
    async fn incr_with_expire_nx(
        &self,
        key: &str,
        delta: i64,
        ttl_secs: i64,
    ) -> Result<i64, StoreError>;

    /// Ranked-set counterpart of [`CounterStore::incr_with_expire_nx`].
    async fn zincr_with_expire_nx(
        &self,
        key: &str,
        member: &str,
        delta: i64,
        ttl_secs: i64,
    ) -> Result<i64, StoreError>;

    /// Apply a batch of writes as one all-or-nothing transaction. Returns
    /// one post-increment value per op, in op order.
    async fn exec(&self, ops: Vec<WriteOp>) -> Result<Vec<i64>, StoreError>;
}
