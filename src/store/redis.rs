//! Redis-backed store over a multiplexed async connection.
//!
//! Single commands map 1:1 onto Redis commands. The conditional-expire
//! operations run as server-side Lua so the increment and the TTL check/set
//! stay one indivisible step. Batches run as MULTI/EXEC pipelines; script
//! ops inside a batch are issued as plain EVAL so the whole transaction
//! stays a flat command sequence.

use redis::aio::MultiplexedConnection;
use redis::Script;

use super::{CounterStore, Order, StoreError, WriteOp};
use async_trait::async_trait;

const INCR_EXPIRE_NX_LUA: &str = r#"
local value = redis.call('INCRBY', KEYS[1], ARGV[1])
local ttl = tonumber(ARGV[2])
if ttl >= 0 and redis.call('TTL', KEYS[1]) < 0 then
  redis.call('EXPIRE', KEYS[1], ttl)
end
return value
"#;

const ZINCR_EXPIRE_NX_LUA: &str = r#"
local score = redis.call('ZINCRBY', KEYS[1], ARGV[1], ARGV[2])
local ttl = tonumber(ARGV[3])
if ttl >= 0 and redis.call('TTL', KEYS[1]) < 0 then
  redis.call('EXPIRE', KEYS[1], ttl)
end
return score
"#;

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
            StoreError::Connection(e.to_string())
        } else if e.kind() == redis::ErrorKind::UnexpectedReturnType {
            StoreError::UnexpectedReply(e.to_string())
        } else {
            StoreError::Command(e.to_string())
        }
    }
}

/// [`CounterStore`] adapter over the `redis` crate.
///
/// Holds only the client handle and the two pre-declared scripts; a
/// multiplexed connection is checked out per call. Reconnection, pooling,
/// and timeouts belong to the client, not here.
pub struct RedisStore {
    client: redis::Client,
    incr_script: Script,
    zincr_script: Script,
}

impl RedisStore {
    pub fn new(client: redis::Client) -> Self {
        RedisStore {
            client,
            incr_script: Script::new(INCR_EXPIRE_NX_LUA),
            zincr_script: Script::new(ZINCR_EXPIRE_NX_LUA),
        }
    }

    /// Connect by URL, e.g. `redis://127.0.0.1/`.
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(StoreError::from)?;
        Ok(RedisStore::new(client))
    }

    async fn conn(&self) -> Result<MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(StoreError::from)
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;
        let value: i64 = redis::cmd("INCRBY")
            .arg(key)
            .arg(delta)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn().await?;
        let value: Option<i64> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<i64>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        let values: Vec<Option<i64>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await?;
        Ok(values)
    }

    async fn zincr_by(&self, key: &str, member: &str, delta: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;
        let score: i64 = redis::cmd("ZINCRBY")
            .arg(key)
            .arg(delta)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(score)
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn().await?;
        let score: Option<i64> = redis::cmd("ZSCORE")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(score)
    }

    async fn zscore_many(
        &self,
        pairs: &[(String, String)],
    ) -> Result<Vec<Option<i64>>, StoreError> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        for (key, member) in pairs {
            pipe.cmd("ZSCORE").arg(key).arg(member);
        }
        let scores: Vec<Option<i64>> = pipe.query_async(&mut conn).await?;
        Ok(scores)
    }

    async fn zrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        order: Order,
    ) -> Result<Vec<(String, i64)>, StoreError> {
        let mut conn = self.conn().await?;
        let command = match order {
            Order::Ascending => "ZRANGE",
            Order::Descending => "ZREVRANGE",
        };
        let entries: Vec<(String, i64)> = redis::cmd(command)
            .arg(key)
            .arg(start)
            .arg(stop)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;
        Ok(entries)
    }

    async fn ttl(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;
        let ttl: i64 = redis::cmd("TTL").arg(key).query_async(&mut conn).await?;
        Ok(ttl)
    }

    async fn incr_with_expire_nx(
        &self,
        key: &str,
        delta: i64,
        ttl_secs: i64,
    ) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;
        let value: i64 = self
            .incr_script
            .key(key)
            .arg(delta)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn zincr_with_expire_nx(
        &self,
        key: &str,
        member: &str,
        delta: i64,
        ttl_secs: i64,
    ) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;
        let score: i64 = self
            .zincr_script
            .key(key)
            .arg(delta)
            .arg(member)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await?;
        Ok(score)
    }

    async fn exec(&self, ops: Vec<WriteOp>) -> Result<Vec<i64>, StoreError> {
        if ops.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in &ops {
            match op {
                WriteOp::IncrBy { key, delta } => {
                    pipe.cmd("INCRBY").arg(key).arg(delta);
                }
                WriteOp::ZIncrBy { key, member, delta } => {
                    pipe.cmd("ZINCRBY").arg(key).arg(delta).arg(member);
                }
                WriteOp::IncrExpireNx {
                    key,
                    delta,
                    ttl_secs,
                } => {
                    pipe.cmd("EVAL")
                        .arg(INCR_EXPIRE_NX_LUA)
                        .arg(1)
                        .arg(key)
                        .arg(delta)
                        .arg(ttl_secs);
                }
                WriteOp::ZIncrExpireNx {
                    key,
                    member,
                    delta,
                    ttl_secs,
                } => {
                    pipe.cmd("EVAL")
                        .arg(ZINCR_EXPIRE_NX_LUA)
                        .arg(1)
                        .arg(key)
                        .arg(delta)
                        .arg(member)
                        .arg(ttl_secs);
                }
            }
        }
        let values: Vec<i64> = pipe.query_async(&mut conn).await?;
        Ok(values)
    }
}
