//! Time-bucketed event counters and leaderboards backed by Redis.
//!
//! An increment on a counter touches a family of bucket keys — the all-time
//! bucket plus one per time level down to the configured granularity — in a
//! single atomic store operation. Queries read totals per level, count
//! series over arbitrary time ranges, and ranked leaderboards over event
//! qualifiers.
//!
//! ```no_run
//! use std::sync::Arc;
//! use redis_tally::store::RedisStore;
//! use redis_tally::{CounterOptions, Metrics, TimeGranularity};
//!
//! # async fn demo() -> redis_tally::Result<()> {
//! let store = Arc::new(RedisStore::open("redis://127.0.0.1/")?);
//! let metrics = Metrics::new(store);
//!
//! let pageviews = metrics.counter_with(
//!     "pageviews",
//!     CounterOptions {
//!         time_granularity: TimeGranularity::Hour,
//!         ..CounterOptions::default()
//!     },
//! );
//! pageviews.incr(None).await?;
//! pageviews.incr(Some("/about")).await?;
//!
//! let total = pageviews.count().await?;
//! let popular = pageviews.top_default().await?;
//! # let _ = (total, popular);
//! # Ok(())
//! # }
//! ```
//!
//! Counters hold no mutable state and spawn no tasks; all state lives in
//! the store and cross-call atomicity is delegated to the store's own
//! primitives (single commands, server-side scripts, transactions). Tests
//! run against [`store::MemoryStore`], an in-memory fake with a virtual
//! clock.

pub mod counter;
pub mod error;
pub mod metrics;
pub mod store;

pub use counter::{
    Counter, CounterOptions, ExpirationTable, InstantArg, TimeGranularity, UpdateStrategy,
    NEVER_EXPIRE,
};
pub use error::{Result, TallyError};
pub use metrics::{Metrics, MetricsConfig, DEFAULT_KEY_PREFIX};
