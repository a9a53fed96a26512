//! Write-path strategy selection and batch construction.
//!
//! Every increment issues exactly one store operation. Which one is a pure
//! function of the bucket-key count and the expiry flag, so the choice is
//! testable without a store.

use crate::store::WriteOp;

use super::keys::qualifier_key;

/// How one increment call reaches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStrategy {
    /// One key, no expiry: a single plain increment.
    Single,
    /// One key with expiry: a single atomic increment-and-expire-if-unset
    /// script.
    SingleExpiring,
    /// Multiple keys: one all-or-nothing transaction, with or without
    /// expiry.
    Batch,
}

impl UpdateStrategy {
    pub fn select(key_count: usize, expire_keys: bool) -> Self {
        debug_assert!(key_count >= 1, "a counter always has its all-time key");
        match (key_count, expire_keys) {
            (1, false) => UpdateStrategy::Single,
            (1, true) => UpdateStrategy::SingleExpiring,
            _ => UpdateStrategy::Batch,
        }
    }
}

/// Ops for the [`UpdateStrategy::Batch`] case, one per bucket key, in key
/// order. With a qualifier, the increments target each bucket's ranked-set
/// sibling; the TTL still derives from the bucket key itself so the `:z`
/// key inherits its bucket's lifetime.
pub(crate) fn plan_batch(
    keys: &[String],
    delta: i64,
    qualifier: Option<&str>,
    expire_keys: bool,
    ttl_of: impl Fn(&str) -> i64,
) -> Vec<WriteOp> {
    keys.iter()
        .map(|key| match (qualifier, expire_keys) {
            (None, false) => WriteOp::IncrBy {
                key: key.clone(),
                delta,
            },
            (None, true) => WriteOp::IncrExpireNx {
                key: key.clone(),
                delta,
                ttl_secs: ttl_of(key),
            },
            (Some(q), false) => WriteOp::ZIncrBy {
                key: qualifier_key(key),
                member: q.to_string(),
                delta,
            },
            (Some(q), true) => WriteOp::ZIncrExpireNx {
                key: qualifier_key(key),
                member: q.to_string(),
                delta,
                ttl_secs: ttl_of(key),
            },
        })
        .collect()
}
