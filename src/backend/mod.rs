//! Backend Adapter Module
//!
//! Normalizes the supported backing-store clients into the single command set
//! used by the scalar cache and the paginated list engine.

mod direct;
mod entry;
mod memory;
mod rest;

pub use self::direct::RedisBackend;
pub use self::entry::{current_timestamp_ms, CacheEntry};
pub use self::memory::MemoryBackend;
pub use self::rest::{RestBackend, SetOptions};

use async_trait::async_trait;

use crate::error::{CacheError, Result};

// == Sort Order ==
/// Direction of a sorted-set range read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Lowest score first (`ZRANGE`)
    Ascending,
    /// Highest score first (`ZREVRANGE`)
    #[default]
    Descending,
}

// == Store Backend ==
/// Command surface consumed from the backing store.
///
/// Every implementation must behave identically from the caller's point of
/// view; expiry conventions are translated inside each backend.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Short backend name used in log lines.
    fn name(&self) -> &'static str;

    /// `GET key`
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// `SET key value [EX seconds]`, returning the store's status reply.
    async fn set(&self, key: &str, value: &str, expiry_secs: Option<u64>) -> Result<String>;

    /// `ZADD key CH score member`: number of members added or re-scored.
    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<i64>;

    /// `ZREM key member`: number of members removed.
    async fn zrem(&self, key: &str, member: &str) -> Result<i64>;

    /// `ZCARD key`
    async fn zcard(&self, key: &str) -> Result<u64>;

    /// `ZRANGE`/`ZREVRANGE key start stop WITHSCORES` as a flat
    /// member, score, member, score... sequence.
    async fn zrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        order: SortOrder,
    ) -> Result<Vec<String>>;

    /// `ZPOPMIN key`: the removed lowest-scored member, if any.
    async fn zpopmin(&self, key: &str) -> Result<Option<(String, f64)>>;

    /// `DEL key`: number of keys removed.
    async fn del(&self, key: &str) -> Result<i64>;
}

/// Keeps only strictly positive expiries; anything else means "no expiry".
pub(crate) fn positive_expiry(expiry_secs: Option<u64>) -> Option<u64> {
    expiry_secs.filter(|&secs| secs > 0)
}

/// Parses a flat `[member, score]` pop reply.
pub(crate) fn parse_popped(mut reply: Vec<String>) -> Result<Option<(String, f64)>> {
    if reply.is_empty() {
        return Ok(None);
    }
    if reply.len() < 2 {
        return Err(CacheError::Store(format!(
            "ZPOPMIN returned {} element(s), expected member and score",
            reply.len()
        )));
    }
    let score = reply[1]
        .parse::<f64>()
        .map_err(|_| CacheError::Store(format!("ZPOPMIN returned invalid score '{}'", reply[1])))?;
    Ok(Some((reply.swap_remove(0), score)))
}
