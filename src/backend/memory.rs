//! In-Memory Backend Module
//!
//! Process-local implementation of the store command set: string entries with
//! lazy TTL expiration plus score-ordered sets. Used for tests and for running
//! without a server.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{positive_expiry, CacheEntry, SortOrder, StoreBackend};
use crate::error::{CacheError, Result};

const WRONG_TYPE: &str =
    "WRONGTYPE Operation against a key holding the wrong kind of value";

// == Stored Value ==
#[derive(Debug, Clone)]
enum StoredValue {
    Text(CacheEntry),
    Sorted(SortedSet),
}

// == Sorted Set ==
/// Members keyed by id; ordering is by (score, member) like Redis.
#[derive(Debug, Clone, Default)]
struct SortedSet {
    members: HashMap<String, f64>,
}

impl SortedSet {
    fn ordered(&self) -> Vec<(&String, f64)> {
        let mut items: Vec<(&String, f64)> =
            self.members.iter().map(|(m, s)| (m, *s)).collect();
        items.sort_by(|a, b| compare_members(a, b));
        items
    }

    fn pop_min(&mut self) -> Option<(String, f64)> {
        let (member, score) = self
            .members
            .iter()
            .min_by(|a, b| compare_members(&(a.0, *a.1), &(b.0, *b.1)))
            .map(|(m, s)| (m.clone(), *s))?;
        self.members.remove(&member);
        Some((member, score))
    }
}

fn compare_members(a: &(&String, f64), b: &(&String, f64)) -> Ordering {
    a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0))
}

/// Resolves Redis-style inclusive range indices (negatives count from the end).
fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (start + len).max(0) } else { start };
    let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };

    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

// == Memory Backend ==
/// Thread-safe in-process store.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<RwLock<HashMap<String, StoredValue>>>,
}

impl MemoryBackend {
    // == Constructor ==
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // == Time To Live ==
    /// Remaining TTL in seconds of a string key, None if absent or persistent.
    pub async fn ttl(&self, key: &str) -> Option<u64> {
        let entries = self.inner.read().await;
        match entries.get(key) {
            Some(StoredValue::Text(entry)) if !entry.is_expired() => entry.ttl_remaining(),
            _ => None,
        }
    }

    // == Length ==
    /// Number of live keys of any type.
    pub async fn len(&self) -> usize {
        let entries = self.inner.read().await;
        entries
            .values()
            .filter(|v| !matches!(v, StoredValue::Text(e) if e.is_expired()))
            .count()
    }

    /// Returns true when no live key is held.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn sorted_mut<'a>(
    entries: &'a mut HashMap<String, StoredValue>,
    key: &str,
) -> Result<Option<&'a mut SortedSet>> {
    match entries.get_mut(key) {
        None => Ok(None),
        Some(StoredValue::Sorted(set)) => Ok(Some(set)),
        Some(StoredValue::Text(entry)) if entry.is_expired() => Ok(None),
        Some(StoredValue::Text(_)) => Err(CacheError::Store(WRONG_TYPE.to_string())),
    }
}

fn sorted_ref<'a>(
    entries: &'a HashMap<String, StoredValue>,
    key: &str,
) -> Result<Option<&'a SortedSet>> {
    match entries.get(key) {
        None => Ok(None),
        Some(StoredValue::Sorted(set)) => Ok(Some(set)),
        Some(StoredValue::Text(entry)) if entry.is_expired() => Ok(None),
        Some(StoredValue::Text(_)) => Err(CacheError::Store(WRONG_TYPE.to_string())),
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.inner.write().await;
        match entries.get(key) {
            None => return Ok(None),
            Some(StoredValue::Sorted(_)) => return Err(CacheError::Store(WRONG_TYPE.to_string())),
            Some(StoredValue::Text(entry)) if !entry.is_expired() => {
                return Ok(Some(entry.value.clone()))
            }
            Some(StoredValue::Text(_)) => {}
        }

        // Lazily drop the expired entry
        entries.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, expiry_secs: Option<u64>) -> Result<String> {
        let entry = CacheEntry::new(value.to_string(), positive_expiry(expiry_secs));
        let mut entries = self.inner.write().await;
        entries.insert(key.to_string(), StoredValue::Text(entry));
        Ok("OK".to_string())
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<i64> {
        if score.is_nan() {
            return Err(CacheError::Store("ERR value is not a valid float".to_string()));
        }

        let mut entries = self.inner.write().await;
        if sorted_mut(&mut entries, key)?.is_none() {
            entries.insert(key.to_string(), StoredValue::Sorted(SortedSet::default()));
        }
        let set = sorted_mut(&mut entries, key)?
            .ok_or_else(|| CacheError::Store(format!("Sorted set '{}' vanished", key)))?;

        match set.members.insert(member.to_string(), score) {
            Some(previous) if previous == score => Ok(0),
            _ => Ok(1),
        }
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<i64> {
        let mut entries = self.inner.write().await;
        let Some(set) = sorted_mut(&mut entries, key)? else {
            return Ok(0);
        };
        let removed = set.members.remove(member).is_some();
        if set.members.is_empty() {
            entries.remove(key);
        }
        Ok(removed as i64)
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        let entries = self.inner.read().await;
        Ok(sorted_ref(&entries, key)?.map_or(0, |set| set.members.len() as u64))
    }

    async fn zrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        order: SortOrder,
    ) -> Result<Vec<String>> {
        let entries = self.inner.read().await;
        let Some(set) = sorted_ref(&entries, key)? else {
            return Ok(Vec::new());
        };

        let mut ordered = set.ordered();
        if order == SortOrder::Descending {
            ordered.reverse();
        }
        let Some((from, to)) = resolve_range(ordered.len(), start, stop) else {
            return Ok(Vec::new());
        };

        Ok(ordered[from..=to]
            .iter()
            .flat_map(|(member, score)| [member.to_string(), score.to_string()])
            .collect())
    }

    async fn zpopmin(&self, key: &str) -> Result<Option<(String, f64)>> {
        let mut entries = self.inner.write().await;
        let Some(set) = sorted_mut(&mut entries, key)? else {
            return Ok(None);
        };
        let popped = set.pop_min();
        if set.members.is_empty() {
            entries.remove(key);
        }
        Ok(popped)
    }

    async fn del(&self, key: &str) -> Result<i64> {
        let mut entries = self.inner.write().await;
        Ok(entries.remove(key).is_some() as i64)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_resolve_range() {
        assert_eq!(resolve_range(5, 0, 2), Some((0, 2)));
        assert_eq!(resolve_range(5, 3, 10), Some((3, 4)));
        assert_eq!(resolve_range(5, 0, -1), Some((0, 4)));
        assert_eq!(resolve_range(5, -2, -1), Some((3, 4)));
        assert_eq!(resolve_range(5, 5, 9), None);
        assert_eq!(resolve_range(5, 3, 1), None);
        assert_eq!(resolve_range(0, 0, -1), None);
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemoryBackend::new();

        assert_eq!(store.set("key1", "value1", None).await.unwrap(), "OK");
        assert_eq!(store.get("key1").await.unwrap(), Some("value1".to_string()));
        assert_eq!(store.get("missing").await.unwrap(), None);
        assert_eq!(store.ttl("key1").await, None);
    }

    #[tokio::test]
    async fn test_set_with_expiry() {
        let store = MemoryBackend::new();

        store.set("key1", "value1", Some(1)).await.unwrap();
        assert!(store.ttl("key1").await.is_some());

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(store.get("key1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zero_expiry_means_persistent() {
        let store = MemoryBackend::new();

        store.set("key1", "value1", Some(0)).await.unwrap();
        assert_eq!(store.ttl("key1").await, None);
    }

    #[tokio::test]
    async fn test_zadd_reports_changes() {
        let store = MemoryBackend::new();

        assert_eq!(store.zadd("list", 1.0, "a").await.unwrap(), 1);
        assert_eq!(store.zadd("list", 1.0, "a").await.unwrap(), 0);
        assert_eq!(store.zadd("list", 2.0, "a").await.unwrap(), 1);
        assert_eq!(store.zcard("list").await.unwrap(), 1);
        assert!(store.zadd("list", f64::NAN, "b").await.is_err());
    }

    #[tokio::test]
    async fn test_zrange_orders() {
        let store = MemoryBackend::new();
        store.zadd("list", 3.0, "c").await.unwrap();
        store.zadd("list", 1.0, "a").await.unwrap();
        store.zadd("list", 2.0, "b").await.unwrap();

        let asc = store
            .zrange_with_scores("list", 0, -1, SortOrder::Ascending)
            .await
            .unwrap();
        assert_eq!(asc, vec!["a", "1", "b", "2", "c", "3"]);

        let desc = store
            .zrange_with_scores("list", 0, 1, SortOrder::Descending)
            .await
            .unwrap();
        assert_eq!(desc, vec!["c", "3", "b", "2"]);

        let empty = store
            .zrange_with_scores("missing", 0, -1, SortOrder::Descending)
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_equal_scores_order_by_member() {
        let store = MemoryBackend::new();
        store.zadd("list", 1.0, "b").await.unwrap();
        store.zadd("list", 1.0, "a").await.unwrap();

        assert_eq!(
            store.zpopmin("list").await.unwrap(),
            Some(("a".to_string(), 1.0))
        );
    }

    #[tokio::test]
    async fn test_zpopmin_and_zrem() {
        let store = MemoryBackend::new();
        store.zadd("list", 5.0, "x").await.unwrap();
        store.zadd("list", 2.0, "y").await.unwrap();

        assert_eq!(
            store.zpopmin("list").await.unwrap(),
            Some(("y".to_string(), 2.0))
        );
        assert_eq!(store.zrem("list", "missing").await.unwrap(), 0);
        assert_eq!(store.zrem("list", "x").await.unwrap(), 1);
        assert_eq!(store.zcard("list").await.unwrap(), 0);
        assert_eq!(store.zpopmin("list").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_wrong_type_errors() {
        let store = MemoryBackend::new();
        store.set("text", "v", None).await.unwrap();
        store.zadd("list", 1.0, "a").await.unwrap();

        assert!(matches!(store.zcard("text").await, Err(CacheError::Store(_))));
        assert!(matches!(store.get("list").await, Err(CacheError::Store(_))));
    }

    #[tokio::test]
    async fn test_del() {
        let store = MemoryBackend::new();
        store.zadd("list", 1.0, "a").await.unwrap();

        assert_eq!(store.del("list").await.unwrap(), 1);
        assert_eq!(store.del("list").await.unwrap(), 0);
        assert!(store.is_empty().await);
    }
}
