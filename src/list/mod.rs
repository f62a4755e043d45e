//! Paginated List Module
//!
//! Score-ordered lists of item ids kept in a sorted set, bounded by
//! `max_paginated_items`. When the bound is reached the lowest-scored member is
//! evicted before the next insertion; scores default to the insertion timestamp
//! so the lowest score approximates the least recently used member.
//!
//! Operations issue several independent round trips. Concurrent inserts into
//! the same list can race between the cardinality read and the write, so the
//! bound holds per caller but is best-effort under concurrent load.


use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::{current_timestamp_ms, SortOrder};
use crate::cache::OK;
use crate::client::UseCache;
use crate::composite::default_item_key;
use crate::error::{CacheError, Result};

// == List Reply ==
/// Acknowledgment of a list mutation.
///
/// `Error` is a soft failure: the store acknowledged no change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListReply {
    Ok,
    Error,
}

impl ListReply {
    fn from_ack(count: i64) -> Self {
        if count > 0 {
            ListReply::Ok
        } else {
            ListReply::Error
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ListReply::Ok)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ListReply::Ok => "OK",
            ListReply::Error => "Error",
        }
    }
}

impl fmt::Display for ListReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == List Record ==
/// A record that can be inserted into a paginated list.
pub trait ListRecord {
    /// Member id, unique within the list.
    fn id(&self) -> &str;
    /// Ordering score; higher sorts first.
    fn score(&self) -> f64;
}

// == Insert Many Options ==
/// Payload caching options for [`UseCache::insert_many`].
#[derive(Debug, Clone, Default)]
pub struct InsertManyOptions {
    /// Also store each record's payload through the scalar cache
    pub cache_payload: bool,
    /// Payload key prefix; the key is `<prefix><id>`. Defaults to
    /// `<list_key>:id:<id>` when unset or empty
    pub cache_prefix: Option<String>,
    /// Expiry in seconds of each payload entry
    pub payload_expiry: Option<u64>,
}

impl InsertManyOptions {
    fn payload_key(&self, list_key: &str, id: &str) -> String {
        match self.cache_prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => format!("{}{}", prefix, id),
            _ => default_item_key(list_key, id),
        }
    }
}

// == Member ==
#[derive(Debug, Clone, PartialEq)]
struct Member {
    id: String,
    score: f64,
}

/// Pairs a flat member/score reply, dropping empty ids and non-numeric scores.
fn parse_members(flat: Vec<String>) -> Vec<Member> {
    let mut members = Vec::with_capacity(flat.len() / 2);
    let mut iter = flat.into_iter();

    while let (Some(id), Some(score)) = (iter.next(), iter.next()) {
        match score.parse::<f64>() {
            Ok(score) if !id.is_empty() && !score.is_nan() => members.push(Member { id, score }),
            _ => debug!("Skipping malformed list entry '{}' -> '{}'", id, score),
        }
    }
    members
}

/// Inclusive zero-based window of a 1-indexed page.
fn page_window(page: usize, size_per_page: usize) -> Result<(i64, i64)> {
    let start = (page - 1)
        .checked_mul(size_per_page)
        .and_then(|start| i64::try_from(start).ok());
    let size = i64::try_from(size_per_page).ok();

    match (start, size) {
        (Some(start), Some(size)) if start.checked_add(size).is_some() => {
            Ok((start, start + size - 1))
        }
        _ => Err(CacheError::Usage(format!(
            "get_page(): page {} of size {} is out of range",
            page, size_per_page
        ))),
    }
}

fn require_id(op: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(CacheError::Usage(format!("{}(): Invalid id.", op)));
    }
    Ok(())
}

impl UseCache {
    // == Total Items ==
    /// Number of members in the list.
    pub async fn get_total_items(&self, list_key: &str) -> Result<u64> {
        self.log_op("get_total_items", list_key);
        self.backend().zcard(list_key).await
    }

    // == Insert ==
    /// Inserts `id`, or re-scores it if already present.
    ///
    /// Without a score the current timestamp in milliseconds is used. If the
    /// list already holds `max_paginated_items` members, the lowest-scored
    /// member is evicted first.
    pub async fn insert(&self, list_key: &str, id: &str, score: Option<f64>) -> Result<ListReply> {
        if let Some(score) = score {
            if score.is_nan() || score < 0.0 {
                return Err(CacheError::Usage("insert(): Invalid score.".to_string()));
            }
        }
        self.log_op("insert", list_key);

        let total = self.backend().zcard(list_key).await?;
        let score = score.unwrap_or_else(|| current_timestamp_ms() as f64);

        if total >= self.max_paginated_items() as u64 {
            if let Some((evicted, evicted_score)) = self.backend().zpopmin(list_key).await? {
                info!(
                    "Evicted '{}' (score {}) from list {} at {} items",
                    evicted, evicted_score, list_key, total
                );
            }
        }

        let changed = self.backend().zadd(list_key, score, id).await?;
        Ok(ListReply::from_ack(changed))
    }

    // == Insert Many ==
    /// Inserts every record one at a time, optionally caching each payload.
    ///
    /// All scores must be at least 1; otherwise the batch is rejected before
    /// any write. An empty batch returns [`ListReply::Error`].
    pub async fn insert_many<R>(
        &self,
        list_key: &str,
        records: &[R],
        options: &InsertManyOptions,
    ) -> Result<ListReply>
    where
        R: ListRecord + Serialize,
    {
        if records.is_empty() {
            return Ok(ListReply::Error);
        }
        if let Some(invalid) = records.iter().find(|r| !(r.score() >= 1.0)) {
            return Err(CacheError::Usage(format!(
                "insert_many(): invalid score {} for id '{}'",
                invalid.score(),
                invalid.id()
            )));
        }
        self.log_op("insert_many", list_key);

        for record in records {
            let reply = self.insert(list_key, record.id(), Some(record.score())).await?;
            if !reply.is_ok() {
                debug!("insert_many(): '{}' left unchanged in {}", record.id(), list_key);
            }

            if options.cache_payload {
                let key = options.payload_key(list_key, record.id());
                let status = self.set(&key, Some(record), options.payload_expiry).await;
                if status != OK {
                    warn!("insert_many(): caching payload {} failed: {}", key, status);
                }
            }
        }

        Ok(ListReply::Ok)
    }

    // == Get Page ==
    /// Ids on the 1-indexed `page` of `size_per_page` members.
    ///
    /// The window is fetched from the store in `order`, then re-sorted by
    /// score high-to-low before the ids are returned. An ascending fetch
    /// therefore selects the lowest-scored window but still lists it
    /// highest first. Page 0 and an empty page size yield no ids.
    pub async fn get_page(
        &self,
        list_key: &str,
        page: usize,
        size_per_page: usize,
        order: SortOrder,
    ) -> Result<Vec<String>> {
        if page == 0 || size_per_page == 0 {
            return Ok(Vec::new());
        }
        self.log_op("get_page", list_key);

        let (start, end) = page_window(page, size_per_page)?;
        let flat = self
            .backend()
            .zrange_with_scores(list_key, start, end, order)
            .await?;

        let mut members = parse_members(flat);
        members.sort_by(|a, b| b.score.total_cmp(&a.score));

        Ok(members.into_iter().map(|m| m.id).collect())
    }

    // == Remove ==
    /// Removes `id`; `Error` if it was not a member.
    pub async fn remove(&self, list_key: &str, id: &str) -> Result<ListReply> {
        require_id("remove", id)?;
        self.log_op("remove", list_key);

        let removed = self.backend().zrem(list_key, id).await?;
        Ok(ListReply::from_ack(removed))
    }

    // == Update Score ==
    /// Sets the score of `id`, adding it when absent.
    ///
    /// `Error` when the store reports no change (same score as before).
    pub async fn update_score(&self, list_key: &str, id: &str, score: f64) -> Result<ListReply> {
        require_id("update_score", id)?;
        self.log_op("update_score", list_key);

        let changed = self.backend().zadd(list_key, score, id).await?;
        Ok(ListReply::from_ack(changed))
    }

    // == Delete List ==
    /// Deletes the whole list, returning the number of keys removed.
    pub async fn delete_list(&self, list_key: &str) -> Result<i64> {
        self.log_op("delete_list", list_key);
        self.backend().del(list_key).await
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, StoreBackend};
    use crate::config::Config;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Post {
        id: String,
        score: f64,
        title: String,
    }

    impl ListRecord for Post {
        fn id(&self) -> &str {
            &self.id
        }
        fn score(&self) -> f64 {
            self.score
        }
    }

    fn post(id: &str, score: f64) -> Post {
        Post {
            id: id.to_string(),
            score,
            title: format!("Post {}", id),
        }
    }

    fn setup(max: usize) -> (UseCache, MemoryBackend) {
        let store = MemoryBackend::new();
        let config = Config::default().with_max_paginated_items(max);
        (UseCache::with_backend(store.clone(), &config), store)
    }

    #[test]
    fn test_list_reply_display() {
        assert_eq!(ListReply::Ok.to_string(), "OK");
        assert_eq!(ListReply::Error.to_string(), "Error");
        assert_eq!(ListReply::from_ack(1), ListReply::Ok);
        assert_eq!(ListReply::from_ack(0), ListReply::Error);
    }

    #[test]
    fn test_parse_members_drops_malformed() {
        let flat = vec!["a", "3", "", "2", "b", "nan", "c", "x", "d", "1", "dangling"]
            .into_iter()
            .map(String::from)
            .collect();

        let members = parse_members(flat);
        assert_eq!(
            members,
            vec![
                Member { id: "a".to_string(), score: 3.0 },
                Member { id: "d".to_string(), score: 1.0 },
            ]
        );
    }

    #[test]
    fn test_page_window() {
        assert_eq!(page_window(1, 10).unwrap(), (0, 9));
        assert_eq!(page_window(3, 5).unwrap(), (10, 14));
        assert!(page_window(usize::MAX, usize::MAX).is_err());
    }

    #[tokio::test]
    async fn test_insert_and_total() {
        let (cache, _) = setup(10);

        assert_eq!(cache.insert("posts", "a", Some(1.0)).await.unwrap(), ListReply::Ok);
        assert_eq!(cache.insert("posts", "b", None).await.unwrap(), ListReply::Ok);
        assert_eq!(cache.get_total_items("posts").await.unwrap(), 2);

        // Timestamp default ranks the un-scored insert first
        let page = cache.get_page("posts", 1, 10, SortOrder::Descending).await.unwrap();
        assert_eq!(page, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_insert_negative_score_rejected() {
        let (cache, store) = setup(10);

        let result = cache.insert("posts", "a", Some(-1.0)).await;
        assert!(matches!(result, Err(CacheError::Usage(_))));
        assert!(matches!(
            cache.insert("posts", "a", Some(f64::NAN)).await,
            Err(CacheError::Usage(_))
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_insert_zero_score_allowed() {
        let (cache, _) = setup(10);
        assert!(cache.insert("posts", "a", Some(0.0)).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_insert_same_score_twice_is_soft_error() {
        let (cache, _) = setup(10);

        cache.insert("posts", "a", Some(5.0)).await.unwrap();
        assert_eq!(
            cache.insert("posts", "a", Some(5.0)).await.unwrap(),
            ListReply::Error
        );
        assert_eq!(cache.get_total_items("posts").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_evicts_lowest_score() {
        let (cache, _) = setup(3);

        cache.insert("posts", "low", Some(1.0)).await.unwrap();
        cache.insert("posts", "high", Some(30.0)).await.unwrap();
        cache.insert("posts", "mid", Some(20.0)).await.unwrap();
        cache.insert("posts", "new", Some(10.0)).await.unwrap();

        assert_eq!(cache.get_total_items("posts").await.unwrap(), 3);
        let page = cache.get_page("posts", 1, 10, SortOrder::Descending).await.unwrap();
        assert_eq!(page, vec!["high", "mid", "new"]);
    }

    #[tokio::test]
    async fn test_reinsert_at_capacity_still_evicts() {
        let (cache, _) = setup(3);

        cache.insert("posts", "a", Some(1.0)).await.unwrap();
        cache.insert("posts", "b", Some(2.0)).await.unwrap();
        cache.insert("posts", "c", Some(3.0)).await.unwrap();
        cache.insert("posts", "c", Some(4.0)).await.unwrap();

        assert_eq!(cache.get_total_items("posts").await.unwrap(), 2);
        let page = cache.get_page("posts", 1, 10, SortOrder::Descending).await.unwrap();
        assert_eq!(page, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_get_page_windows() {
        let (cache, _) = setup(100);
        for i in 1..=7 {
            cache.insert("posts", &format!("p{}", i), Some(i as f64)).await.unwrap();
        }

        let first = cache.get_page("posts", 1, 3, SortOrder::Descending).await.unwrap();
        let second = cache.get_page("posts", 2, 3, SortOrder::Descending).await.unwrap();
        let third = cache.get_page("posts", 3, 3, SortOrder::Descending).await.unwrap();
        let beyond = cache.get_page("posts", 4, 3, SortOrder::Descending).await.unwrap();

        assert_eq!(first, vec!["p7", "p6", "p5"]);
        assert_eq!(second, vec!["p4", "p3", "p2"]);
        assert_eq!(third, vec!["p1"]);
        assert!(beyond.is_empty());
    }

    #[tokio::test]
    async fn test_get_page_ascending_window_is_resorted_descending() {
        let (cache, _) = setup(100);
        for i in 1..=5 {
            cache.insert("posts", &format!("p{}", i), Some(i as f64)).await.unwrap();
        }

        // The ascending fetch picks the lowest-scored window, but the
        // returned ids are still ordered high to low.
        let page = cache.get_page("posts", 1, 2, SortOrder::Ascending).await.unwrap();
        assert_eq!(page, vec!["p2", "p1"]);
    }

    #[tokio::test]
    async fn test_get_page_boundaries() {
        let (cache, _) = setup(100);

        assert!(cache.get_page("empty", 1, 10, SortOrder::Descending).await.unwrap().is_empty());
        assert!(cache.get_page("empty", 5, 10, SortOrder::Ascending).await.unwrap().is_empty());

        assert!(cache.get_page("empty", 0, 10, SortOrder::Descending).await.unwrap().is_empty());

        cache.insert("posts", "a", Some(1.0)).await.unwrap();
        assert!(cache.get_page("posts", 1, 0, SortOrder::Descending).await.unwrap().is_empty());
        assert!(cache.get_page("posts", 0, 10, SortOrder::Descending).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove() {
        let (cache, _) = setup(10);
        cache.insert("posts", "a", Some(1.0)).await.unwrap();

        assert_eq!(cache.remove("posts", "a").await.unwrap(), ListReply::Ok);
        assert_eq!(cache.remove("posts", "a").await.unwrap(), ListReply::Error);
        assert!(matches!(cache.remove("posts", "").await, Err(CacheError::Usage(_))));
    }

    #[tokio::test]
    async fn test_update_score_moves_member() {
        let (cache, _) = setup(10);
        cache.insert("posts", "a", Some(1.0)).await.unwrap();
        cache.insert("posts", "b", Some(2.0)).await.unwrap();
        cache.insert("posts", "c", Some(3.0)).await.unwrap();

        assert_eq!(cache.update_score("posts", "a", 10.0).await.unwrap(), ListReply::Ok);
        let page = cache.get_page("posts", 1, 3, SortOrder::Descending).await.unwrap();
        assert_eq!(page, vec!["a", "c", "b"]);

        assert!(matches!(
            cache.update_score("posts", "", 1.0).await,
            Err(CacheError::Usage(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_list() {
        let (cache, _) = setup(10);
        cache.insert("posts", "a", Some(1.0)).await.unwrap();

        assert_eq!(cache.delete_list("posts").await.unwrap(), 1);
        assert_eq!(cache.get_total_items("posts").await.unwrap(), 0);
        assert_eq!(cache.delete_list("posts").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_many_with_payloads() {
        let (cache, store) = setup(10);
        let posts = vec![post("a", 1.0), post("b", 2.0)];

        let reply = cache
            .insert_many(
                "posts",
                &posts,
                &InsertManyOptions {
                    cache_payload: true,
                    payload_expiry: Some(60),
                    ..InsertManyOptions::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(reply, ListReply::Ok);
        assert_eq!(cache.get_total_items("posts").await.unwrap(), 2);

        let stored = store.get("posts:id:b").await.unwrap().unwrap();
        assert_eq!(serde_json::from_str::<Post>(&stored).unwrap(), posts[1]);
        assert!(store.ttl("posts:id:b").await.is_some());
    }

    #[tokio::test]
    async fn test_insert_many_with_prefix() {
        let (cache, store) = setup(10);
        let options = InsertManyOptions {
            cache_payload: true,
            cache_prefix: Some("post:".to_string()),
            payload_expiry: None,
        };

        cache.insert_many("posts", &[post("a", 1.0)], &options).await.unwrap();

        assert!(store.get("post:a").await.unwrap().is_some());
        assert!(store.get("posts:id:a").await.unwrap().is_none());
        assert_eq!(store.ttl("post:a").await, None);
    }

    #[tokio::test]
    async fn test_insert_many_without_payloads() {
        let (cache, store) = setup(10);

        cache
            .insert_many("posts", &[post("a", 1.0)], &InsertManyOptions::default())
            .await
            .unwrap();

        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_insert_many_rejects_whole_batch() {
        let (cache, store) = setup(10);
        let posts = vec![post("a", 5.0), post("b", 0.5)];

        let result = cache
            .insert_many("posts", &posts, &InsertManyOptions::default())
            .await;

        assert!(matches!(result, Err(CacheError::Usage(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_insert_many_empty_is_error() {
        let (cache, _) = setup(10);

        let reply = cache
            .insert_many::<Post>("posts", &[], &InsertManyOptions::default())
            .await
            .unwrap();
        assert_eq!(reply, ListReply::Error);
    }
}
