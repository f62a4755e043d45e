//! Composite Operations Module
//!
//! Read-through access to items that are also members of a paginated list,
//! plus the key helpers shared by both layers.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{CacheValue, GetOrRefresh, RefreshError};
use crate::client::UseCache;
use crate::error::{CacheError, Result};

// == Key Helpers ==
/// Default cache key of an item belonging to a paginated list.
pub fn default_item_key(list_key: &str, item_id: &str) -> String {
    format!("{}:id:{}", list_key, item_id)
}

/// Builds a deterministic key fragment from a flat filter record.
///
/// Each property contributes its capitalized name followed by its capitalized
/// value, in the record's field order. Empty, null, false and zero values
/// contribute only the name. Anything that does not serialize to an object
/// yields an empty string.
///
/// `{"limit": 1, "team": "team-id"}` becomes `"Limit1TeamTeam-id"`.
pub fn generate_key_from_filters<F: Serialize + ?Sized>(filters: &F) -> String {
    let fields = match serde_json::to_value(filters) {
        Ok(Value::Object(fields)) => fields,
        Ok(_) => return String::new(),
        Err(err) => {
            debug!("generate_key_from_filters(): unserializable filters: {}", err);
            return String::new();
        }
    };

    fields
        .iter()
        .map(|(name, value)| format!("{}{}", capitalize(name), capitalize(&value_segment(value))))
        .collect()
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn value_segment(value: &Value) -> String {
    if !is_truthy(value) {
        return String::new();
    }
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => number_text(n),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                Value::String(s) => s.clone(),
                Value::Number(n) => number_text(n),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

/// Integral floats render without a fractional part (`1.0` -> `1`).
fn number_text(n: &serde_json::Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        _ => n.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// == Get Or Refresh In List Params ==
/// Parameters of a read-through lookup of a list item.
pub struct GetOrRefreshInList<'a, T> {
    list_key: String,
    id: Option<String>,
    key: Option<String>,
    score: Option<f64>,
    update_score_in_list: bool,
    read: GetOrRefresh<'a, T>,
}

impl<'a, T> GetOrRefreshInList<'a, T> {
    /// Lookup of an item of `list_key`; set an id or an explicit key.
    pub fn new(list_key: impl Into<String>) -> Self {
        Self {
            list_key: list_key.into(),
            id: None,
            key: None,
            score: None,
            update_score_in_list: false,
            read: GetOrRefresh::new(String::new()),
        }
    }

    /// Item id; also derives the cache key when no explicit key is set.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Explicit cache key, overriding `<list_key>:id:<id>`.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// New list score applied on a successful read.
    pub fn score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    /// Opt in to refreshing the member's score on access.
    pub fn update_score_in_list(mut self, update: bool) -> Self {
        self.update_score_in_list = update;
        self
    }

    pub fn expiry(mut self, seconds: u64) -> Self {
        self.read = self.read.expiry(seconds);
        self
    }

    pub fn force_refresh(mut self, force: bool) -> Self {
        self.read = self.read.force_refresh(force);
        self
    }

    pub fn parse_result(mut self, parse: bool) -> Self {
        self.read = self.read.parse_result(parse);
        self
    }

    pub fn refresh_with<F, Fut>(mut self, handler: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = std::result::Result<T, RefreshError>> + Send + 'a,
    {
        self.read = self.read.refresh_with(handler);
        self
    }
}

impl UseCache {
    // == Get Or Refresh In List ==
    /// Reads an item through the scalar cache and, when opted in, refreshes
    /// its score in the list.
    ///
    /// The score is only written when the read produced a value, the id
    /// (explicit, or the value's `id` field) is non-empty and the score is
    /// positive. A failing score update is logged and does not affect the
    /// returned value.
    pub async fn get_or_refresh_in_list<T>(
        &self,
        params: GetOrRefreshInList<'_, T>,
    ) -> Result<Option<CacheValue<T>>>
    where
        T: Serialize + DeserializeOwned,
    {
        let GetOrRefreshInList {
            list_key,
            id,
            key,
            score,
            update_score_in_list,
            read,
        } = params;
        let id = id.filter(|id| !id.is_empty());

        let key = match (key.filter(|k| !k.is_empty()), id.as_deref()) {
            (Some(key), _) => key,
            (None, Some(id)) => default_item_key(&list_key, id),
            (None, None) => {
                return Err(CacheError::Usage(
                    "get_or_refresh_in_list(): an id or a key is required.".to_string(),
                ))
            }
        };

        let value = self.get_or_refresh(read.with_key(key)).await?;

        let score = score.filter(|s| *s > 0.0);
        let (Some(found), Some(score), true) = (value.as_ref(), score, update_score_in_list) else {
            return Ok(value);
        };

        let json = match found {
            CacheValue::Raw(raw) => Value::String(raw.clone()),
            CacheValue::Typed(typed) => serde_json::to_value(typed).unwrap_or(Value::Null),
        };
        if !is_truthy(&json) {
            return Ok(value);
        }

        let member = id.or_else(|| match found {
            CacheValue::Typed(_) => json.get("id").and_then(Value::as_str).map(str::to_string),
            CacheValue::Raw(_) => None,
        });
        let Some(member) = member.filter(|m| !m.is_empty()) else {
            return Ok(value);
        };

        match self.update_score(&list_key, &member, score).await {
            Ok(reply) => debug!("Refreshed score of '{}' in {}: {}", member, list_key, reply),
            Err(err) => warn!("Score refresh of '{}' in {} failed: {}", member, list_key, err),
        }

        Ok(value)
    }
}
