//! Scalar Cache Module
//!
//! Read-through `get_or_refresh` and error-as-value `set` over single string keys.

use std::future::Future;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::client::UseCache;
use crate::error::{CacheError, Result};

/// Status reply of a successful write.
pub const OK: &str = "OK";

/// Error type a refresh handler may fail with.
pub type RefreshError = Box<dyn std::error::Error + Send + Sync>;

type RefreshFuture<'a, T> =
    Pin<Box<dyn Future<Output = std::result::Result<T, RefreshError>> + Send + 'a>>;
type RefreshHandler<'a, T> = Box<dyn FnOnce() -> RefreshFuture<'a, T> + Send + 'a>;

// == Cache Value ==
/// A value returned by [`UseCache::get_or_refresh`].
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue<T> {
    /// Stored string returned as-is
    Raw(String),
    /// Deserialized stored value, or the value produced by the refresh handler
    Typed(T),
}

impl<T> CacheValue<T> {
    /// The typed value, if this is not a raw string.
    pub fn into_typed(self) -> Option<T> {
        match self {
            CacheValue::Typed(value) => Some(value),
            CacheValue::Raw(_) => None,
        }
    }

    /// The raw string, if this was returned undecoded.
    pub fn as_raw(&self) -> Option<&str> {
        match self {
            CacheValue::Raw(raw) => Some(raw),
            CacheValue::Typed(_) => None,
        }
    }
}

// == Get Or Refresh Params ==
/// Parameters of a read-through lookup.
pub struct GetOrRefresh<'a, T> {
    pub(crate) key: String,
    pub(crate) expiry: Option<u64>,
    pub(crate) force_refresh: bool,
    pub(crate) parse_result: bool,
    pub(crate) refresh: Option<RefreshHandler<'a, T>>,
}

impl<'a, T> GetOrRefresh<'a, T> {
    /// Lookup of `key` with no expiry, no forced refresh and no decoding.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            expiry: None,
            force_refresh: false,
            parse_result: false,
            refresh: None,
        }
    }

    /// Expiry in seconds applied when a refreshed value is written back.
    pub fn expiry(mut self, seconds: u64) -> Self {
        self.expiry = Some(seconds);
        self
    }

    /// Invoke the refresh handler even when a value is cached.
    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    /// Decode the stored string as JSON before returning it.
    pub fn parse_result(mut self, parse: bool) -> Self {
        self.parse_result = parse;
        self
    }

    /// Producer invoked on a miss (or always, with `force_refresh`).
    pub fn refresh_with<F, Fut>(mut self, handler: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = std::result::Result<T, RefreshError>> + Send + 'a,
    {
        self.refresh = Some(Box::new(move || Box::pin(handler())));
        self
    }

    pub(crate) fn with_key(mut self, key: String) -> Self {
        self.key = key;
        self
    }
}

// == Payload Encoding ==
/// Encodes a value to its stored string form.
///
/// Strings are stored verbatim, numbers and booleans stringified, and
/// structured values (objects, arrays, null) as JSON text.
pub fn encode_payload<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let json = serde_json::to_value(value).map_err(|e| CacheError::Serialize(e.to_string()))?;
    Ok(match json {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    })
}

impl UseCache {
    // == Get Or Refresh ==
    /// Reads `params.key`, refreshing it through the handler on a miss or
    /// when forced.
    ///
    /// A refreshed value is written back (with the expiry, if positive) and
    /// returned exactly as produced. Returns `Ok(None)` when nothing is cached
    /// and no refresh happened.
    pub async fn get_or_refresh<T>(&self, params: GetOrRefresh<'_, T>) -> Result<Option<CacheValue<T>>>
    where
        T: Serialize + DeserializeOwned,
    {
        let GetOrRefresh {
            key,
            expiry,
            force_refresh,
            parse_result,
            refresh,
        } = params;
        self.log_op("get_or_refresh", &key);

        let stored = self.backend().get(&key).await?;
        let missing = stored.as_deref().map_or(true, str::is_empty);

        if missing || force_refresh {
            if let Some(handler) = refresh {
                let value = handler()
                    .await
                    .map_err(|e| CacheError::Store(format!("Refresh handler failed: {}", e)))?;
                let encoded = encode_payload(&value)?;
                self.backend().set(&key, &encoded, expiry).await?;
                debug!("Refreshed cache key {}", key);

                return Ok(Some(CacheValue::Typed(value)));
            }
        }

        let Some(raw) = stored else {
            return Ok(None);
        };

        if parse_result && !raw.is_empty() {
            let value = serde_json::from_str(&raw)?;
            return Ok(Some(CacheValue::Typed(value)));
        }

        Ok(Some(CacheValue::Raw(raw)))
    }

    // == Set ==
    /// Writes `value` under `key`, returning `"OK"` or the failure message.
    ///
    /// A `None` value is rejected before any store command is issued. Errors
    /// are returned as the message string rather than raised.
    pub async fn set<T>(&self, key: &str, value: Option<&T>, expiry: Option<u64>) -> String
    where
        T: Serialize + ?Sized,
    {
        self.log_op("set", key);
        match self.try_set(key, value, expiry).await {
            Ok(reply) => reply,
            Err(err) => {
                debug!("set({}) failed: {}", key, err);
                err.to_string()
            }
        }
    }

    async fn try_set<T>(&self, key: &str, value: Option<&T>, expiry: Option<u64>) -> Result<String>
    where
        T: Serialize + ?Sized,
    {
        let value = value
            .ok_or_else(|| CacheError::Usage("set(): value should not be undefined.".to_string()))?;
        let encoded = encode_payload(value)?;
        self.backend().set(key, &encoded, expiry).await
    }
}
