//! REST backend speaking the Upstash-style HTTP command protocol.
//!
//! Every command is a `POST` of a JSON array (`["SET", "key", "value"]`) to the
//! endpoint root, authenticated with a bearer token. Replies are wrapped as
//! `{"result": ...}` or `{"error": "..."}`.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use super::{parse_popped, positive_expiry, SortOrder, StoreBackend};
use crate::error::{CacheError, Result};

/// Default request timeout for REST calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// == Set Options ==
/// Structured `SET` options record used by the REST client.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SetOptions {
    /// Expiry in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ex: Option<u64>,
}

impl SetOptions {
    /// Builds options from an optional expiry, dropping non-positive values.
    pub fn from_expiry(expiry_secs: Option<u64>) -> Self {
        Self {
            ex: positive_expiry(expiry_secs),
        }
    }

    /// Renders the options as trailing command arguments.
    pub fn to_args(&self) -> Vec<String> {
        match self.ex {
            Some(secs) => vec!["EX".to_string(), secs.to_string()],
            None => Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RestReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

// == Rest Backend ==
/// Backend issuing commands over HTTP.
#[derive(Clone)]
pub struct RestBackend {
    client: Client,
    url: String,
    token: String,
}

impl fmt::Debug for RestBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestBackend")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl RestBackend {
    /// Creates a client for the endpoint at `url` using `token` for auth.
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self::with_client(client, url, token))
    }

    /// Creates a backend around a preconfigured HTTP client.
    pub fn with_client(client: Client, url: impl Into<String>, token: impl Into<String>) -> Self {
        let url = url.into().trim_end_matches('/').to_string();
        Self {
            client,
            url,
            token: token.into(),
        }
    }

    /// Endpoint URL commands are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }

    #[instrument(skip_all)]
    async fn command(&self, args: Vec<String>) -> Result<Value> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&args)
            .send()
            .await?;

        let status = response.status();
        let reply: RestReply = response.json().await.map_err(|e| {
            CacheError::Store(format!("Invalid REST reply (HTTP {}): {}", status, e))
        })?;

        if let Some(error) = reply.error {
            return Err(CacheError::Store(error));
        }
        if !status.is_success() {
            return Err(CacheError::Store(format!("REST request failed: HTTP {}", status)));
        }

        debug!("REST {} ok", args[0]);
        Ok(reply.result.unwrap_or(Value::Null))
    }
}

// == Reply Conversions ==
fn reply_string(value: Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(CacheError::Store(format!("Expected string reply, got {}", other))),
    }
}

fn reply_integer(value: Value) -> Result<i64> {
    let parsed = match &value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        Value::Null => Some(0),
        _ => None,
    };
    parsed.ok_or_else(|| CacheError::Store(format!("Expected integer reply, got {}", value)))
}

fn reply_strings(value: Value) -> Result<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| reply_string(item).map(Option::unwrap_or_default))
            .collect(),
        other => Err(CacheError::Store(format!("Expected array reply, got {}", other))),
    }
}

#[async_trait]
impl StoreBackend for RestBackend {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let reply = self.command(vec!["GET".into(), key.into()]).await?;
        reply_string(reply)
    }

    async fn set(&self, key: &str, value: &str, expiry_secs: Option<u64>) -> Result<String> {
        let options = SetOptions::from_expiry(expiry_secs);
        let mut args = vec!["SET".to_string(), key.to_string(), value.to_string()];
        args.extend(options.to_args());

        let reply = self.command(args).await?;
        Ok(reply_string(reply)?.unwrap_or_default())
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<i64> {
        let reply = self
            .command(vec![
                "ZADD".into(),
                key.into(),
                "CH".into(),
                score.to_string(),
                member.into(),
            ])
            .await?;
        reply_integer(reply)
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<i64> {
        let reply = self
            .command(vec!["ZREM".into(), key.into(), member.into()])
            .await?;
        reply_integer(reply)
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        let reply = self.command(vec!["ZCARD".into(), key.into()]).await?;
        Ok(reply_integer(reply)?.max(0) as u64)
    }

    async fn zrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        order: SortOrder,
    ) -> Result<Vec<String>> {
        let mut args = vec![
            "ZRANGE".to_string(),
            key.to_string(),
            start.to_string(),
            stop.to_string(),
        ];
        if order == SortOrder::Descending {
            args.push("REV".to_string());
        }
        args.push("WITHSCORES".to_string());

        let reply = self.command(args).await?;
        reply_strings(reply)
    }

    async fn zpopmin(&self, key: &str) -> Result<Option<(String, f64)>> {
        let reply = self.command(vec!["ZPOPMIN".into(), key.into()]).await?;
        parse_popped(reply_strings(reply)?)
    }

    async fn del(&self, key: &str) -> Result<i64> {
        let reply = self.command(vec!["DEL".into(), key.into()]).await?;
        reply_integer(reply)
    }
}
