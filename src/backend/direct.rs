//! Direct-protocol backend over a multiplexed Redis connection.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Value};
use tracing::debug;

use super::{parse_popped, positive_expiry, SortOrder, StoreBackend};
use crate::error::{CacheError, Result};

/// Backend speaking the Redis wire protocol.
///
/// Expiry is passed positionally as `EX <seconds>`.
#[derive(Clone)]
pub struct RedisBackend {
    connection: ConnectionManager,
}

impl RedisBackend {
    /// Opens a managed connection to the server at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        debug!("Connected to redis at {}", url);

        Ok(Self { connection })
    }

    /// Wraps an already established connection manager.
    pub fn from_connection(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    /// Test the connection to Redis
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

/// Renders a status reply (`+OK`) or bulk string as text.
fn status_text(value: Value) -> Result<String> {
    match value {
        Value::Okay => Ok("OK".to_string()),
        Value::SimpleString(s) => Ok(s),
        Value::BulkString(bytes) => String::from_utf8(bytes)
            .map_err(|e| CacheError::Store(format!("Non UTF-8 status reply: {}", e))),
        Value::Nil => Ok(String::new()),
        other => Err(CacheError::Store(format!(
            "Unexpected SET reply: {:?}",
            other
        ))),
    }
}

#[async_trait]
impl StoreBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, expiry_secs: Option<u64>) -> Result<String> {
        let mut conn = self.connection.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(secs) = positive_expiry(expiry_secs) {
            cmd.arg("EX").arg(secs);
        }

        let reply: Value = cmd.query_async(&mut conn).await?;
        status_text(reply)
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<i64> {
        let mut conn = self.connection.clone();
        let changed: i64 = redis::cmd("ZADD")
            .arg(key)
            .arg("CH")
            .arg(score)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(changed)
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<i64> {
        let mut conn = self.connection.clone();
        let removed: i64 = redis::cmd("ZREM")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(removed)
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        let mut conn = self.connection.clone();
        let count: u64 = redis::cmd("ZCARD").arg(key).query_async(&mut conn).await?;
        Ok(count)
    }

    async fn zrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        order: SortOrder,
    ) -> Result<Vec<String>> {
        let mut conn = self.connection.clone();
        let command = match order {
            SortOrder::Ascending => "ZRANGE",
            SortOrder::Descending => "ZREVRANGE",
        };

        let flat: Vec<String> = redis::cmd(command)
            .arg(key)
            .arg(start)
            .arg(stop)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;
        Ok(flat)
    }

    async fn zpopmin(&self, key: &str) -> Result<Option<(String, f64)>> {
        let mut conn = self.connection.clone();
        let reply: Vec<String> = redis::cmd("ZPOPMIN").arg(key).query_async(&mut conn).await?;
        parse_popped(reply)
    }

    async fn del(&self, key: &str) -> Result<i64> {
        let mut conn = self.connection.clone();
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed)
    }
}
