//! Cache Entry Module
//!
//! Defines string entries with TTL support held by the in-memory backend.

use chrono::Utc;

// == Cache Entry ==
/// Represents a single string value with expiry metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value
    pub value: String,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry with optional TTL.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `ttl_seconds` - Optional TTL in seconds
    pub fn new(value: String, ttl_seconds: Option<u64>) -> Self {
        let now = current_timestamp_ms();
        let expires_at = ttl_seconds.map(|ttl| now.saturating_add(ttl.saturating_mul(1000)));

        Self { value, expires_at }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches its expiration time.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => current_timestamp_ms() >= expires,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns remaining TTL in seconds, or None if no expiration is set.
    pub fn ttl_remaining(&self) -> Option<u64> {
        self.expires_at
            .map(|expires| expires.saturating_sub(current_timestamp_ms()) / 1000)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
