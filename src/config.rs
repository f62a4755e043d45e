//! Configuration Module
//!
//! Handles loading the cache client configuration from environment variables
//! and the explicit initialization record.

use std::env;

use crate::backend::{RedisBackend, RestBackend};

/// Default bound on the number of members a paginated list may hold.
pub const DEFAULT_MAX_PAGINATED_ITEMS: usize = 1000;

/// Cache client configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Maximum number of members a paginated list can hold before evicting
    pub max_paginated_items: usize,
    /// Log every operation at info level
    pub verbose: bool,
    /// Connection URL for the direct-protocol client
    pub redis_url: Option<String>,
    /// Base URL of the REST endpoint
    pub rest_url: Option<String>,
    /// Bearer token for the REST endpoint
    pub rest_token: Option<String>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `USE_CACHE_MAX_PAGINATED_ITEMS` - List size bound (default: 1000)
    /// - `USE_CACHE_VERBOSE` - Verbose operation logging (default: false)
    /// - `REDIS_URL` - Direct-protocol connection URL
    /// - `UPSTASH_REDIS_REST_URL` - REST endpoint URL
    /// - `UPSTASH_REDIS_REST_TOKEN` - REST endpoint token
    pub fn from_env() -> Self {
        Self {
            max_paginated_items: env::var("USE_CACHE_MAX_PAGINATED_ITEMS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(DEFAULT_MAX_PAGINATED_ITEMS),
            verbose: env::var("USE_CACHE_VERBOSE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            redis_url: non_empty_var("REDIS_URL"),
            rest_url: non_empty_var("UPSTASH_REDIS_REST_URL"),
            rest_token: non_empty_var("UPSTASH_REDIS_REST_TOKEN"),
        }
    }

    /// Sets the list bound, keeping the default for zero.
    pub fn with_max_paginated_items(mut self, max: usize) -> Self {
        self.max_paginated_items = effective_max(Some(max));
        self
    }

    /// Enables or disables verbose operation logging.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_paginated_items: DEFAULT_MAX_PAGINATED_ITEMS,
            verbose: false,
            redis_url: None,
            rest_url: None,
            rest_token: None,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Resolves the list bound, falling back to the default when missing or zero.
pub(crate) fn effective_max(max: Option<usize>) -> usize {
    max.filter(|&n| n > 0).unwrap_or(DEFAULT_MAX_PAGINATED_ITEMS)
}

// == Init Params ==
/// Initialization record accepted by [`UseCache::init`](crate::UseCache::init).
///
/// Exactly one of the two client handles is expected. When both are set the
/// direct-protocol client is used.
#[derive(Default)]
pub struct InitParams {
    /// Direct-protocol client
    pub redis: Option<RedisBackend>,
    /// REST client
    pub rest: Option<RestBackend>,
    /// List size bound; zero or `None` selects the default
    pub max_paginated_items: Option<usize>,
    /// Log every operation at info level
    pub verbose: bool,
}
