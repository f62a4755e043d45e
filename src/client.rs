//! Cache Client Module
//!
//! The constructed client object that carries the selected backend and the
//! configuration every operation reads.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::{RedisBackend, RestBackend, StoreBackend};
use crate::config::{effective_max, Config, InitParams};
use crate::error::{CacheError, Result};

// == Use Cache ==
/// Entry point for the scalar cache, the paginated list engine and the
/// composite operations.
///
/// Cloning is cheap; clones share the backend connection.
#[derive(Clone)]
pub struct UseCache {
    backend: Arc<dyn StoreBackend>,
    max_paginated_items: usize,
    verbose: bool,
}

impl UseCache {
    // == Init ==
    /// Builds a client from the initialization record.
    ///
    /// Fails with [`CacheError::Configuration`] when neither client handle is
    /// present. The direct-protocol client wins when both are given.
    pub fn init(params: InitParams) -> Result<Self> {
        let InitParams {
            redis,
            rest,
            max_paginated_items,
            verbose,
        } = params;

        let backend: Arc<dyn StoreBackend> = match (redis, rest) {
            (Some(redis), _) => Arc::new(redis),
            (None, Some(rest)) => Arc::new(rest),
            (None, None) => {
                return Err(CacheError::Configuration(
                    "Missing redis instance".to_string(),
                ))
            }
        };

        Ok(Self::from_parts(
            backend,
            effective_max(max_paginated_items),
            verbose,
        ))
    }

    // == Connect ==
    /// Builds the backend described by `config`, preferring the
    /// direct-protocol URL over the REST endpoint.
    pub async fn connect(config: &Config) -> Result<Self> {
        let mut params = InitParams {
            max_paginated_items: Some(config.max_paginated_items),
            verbose: config.verbose,
            ..InitParams::default()
        };

        if let Some(url) = &config.redis_url {
            params.redis = Some(RedisBackend::connect(url).await?);
        } else if let Some(url) = &config.rest_url {
            let token = config.rest_token.clone().ok_or_else(|| {
                CacheError::Configuration("REST url set without a token".to_string())
            })?;
            params.rest = Some(RestBackend::new(url.clone(), token)?);
        }

        Self::init(params)
    }

    // == With Backend ==
    /// Builds a client around any backend implementation.
    pub fn with_backend<B>(backend: B, config: &Config) -> Self
    where
        B: StoreBackend + 'static,
    {
        Self::from_parts(
            Arc::new(backend),
            effective_max(Some(config.max_paginated_items)),
            config.verbose,
        )
    }

    fn from_parts(backend: Arc<dyn StoreBackend>, max_paginated_items: usize, verbose: bool) -> Self {
        info!(
            "Cache client initialized: backend={}, max_paginated_items={}",
            backend.name(),
            max_paginated_items
        );
        Self {
            backend,
            max_paginated_items,
            verbose,
        }
    }

    /// Upper bound on the number of members of any paginated list.
    pub fn max_paginated_items(&self) -> usize {
        self.max_paginated_items
    }

    /// Name of the configured backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub(crate) fn backend(&self) -> &dyn StoreBackend {
        self.backend.as_ref()
    }

    /// Logs an operation at info when verbose, debug otherwise.
    pub(crate) fn log_op(&self, op: &str, key: &str) {
        if self.verbose {
            info!(op, key, "cache operation");
        } else {
            debug!(op, key, "cache operation");
        }
    }
}

impl fmt::Debug for UseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UseCache")
            .field("backend", &self.backend.name())
            .field("max_paginated_items", &self.max_paginated_items)
            .field("verbose", &self.verbose)
            .finish()
    }
}
