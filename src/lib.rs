//! Use Cache - read-through caching and paginated lists over Redis
//!
//! Provides a scalar read-through cache, score-ordered paginated lists bounded
//! by least-recently-used eviction, and composite operations coupling the two.
//! Commands go through a [`StoreBackend`]: a direct Redis connection, a REST
//! endpoint, or the in-process [`MemoryBackend`].

pub mod backend;
pub mod cache;
pub mod client;
pub mod composite;
pub mod config;
pub mod error;
pub mod list;

pub use backend::{MemoryBackend, RedisBackend, RestBackend, SortOrder, StoreBackend};
pub use cache::{encode_payload, CacheValue, GetOrRefresh, RefreshError, OK};
pub use client::UseCache;
pub use composite::{default_item_key, generate_key_from_filters, GetOrRefreshInList};
pub use config::{Config, InitParams, DEFAULT_MAX_PAGINATED_ITEMS};
pub use error::{CacheError, Result};
pub use list::{InsertManyOptions, ListRecord, ListReply};
