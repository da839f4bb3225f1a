//! Response caching: the key-value store contract and the per-invocation cache.

pub mod request_cache;
pub mod store;

pub use request_cache::{InvocationParams, RequestCache, DEFAULT_TTL};
pub use store::{CacheSetOptions, CacheStats, InMemoryLruCache, KeyValueCache};
