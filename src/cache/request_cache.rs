//! Per-invocation response cache over a [`KeyValueCache`].
//!
//! The key is `method + ":" + compact JSON of args`. Object keys are written
//! in insertion order and are not canonicalized: the same keys inserted in a
//! different order produce a different key and therefore a cache miss.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::store::{CacheSetOptions, KeyValueCache};
use crate::error::StoreError;

/// Default time-to-live of cached responses (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Identity of one invocation: method path plus arguments.
#[derive(Debug, Clone, Copy)]
pub struct InvocationParams<'a> {
    pub method: &'a str,
    pub args: &'a Value,
}

impl<'a> InvocationParams<'a> {
    pub fn new(method: &'a str, args: &'a Value) -> Self {
        Self { method, args }
    }
}

/// Typed get/set of invocation responses against an external store.
///
/// Store failures are returned as-is; this type does not interpret them.
#[derive(Clone)]
pub struct RequestCache {
    store: Arc<dyn KeyValueCache>,
    ttl: Duration,
}

impl RequestCache {
    /// Create a cache with the default 300 second TTL.
    pub fn new(store: Arc<dyn KeyValueCache>) -> Self {
        Self::with_ttl(store, DEFAULT_TTL)
    }

    pub fn with_ttl(store: Arc<dyn KeyValueCache>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Derive the store key for `params`. Pure, no I/O.
    pub fn cache_key(params: &InvocationParams<'_>) -> String {
        format!("{}:{}", params.method, params.args)
    }

    /// Fetch and decode a cached response. `Ok(None)` when absent.
    pub async fn get(&self, params: &InvocationParams<'_>) -> Result<Option<Value>, StoreError> {
        match self.store.get(&Self::cache_key(params)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Store `response` with the configured TTL.
    pub async fn set(&self, params: &InvocationParams<'_>, response: &Value) -> Result<(), StoreError> {
        self.set_with_ttl(params, response, self.ttl).await
    }

    pub async fn set_with_ttl(
        &self,
        params: &InvocationParams<'_>,
        response: &Value,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(response)?;
        self.store
            .set(&Self::cache_key(params), raw, CacheSetOptions::with_ttl(ttl))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryLruCache;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records every set() so TTL and payload can be inspected.
    #[derive(Default)]
    struct RecordingStore {
        sets: Mutex<Vec<(String, String, CacheSetOptions)>>,
    }

    #[async_trait]
    impl KeyValueCache for RecordingStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            let sets = self.sets.lock().unwrap();
            Ok(sets.iter().rev().find(|(k, _, _)| k == key).map(|(_, v, _)| v.clone()))
        }

        async fn set(
            &self,
            key: &str,
            value: String,
            options: CacheSetOptions,
        ) -> Result<(), StoreError> {
            self.sets.lock().unwrap().push((key.to_string(), value, options));
            Ok(())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl KeyValueCache for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Backend("connection reset".into()))
        }

        async fn set(&self, _: &str, _: String, _: CacheSetOptions) -> Result<(), StoreError> {
            Err(StoreError::Backend("read-only replica".into()))
        }
    }

    fn request_cache() -> RequestCache {
        RequestCache::new(Arc::new(InMemoryLruCache::new(16)))
    }

    #[test]
    fn test_cache_key_format() {
        let args = json!({"firstName": "John"});
        let nested_args = json!({"name": {"first": "John"}});
        let normal = RequestCache::cache_key(&InvocationParams::new("test", &args));
        let nested = RequestCache::cache_key(&InvocationParams::new("serv.port.test", &nested_args));
        assert_eq!(normal, r#"test:{"firstName":"John"}"#);
        assert_eq!(nested, r#"serv.port.test:{"name":{"first":"John"}}"#);
        assert_ne!(normal, nested);
    }

    #[test]
    fn test_cache_key_deterministic() {
        let args = json!({"a": 1, "b": [true, null, "x"]});
        let k1 = RequestCache::cache_key(&InvocationParams::new("m", &args));
        let k2 = RequestCache::cache_key(&InvocationParams::new("m", &args.clone()));
        assert_eq!(k1, k2);
    }

    #[test]
    fn test_cache_key_follows_insertion_order() {
        let ab = json!({"a": 1, "b": 2});
        let ba = json!({"b": 2, "a": 1});
        assert_eq!(ab, ba, "values compare equal regardless of key order");
        assert_ne!(
            RequestCache::cache_key(&InvocationParams::new("m", &ab)),
            RequestCache::cache_key(&InvocationParams::new("m", &ba)),
        );
    }

    #[test]
    fn test_cache_key_scalar_args() {
        let args = json!("plain");
        assert_eq!(
            RequestCache::cache_key(&InvocationParams::new("echo", &args)),
            r#"echo:"plain""#
        );
        assert_eq!(
            RequestCache::cache_key(&InvocationParams::new("ping", &Value::Null)),
            "ping:null"
        );
    }

    #[tokio::test]
    async fn test_store_and_retrieve() {
        let cache = request_cache();
        let args = json!({"firstName": "John"});
        let params = InvocationParams::new("test", &args);

        assert_eq!(cache.get(&params).await.unwrap(), None);
        cache.set(&params, &json!({"myResponse": "test "})).await.unwrap();
        assert_eq!(
            cache.get(&params).await.unwrap(),
            Some(json!({"myResponse": "test "}))
        );
    }

    #[tokio::test]
    async fn test_cached_null_is_a_value() {
        let cache = request_cache();
        let params = InvocationParams::new("nothing", &Value::Null);
        cache.set(&params, &Value::Null).await.unwrap();
        assert_eq!(cache.get(&params).await.unwrap(), Some(Value::Null));
    }

    #[tokio::test]
    async fn test_set_uses_default_ttl() {
        let store = Arc::new(RecordingStore::default());
        let cache = RequestCache::new(store.clone());
        let args = json!({"x": 1});
        cache
            .set(&InvocationParams::new("m", &args), &json!("r"))
            .await
            .unwrap();

        let sets = store.sets.lock().unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].0, r#"m:{"x":1}"#);
        assert_eq!(sets[0].1, r#""r""#);
        assert_eq!(sets[0].2.ttl, Some(Duration::from_secs(300)));
    }

    #[tokio::test]
    async fn test_set_with_explicit_ttl() {
        let store = Arc::new(RecordingStore::default());
        let cache = RequestCache::with_ttl(store.clone(), Duration::from_secs(10));
        assert_eq!(cache.ttl(), Duration::from_secs(10));
        cache
            .set_with_ttl(&InvocationParams::new("m", &Value::Null), &json!(1), Duration::from_secs(42))
            .await
            .unwrap();
        assert_eq!(
            store.sets.lock().unwrap()[0].2.ttl,
            Some(Duration::from_secs(42))
        );
    }

    #[tokio::test]
    async fn test_store_failure_propagates_unchanged() {
        let cache = RequestCache::new(Arc::new(BrokenStore));
        let params = InvocationParams::new("m", &Value::Null);

        let err = cache.get(&params).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(ref msg) if msg == "connection reset"));

        let err = cache.set(&params, &json!(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(ref msg) if msg == "read-only replica"));
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_serialization_error() {
        let store = Arc::new(InMemoryLruCache::new(4));
        store
            .set("m:null", "{not json".into(), CacheSetOptions::default())
            .await
            .unwrap();
        let cache = RequestCache::new(store);
        let err = cache
            .get(&InvocationParams::new("m", &Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
