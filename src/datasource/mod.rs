//! The cache-aware SOAP gateway.
//!
//! [`SoapDataSource`] turns SOAP operations into cached async calls. Every
//! call runs the same sequence, never overlapping its own steps:
//!
//! 1. resolve the client (a factory runs at most once per data source)
//! 2. run the pre-call hook, if any, even when the answer is cached
//! 3. look the invocation up in the [`RequestCache`]
//! 4. on a miss, call the method, then store its response
//!
//! Client, hook, resolution and remote failures come back as one
//! [`SoapError`]. Store failures are passed through as
//! [`DataSourceError::Store`].
//!
//! Identical calls racing before the first response is cached each reach the
//! remote side; there is no in-flight de-duplication.
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::{json, Value};
//! use soap_datasource::cache::InMemoryLruCache;
//! use soap_datasource::client::{Callback, SoapClient};
//! use soap_datasource::datasource::{DataSourceConfig, SoapDataSource};
//!
//! # tokio_test::block_on(async {
//! let client = SoapClient::new().with_method("sayHello", |args: Value, cb: Callback| {
//!     let name = args["firstName"].as_str().unwrap_or_default().to_string();
//!     cb(Ok(json!({ "greeting": format!("Hello {name}") })))
//! });
//!
//! let mut source: SoapDataSource = SoapDataSource::new(client);
//! source.initialize(DataSourceConfig {
//!     cache: Arc::new(InMemoryLruCache::default()),
//!     context: (),
//! });
//!
//! let response = source.invoke("sayHello", json!({ "firstName": "Ada" })).await.unwrap();
//! assert_eq!(response, json!({ "greeting": "Hello Ada" }));
//! # });
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::cache::{InvocationParams, KeyValueCache, RequestCache, DEFAULT_TTL};
use crate::client::{call_method, ClientFactory, ClientHandle, SoapClient, SoapMethod};
use crate::error::{DataSourceError, RemoteError, Result, SoapError};

/// What the host hands over when it wires the data source in.
pub struct DataSourceConfig<C> {
    /// Shared key-value store backing the response cache.
    pub cache: Arc<dyn KeyValueCache>,
    /// Request-scoped context, stored and exposed untouched.
    pub context: C,
}

/// Operation run before every gateway call.
///
/// The hook marks "about to attempt a call", not "about to contact the
/// remote side": it runs before the cache is consulted, so cache hits run
/// it too. An error aborts the call and is normalized like a remote failure.
#[async_trait]
pub trait PreCallHook: Send + Sync {
    async fn before_call(&self, client: &SoapClient) -> std::result::Result<(), RemoteError>;
}

/// Cache-aware gateway over a [`SoapClient`].
pub struct SoapDataSource<C = ()> {
    client: OnceCell<Arc<SoapClient>>,
    factory: Option<ClientFactory>,
    pre_call_hook: Option<Arc<dyn PreCallHook>>,
    cache_ttl: Duration,
    cache: Option<RequestCache>,
    context: Option<C>,
}

impl<C> SoapDataSource<C> {
    /// Create a data source from a ready client or a client factory.
    pub fn new(client: impl Into<ClientHandle>) -> Self {
        let (client, factory) = match client.into() {
            ClientHandle::Ready(client) => (OnceCell::new_with(Some(Arc::new(client))), None),
            ClientHandle::Factory(factory) => (OnceCell::new(), Some(factory)),
        };
        Self {
            client,
            factory,
            pre_call_hook: None,
            cache_ttl: DEFAULT_TTL,
            cache: None,
            context: None,
        }
    }

    pub fn with_pre_call_hook(mut self, hook: impl PreCallHook + 'static) -> Self {
        self.pre_call_hook = Some(Arc::new(hook));
        self
    }

    /// TTL of cached responses. Applies to the cache built by [`initialize`](Self::initialize).
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Wire the data source into its host: build the response cache and
    /// keep the request context.
    pub fn initialize(&mut self, config: DataSourceConfig<C>) {
        self.cache = Some(RequestCache::with_ttl(config.cache, self.cache_ttl));
        self.context = Some(config.context);
    }

    /// The context passed to [`initialize`](Self::initialize).
    pub fn context(&self) -> Option<&C> {
        self.context.as_ref()
    }

    /// Whether the client has been resolved.
    pub fn is_client_resolved(&self) -> bool {
        self.client.initialized()
    }

    /// Resolve the client, running the factory on first use.
    ///
    /// Concurrent first callers wait on the same resolution. A failed
    /// factory leaves the client unresolved, so the next call tries again.
    pub async fn client(&self) -> std::result::Result<Arc<SoapClient>, RemoteError> {
        self.client
            .get_or_try_init(|| async {
                match &self.factory {
                    Some(factory) => {
                        debug!("Resolving SOAP client from factory");
                        factory().await.map(Arc::new)
                    }
                    None => Err(RemoteError::new(
                        "No SOAP client or client factory configured",
                    )),
                }
            })
            .await
            .cloned()
    }

    /// Call a flat method by name.
    pub async fn invoke(&self, method: &str, args: Value) -> Result<Value> {
        self.cache_aware_call(method, args, |client| client.method(method))
            .await
    }

    /// Call `client[service][port][method]`, cached under `service.port.method`.
    pub async fn invoke_namespaced(
        &self,
        service: &str,
        port: &str,
        method: &str,
        args: Value,
    ) -> Result<Value> {
        let identity = format!("{service}.{port}.{method}");
        self.cache_aware_call(&identity, args, |client| {
            client.port_method(service, port, method)
        })
        .await
    }

    async fn cache_aware_call<R>(&self, identity: &str, args: Value, resolve: R) -> Result<Value>
    where
        R: FnOnce(&SoapClient) -> std::result::Result<Arc<dyn SoapMethod>, RemoteError> + Send,
    {
        let cache = self.cache.as_ref().ok_or(DataSourceError::NotInitialized)?;
        let normalize = |err: RemoteError| {
            let err = SoapError::from_remote(err, identity, &args);
            warn!(
                method = identity,
                error = %err.message,
                fault = err.fault().is_some(),
                "SOAP call failed"
            );
            err
        };

        let client = self.client().await.map_err(normalize)?;

        if let Some(hook) = &self.pre_call_hook {
            debug!(method = identity, "Running pre-call hook");
            hook.before_call(&client).await.map_err(normalize)?;
        }

        let params = InvocationParams::new(identity, &args);
        if let Some(cached) = cache.get(&params).await? {
            debug!(method = identity, "SOAP cache hit");
            return Ok(cached);
        }
        debug!(method = identity, "SOAP cache miss");

        let soap_method = resolve(client.as_ref()).map_err(normalize)?;
        let response = call_method(soap_method.as_ref(), args.clone())
            .await
            .map_err(normalize)?;

        cache.set(&params, &response).await?;
        debug!(method = identity, ttl_secs = cache.ttl().as_secs(), "Stored SOAP response");
        Ok(response)
    }
}
