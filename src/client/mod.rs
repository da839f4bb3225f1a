//! SOAP client surface consumed by the gateway.
//!
//! A [`SoapClient`] is a method table: flat methods addressed by name, and
//! methods nested under `service` and `port`. Every method completes through
//! a one-shot callback; [`call_method`] turns that into a future so nothing
//! above this module sees the callback form.

pub mod envelope;
pub mod http;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::RemoteError;

pub use http::HttpSoapMethod;

/// Completion callback handed to a [`SoapMethod`]. Called at most once.
pub type Callback = Box<dyn FnOnce(Result<Value, RemoteError>) + Send + 'static>;

/// A remote operation following the `(args, callback(error, result))` shape.
///
/// Implemented for any `Fn(Value, Callback)` closure, which is how tests and
/// in-process services plug in.
pub trait SoapMethod: Send + Sync {
    fn call(&self, args: Value, callback: Callback);
}

impl<F> SoapMethod for F
where
    F: Fn(Value, Callback) + Send + Sync,
{
    fn call(&self, args: Value, callback: Callback) {
        self(args, callback)
    }
}

/// Invoke `method` and await its callback.
///
/// A method that drops its callback without calling it resolves to an error
/// rather than hanging forever.
pub async fn call_method(method: &dyn SoapMethod, args: Value) -> Result<Value, RemoteError> {
    let (tx, rx) = oneshot::channel();
    method.call(
        args,
        Box::new(move |result| {
            let _ = tx.send(result);
        }),
    );
    rx.await.unwrap_or_else(|_| {
        Err(RemoteError::new(
            "SOAP method completed without invoking its callback",
        ))
    })
}

type MethodTable = HashMap<String, Arc<dyn SoapMethod>>;

/// Method table of a SOAP endpoint.
#[derive(Clone, Default)]
pub struct SoapClient {
    methods: MethodTable,
    services: HashMap<String, HashMap<String, MethodTable>>,
}

impl SoapClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a flat method.
    pub fn with_method(mut self, name: &str, method: impl SoapMethod + 'static) -> Self {
        self.methods.insert(name.to_string(), Arc::new(method));
        self
    }

    /// Register a method under `service` and `port`.
    ///
    /// The method is also reachable by its bare name unless a flat method of
    /// that name already exists; the first registration wins.
    pub fn with_port_method(
        mut self,
        service: &str,
        port: &str,
        name: &str,
        method: impl SoapMethod + 'static,
    ) -> Self {
        let method: Arc<dyn SoapMethod> = Arc::new(method);
        self.methods
            .entry(name.to_string())
            .or_insert_with(|| Arc::clone(&method));
        self.services
            .entry(service.to_string())
            .or_default()
            .entry(port.to_string())
            .or_default()
            .insert(name.to_string(), method);
        self
    }

    /// Resolve a flat method.
    pub fn method(&self, name: &str) -> Result<Arc<dyn SoapMethod>, RemoteError> {
        self.methods
            .get(name)
            .cloned()
            .ok_or_else(|| RemoteError::new(format!("Method '{name}' is not defined on client")))
    }

    /// Resolve `service`, then `port`, then `method`.
    pub fn port_method(
        &self,
        service: &str,
        port: &str,
        method: &str,
    ) -> Result<Arc<dyn SoapMethod>, RemoteError> {
        let ports = self.services.get(service).ok_or_else(|| {
            RemoteError::new(format!("Service '{service}' is not defined on client"))
        })?;
        let methods = ports.get(port).ok_or_else(|| {
            RemoteError::new(format!("Port '{service}.{port}' is not defined on client"))
        })?;
        methods.get(method).cloned().ok_or_else(|| {
            RemoteError::new(format!(
                "Method '{service}.{port}.{method}' is not defined on client"
            ))
        })
    }

    /// Flat method names, sorted.
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        names.sort();
        names
    }

    /// Fully qualified `service.port.method` names, sorted.
    pub fn qualified_method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .services
            .iter()
            .flat_map(|(service, ports)| {
                ports.iter().flat_map(move |(port, methods)| {
                    methods.keys().map(move |m| format!("{service}.{port}.{m}"))
                })
            })
            .collect();
        names.sort();
        names
    }
}

impl fmt::Debug for SoapClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoapClient")
            .field("methods", &self.method_names())
            .field("qualified", &self.qualified_method_names())
            .finish()
    }
}

/// Zero-argument async constructor for a [`SoapClient`].
pub type ClientFactory =
    Box<dyn Fn() -> BoxFuture<'static, Result<SoapClient, RemoteError>> + Send + Sync>;

/// Either a ready client or a factory resolved on first use.
pub enum ClientHandle {
    Ready(SoapClient),
    Factory(ClientFactory),
}

impl ClientHandle {
    /// Wrap an async closure as a lazily resolved client.
    pub fn factory<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<SoapClient, RemoteError>> + Send + 'static,
    {
        Self::Factory(Box::new(move || Box::pin(f())))
    }
}

impl From<SoapClient> for ClientHandle {
    fn from(client: SoapClient) -> Self {
        Self::Ready(client)
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(client) => f.debug_tuple("Ready").field(client).finish(),
            Self::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo(args: Value, cb: Callback) {
        cb(Ok(json!({"echo": args})))
    }

    #[tokio::test]
    async fn test_call_method_success() {
        let result = call_method(&echo, json!({"a": 1})).await;
        assert_eq!(result, Ok(json!({"echo": {"a": 1}})));
    }

    #[tokio::test]
    async fn test_call_method_error() {
        let failing = |_args: Value, cb: Callback| cb(Err(RemoteError::new("problem")));
        let err = call_method(&failing, Value::Null).await.unwrap_err();
        assert_eq!(err.message, "problem");
    }

    #[tokio::test]
    async fn test_call_method_dropped_callback() {
        let forgetful = |_args: Value, cb: Callback| drop(cb);
        let err = call_method(&forgetful, Value::Null).await.unwrap_err();
        assert!(err.message.contains("without invoking its callback"));
    }

    #[tokio::test]
    async fn test_call_method_async_completion() {
        let delayed = |args: Value, cb: Callback| {
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                cb(Ok(args));
            });
        };
        assert_eq!(call_method(&delayed, json!(7)).await, Ok(json!(7)));
    }

    #[test]
    fn test_flat_resolution() {
        let client = SoapClient::new().with_method("sayHello", echo);
        assert!(client.method("sayHello").is_ok());
        let err = client.method("sayGoodbye").err().unwrap();
        assert!(err.message.contains("sayGoodbye"));
        assert!(err.fault().is_none());
    }

    #[test]
    fn test_namespaced_resolution_each_level() {
        let client = SoapClient::new().with_port_method("Hello_Service", "Hello_Port", "sayHello", echo);
        assert!(client.port_method("Hello_Service", "Hello_Port", "sayHello").is_ok());

        let missing_service = client.port_method("Nope", "Hello_Port", "sayHello").err().unwrap();
        assert!(missing_service.message.contains("Service 'Nope'"));
        let missing_port = client.port_method("Hello_Service", "Nope", "sayHello").err().unwrap();
        assert!(missing_port.message.contains("Port 'Hello_Service.Nope'"));
        let missing_method = client.port_method("Hello_Service", "Hello_Port", "nope").err().unwrap();
        assert!(missing_method.message.contains("Hello_Service.Hello_Port.nope"));
    }

    #[tokio::test]
    async fn test_port_method_also_registered_flat() {
        let flat = |_args: Value, cb: Callback| cb(Ok(json!("flat")));
        let nested = |_args: Value, cb: Callback| cb(Ok(json!("nested")));
        let client = SoapClient::new()
            .with_method("sayHello", flat)
            .with_port_method("S", "P", "sayHello", nested)
            .with_port_method("S", "P", "sayBye", echo);

        let m = client.method("sayHello").unwrap();
        assert_eq!(call_method(m.as_ref(), Value::Null).await, Ok(json!("flat")));
        let m = client.port_method("S", "P", "sayHello").unwrap();
        assert_eq!(call_method(m.as_ref(), Value::Null).await, Ok(json!("nested")));
        assert!(client.method("sayBye").is_ok());
        assert_eq!(client.method_names(), vec!["sayBye", "sayHello"]);
        assert_eq!(client.qualified_method_names(), vec!["S.P.sayBye", "S.P.sayHello"]);
    }

    #[test]
    fn test_client_handle_debug() {
        let ready = ClientHandle::from(SoapClient::new());
        assert!(format!("{ready:?}").starts_with("Ready"));
        let factory = ClientHandle::factory(|| async { Ok(SoapClient::new()) });
        assert_eq!(format!("{factory:?}"), "Factory(..)");
    }
}
