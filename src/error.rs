//! Error types for soap-datasource.
//!
//! [`StoreError`] belongs to the key-value store and is handed back to
//! callers untouched. [`ConfigError`] covers loading the config file.
//! [`SoapError`] is the single normalized failure produced by the gateway for
//! client construction, pre-call hooks, method resolution and the remote call.

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Stable discriminator carried by every [`SoapError`].
pub const SOAP_DATA_SOURCE: &str = "SOAP_DATA_SOURCE";

/// Failure raised by a [`KeyValueCache`](crate::cache::KeyValueCache) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend itself failed (connection lost, store closed, ...).
    #[error("Cache backend error: {0}")]
    Backend(String),

    /// A payload could not be encoded or decoded as JSON.
    #[error("Cache payload error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure reported through a method callback, a client factory or a
/// pre-call hook.
///
/// `root` holds the parsed response document when the remote side answered
/// with a SOAP fault; transport failures leave it empty.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
    pub root: Option<Value>,
}

impl RemoteError {
    /// A failure without a response document.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            root: None,
        }
    }

    /// A failure carrying the parsed response document.
    pub fn with_root(message: impl Into<String>, root: Value) -> Self {
        Self {
            message: message.into(),
            root: Some(root),
        }
    }

    /// The structured fault at `root.Envelope.Body.Fault`, if any.
    pub fn fault(&self) -> Option<&Value> {
        self.root.as_ref()?.get("Envelope")?.get("Body")?.get("Fault")
    }
}

/// Diagnostic payload attached to a [`SoapError`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorExtension {
    pub method: String,
    pub args: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<Value>,
}

/// The normalized gateway error.
///
/// Only the message, the invocation identity and the narrowest fault
/// description survive; the raw response document is dropped.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct SoapError {
    pub message: String,
    pub extension: ErrorExtension,
}

impl SoapError {
    pub fn new(message: impl Into<String>, method: &str, args: &Value) -> Self {
        Self {
            message: message.into(),
            extension: ErrorExtension {
                method: method.to_string(),
                args: args.clone(),
                fault: None,
            },
        }
    }

    /// Normalize a [`RemoteError`], keeping only its nested fault.
    pub fn from_remote(err: RemoteError, method: &str, args: &Value) -> Self {
        let fault = err.fault().cloned();
        let mut normalized = Self::new(err.message, method, args);
        normalized.extension.fault = fault;
        normalized
    }

    pub fn kind(&self) -> &'static str {
        SOAP_DATA_SOURCE
    }

    pub fn fault(&self) -> Option<&Value> {
        self.extension.fault.as_ref()
    }

    /// Wire shape handed to API callers.
    pub fn to_json(&self) -> Value {
        json!({
            "message": self.message,
            "kind": self.kind(),
            "extension": self.extension,
        })
    }
}

/// Top-level error returned by [`SoapDataSource`](crate::datasource::SoapDataSource).
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error(transparent)]
    Soap(#[from] SoapError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Data source used before initialize()")]
    NotInitialized,
}

/// Result type alias for data source operations.
pub type Result<T> = std::result::Result<T, DataSourceError>;
