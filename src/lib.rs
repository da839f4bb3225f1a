//! soap-datasource: call SOAP operations as cached async functions.
//!
//! A [`SoapDataSource`] wraps a [`SoapClient`] and a shared [`KeyValueCache`].
//! Calls are keyed by method identity and arguments, answered from the cache
//! when possible, and failures are normalized into a single [`SoapError`]
//! that carries the narrowest available fault description.

pub mod cache;
pub mod client;
pub mod config;
pub mod datasource;
pub mod error;

pub use cache::{InMemoryLruCache, KeyValueCache, RequestCache};
pub use client::{ClientHandle, HttpSoapMethod, SoapClient, SoapMethod};
pub use config::Config;
pub use datasource::{DataSourceConfig, PreCallHook, SoapDataSource};
pub use error::{DataSourceError, RemoteError, Result, SoapError, StoreError};
