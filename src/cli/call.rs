//! `call` command handler.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::info;

use soap_datasource::cache::InMemoryLruCache;
use soap_datasource::client::{HttpSoapMethod, SoapClient};
use soap_datasource::config::Config;
use soap_datasource::datasource::{DataSourceConfig, SoapDataSource};
use soap_datasource::error::DataSourceError;

pub(crate) struct CallArgs {
    pub method: String,
    pub args: String,
    /// `(service, port)` for a namespaced call.
    pub target: Option<(String, String)>,
    pub endpoint: Option<String>,
    pub namespace: Option<String>,
    pub soap_action: Option<String>,
    pub repeat: u32,
}

/// Invoke a method through a data source backed by an in-process cache.
pub(crate) async fn cmd_call(args: CallArgs) -> Result<()> {
    let config = Config::load().with_context(|| "Failed to load configuration")?;
    let endpoint = args
        .endpoint
        .or_else(|| config.transport.endpoint.clone())
        .context("No SOAP endpoint: pass --endpoint or set SOAP_DATASOURCE_ENDPOINT")?;
    let namespace = args
        .namespace
        .unwrap_or_else(|| config.transport.namespace.clone());
    let call_args: Value = serde_json::from_str(&args.args)
        .with_context(|| format!("--args is not valid JSON: {}", args.args))?;

    let mut method = HttpSoapMethod::new(
        &endpoint,
        &namespace,
        &args.method,
        config.transport.timeout_secs,
    )
    .context("Failed to create SOAP method")?;
    if let Some(action) = args.soap_action.as_deref() {
        method = method.with_soap_action(action);
    }
    let client = match &args.target {
        Some((service, port)) => {
            SoapClient::new().with_port_method(service, port, &args.method, method)
        }
        None => SoapClient::new().with_method(&args.method, method),
    };

    let store = Arc::new(InMemoryLruCache::new(config.cache.max_entries));
    let mut source: SoapDataSource = SoapDataSource::new(client).with_cache_ttl(config.cache.ttl());
    source.initialize(DataSourceConfig {
        cache: store.clone(),
        context: (),
    });

    for attempt in 1..=args.repeat.max(1) {
        let result = match &args.target {
            Some((service, port)) => {
                source
                    .invoke_namespaced(service, port, &args.method, call_args.clone())
                    .await
            }
            None => source.invoke(&args.method, call_args.clone()).await,
        };

        match result {
            Ok(response) => {
                info!(attempt, endpoint = %endpoint, "Call completed");
                println!("{}", serde_json::to_string_pretty(&response)?);
            }
            Err(DataSourceError::Soap(err)) => {
                println!("{}", serde_json::to_string_pretty(&err.to_json())?);
                bail!("SOAP call failed: {}", err);
            }
            Err(other) => return Err(other).context("Data source error"),
        }
    }

    let stats = store.stats().await;
    info!(
        hits = stats.hits,
        misses = stats.misses,
        entries = stats.total_entries,
        "Cache statistics"
    );
    Ok(())
}
