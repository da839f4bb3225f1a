//! HTTP binding for SOAP methods.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tracing::debug;

use super::envelope;
use super::{Callback, SoapMethod};
use crate::error::RemoteError;

/// A SOAP operation posted as a SOAP 1.1 envelope over HTTP.
///
/// Each call is spawned onto the current tokio runtime and completes its
/// callback when the response has been parsed. Timeouts come from the
/// underlying `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpSoapMethod {
    http: reqwest::Client,
    endpoint: String,
    namespace: String,
    name: String,
    soap_action: String,
}

impl HttpSoapMethod {
    /// Create a method bound to `endpoint`. The SOAPAction defaults to
    /// `namespace` + `name`.
    ///
    /// Fails if the HTTP client cannot be built with the requested timeout.
    pub fn new(
        endpoint: &str,
        namespace: &str,
        name: &str,
        timeout_secs: u64,
    ) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| RemoteError::new(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_http_client(http, endpoint, namespace, name))
    }

    /// Create a method sharing an existing HTTP client (and its connection pool).
    pub fn with_http_client(
        http: reqwest::Client,
        endpoint: &str,
        namespace: &str,
        name: &str,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            soap_action: format!("{namespace}{name}"),
        }
    }

    pub fn with_soap_action(mut self, action: &str) -> Self {
        self.soap_action = action.to_string();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn soap_action(&self) -> &str {
        &self.soap_action
    }

    async fn post(self, args: Value) -> Result<Value, RemoteError> {
        let body = envelope::build_request(&self.namespace, &self.name, &args)?;
        debug!(endpoint = %self.endpoint, method = %self.name, "Posting SOAP envelope");

        let resp = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", format!("\"{}\"", self.soap_action))
            .body(body)
            .send()
            .await
            .map_err(|e| RemoteError::new(format!("HTTP request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| RemoteError::new(format!("Failed to read SOAP response: {e}")))?;

        interpret_response(status, &text)
    }
}

/// Map an HTTP status and body to the method result.
///
/// Faults win over the status code: SOAP 1.1 servers answer faults with 500,
/// and the fault body is the useful part.
fn interpret_response(status: reqwest::StatusCode, text: &str) -> Result<Value, RemoteError> {
    match envelope::parse_response(text) {
        Ok(doc) if status.is_success() || doc.pointer("/Envelope/Body/Fault").is_some() => {
            envelope::into_result(doc)
        }
        Err(e) if status.is_success() => Err(e),
        _ => Err(RemoteError::new(format!(
            "HTTP {status} from SOAP endpoint"
        ))),
    }
}

impl SoapMethod for HttpSoapMethod {
    fn call(&self, args: Value, callback: Callback) {
        let method = self.clone();
        tokio::spawn(async move {
            callback(method.post(args).await);
        });
    }
}
