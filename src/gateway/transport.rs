//! Request/response transport to the processing service.
//!
//! [`Transport`] is the only place network I/O happens. The production
//! implementation, [`HttpTransport`], speaks HTTP through `reqwest`; tests and
//! embedders inject their own implementation through
//! [`crate::config::PipelineConfigBuilder::transport`].
//!
//! ## Status handling
//!
//! | Outcome | Result |
//! |---------|--------|
//! | connect error / timeout / body read error | [`TransportError::Unreachable`] |
//! | 2xx, JSON body | `Ok(body)` |
//! | 2xx, body not JSON | [`TransportError::NotJson`] |
//! | non-2xx, JSON object body | `Ok(body)` (logged) |
//! | non-2xx, anything else | [`TransportError::Unreachable`] |

use crate::document::SourceFile;
use crate::error::SchematizeError;
use futures::future::{BoxFuture, FutureExt};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure below the level of response decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The service could not be reached or did not answer usefully.
    #[error("{reason}")]
    Unreachable { reason: String },

    /// The service answered 2xx with a body that is not JSON.
    #[error("HTTP {status} body is not JSON: {detail}")]
    NotJson { status: u16, detail: String },
}

/// One request/response exchange with the processing service.
///
/// Implementations must be `Send + Sync`; the controller shares a single
/// instance behind an `Arc`. Neither method retries.
pub trait Transport: Send + Sync {
    /// POST a JSON body to `endpoint` and return the decoded JSON reply.
    fn post_json<'a>(
        &'a self,
        endpoint: &'a str,
        body: Value,
    ) -> BoxFuture<'a, Result<Value, TransportError>>;

    /// POST `file` as multipart form field `field` to `endpoint`.
    fn post_file<'a>(
        &'a self,
        endpoint: &'a str,
        field: &'a str,
        file: &'a SourceFile,
    ) -> BoxFuture<'a, Result<Value, TransportError>>;
}

/// HTTP transport backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Build a transport rooted at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        api_timeout_secs: u64,
        connect_timeout_secs: u64,
    ) -> Result<Self, SchematizeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(api_timeout_secs))
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .build()
            .map_err(|e| SchematizeError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Absolute URL for an endpoint path.
    pub fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, TransportError> {
        let response = request.send().await.map_err(|e| TransportError::Unreachable {
            reason: describe(&e),
        })?;
        read_reply(response).await
    }
}

impl Transport for HttpTransport {
    fn post_json<'a>(
        &'a self,
        endpoint: &'a str,
        body: Value,
    ) -> BoxFuture<'a, Result<Value, TransportError>> {
        async move {
            let url = self.url(endpoint);
            debug!("POST {} (json)", url);
            self.send(self.client.post(&url).json(&body)).await
        }
        .boxed()
    }

    fn post_file<'a>(
        &'a self,
        endpoint: &'a str,
        field: &'a str,
        file: &'a SourceFile,
    ) -> BoxFuture<'a, Result<Value, TransportError>> {
        async move {
            let url = self.url(endpoint);
            debug!("POST {} (multipart, {} bytes)", url, file.len());
            let part = || {
                Part::bytes(file.bytes().to_vec()).file_name(file.file_name().to_string())
            };
            let part = part().mime_str(file.mime_type()).unwrap_or_else(|_| part());
            let form = Form::new().part(field.to_string(), part);
            self.send(self.client.post(&url).multipart(form)).await
        }
        .boxed()
    }
}

/// Apply the status/body table from the module docs.
async fn read_reply(response: reqwest::Response) -> Result<Value, TransportError> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| TransportError::Unreachable {
            reason: describe(&e),
        })?;

    let parsed = serde_json::from_slice::<Value>(&bytes);
    if status.is_success() {
        return parsed.map_err(|e| TransportError::NotJson {
            status: status.as_u16(),
            detail: e.to_string(),
        });
    }

    match parsed {
        Ok(body @ Value::Object(_)) => {
            warn!("Service answered HTTP {} with a JSON body; decoding it", status);
            Ok(body)
        }
        _ => Err(TransportError::Unreachable {
            reason: format!("HTTP {status}"),
        }),
    }
}

fn describe(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    }
}
