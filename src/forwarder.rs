//! Generic relay to the upstream inventory/sales API.
//!
//! [`Forwarder::forward`] takes an upstream path (already carrying any query
//! string), a verb, an optional JSON body and the caller's global token, and
//! returns the upstream status code and JSON body untouched. The gateway does not
//! look inside the payload.
//!
//! ## Error Handling
//!
//! Only transport-level problems are errors:
//! - connection failures,
//! - timeouts,
//! - bodies that cannot be read or are not JSON.
//!
//! A `404` or `500` from upstream is a successful forward.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::MethodFilter;
use reqwest::{Client, Method};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{Span, instrument};
use url::Url;

use crate::auth::guard::GLOBAL_TOKEN_HEADER;

/// HTTP verbs the gateway relays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    /// Carries no body; the mutation parameters travel in the query string.
    Put,
}

impl Verb {
    pub fn method(&self) -> Method {
        match self {
            Verb::Get => Method::GET,
            Verb::Post => Method::POST,
            Verb::Put => Method::PUT,
        }
    }

    pub fn method_filter(&self) -> MethodFilter {
        match self {
            Verb::Get => MethodFilter::GET,
            Verb::Post => MethodFilter::POST,
            Verb::Put => MethodFilter::PUT,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method().as_str())
    }
}

/// Status and body exactly as the upstream produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl IntoResponse for UpstreamResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("HTTP error: {context}: {source}")]
    Http {
        context: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Upstream timed out: {context}: {source}")]
    Timeout {
        context: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to read response body: {context}: {source}")]
    ResponseBodyRead {
        context: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Upstream answered {status} with a non-JSON body: {context}: {source}")]
    InvalidJson {
        context: String,
        status: StatusCode,
        #[source]
        source: serde_json::Error,
    },
}

impl ForwardError {
    fn from_send(context: String, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            ForwardError::Timeout { context, source }
        } else {
            ForwardError::Http { context, source }
        }
    }
}

/// Relays requests to the upstream API under a fixed base URL.
#[derive(Clone, Debug)]
pub struct Forwarder {
    /// Base URL without trailing slash; paths are appended verbatim.
    base_url: String,
    client: Client,
    timeout: Option<Duration>,
}

impl Forwarder {
    pub fn new(base_url: &Url) -> Self {
        Self {
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            client: Client::new(),
            timeout: None,
        }
    }

    /// Sets a timeout for all future requests.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.timeout = Some(timeout);
        this
    }

    /// Full upstream URL for `path`: plain concatenation, no re-escaping.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends one request upstream with `token` in `x-authentication`.
    ///
    /// `body` is only sent for [`Verb::Post`].
    #[instrument(
        name = "gateway.forward",
        skip_all,
        fields(verb = %verb, path = %path, status = tracing::field::Empty),
        err
    )]
    pub async fn forward(
        &self,
        verb: Verb,
        path: &str,
        body: Option<&Value>,
        token: &str,
    ) -> Result<UpstreamResponse, ForwardError> {
        let context = format!("{verb} {path}");
        let mut req = self
            .client
            .request(verb.method(), self.url_for(path))
            .header(GLOBAL_TOKEN_HEADER, token);
        if let (Verb::Post, Some(body)) = (verb, body) {
            req = req.json(body);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }

        let http_response = req
            .send()
            .await
            .map_err(|e| ForwardError::from_send(context.clone(), e))?;
        let status = http_response.status();
        Span::current().record("status", status.as_u16());

        let bytes = http_response
            .bytes()
            .await
            .map_err(|e| ForwardError::ResponseBodyRead {
                context: context.clone(),
                source: e,
            })?;
        let body = serde_json::from_slice(&bytes).map_err(|e| ForwardError::InvalidJson {
            context,
            status,
            source: e,
        })?;

        Ok(UpstreamResponse { status, body })
    }
}
