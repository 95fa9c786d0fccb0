//! Exchange-rate lookups against fxratesapi.
//!
//! Every call is a live round trip: no caching, no fallback source.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::instrument;
use url::Url;

/// Currency pair checked by length only (3 characters each); membership in
/// ISO-4217 is left to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyPair {
    base: String,
    target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Currency code must be exactly 3 characters, got '{0}'")]
pub struct CurrencyCodeError(pub String);

impl CurrencyPair {
    /// Validates both codes and uppercases them.
    pub fn new(base: &str, target: &str) -> Result<Self, CurrencyCodeError> {
        Ok(Self {
            base: Self::code(base)?,
            target: Self::code(target)?,
        })
    }

    fn code(raw: &str) -> Result<String, CurrencyCodeError> {
        if raw.chars().count() == 3 {
            Ok(raw.to_uppercase())
        } else {
            Err(CurrencyCodeError(raw.to_string()))
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.target)
    }
}

/// Body of `GET /fxrate`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FxRate {
    pub rate: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum FxError {
    #[error("FX provider answered {status}")]
    Provider { status: reqwest::StatusCode },
    #[error("FX provider request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("FX provider body could not be decoded: {0}")]
    Body(#[source] reqwest::Error),
    #[error("No rate for currency {0}")]
    InvalidCurrency(String),
}

#[derive(Debug, Deserialize)]
struct RatesResponse {
    #[serde(default)]
    rates: HashMap<String, Value>,
}

#[derive(Clone)]
pub struct FxClient {
    endpoint: Url,
    api_key: String,
    client: Client,
    timeout: Option<Duration>,
}

impl fmt::Debug for FxClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FxClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl FxClient {
    pub fn new(endpoint: Url, api_key: impl Into<String>) -> Self {
        Self {
            endpoint,
            api_key: api_key.into(),
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

    /// `{endpoint}?base=BASE&symbols=TARGET&api_key=KEY`
    fn query_url(&self, pair: &CurrencyPair) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("base", pair.base())
            .append_pair("symbols", pair.target())
            .append_pair("api_key", &self.api_key);
        url
    }

    /// Fetches the `pair.target()` rate quoted against `pair.base()`.
    #[instrument(name = "gateway.fx_rate", skip_all, fields(pair = %pair), err)]
    pub async fn get_rate(&self, pair: &CurrencyPair) -> Result<FxRate, FxError> {
        let mut req = self.client.get(self.query_url(pair));
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let response = req.send().await.map_err(FxError::Http)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FxError::Provider { status });
        }
        let body: RatesResponse = response.json().await.map_err(FxError::Body)?;
        body.rates
            .get(pair.target())
            .and_then(Value::as_f64)
            .map(|rate| FxRate { rate })
            .ok_or_else(|| FxError::InvalidCurrency(pair.target().to_string()))
    }
}
