//! Checkout sessions with the payment provider.
//!
//! [`PaymentSessions`] turns the client's cart into a [`CheckoutRequest`] and
//! hands it to a [`PaymentProvider`]; [`StripeClient`] is the production
//! provider, speaking Stripe's form-encoded `POST /v1/checkout/sessions`.
//!
//! Every provider failure (rejected parameters, transport error, missing
//! redirect URL) surfaces as a [`PaymentError`] carrying the provider's
//! message. Nothing is retried.

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::instrument;
use url::Url;

use crate::config::StripeConfig;

/// One cart entry as sent by the storefront.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentItem {
    pub id: String,
    #[serde(rename = "nombre")]
    pub name: String,
    /// Minor currency units.
    #[serde(rename = "precio")]
    pub unit_amount: i64,
    #[serde(rename = "cantidad")]
    pub quantity: i64,
    #[serde(rename = "moneda")]
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub currency: String,
    pub unit_amount: i64,
    pub product_name: String,
    pub quantity: i64,
}

impl From<&PaymentItem> for LineItem {
    fn from(item: &PaymentItem) -> Self {
        Self {
            currency: item.currency.clone(),
            unit_amount: item.unit_amount,
            product_name: item.name.clone(),
            quantity: item.quantity,
        }
    }
}

/// Fixed part of every checkout: redirects and accepted payment methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSettings {
    pub success_url: String,
    pub cancel_url: String,
    pub payment_method_types: Vec<String>,
}

impl From<&StripeConfig> for CheckoutSettings {
    fn from(config: &StripeConfig) -> Self {
        Self {
            success_url: config.success_url.clone(),
            cancel_url: config.cancel_url.clone(),
            payment_method_types: config.payment_method_types.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub line_items: Vec<LineItem>,
    pub settings: CheckoutSettings,
}

impl CheckoutRequest {
    pub fn new(items: &[PaymentItem], settings: CheckoutSettings) -> Self {
        Self {
            line_items: items.iter().map(LineItem::from).collect(),
            settings,
        }
    }

    /// Stripe's bracketed form encoding of the session parameters.
    pub fn form_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), self.settings.success_url.clone()),
            ("cancel_url".to_string(), self.settings.cancel_url.clone()),
        ];
        for (i, method) in self.settings.payment_method_types.iter().enumerate() {
            pairs.push((format!("payment_method_types[{i}]"), method.clone()));
        }
        for (i, item) in self.line_items.iter().enumerate() {
            let prefix = format!("line_items[{i}]");
            pairs.push((
                format!("{prefix}[price_data][currency]"),
                item.currency.clone(),
            ));
            pairs.push((
                format!("{prefix}[price_data][unit_amount]"),
                item.unit_amount.to_string(),
            ));
            pairs.push((
                format!("{prefix}[price_data][product_data][name]"),
                item.product_name.clone(),
            ));
            pairs.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
        }
        pairs
    }
}

/// Body of a successful `POST /stripe/sesion`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct PaymentError {
    message: String,
}

impl PaymentError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A backend able to open checkout sessions.
pub trait PaymentProvider: Send + Sync {
    fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> impl Future<Output = Result<CheckoutSession, PaymentError>> + Send;
}

/// Payment Session Builder: cart in, redirect URL out.
#[derive(Debug, Clone)]
pub struct PaymentSessions<P> {
    provider: P,
    settings: CheckoutSettings,
}

impl<P: PaymentProvider> PaymentSessions<P> {
    pub fn new(provider: P, settings: CheckoutSettings) -> Self {
        Self { provider, settings }
    }

    #[instrument(name = "gateway.payment_session", skip_all, fields(items = items.len()), err)]
    pub async fn create_session(
        &self,
        items: &[PaymentItem],
    ) -> Result<CheckoutSession, PaymentError> {
        let request = CheckoutRequest::new(items, self.settings.clone());
        self.provider.create_checkout_session(&request).await
    }
}

#[derive(Debug, Deserialize)]
struct StripeSession {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: Option<String>,
}

/// Stripe Checkout over its REST API.
#[derive(Clone)]
pub struct StripeClient {
    sessions_url: Url,
    secret_key: String,
    client: Client,
    timeout: Option<Duration>,
}

impl fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeClient")
            .field("sessions_url", &self.sessions_url.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl StripeClient {
    /// `api_base` is the API root, e.g. `https://api.stripe.com/`.
    pub fn try_new(api_base: &Url, secret_key: impl Into<String>) -> Result<Self, url::ParseError> {
        let sessions_url = api_base.join("v1/checkout/sessions")?;
        Ok(Self {
            sessions_url,
            secret_key: secret_key.into(),
            client: Client::new(),
            timeout: None,
        })
    }

    pub fn sessions_url(&self) -> &Url {
        &self.sessions_url
    }

    /// Sets a timeout for all future requests.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.timeout = Some(timeout);
        this
    }

    async fn post_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession, PaymentError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(request.form_pairs())
            .finish();
        let mut req = self
            .client
            .post(self.sessions_url.clone())
            .basic_auth(&self.secret_key, None::<&str>)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let response = req
            .send()
            .await
            .map_err(|e| PaymentError::new(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let session: StripeSession = response
                .json()
                .await
                .map_err(|e| PaymentError::new(e.to_string()))?;
            return session
                .url
                .map(|url| CheckoutSession { url })
                .ok_or_else(|| PaymentError::new("Checkout session has no redirect URL"));
        }

        let text = response
            .text()
            .await
            .map_err(|e| PaymentError::new(e.to_string()))?;
        let message = serde_json::from_str::<StripeErrorEnvelope>(&text)
            .ok()
            .and_then(|envelope| envelope.error.message)
            .unwrap_or_else(|| format!("Payment provider answered {status}"));
        Err(PaymentError::new(message))
    }
}

impl PaymentProvider for StripeClient {
    fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> impl Future<Output = Result<CheckoutSession, PaymentError>> + Send {
        self.post_session(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings() -> CheckoutSettings {
        CheckoutSettings {
            success_url: "https://shop.local/success".to_string(),
            cancel_url: "https://shop.local/cancel".to_string(),
            payment_method_types: vec!["card".to_string()],
        }
    }

    fn cart() -> Vec<PaymentItem> {
        serde_json::from_value(serde_json::json!([
            { "id": "A-1", "nombre": "Taladro", "precio": 1000, "cantidad": 2, "moneda": "usd" },
            { "id": "A-2", "nombre": "Broca", "precio": 500, "cantidad": 1, "moneda": "usd" }
        ]))
        .unwrap()
    }

    struct FailingProvider(&'static str);

    impl PaymentProvider for FailingProvider {
        async fn create_checkout_session(
            &self,
            _request: &CheckoutRequest,
        ) -> Result<CheckoutSession, PaymentError> {
            Err(PaymentError::new(self.0))
        }
    }

    struct EchoProvider;

    impl PaymentProvider for EchoProvider {
        async fn create_checkout_session(
            &self,
            request: &CheckoutRequest,
        ) -> Result<CheckoutSession, PaymentError> {
            Ok(CheckoutSession {
                url: format!("https://pay.local/{}", request.line_items.len()),
            })
        }
    }

    #[test]
    fn test_line_items_preserve_amounts_and_quantities() {
        let request = CheckoutRequest::new(&cart(), settings());
        assert_eq!(request.line_items.len(), 2);
        assert_eq!(request.line_items[0].unit_amount, 1000);
        assert_eq!(request.line_items[0].quantity, 2);
        assert_eq!(request.line_items[0].product_name, "Taladro");
        assert_eq!(request.line_items[1].unit_amount, 500);
        assert_eq!(request.line_items[1].quantity, 1);
        assert_eq!(request.line_items[1].currency, "usd");
    }

    #[test]
    fn test_form_pairs_use_bracket_notation() {
        let pairs = CheckoutRequest::new(&cart(), settings()).form_pairs();
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("mode"), Some("payment"));
        assert_eq!(get("payment_method_types[0]"), Some("card"));
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("1000"));
        assert_eq!(get("line_items[1][price_data][product_data][name]"), Some("Broca"));
        assert_eq!(get("line_items[1][quantity]"), Some("1"));
        assert_eq!(get("success_url"), Some("https://shop.local/success"));
    }

    #[tokio::test]
    async fn test_provider_failure_message_is_kept() {
        let sessions = PaymentSessions::new(FailingProvider("Amount must be positive"), settings());
        let err = sessions.create_session(&cart()).await.unwrap_err();
        assert_eq!(err.message(), "Amount must be positive");
    }

    #[tokio::test]
    async fn test_builder_passes_whole_cart_to_provider() {
        let sessions = PaymentSessions::new(EchoProvider, settings());
        let session = sessions.create_session(&cart()).await.unwrap();
        assert_eq!(session.url, "https://pay.local/2");
    }

    #[tokio::test]
    async fn test_stripe_client_returns_redirect_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(header_exists("authorization"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("line_items%5B0%5D%5Bquantity%5D=2"))
            .and(body_string_contains("mode=payment"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cs_test_1",
                "url": "https://checkout.stripe.com/c/pay/cs_test_1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = StripeClient::try_new(&server.uri().parse().unwrap(), "sk_test").unwrap();
        let sessions = PaymentSessions::new(client, settings());
        let session = sessions.create_session(&cart()).await.unwrap();
        assert_eq!(session.url, "https://checkout.stripe.com/c/pay/cs_test_1");
    }

    #[tokio::test]
    async fn test_stripe_error_message_is_passed_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": { "message": "Invalid currency: zzz", "type": "invalid_request_error" }
            })))
            .mount(&server)
            .await;

        let client = StripeClient::try_new(&server.uri().parse().unwrap(), "sk_test").unwrap();
        let err = client
            .create_checkout_session(&CheckoutRequest::new(&cart(), settings()))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "Invalid currency: zzz");
    }

    #[tokio::test]
    async fn test_stripe_unstructured_error_mentions_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
            .mount(&server)
            .await;

        let client = StripeClient::try_new(&server.uri().parse().unwrap(), "sk_test").unwrap();
        let err = client
            .create_checkout_session(&CheckoutRequest::new(&cart(), settings()))
            .await
            .unwrap_err();
        assert!(err.message().contains("500"));
    }

    #[test]
    fn test_sessions_url_is_relative_to_api_base() {
        let client =
            StripeClient::try_new(&"https://api.stripe.com/".parse().unwrap(), "sk").unwrap();
        assert_eq!(
            client.sessions_url().as_str(),
            "https://api.stripe.com/v1/checkout/sessions"
        );
        assert!(!format!("{client:?}").contains("sk"));
    }
}
