//! Public endpoints served by the gateway itself.
//!
//! Login, exchange rates, and payment sessions do not require a token. The
//! guarded passthrough endpoints live in [`crate::routes`].

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Router, response::IntoResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

use crate::auth::{AuthError, Session};
use crate::error::GatewayError;
use crate::fx::{CurrencyPair, FxRate};
use crate::gateway::Gateway;
use crate::payment::{CheckoutSession, PaymentItem};

/// Credentials as posted. Fields are kept loose so that a missing or
/// non-string value fails like any other mismatch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    user: Value,
    #[serde(default)]
    password: Value,
}

impl LoginRequest {
    pub fn user(&self) -> Option<&str> {
        self.user.as_str()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_str()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FxQuery {
    pub moneda_base: String,
    pub destino: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyResponse {
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, GatewayError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| GatewayError::InvalidRequest(rejection.body_text()))
}

/// `POST /login`: exchanges credentials for the global and vendor tokens.
#[instrument(skip_all)]
pub async fn post_login(
    State(gateway): State<Arc<Gateway>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<Session>, GatewayError> {
    let request = json_body(body)?;
    let user = request.user().unwrap_or("<missing>");
    let outcome = match (request.user(), request.password()) {
        (Some(user), Some(password)) => {
            gateway
                .authority
                .login(gateway.identity.as_ref(), user, password)
        }
        _ => Err(AuthError::InvalidCredentials),
    };
    match outcome {
        Ok(session) => {
            tracing::info!(%user, role = %session.role, "Login succeeded");
            Ok(Json(session))
        }
        Err(error) => {
            tracing::warn!(%user, "Login rejected");
            Err(error.into())
        }
    }
}

/// `GET /fxrate?moneda_base=XXX&destino=YYY`: live exchange rate.
#[instrument(skip_all)]
pub async fn get_fxrate(
    State(gateway): State<Arc<Gateway>>,
    query: Result<Query<FxQuery>, QueryRejection>,
) -> Result<Json<FxRate>, GatewayError> {
    let Query(query) = query.map_err(|e| GatewayError::InvalidRequest(e.body_text()))?;
    let pair = CurrencyPair::new(&query.moneda_base, &query.destino)?;
    let rate = gateway.fx.get_rate(&pair).await?;
    Ok(Json(rate))
}

/// `POST /stripe/sesion`: opens a checkout session for the cart.
#[instrument(skip_all)]
pub async fn post_stripe_session(
    State(gateway): State<Arc<Gateway>>,
    body: Result<Json<Vec<PaymentItem>>, JsonRejection>,
) -> Result<Json<CheckoutSession>, GatewayError> {
    let items = json_body(body)?;
    let session = gateway.payments.create_session(&items).await.map_err(|error| {
        tracing::warn!(%error, items = items.len(), "Checkout session rejected");
        GatewayError::from(error)
    })?;
    Ok(Json(session))
}

/// `GET /stripe/config`: publishable key for the browser.
#[instrument(skip_all)]
pub async fn get_stripe_config(State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
    match &gateway.public_key {
        Some(key) => Json(PublicKeyResponse {
            public_key: key.clone(),
        })
        .into_response(),
        None => GatewayError::Config("Public key not available".to_string()).into_response(),
    }
}

pub fn routes() -> Router<Arc<Gateway>> {
    Router::new()
        .route("/login", post(post_login))
        .route("/fxrate", get(get_fxrate))
        .route("/stripe/sesion", post(post_stripe_session))
        .route("/stripe/config", get(get_stripe_config))
}
