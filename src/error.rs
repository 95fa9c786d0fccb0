//! Uniform error shape returned to clients.
//!
//! Every failure becomes `{"error": "<message>"}` with the status matching its
//! kind. Upstream responses relayed by the Forwarder are not errors, whatever
//! their status.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::auth::AuthError;
use crate::forwarder::ForwardError;
use crate::fx::{CurrencyCodeError, FxError};
use crate::payment::PaymentError;

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// A backend could not be reached, timed out, or answered garbage.
    #[error("{message}")]
    Upstream { status: StatusCode, message: String },
    #[error("Invalid currency code")]
    InvalidCurrency,
    /// The payment provider rejected the session; message is the provider's.
    #[error("{0}")]
    Payment(String),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Config(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Auth(error) => error.status(),
            GatewayError::Upstream { status, .. } => *status,
            GatewayError::InvalidCurrency
            | GatewayError::Payment(_)
            | GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ForwardError> for GatewayError {
    fn from(error: ForwardError) -> Self {
        // Details (upstream host, reqwest cause) stay in the logs.
        let (status, message) = match error {
            ForwardError::Timeout { .. } => {
                (StatusCode::GATEWAY_TIMEOUT, "Upstream service timed out")
            }
            ForwardError::Http { .. } => (StatusCode::BAD_GATEWAY, "Upstream service unavailable"),
            ForwardError::ResponseBodyRead { .. } | ForwardError::InvalidJson { .. } => (
                StatusCode::BAD_GATEWAY,
                "Upstream service returned an invalid response",
            ),
        };
        GatewayError::Upstream {
            status,
            message: message.to_string(),
        }
    }
}

impl From<FxError> for GatewayError {
    fn from(error: FxError) -> Self {
        match error {
            FxError::InvalidCurrency(_) => GatewayError::InvalidCurrency,
            FxError::Provider { .. } | FxError::Http(_) | FxError::Body(_) => {
                GatewayError::Upstream {
                    status: StatusCode::BAD_GATEWAY,
                    message: "Could not fetch exchange rate".to_string(),
                }
            }
        }
    }
}

impl From<CurrencyCodeError> for GatewayError {
    fn from(error: CurrencyCodeError) -> Self {
        GatewayError::InvalidRequest(error.to_string())
    }
}

impl From<PaymentError> for GatewayError {
    fn from(error: PaymentError) -> Self {
        GatewayError::Payment(error.message().to_string())
    }
}
