//! Shared request state and the assembled router.
//!
//! A [`Gateway`] is built once from [`Config`] and shared behind an `Arc`. It
//! holds read-only data and outbound clients only.

use axum::Router;
use std::sync::Arc;

use crate::auth::{Account, IdentityProvider, StaticAccounts, TokenAuthority};
use crate::config::Config;
use crate::forwarder::Forwarder;
use crate::fx::FxClient;
use crate::handlers;
use crate::payment::{CheckoutSettings, PaymentSessions, StripeClient};
use crate::routes;

#[derive(Clone)]
pub struct Gateway {
    pub authority: Arc<TokenAuthority>,
    pub identity: Arc<dyn IdentityProvider>,
    pub forwarder: Forwarder,
    pub fx: FxClient,
    pub payments: PaymentSessions<StripeClient>,
    /// Publishable payment key; `None` when not configured.
    pub public_key: Option<String>,
}

impl Gateway {
    /// Wires every collaborator from configuration. Outbound clients share the
    /// configured request timeout.
    pub fn from_config(config: &Config) -> Result<Self, url::ParseError> {
        let timeout = config.request_timeout();
        let tokens = config.tokens();
        let authority = TokenAuthority::new(
            tokens.global.inner().clone(),
            tokens.vendor_granted.inner().clone(),
            tokens.vendor_denied.inner().clone(),
        );
        let accounts: StaticAccounts = config.accounts().iter().map(Account::from).collect();
        if accounts.is_empty() {
            tracing::warn!("No accounts configured, every login will be rejected");
        }

        let forwarder = Forwarder::new(config.upstream().base_url.inner()).with_timeout(timeout);
        let fx = FxClient::new(
            config.fx().base_url.inner().clone(),
            config.fx().api_key.inner().clone(),
        )
        .with_timeout(timeout);

        let stripe_config = config.stripe();
        let stripe = StripeClient::try_new(
            stripe_config.api_base.inner(),
            stripe_config.secret_key.inner().clone(),
        )?
        .with_timeout(timeout);
        let payments = PaymentSessions::new(stripe, CheckoutSettings::from(stripe_config));

        Ok(Self {
            authority: Arc::new(authority),
            identity: Arc::new(accounts),
            forwarder,
            fx,
            payments,
            public_key: stripe_config.public_key.clone(),
        })
    }

    /// Public endpoints plus the guarded passthrough table.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .merge(handlers::routes())
            .merge(routes::passthrough_routes(self.authority.clone()))
            .with_state(self)
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("forwarder", &self.forwarder)
            .field("fx", &self.fx)
            .field("payments", &self.payments)
            .field("public_key", &self.public_key.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::auth::Role;
    use url::Url;

    pub const GLOBAL: &str = "global-token";
    pub const GRANTED: &str = "vendor-granted";
    pub const DENIED: &str = "vendor-denied";

    /// Gateway whose outbound clients all point at `backend`.
    pub fn gateway(backend: &str, public_key: Option<&str>) -> Gateway {
        let base: Url = backend.parse().unwrap();
        let accounts = StaticAccounts::new(vec![
            Account::new("javier_thompson", "admin-pw", Role::Admin),
            Account::new("ignacio_tapia", "maint-pw", Role::Maintainer),
            Account::new("stripe_sa", "sa-pw", Role::ServiceAccount),
        ]);
        let settings = CheckoutSettings {
            success_url: "https://shop.local/success".to_string(),
            cancel_url: "https://shop.local/cancel".to_string(),
            payment_method_types: vec!["card".to_string()],
        };
        Gateway {
            authority: Arc::new(TokenAuthority::new(GLOBAL, GRANTED, DENIED)),
            identity: Arc::new(accounts),
            forwarder: Forwarder::new(&base),
            fx: FxClient::new(base.join("api/latest").unwrap(), "fx-key"),
            payments: PaymentSessions::new(StripeClient::try_new(&base, "sk_test").unwrap(), settings),
            public_key: public_key.map(str::to_string),
        }
    }

    pub fn router(backend: &str, public_key: Option<&str>) -> Router {
        Arc::new(gateway(backend, public_key)).router()
    }
}
