//! Header guards applied in front of protected routes.
//!
//! Each [`TokenCheck`] is an independent check of one header against the
//! [`TokenAuthority`]. A route's [`Guard`] lists the checks it needs; all of them
//! run, and the first failure in list order is reported, so a request failing
//! both is told about the global token only.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use crate::auth::{AuthError, TokenAuthority};
use crate::error::GatewayError;

pub const GLOBAL_TOKEN_HEADER: &str = "x-authentication";
pub const VENDOR_TOKEN_HEADER: &str = "x-vendor-token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCheck {
    Global,
    Vendor,
}

impl TokenCheck {
    pub fn header(&self) -> &'static str {
        match self {
            TokenCheck::Global => GLOBAL_TOKEN_HEADER,
            TokenCheck::Vendor => VENDOR_TOKEN_HEADER,
        }
    }

    fn run(&self, authority: &TokenAuthority, headers: &HeaderMap) -> Result<(), AuthError> {
        let presented = headers
            .get(self.header())
            .and_then(|value| value.to_str().ok());
        match self {
            TokenCheck::Global => authority.check_global(presented).map(|_| ()),
            TokenCheck::Vendor => authority.check_vendor(presented).map(|_| ()),
        }
    }
}

/// Guard set required by a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    None,
    Global,
    GlobalAndVendor,
}

impl Guard {
    pub fn checks(&self) -> &'static [TokenCheck] {
        match self {
            Guard::None => &[],
            Guard::Global => &[TokenCheck::Global],
            Guard::GlobalAndVendor => &[TokenCheck::Global, TokenCheck::Vendor],
        }
    }

    /// Runs every check and yields the validated global token, if the guard
    /// requires one.
    pub fn authorize(
        &self,
        authority: &TokenAuthority,
        headers: &HeaderMap,
    ) -> Result<Option<AuthContext>, AuthError> {
        let outcomes: Vec<Result<(), AuthError>> = self
            .checks()
            .iter()
            .map(|check| check.run(authority, headers))
            .collect();
        if let Some(Err(error)) = outcomes.into_iter().find(Result::is_err) {
            return Err(error);
        }
        let context = self
            .checks()
            .contains(&TokenCheck::Global)
            .then(|| headers.get(GLOBAL_TOKEN_HEADER))
            .flatten()
            .and_then(|value| value.to_str().ok())
            .map(|token| AuthContext(token.to_string()));
        Ok(context)
    }
}

/// The global token presented by the caller, valid for this request only.
///
/// Inserted into request extensions by [`enforce`]; the Forwarder relays it
/// upstream.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthContext(String);

impl AuthContext {
    pub fn token(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthContext(<redacted>)")
    }
}

/// State of one guard layer.
#[derive(Debug, Clone)]
pub struct GuardState {
    authority: Arc<TokenAuthority>,
    guard: Guard,
}

impl GuardState {
    pub fn new(authority: Arc<TokenAuthority>, guard: Guard) -> Self {
        Self { authority, guard }
    }
}

/// Axum middleware: rejects with 403 before the handler runs.
pub async fn enforce(
    State(state): State<GuardState>,
    mut request: Request,
    next: Next,
) -> Response {
    match state.guard.authorize(&state.authority, request.headers()) {
        Ok(context) => {
            if let Some(context) = context {
                request.extensions_mut().insert(context);
            }
            next.run(request).await
        }
        Err(error) => {
            tracing::warn!(
                method = %request.method(),
                path = %request.uri().path(),
                %error,
                "Rejected request at token guard"
            );
            GatewayError::from(error).into_response()
        }
    }
}
