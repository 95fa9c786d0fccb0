//! The two-tier token model.
//!
//! A single global token protects every non-public route; a vendor token
//! additionally protects the seller routes. Tokens are undifferentiated shared
//! secrets: once issued, the gateway cannot tell which account holds one.

use serde::Serialize;
use std::fmt;

use crate::auth::{AuthError, IdentityProvider, Role};

/// Issues and validates the process-wide tokens.
#[derive(Clone)]
pub struct TokenAuthority {
    global: String,
    vendor_granted: String,
    vendor_denied: String,
}

/// Body of a successful `POST /login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub token: String,
    #[serde(rename = "rol")]
    pub role: Role,
    #[serde(rename = "vendorToken")]
    pub vendor_token: String,
}

impl TokenAuthority {
    pub fn new(
        global: impl Into<String>,
        vendor_granted: impl Into<String>,
        vendor_denied: impl Into<String>,
    ) -> Self {
        Self {
            global: global.into(),
            vendor_granted: vendor_granted.into(),
            vendor_denied: vendor_denied.into(),
        }
    }

    /// Vendor token for `role`: service accounts get the denied value.
    pub fn vendor_token_for(&self, role: Role) -> &str {
        match role {
            Role::ServiceAccount => &self.vendor_denied,
            Role::Admin | Role::Maintainer => &self.vendor_granted,
        }
    }

    /// Authenticates against `identity` and hands out the token pair.
    pub fn login(
        &self,
        identity: &dyn IdentityProvider,
        username: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let role = identity.authenticate(username, password)?;
        Ok(Session {
            token: self.global.clone(),
            role,
            vendor_token: self.vendor_token_for(role).to_string(),
        })
    }

    pub fn check_global<'a>(&self, presented: Option<&'a str>) -> Result<&'a str, AuthError> {
        match presented {
            Some(token) if token == self.global => Ok(token),
            _ => Err(AuthError::InvalidGlobalToken),
        }
    }

    /// Only the granted value passes. The denied value is rejected exactly
    /// like an unknown one.
    pub fn check_vendor<'a>(&self, presented: Option<&'a str>) -> Result<&'a str, AuthError> {
        match presented {
            Some(token) if token == self.vendor_granted => Ok(token),
            _ => Err(AuthError::InvalidVendorToken),
        }
    }
}

impl fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthority").finish_non_exhaustive()
    }
}
