//! Authentication: accounts, the token authority, and the per-request guards.
//!
//! - [`identity`] - account list and the [`IdentityProvider`] seam
//! - [`token`] - [`TokenAuthority`], login and token checks
//! - [`guard`] - axum middleware enforcing a route's [`Guard`]

pub mod guard;
pub mod identity;
pub mod token;

pub use guard::{AuthContext, Guard, GuardState, TokenCheck};
pub use identity::{Account, IdentityProvider, Role, StaticAccounts};
pub use token::{Session, TokenAuthority};

use axum::http::StatusCode;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidGlobalToken,
    #[error("Vendor access denied")]
    InvalidVendorToken,
    #[error("Invalid credentials")]
    InvalidCredentials,
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidGlobalToken | AuthError::InvalidVendorToken => StatusCode::FORBIDDEN,
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        }
    }
}
